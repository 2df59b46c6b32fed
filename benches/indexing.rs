//! Indexing and serialization benchmarks on a synthetic site.
//!
//! Run with: `cargo bench`
//! Save baseline: `cargo bench -- --save-baseline main`
//! Compare: `cargo bench -- --baseline main`

use criterion::{Criterion, Throughput, criterion_group, criterion_main};
use sitefind::index::bundle;
use sitefind::index::{Document, IndexWriter, Normalizer};
use sitefind::utils::term_positions;
use sitefind::{HtmlFile, IndexConfig};
use std::hint::black_box;

const WORDS: &[&str] = &[
    "search", "static", "index", "bundle", "page", "language", "filter", "sort", "token", "rust",
    "fragment", "manifest", "posting", "document", "site", "query", "runtime", "compact", "build",
    "deploy",
];

fn paragraph(seed: usize, len: usize) -> String {
    (0..len)
        .map(|i| WORDS[(seed * 31 + i * 7) % WORDS.len()])
        .collect::<Vec<_>>()
        .join(" ")
}

fn html_page(i: usize) -> HtmlFile {
    HtmlFile {
        path: format!("section{}/page{}/index.html", i % 10, i),
        content: format!(
            "<html lang=\"en\"><head><title>Page {i}</title></head><body>\
             <nav>Home About Blog</nav><main><h1 id=\"top\">Page {i}</h1>\
             <p>{}</p><h2 id=\"more\">More</h2><p>{}</p>\
             <span data-sitefind-filter=\"section:s{}\"></span></main></body></html>",
            paragraph(i, 200),
            paragraph(i + 1, 200),
            i % 10
        ),
    }
}

fn bench_tokenize(c: &mut Criterion) {
    let text = paragraph(0, 5_000);
    let mut group = c.benchmark_group("tokenize");
    group.throughput(Throughput::Bytes(text.len() as u64));
    group.bench_function("term_positions_5k_words", |b| {
        b.iter(|| term_positions(black_box(&text)))
    });
    group.finish();
}

fn bench_normalize(c: &mut Criterion) {
    let normalizer = Normalizer::new(&IndexConfig::default()).unwrap();
    let page = html_page(1);
    c.bench_function("normalize_html_page", |b| {
        b.iter(|| normalizer.html_file(black_box(&page)).unwrap())
    });
}

fn bench_build_and_serialize(c: &mut Criterion) {
    let normalizer = Normalizer::new(&IndexConfig::default()).unwrap();
    let documents: Vec<Document> = (0..500)
        .map(|i| normalizer.html_file(&html_page(i)).unwrap())
        .collect();

    let mut group = c.benchmark_group("index");
    group.sample_size(20);
    group.bench_function("insert_500_pages", |b| {
        b.iter(|| {
            let mut writer = IndexWriter::new(IndexConfig::default()).unwrap();
            for doc in documents.iter().cloned() {
                writer.insert(doc).unwrap();
            }
            writer
        })
    });

    let mut writer = IndexWriter::new(IndexConfig::default()).unwrap();
    for doc in documents.iter().cloned() {
        writer.insert(doc).unwrap();
    }
    group.bench_function("serialize_500_pages", |b| {
        b.iter(|| bundle::serialize(black_box(&writer)).unwrap())
    });
    group.finish();
}

criterion_group!(benches, bench_tokenize, bench_normalize, bench_build_and_serialize);
criterion_main!(benches);
