//! Bundle serialization.
//!
//! Compiles the in-memory partitions into the files a static search runtime
//! loads. For each language:
//!
//! - `meta/<lang>_<hash>.sf_meta` - pages, index chunk boundaries, filter
//!   and sort names
//! - `index/<lang>_<hash>.sf_index` - word dictionary and postings, split
//!   into chunks of roughly `index_chunk_size` bytes
//! - `filter/<lang>_<hash>.sf_filter` - filter values to pages
//! - `sort/<lang>_<hash>.sf_sort` - pages pre-ordered per sort key
//! - `fragment/<lang>_<hash>.sf_fragment` - one JSON document per page
//!
//! plus the `sitefind-entry.json` manifest. `<hash>` is the CRC-32 of the
//! file's bytes, so names change exactly when content does.
//!
//! Pages are numbered by ascending `(url, document id)`, which makes the
//! output independent of insertion order.

use crate::error::{Result, SitefindError};
use crate::index::partition::Partition;
use crate::index::types::{Anchor, DocId, PageIndex};
use crate::index::writer::IndexWriter;
use crate::utils::{FORMAT_VERSION, FragmentKind, delta_encode, encode_str, encode_varint, seal_fragment};
use ahash::AHashMap;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

/// Name of the manifest file at the bundle root
pub const MANIFEST_FILE: &str = "sitefind-entry.json";

/// Directory name used when no bundle path is given
pub const DEFAULT_BUNDLE_DIR: &str = "_sitefind";

/// One output file, path relative to the bundle root
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BundleFile {
    pub path: String,
    pub content: Vec<u8>,
}

/// Top-level manifest tying the language partitions together
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    pub format_version: u16,
    pub generator: String,
    pub languages: BTreeMap<String, LanguageEntry>,
}

/// Manifest summary of one language partition
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LanguageEntry {
    /// Stem of the meta file, changes whenever the partition does
    pub hash: String,
    pub page_count: u32,
    /// Distinct words in the partition
    pub word_count: u32,
    pub meta: String,
    pub index: Vec<String>,
    pub filter: String,
    pub sort: String,
}

/// Per-page document stored as a JSON fragment
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageFragment {
    pub url: String,
    pub language: String,
    pub content: String,
    pub word_count: u32,
    pub meta: BTreeMap<String, String>,
    pub filters: BTreeMap<String, Vec<String>>,
    pub sort: BTreeMap<String, String>,
    pub anchors: Vec<Anchor>,
}

/// A serialized index, ready to be written or handed out in memory
#[derive(Debug, Clone)]
pub struct Bundle {
    manifest: Manifest,
    /// Fragment files keyed by path, manifest excluded
    files: BTreeMap<String, Vec<u8>>,
}

impl Bundle {
    pub fn manifest(&self) -> &Manifest {
        &self.manifest
    }

    /// All files as in-memory buffers: fragments by path, manifest last
    pub fn to_memory(&self) -> Result<Vec<BundleFile>> {
        let mut out: Vec<BundleFile> = self
            .files
            .iter()
            .map(|(path, content)| BundleFile {
                path: path.clone(),
                content: content.clone(),
            })
            .collect();
        out.push(BundleFile {
            path: MANIFEST_FILE.to_string(),
            content: self.manifest_bytes()?,
        });
        Ok(out)
    }

    /// Write every file below `target`, creating directories as needed.
    ///
    /// Relative targets are resolved against the current directory. Returns
    /// the absolute path written to. Not atomic: on error, files written so
    /// far are left in place.
    pub fn write(&self, target: &Path) -> Result<PathBuf> {
        let target = if target.is_relative() {
            std::env::current_dir()?.join(target)
        } else {
            target.to_path_buf()
        };
        fs::create_dir_all(&target)?;
        let target = target.canonicalize()?;

        for file in self.to_memory()? {
            let path = target.join(&file.path);
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::write(&path, &file.content)?;
        }

        info!(
            path = %target.display(),
            files = self.files.len() + 1,
            "bundle written"
        );
        Ok(target)
    }

    fn manifest_bytes(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec_pretty(&self.manifest)?)
    }
}

/// Compile the current state of an index into a bundle; the index is not modified
pub fn serialize(writer: &IndexWriter) -> Result<Bundle> {
    let chunk_size = writer.config().index_chunk_size;
    let mut files = BTreeMap::new();
    let mut languages = BTreeMap::new();

    for partition in writer.partitions().iter() {
        let entry = serialize_partition(partition, chunk_size, &mut files)?;
        languages.insert(partition.language().to_string(), entry);
    }

    info!(
        languages = languages.len(),
        files = files.len() + 1,
        "bundle serialized"
    );

    Ok(Bundle {
        manifest: Manifest {
            format_version: FORMAT_VERSION,
            generator: format!("sitefind {}", env!("CARGO_PKG_VERSION")),
            languages,
        },
        files,
    })
}

/// Add a file under `<kind>/<lang>_<crc>.<ext>` and return its stem
///
/// Identical content shares one file. Two different contents with the same
/// checksum cannot both be addressed, so that case is an error.
fn add_file(
    files: &mut BTreeMap<String, Vec<u8>>,
    kind: &str,
    ext: &str,
    language: &str,
    content: Vec<u8>,
) -> Result<String> {
    let stem = format!("{}_{:08x}", language, crc32fast::hash(&content));
    let path = file_path(kind, &stem, ext);
    match files.get(&path) {
        Some(existing) if *existing != content => {
            return Err(SitefindError::corrupt(format!(
                "{}: two different fragments hash to the same name",
                path
            )));
        }
        Some(_) => {}
        None => {
            files.insert(path, content);
        }
    }
    Ok(stem)
}

pub(crate) fn file_path(kind: &str, stem: &str, ext: &str) -> String {
    format!("{}/{}.{}", kind, stem, ext)
}

/// Word dictionary chunk boundaries recorded in the meta file
struct ChunkInfo {
    first: String,
    last: String,
    stem: String,
}

fn serialize_partition(
    partition: &Partition,
    chunk_size: usize,
    files: &mut BTreeMap<String, Vec<u8>>,
) -> Result<LanguageEntry> {
    let language = partition.language();

    // Page numbering by (url, id)
    let mut docs: Vec<_> = partition.documents().collect();
    docs.sort_by(|a, b| a.document.url.cmp(&b.document.url).then(a.id.cmp(&b.id)));
    let page_of: AHashMap<DocId, PageIndex> = docs
        .iter()
        .enumerate()
        .map(|(page, doc)| (doc.id, page as PageIndex))
        .collect();

    // Page fragments
    let mut pages = Vec::with_capacity(docs.len());
    for doc in &docs {
        let fragment = PageFragment {
            url: doc.document.url.clone(),
            language: language.to_string(),
            content: doc.document.content.clone(),
            word_count: doc.word_count,
            meta: doc.document.meta.clone(),
            filters: doc
                .document
                .filters
                .iter()
                .map(|(name, values)| (name.clone(), values.iter().cloned().collect()))
                .collect(),
            sort: doc.document.sort.clone(),
            anchors: doc.document.anchors.clone(),
        };
        let stem = add_file(files, "fragment", "sf_fragment", language, serde_json::to_vec(&fragment)?)?;
        pages.push((stem, doc.word_count));
    }

    // Index chunks
    let mut chunks: Vec<ChunkInfo> = Vec::new();
    let mut current = Vec::new();
    let mut current_words = 0u32;
    let mut first_word: Option<&str> = None;
    let mut last_word = "";
    for (word, postings) in partition.postings() {
        let mut entry = Vec::new();
        encode_str(word, &mut entry);
        encode_varint(postings.len() as u32, &mut entry);
        let mut by_page: Vec<_> = postings
            .iter()
            .map(|p| (page_of[&p.doc], &p.positions))
            .collect();
        by_page.sort_by_key(|(page, _)| *page);
        let mut prev_page = 0;
        for (page, positions) in by_page {
            encode_varint(page - prev_page, &mut entry);
            delta_encode(positions, &mut entry);
            prev_page = page;
        }

        if current_words > 0 && current.len() + entry.len() > chunk_size {
            chunks.push(flush_chunk(files, language, &mut current, &mut current_words, first_word, last_word)?);
            first_word = None;
        }
        if first_word.is_none() {
            first_word = Some(word.as_str());
        }
        last_word = word.as_str();
        current.extend_from_slice(&entry);
        current_words += 1;
    }
    if current_words > 0 {
        chunks.push(flush_chunk(files, language, &mut current, &mut current_words, first_word, last_word)?);
    }

    // Filters
    let mut payload = Vec::new();
    encode_varint(partition.filters().len() as u32, &mut payload);
    for (name, values) in partition.filters() {
        encode_str(name, &mut payload);
        encode_varint(values.len() as u32, &mut payload);
        for (value, docs) in values {
            encode_str(value, &mut payload);
            let mut pages: Vec<PageIndex> = docs.iter().map(|id| page_of[&id]).collect();
            pages.sort_unstable();
            delta_encode(&pages, &mut payload);
        }
    }
    let filter_stem = add_file(
        files,
        "filter",
        "sf_filter",
        language,
        seal_fragment(FragmentKind::Filter, &payload),
    )?;

    // Sorts
    let mut payload = Vec::new();
    encode_varint(partition.sorts().len() as u32, &mut payload);
    for (key, column) in partition.sorts() {
        let mut entries: Vec<(PageIndex, &str)> = column
            .iter()
            .map(|(id, value)| (page_of[id], value.as_str()))
            .collect();
        entries.sort_by(|a, b| compare_sort_values(a.1, b.1).then(a.0.cmp(&b.0)));
        encode_str(key, &mut payload);
        encode_varint(entries.len() as u32, &mut payload);
        for (page, value) in entries {
            encode_varint(page, &mut payload);
            encode_str(value, &mut payload);
        }
    }
    let sort_stem = add_file(
        files,
        "sort",
        "sf_sort",
        language,
        seal_fragment(FragmentKind::Sort, &payload),
    )?;

    // Meta
    let mut payload = Vec::new();
    encode_str(language, &mut payload);
    encode_varint(pages.len() as u32, &mut payload);
    for (stem, word_count) in &pages {
        encode_str(stem, &mut payload);
        encode_varint(*word_count, &mut payload);
    }
    encode_varint(chunks.len() as u32, &mut payload);
    for chunk in &chunks {
        encode_str(&chunk.first, &mut payload);
        encode_str(&chunk.last, &mut payload);
        encode_str(&chunk.stem, &mut payload);
    }
    encode_str(&filter_stem, &mut payload);
    encode_str(&sort_stem, &mut payload);
    encode_varint(partition.filters().len() as u32, &mut payload);
    for name in partition.filters().keys() {
        encode_str(name, &mut payload);
    }
    encode_varint(partition.sorts().len() as u32, &mut payload);
    for key in partition.sorts().keys() {
        encode_str(key, &mut payload);
    }
    let meta_stem = add_file(
        files,
        "meta",
        "sf_meta",
        language,
        seal_fragment(FragmentKind::Meta, &payload),
    )?;

    Ok(LanguageEntry {
        page_count: pages.len() as u32,
        word_count: partition.postings().len() as u32,
        meta: file_path("meta", &meta_stem, "sf_meta"),
        index: chunks
            .iter()
            .map(|c| file_path("index", &c.stem, "sf_index"))
            .collect(),
        filter: file_path("filter", &filter_stem, "sf_filter"),
        sort: file_path("sort", &sort_stem, "sf_sort"),
        hash: meta_stem,
    })
}

fn flush_chunk(
    files: &mut BTreeMap<String, Vec<u8>>,
    language: &str,
    current: &mut Vec<u8>,
    current_words: &mut u32,
    first: Option<&str>,
    last: &str,
) -> Result<ChunkInfo> {
    let mut payload = Vec::with_capacity(current.len() + 5);
    encode_varint(*current_words, &mut payload);
    payload.append(current);
    *current_words = 0;

    let stem = add_file(
        files,
        "index",
        "sf_index",
        language,
        seal_fragment(FragmentKind::Index, &payload),
    )?;
    Ok(ChunkInfo {
        first: first.unwrap_or(last).to_string(),
        last: last.to_string(),
        stem,
    })
}

/// Order of sort values: numbers first, by value, then text in byte order.
///
/// Numerically equal spellings (`2.5`, `2.50`) fall back to byte order so
/// the result is a total order over all strings.
pub fn compare_sort_values(a: &str, b: &str) -> Ordering {
    let number = |v: &str| v.trim().parse::<f64>().ok().filter(|n| !n.is_nan());
    match (number(a), number(b)) {
        (Some(x), Some(y)) => x.total_cmp(&y).then_with(|| a.cmp(b)),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => a.cmp(b),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::IndexConfig;
    use crate::index::types::Document;
    use crate::utils::{ByteReader, open_fragment};
    use tempfile::TempDir;

    fn writer_with(docs: &[(&str, &str, &str)]) -> IndexWriter {
        let mut writer = IndexWriter::new(IndexConfig::default()).unwrap();
        for (url, language, content) in docs {
            writer
                .insert(Document {
                    url: url.to_string(),
                    language: language.to_string(),
                    content: content.to_string(),
                    ..Default::default()
                })
                .unwrap();
        }
        writer
    }

    #[test]
    fn test_manifest_lists_languages() {
        let writer = writer_with(&[("/a", "en", "hello"), ("/b", "fr", "bonjour"), ("/c", "en", "world")]);
        let bundle = serialize(&writer).unwrap();
        let manifest = bundle.manifest();

        assert_eq!(manifest.format_version, FORMAT_VERSION);
        assert_eq!(manifest.languages.len(), 2);
        assert_eq!(manifest.languages["en"].page_count, 2);
        assert_eq!(manifest.languages["en"].word_count, 2);
        assert!(manifest.languages["fr"].meta.starts_with("meta/fr_"));
        assert!(manifest.languages["fr"].index[0].ends_with(".sf_index"));
    }

    #[test]
    fn test_memory_files_sorted_manifest_last() {
        let writer = writer_with(&[("/a", "en", "hello")]);
        let files = serialize(&writer).unwrap().to_memory().unwrap();

        assert_eq!(files.last().unwrap().path, MANIFEST_FILE);
        let paths: Vec<_> = files[..files.len() - 1].iter().map(|f| f.path.clone()).collect();
        let mut sorted = paths.clone();
        sorted.sort();
        assert_eq!(paths, sorted);
    }

    #[test]
    fn test_insertion_order_does_not_matter() {
        let forward = writer_with(&[("/a", "en", "alpha beta"), ("/b", "en", "beta gamma")]);
        let backward = writer_with(&[("/b", "en", "beta gamma"), ("/a", "en", "alpha beta")]);

        let forward = serialize(&forward).unwrap().to_memory().unwrap();
        let backward = serialize(&backward).unwrap().to_memory().unwrap();
        assert_eq!(forward, backward);
    }

    #[test]
    fn test_serialize_is_read_only_and_repeatable() {
        let writer = writer_with(&[("/a", "en", "alpha beta")]);
        let first = serialize(&writer).unwrap().to_memory().unwrap();
        let second = serialize(&writer).unwrap().to_memory().unwrap();
        assert_eq!(first, second);
        assert_eq!(writer.doc_count(), 1);
    }

    #[test]
    fn test_small_chunk_size_splits_index() {
        let config = IndexConfig {
            index_chunk_size: 16,
            ..IndexConfig::default()
        };
        let mut writer = IndexWriter::new(config).unwrap();
        writer
            .insert(Document {
                url: "/a".into(),
                language: "en".into(),
                content: "apple banana cherry damson elderberry fig grape".into(),
                ..Default::default()
            })
            .unwrap();

        let bundle = serialize(&writer).unwrap();
        let index = &bundle.manifest().languages["en"].index;
        assert!(index.len() > 1);

        // Every chunk holds at least one word and chunks cover all words
        let files = bundle.to_memory().unwrap();
        let mut total = 0;
        for path in index {
            let file = files.iter().find(|f| &f.path == path).unwrap();
            let payload = open_fragment(&file.content, FragmentKind::Index).unwrap();
            let words = ByteReader::new(payload).varint().unwrap();
            assert!(words >= 1);
            total += words;
        }
        assert_eq!(total, 7);
    }

    #[test]
    fn test_write_matches_memory() {
        let writer = writer_with(&[("/about/", "en", "Meet the team")]);
        let bundle = serialize(&writer).unwrap();
        let dir = TempDir::new().unwrap();
        let target = dir.path().join("public").join("_sitefind");

        let written = bundle.write(&target).unwrap();
        assert!(written.is_absolute());
        for file in bundle.to_memory().unwrap() {
            let on_disk = fs::read(written.join(&file.path)).unwrap();
            assert_eq!(on_disk, file.content, "{}", file.path);
        }
    }

    #[test]
    fn test_empty_index() {
        let writer = writer_with(&[]);
        let bundle = serialize(&writer).unwrap();
        assert!(bundle.manifest().languages.is_empty());
        assert_eq!(bundle.to_memory().unwrap().len(), 1);
    }

    #[test]
    fn test_compare_sort_values() {
        assert_eq!(compare_sort_values("9", "10"), Ordering::Less);
        assert_eq!(compare_sort_values("2.5", "2.50"), Ordering::Less);
        assert_eq!(compare_sort_values("apple", "banana"), Ordering::Less);
        assert_eq!(compare_sort_values("10", "apple"), Ordering::Less);
        assert_eq!(compare_sort_values("1a", "9"), Ordering::Greater);
        assert_eq!(compare_sort_values("NaN", "1"), Ordering::Greater);
    }

    #[test]
    fn test_mixed_sort_column() {
        let mut writer = IndexWriter::new(IndexConfig::default()).unwrap();
        let mut values = Vec::new();
        let mut state: u32 = 12345;
        for i in 0..3000 {
            state = state.wrapping_mul(1_103_515_245).wrapping_add(12345);
            let n = (state >> 16) % 1000;
            let value = if state & 1 == 0 { n.to_string() } else { format!("{}x", n) };
            writer
                .insert(Document {
                    url: format!("/p{:04}", i),
                    language: "en".into(),
                    content: "page".into(),
                    sort: BTreeMap::from([("rank".to_string(), value.clone())]),
                    ..Default::default()
                })
                .unwrap();
            values.push(value);
        }

        let files = serialize(&writer).unwrap().to_memory().unwrap();
        let reader = crate::index::reader::BundleReader::from_files(files).unwrap();
        let order = reader.sorted_pages("en", "rank");
        assert_eq!(order.len(), values.len());
        for pair in order.windows(2) {
            let (a, b) = (&values[pair[0] as usize], &values[pair[1] as usize]);
            assert_ne!(compare_sort_values(a, b), Ordering::Greater, "{} before {}", a, b);
        }
        let first_text = order
            .iter()
            .position(|&page| values[page as usize].ends_with('x'))
            .unwrap();
        assert!(order[first_text..].iter().all(|&page| values[page as usize].ends_with('x')));
    }

    #[test]
    fn test_hash_collision_is_reported() {
        let mut files = BTreeMap::new();
        let content = b"fragment".to_vec();
        let stem = add_file(&mut files, "sort", "sf_sort", "en", content.clone()).unwrap();
        assert_eq!(add_file(&mut files, "sort", "sf_sort", "en", content.clone()).unwrap(), stem);
        assert_eq!(files.len(), 1);

        let path = file_path("sort", &stem, "sf_sort");
        files.insert(path, b"something else".to_vec());
        assert!(matches!(
            add_file(&mut files, "sort", "sf_sort", "en", content),
            Err(SitefindError::Corrupt(_))
        ));
    }
}
