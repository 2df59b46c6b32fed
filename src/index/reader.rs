//! Bundle reader.
//!
//! Loads a serialized bundle back into memory, either from the buffers
//! returned by [`Bundle::to_memory`](crate::index::bundle::Bundle::to_memory)
//! or from a directory on disk. Used by the `stats` command and to verify
//! that what was written can be consumed.

use crate::error::{Result, SitefindError};
use crate::index::bundle::{BundleFile, MANIFEST_FILE, Manifest, PageFragment, file_path};
use crate::index::types::PageIndex;
use crate::utils::{ByteReader, FragmentKind, normalize_word, open_fragment};
use ahash::AHashMap;
use memmap2::Mmap;
use std::collections::BTreeMap;
use std::fs::File;
use std::path::{Path, PathBuf};

/// One page's occurrences of a word
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostingHit {
    pub page: PageIndex,
    pub frequency: u32,
    pub positions: Vec<u32>,
}

/// Word range covered by one index chunk
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkRange {
    pub first: String,
    pub last: String,
    pub path: String,
}

/// Decoded contents of one language partition
#[derive(Debug, Default)]
struct LanguageData {
    pages: Vec<PageFragment>,
    chunks: Vec<ChunkRange>,
    postings: BTreeMap<String, Vec<PostingHit>>,
    filters: BTreeMap<String, BTreeMap<String, Vec<PageIndex>>>,
    sorts: BTreeMap<String, Vec<PageIndex>>,
}

enum Source {
    Memory(AHashMap<String, Vec<u8>>),
    Dir(PathBuf),
}

impl Source {
    /// Run `f` over the bytes of a bundle file
    fn with_file<T>(&self, path: &str, f: impl FnOnce(&[u8]) -> Result<T>) -> Result<T> {
        if path.starts_with('/') || path.split('/').any(|part| part == "..") {
            return Err(SitefindError::corrupt(format!("refusing bundle path {:?}", path)));
        }
        match self {
            Source::Memory(files) => {
                let bytes = files
                    .get(path)
                    .ok_or_else(|| SitefindError::corrupt(format!("missing bundle file {}", path)))?;
                f(bytes)
            }
            Source::Dir(root) => {
                let file = File::open(root.join(path))?;
                if file.metadata()?.len() == 0 {
                    return f(&[]);
                }
                // SAFETY: the bundle is treated as immutable while it is read
                let mmap = unsafe { Mmap::map(&file)? };
                f(&mmap)
            }
        }
    }
}

/// Read-only view over a serialized bundle
pub struct BundleReader {
    manifest: Manifest,
    languages: BTreeMap<String, LanguageData>,
}

impl BundleReader {
    /// Load from in-memory files
    pub fn from_files(files: Vec<BundleFile>) -> Result<Self> {
        let files = files.into_iter().map(|f| (f.path, f.content)).collect();
        Self::load(Source::Memory(files))
    }

    /// Load from a bundle directory
    pub fn open(dir: &Path) -> Result<Self> {
        if !dir.join(MANIFEST_FILE).is_file() {
            return Err(SitefindError::corrupt(format!(
                "no {} in {}",
                MANIFEST_FILE,
                dir.display()
            )));
        }
        Self::load(Source::Dir(dir.to_path_buf()))
    }

    fn load(source: Source) -> Result<Self> {
        let manifest: Manifest =
            source.with_file(MANIFEST_FILE, |bytes| Ok(serde_json::from_slice(bytes)?))?;

        let mut languages = BTreeMap::new();
        for (language, entry) in &manifest.languages {
            let data = load_language(&source, language, &entry.meta)?;
            if data.pages.len() as u32 != entry.page_count {
                return Err(SitefindError::corrupt(format!(
                    "{}: manifest lists {} pages, meta has {}",
                    language,
                    entry.page_count,
                    data.pages.len()
                )));
            }
            languages.insert(language.clone(), data);
        }

        Ok(Self {
            manifest,
            languages,
        })
    }

    pub fn manifest(&self) -> &Manifest {
        &self.manifest
    }

    pub fn languages(&self) -> impl Iterator<Item = &str> {
        self.languages.keys().map(String::as_str)
    }

    pub fn page_count(&self, language: &str) -> usize {
        self.languages.get(language).map_or(0, |l| l.pages.len())
    }

    pub fn page(&self, language: &str, page: PageIndex) -> Option<&PageFragment> {
        self.languages.get(language)?.pages.get(page as usize)
    }

    pub fn page_url(&self, language: &str, page: PageIndex) -> Option<&str> {
        self.page(language, page).map(|p| p.url.as_str())
    }

    /// Pages containing a word; the query goes through the indexing tokenizer first
    pub fn lookup(&self, language: &str, word: &str) -> &[PostingHit] {
        let Some(data) = self.languages.get(language) else {
            return &[];
        };
        normalize_word(word)
            .and_then(|w| data.postings.get(&w))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Pages tagged with `value` under filter `name`, ascending
    pub fn filter_pages(&self, language: &str, name: &str, value: &str) -> &[PageIndex] {
        self.languages
            .get(language)
            .and_then(|l| l.filters.get(name))
            .and_then(|values| values.get(value))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Filter names and values of a language
    pub fn filter_values(&self, language: &str) -> BTreeMap<&str, Vec<&str>> {
        self.languages
            .get(language)
            .map(|l| {
                l.filters
                    .iter()
                    .map(|(name, values)| (name.as_str(), values.keys().map(String::as_str).collect()))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Pages carrying sort key `key`, in sort order
    pub fn sorted_pages(&self, language: &str, key: &str) -> &[PageIndex] {
        self.languages
            .get(language)
            .and_then(|l| l.sorts.get(key))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn sort_keys(&self, language: &str) -> impl Iterator<Item = &str> {
        self.languages
            .get(language)
            .into_iter()
            .flat_map(|l| l.sorts.keys().map(String::as_str))
    }

    pub fn chunks(&self, language: &str) -> &[ChunkRange] {
        self.languages
            .get(language)
            .map(|l| l.chunks.as_slice())
            .unwrap_or(&[])
    }

    /// Distinct words stored for a language
    pub fn word_count(&self, language: &str) -> usize {
        self.languages.get(language).map_or(0, |l| l.postings.len())
    }
}

fn load_language(source: &Source, language: &str, meta_path: &str) -> Result<LanguageData> {
    let mut data = LanguageData::default();
    let mut page_stems = Vec::new();
    let (filter_stem, sort_stem) = source.with_file(meta_path, |bytes| {
        let mut r = ByteReader::new(open_fragment(bytes, FragmentKind::Meta)?);
        let stored_language = r.str()?;
        if stored_language != language {
            return Err(SitefindError::corrupt(format!(
                "meta of {} claims language {}",
                language, stored_language
            )));
        }
        for _ in 0..r.varint()? {
            page_stems.push(r.str()?.to_string());
            r.varint()?;
        }
        for _ in 0..r.varint()? {
            let first = r.str()?.to_string();
            let last = r.str()?.to_string();
            let path = file_path("index", r.str()?, "sf_index");
            data.chunks.push(ChunkRange { first, last, path });
        }
        Ok((r.str()?.to_string(), r.str()?.to_string()))
    })?;

    for stem in &page_stems {
        let path = file_path("fragment", stem, "sf_fragment");
        let page: PageFragment = source.with_file(&path, |bytes| Ok(serde_json::from_slice(bytes)?))?;
        data.pages.push(page);
    }
    let page_count = data.pages.len() as u32;
    let check_page = |page: PageIndex| {
        if page < page_count {
            Ok(page)
        } else {
            Err(SitefindError::corrupt(format!("page {} out of range", page)))
        }
    };

    for chunk in &data.chunks {
        source.with_file(&chunk.path, |bytes| {
            let mut r = ByteReader::new(open_fragment(bytes, FragmentKind::Index)?);
            for _ in 0..r.varint()? {
                let word = r.str()?;
                if word < chunk.first.as_str() || word > chunk.last.as_str() {
                    return Err(SitefindError::corrupt(format!(
                        "word {:?} outside chunk {}",
                        word, chunk.path
                    )));
                }
                let mut hits = Vec::new();
                let mut page = 0u32;
                for _ in 0..r.varint()? {
                    page = check_page(page.saturating_add(r.varint()?))?;
                    let positions = r.delta_list()?;
                    hits.push(PostingHit {
                        page,
                        frequency: positions.len() as u32,
                        positions,
                    });
                }
                data.postings.insert(word.to_string(), hits);
            }
            Ok(())
        })?;
    }

    source.with_file(&file_path("filter", &filter_stem, "sf_filter"), |bytes| {
        let mut r = ByteReader::new(open_fragment(bytes, FragmentKind::Filter)?);
        for _ in 0..r.varint()? {
            let name = r.str()?.to_string();
            let values = data.filters.entry(name).or_default();
            for _ in 0..r.varint()? {
                let value = r.str()?.to_string();
                let pages = r
                    .delta_list()?
                    .into_iter()
                    .map(check_page)
                    .collect::<Result<Vec<_>>>()?;
                values.insert(value, pages);
            }
        }
        Ok(())
    })?;

    source.with_file(&file_path("sort", &sort_stem, "sf_sort"), |bytes| {
        let mut r = ByteReader::new(open_fragment(bytes, FragmentKind::Sort)?);
        for _ in 0..r.varint()? {
            let key = r.str()?.to_string();
            let mut pages = Vec::new();
            for _ in 0..r.varint()? {
                pages.push(check_page(r.varint()?)?);
                r.str()?;
            }
            data.sorts.insert(key, pages);
        }
        Ok(())
    })?;

    Ok(data)
}
