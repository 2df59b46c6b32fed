//! Per-language index state.
//!
//! A [`Partition`] owns the documents, postings, filter table and sort table
//! of one language. [`Partitions`] routes documents to the partition named by
//! their `language` field, creating it on first use. Partitions never share
//! postings.

use crate::config::DuplicateUrlPolicy;
use crate::error::{Result, SitefindError};
use crate::index::types::{DocId, Document};
use crate::utils::term_positions;
use ahash::AHashMap;
use roaring::RoaringBitmap;
use std::collections::BTreeMap;

/// One document's occurrences of a word
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Posting {
    pub doc: DocId,
    pub positions: Vec<u32>,
}

impl Posting {
    pub fn frequency(&self) -> u32 {
        self.positions.len() as u32
    }
}

/// A normalized document with its tokens already grouped by word.
///
/// Building this is the expensive part of an insertion and needs no access to
/// shared state, so it can happen on any thread.
#[derive(Debug, Clone)]
pub struct PreparedDocument {
    pub document: Document,
    pub terms: BTreeMap<String, Vec<u32>>,
    pub word_count: u32,
}

impl PreparedDocument {
    pub fn new(document: Document) -> Self {
        let terms = term_positions(&document.content);
        let word_count = terms.values().map(|p| p.len() as u32).sum();
        Self {
            document,
            terms,
            word_count,
        }
    }

    pub fn unique_words(&self) -> usize {
        self.terms.len()
    }
}

/// A document as stored in its partition
#[derive(Debug, Clone)]
pub struct StoredDocument {
    pub id: DocId,
    pub document: Document,
    pub word_count: u32,
    /// Distinct words this document contributed, in order
    pub words: Vec<String>,
}

/// Complete index state for one language
#[derive(Debug, Default)]
pub struct Partition {
    language: String,
    documents: BTreeMap<DocId, StoredDocument>,
    url_to_ids: AHashMap<String, Vec<DocId>>,
    postings: BTreeMap<String, Vec<Posting>>,
    filters: BTreeMap<String, BTreeMap<String, RoaringBitmap>>,
    sorts: BTreeMap<String, BTreeMap<DocId, String>>,
    next_id: DocId,
}

impl Partition {
    pub fn new(language: &str) -> Self {
        Self {
            language: language.to_string(),
            ..Default::default()
        }
    }

    pub fn language(&self) -> &str {
        &self.language
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    pub fn documents(&self) -> impl Iterator<Item = &StoredDocument> {
        self.documents.values()
    }

    pub fn document(&self, id: DocId) -> Option<&StoredDocument> {
        self.documents.get(&id)
    }

    pub fn ids_for_url(&self, url: &str) -> &[DocId] {
        self.url_to_ids.get(url).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Postings of every word, in word order
    pub fn postings(&self) -> &BTreeMap<String, Vec<Posting>> {
        &self.postings
    }

    pub fn postings_for(&self, word: &str) -> Option<&[Posting]> {
        self.postings.get(word).map(Vec::as_slice)
    }

    pub fn filters(&self) -> &BTreeMap<String, BTreeMap<String, RoaringBitmap>> {
        &self.filters
    }

    pub fn sorts(&self) -> &BTreeMap<String, BTreeMap<DocId, String>> {
        &self.sorts
    }

    /// Insert a document, honouring the duplicate URL policy.
    ///
    /// Either the whole document is applied or, on error, nothing is.
    pub fn insert(&mut self, prepared: PreparedDocument, policy: DuplicateUrlPolicy) -> Result<DocId> {
        let url = prepared.document.url.clone();
        let existing = self.url_to_ids.get(&url).and_then(|ids| ids.last().copied());

        let id = match (existing, policy) {
            (Some(_), DuplicateUrlPolicy::Reject) => {
                return Err(SitefindError::invalid_field(format!(
                    "duplicate url {} in language {}",
                    url, self.language
                )));
            }
            (Some(id), DuplicateUrlPolicy::Replace) => {
                self.remove_contributions(id);
                id
            }
            (_, _) => {
                let id = self.next_id;
                self.next_id += 1;
                self.url_to_ids.entry(url).or_default().push(id);
                id
            }
        };

        self.apply(id, prepared);
        Ok(id)
    }

    fn apply(&mut self, id: DocId, prepared: PreparedDocument) {
        let PreparedDocument {
            document,
            terms,
            word_count,
        } = prepared;

        let mut words = Vec::with_capacity(terms.len());
        for (word, positions) in terms {
            let list = self.postings.entry(word.clone()).or_default();
            let at = list.partition_point(|p| p.doc < id);
            list.insert(at, Posting { doc: id, positions });
            words.push(word);
        }

        for (name, values) in &document.filters {
            let table = self.filters.entry(name.clone()).or_default();
            for value in values {
                table.entry(value.clone()).or_default().insert(id);
            }
        }

        for (key, value) in &document.sort {
            self.sorts
                .entry(key.clone())
                .or_default()
                .insert(id, value.clone());
        }

        self.documents.insert(
            id,
            StoredDocument {
                id,
                document,
                word_count,
                words,
            },
        );
    }

    /// Strip a document from every table, pruning entries that become empty
    fn remove_contributions(&mut self, id: DocId) {
        let Some(stored) = self.documents.remove(&id) else {
            return;
        };

        for word in &stored.words {
            if let Some(list) = self.postings.get_mut(word) {
                if let Ok(at) = list.binary_search_by_key(&id, |p| p.doc) {
                    list.remove(at);
                }
                if list.is_empty() {
                    self.postings.remove(word);
                }
            }
        }

        for (name, values) in &stored.document.filters {
            if let Some(table) = self.filters.get_mut(name) {
                for value in values {
                    if let Some(bitmap) = table.get_mut(value) {
                        bitmap.remove(id);
                        if bitmap.is_empty() {
                            table.remove(value);
                        }
                    }
                }
                if table.is_empty() {
                    self.filters.remove(name);
                }
            }
        }

        for key in stored.document.sort.keys() {
            if let Some(column) = self.sorts.get_mut(key) {
                column.remove(&id);
                if column.is_empty() {
                    self.sorts.remove(key);
                }
            }
        }
    }
}

/// Language partitioner
#[derive(Debug, Default)]
pub struct Partitions {
    by_language: BTreeMap<String, Partition>,
}

impl Partitions {
    /// Select the partition for a language, allocating it on first use
    pub fn get_or_create(&mut self, language: &str) -> &mut Partition {
        self.by_language
            .entry(language.to_string())
            .or_insert_with(|| Partition::new(language))
    }

    pub fn get(&self, language: &str) -> Option<&Partition> {
        self.by_language.get(language)
    }

    /// Partitions in language order
    pub fn iter(&self) -> impl Iterator<Item = &Partition> {
        self.by_language.values()
    }

    pub fn len(&self) -> usize {
        self.by_language.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_language.is_empty()
    }

    pub fn doc_count(&self) -> usize {
        self.by_language.values().map(Partition::len).sum()
    }
}
