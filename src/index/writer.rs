use crate::config::IndexConfig;
use crate::error::Result;
use crate::index::partition::{Partitions, PreparedDocument};
use crate::index::types::{Document, IndexingResponse, NewFile};
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, error, info, warn};

/// Index builder: owns every language partition and applies insertions.
///
/// Not synchronized; callers that share it must serialize access (see
/// [`crate::service`]).
pub struct IndexWriter {
    config: IndexConfig,
    partitions: Partitions,
}

impl IndexWriter {
    /// Create an empty index writer
    pub fn new(config: IndexConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            partitions: Partitions::default(),
        })
    }

    pub fn config(&self) -> &IndexConfig {
        &self.config
    }

    pub fn partitions(&self) -> &Partitions {
        &self.partitions
    }

    /// Get current document count across all languages
    pub fn doc_count(&self) -> usize {
        self.partitions.doc_count()
    }

    /// Tokenize and insert one document
    pub fn insert(&mut self, document: Document) -> Result<NewFile> {
        self.insert_prepared(PreparedDocument::new(document))
    }

    /// Insert a document whose tokens were computed ahead of time
    pub fn insert_prepared(&mut self, prepared: PreparedDocument) -> Result<NewFile> {
        let file = NewFile {
            unique_words: prepared.unique_words(),
            url: prepared.document.url.clone(),
            meta: prepared.document.meta.clone(),
        };

        let partition = self.partitions.get_or_create(&prepared.document.language);
        let id = partition.insert(prepared, self.config.duplicate_urls)?;
        debug!(
            url = %file.url,
            language = partition.language(),
            id,
            unique_words = file.unique_words,
            "indexed document"
        );

        Ok(file)
    }

    /// Insert each item independently; failures are collected, not fatal.
    ///
    /// When `cancel` is raised, insertion stops before the next item and the
    /// items already inserted stay in the index.
    pub fn insert_batch<I>(&mut self, batch: I, cancel: Option<&AtomicBool>) -> IndexingResponse
    where
        I: IntoIterator<Item = Result<PreparedDocument>>,
    {
        let mut response = IndexingResponse::default();

        for item in batch {
            if cancel.is_some_and(|flag| flag.load(Ordering::Relaxed)) {
                warn!(inserted = response.page_count, "batch insertion cancelled");
                response.errors.push(format!(
                    "indexing cancelled after {} documents; inserted documents were kept",
                    response.page_count
                ));
                break;
            }

            match item.and_then(|prepared| self.insert_prepared(prepared)) {
                Ok(_) => response.page_count += 1,
                Err(e) => {
                    if e.is_per_document() {
                        warn!(error = %e, "skipping document");
                    } else {
                        error!(error = %e, "skipping batch item");
                    }
                    response.errors.push(e.to_string());
                }
            }
        }

        info!(
            pages = response.page_count,
            errors = response.errors.len(),
            "batch indexed"
        );
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SitefindError;

    fn document(url: &str, language: &str, content: &str) -> Document {
        Document {
            url: url.into(),
            language: language.into(),
            content: content.into(),
            ..Default::default()
        }
    }

    #[test]
    fn test_insert_reports_unique_words() {
        let mut writer = IndexWriter::new(IndexConfig::default()).unwrap();
        let mut doc = document("/about/", "en", "Meet the team. The team!");
        doc.meta.insert("title".into(), "About".into());

        let file = writer.insert(doc).unwrap();
        assert_eq!(file.unique_words, 3);
        assert_eq!(file.url, "/about/");
        assert_eq!(file.meta["title"], "About");
        assert_eq!(writer.doc_count(), 1);
    }

    #[test]
    fn test_partition_isolation() {
        let mut writer = IndexWriter::new(IndexConfig::default()).unwrap();
        writer.insert(document("/en/", "en", "hello world")).unwrap();
        writer.insert(document("/fr/", "fr", "bonjour monde")).unwrap();

        let en = writer.partitions().get("en").unwrap();
        let fr = writer.partitions().get("fr").unwrap();
        assert!(en.postings_for("hello").is_some());
        assert!(fr.postings_for("hello").is_none());
        assert!(en.postings_for("bonjour").is_none());
        assert_eq!(fr.len(), 1);
    }

    #[test]
    fn test_batch_continues_after_failure() {
        let mut writer = IndexWriter::new(IndexConfig::default()).unwrap();
        let batch = vec![
            Ok(PreparedDocument::new(document("/a", "en", "one"))),
            Err(SitefindError::normalization("broken.html: bad bytes")),
            Ok(PreparedDocument::new(document("/b", "en", "two"))),
        ];

        let response = writer.insert_batch(batch, None);
        assert_eq!(response.page_count, 2);
        assert_eq!(response.errors.len(), 1);
        assert!(response.errors[0].contains("broken.html"));
    }

    #[test]
    fn test_batch_cancellation_keeps_inserted() {
        let mut writer = IndexWriter::new(IndexConfig::default()).unwrap();
        let cancel = AtomicBool::new(false);
        let mut items = Vec::new();
        for i in 0..3 {
            items.push(Ok(PreparedDocument::new(document(&format!("/{}", i), "en", "x"))));
        }

        let mut inserted = 0;
        let batch = items.into_iter().inspect(|_| {
            inserted += 1;
            if inserted == 2 {
                cancel.store(true, Ordering::Relaxed);
            }
        });
        let response = writer.insert_batch(batch, Some(&cancel));

        assert_eq!(response.page_count, 1);
        assert_eq!(response.errors.len(), 1);
        assert_eq!(writer.doc_count(), 1);
    }
}
