//! Document normalization.
//!
//! Converts HTML files, custom records and raw directory entries into
//! [`Document`]s. Nothing here touches shared index state.

use crate::config::IndexConfig;
use crate::error::{Result, SitefindError};
use crate::index::html::HtmlExtractor;
use crate::index::types::{CustomRecord, Document, HtmlFile};
use tracing::warn;

/// Check a language tag: non-empty ASCII alphanumerics, `-` and `_`
pub fn is_valid_language(tag: &str) -> bool {
    !tag.is_empty()
        && tag
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
}

/// Derive the result URL of an HTML file from its site-relative path.
///
/// `about/index.html` becomes `/about/`, `blog/post.html` stays
/// `/blog/post.html`.
pub fn url_from_path(path: &str, keep_index_url: bool) -> Result<String> {
    let mut rel = path.replace('\\', "/");
    loop {
        if let Some(rest) = rel.strip_prefix("./") {
            rel = rest.to_string();
        } else if let Some(rest) = rel.strip_prefix('/') {
            rel = rest.to_string();
        } else {
            break;
        }
    }
    if rel.is_empty() {
        return Err(SitefindError::invalid_field(format!(
            "cannot derive a URL from path {:?}",
            path
        )));
    }

    if !keep_index_url && (rel == "index.html" || rel.ends_with("/index.html")) {
        rel.truncate(rel.len() - "index.html".len());
    }
    Ok(format!("/{}", rel))
}

/// Turns any supported input into a [`Document`]
pub struct Normalizer {
    config: IndexConfig,
    extractor: HtmlExtractor,
}

impl Normalizer {
    pub fn new(config: &IndexConfig) -> Result<Self> {
        Ok(Self {
            config: config.clone(),
            extractor: HtmlExtractor::new(&config.root_selector, &config.exclude_selectors)?,
        })
    }

    pub fn config(&self) -> &IndexConfig {
        &self.config
    }

    /// Normalize an HTML file given as text
    pub fn html_file(&self, file: &HtmlFile) -> Result<Document> {
        let url = url_from_path(&file.path, self.config.keep_index_url)?;
        let page = self.extractor.extract(&file.content);

        // Configured languages were validated when the normalizer was built
        let language = match (&self.config.force_language, page.language) {
            (Some(forced), _) => forced.clone(),
            (None, Some(declared)) if is_valid_language(&declared) => declared,
            (None, Some(declared)) => {
                warn!(
                    path = %file.path,
                    declared = %declared,
                    fallback = %self.config.default_language,
                    "ignoring invalid page language"
                );
                self.config.default_language.clone()
            }
            (None, None) => self.config.default_language.clone(),
        };

        Ok(Document {
            url,
            language,
            content: page.content,
            meta: page.meta,
            filters: page.filters,
            sort: page.sort,
            anchors: page.anchors,
        })
    }

    /// Normalize a file read from disk; the bytes must be UTF-8
    pub fn html_bytes(&self, rel_path: &str, bytes: Vec<u8>) -> Result<Document> {
        let content = String::from_utf8(bytes).map_err(|e| {
            SitefindError::normalization(format!("{}: content is not valid UTF-8 ({})", rel_path, e))
        })?;
        self.html_file(&HtmlFile {
            path: rel_path.to_string(),
            content,
        })
    }
}

/// Normalize a custom record; url and language are used verbatim
pub fn custom_record(record: CustomRecord) -> Result<Document> {
    if record.url.trim().is_empty() {
        return Err(SitefindError::invalid_field("record url must not be empty"));
    }
    if !is_valid_language(&record.language) {
        return Err(SitefindError::invalid_field(format!(
            "record {}: language {:?} is not a valid language tag",
            record.url, record.language
        )));
    }

    let filters = record
        .filters
        .unwrap_or_default()
        .into_iter()
        .map(|(name, values)| (name, values.into_iter().collect()))
        .collect();

    Ok(Document {
        url: record.url,
        language: record.language,
        content: record.content,
        meta: record.meta.unwrap_or_default(),
        filters,
        sort: record.sort.unwrap_or_default(),
        anchors: Vec::new(),
    })
}
