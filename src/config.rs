use crate::error::{Result, SitefindError};
use crate::index::normalize::is_valid_language;
use scraper::Selector;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Name of the optional config file looked up in a site root
pub const CONFIG_FILE: &str = "sitefind.json";

/// What happens when a second document with an already indexed URL arrives
/// in the same language partition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum DuplicateUrlPolicy {
    /// The new document supersedes the old one and inherits its id
    #[default]
    Replace,
    /// The new document is refused with an invalid field error
    Reject,
    /// Both documents are indexed side by side
    Keep,
}

/// Configuration for the indexer
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexConfig {
    /// Language used for HTML pages that do not declare one
    pub default_language: String,
    /// Index every HTML page under this language regardless of `<html lang>`
    pub force_language: Option<String>,
    /// Keep a trailing `index.html` in URLs derived from file paths
    pub keep_index_url: bool,
    pub duplicate_urls: DuplicateUrlPolicy,
    /// Glob used by directory ingestion when the caller passes none
    pub glob: String,
    /// CSS selector of the element whose content is indexed
    pub root_selector: String,
    /// Extra CSS selectors whose subtrees are never indexed
    pub exclude_selectors: Vec<String>,
    pub max_file_size: u64,
    /// Soft upper bound, in bytes, on one encoded index fragment
    pub index_chunk_size: usize,
    /// Worker threads for directory ingestion (0 = number of CPUs)
    pub threads: usize,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            default_language: "unknown".to_string(),
            force_language: None,
            keep_index_url: false,
            duplicate_urls: DuplicateUrlPolicy::default(),
            glob: "**/*.{html}".to_string(),
            root_selector: "html".to_string(),
            exclude_selectors: Vec::new(),
            max_file_size: 100 * 1024 * 1024,
            index_chunk_size: 40_000,
            threads: 0,
        }
    }
}

impl IndexConfig {
    /// Load config from a JSON file; missing fields fall back to defaults
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        let config: IndexConfig = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load `sitefind.json` from a site root, or return defaults if absent
    pub fn load_from_site(site_root: &Path) -> Result<Self> {
        let path = site_root.join(CONFIG_FILE);
        if path.is_file() {
            Self::load(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Check that every field holds a usable value
    pub fn validate(&self) -> Result<()> {
        if self.index_chunk_size == 0 {
            return Err(SitefindError::invalid_field("index_chunk_size must be positive"));
        }
        if !is_valid_language(&self.default_language) {
            return Err(SitefindError::invalid_field(format!(
                "default_language {:?} is not a valid language tag",
                self.default_language
            )));
        }
        if let Some(forced) = &self.force_language {
            if !is_valid_language(forced) {
                return Err(SitefindError::invalid_field(format!(
                    "force_language {:?} is not a valid language tag",
                    forced
                )));
            }
        }
        globset::Glob::new(&self.glob)?;
        for selector in std::iter::once(&self.root_selector).chain(&self.exclude_selectors) {
            Selector::parse(selector).map_err(|e| {
                SitefindError::invalid_field(format!("invalid selector {:?}: {:?}", selector, e))
            })?;
        }
        Ok(())
    }

    /// Get the effective thread count (resolves 0 to CPU count)
    pub fn effective_threads(&self) -> usize {
        if self.threads == 0 {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(4)
        } else {
            self.threads
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_config_default_is_valid() {
        let config = IndexConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.duplicate_urls, DuplicateUrlPolicy::Replace);
        assert!(config.effective_threads() >= 1);
    }

    #[test]
    fn test_config_partial_json() {
        let json = r#"{"duplicate_urls": "reject", "keep_index_url": true}"#;
        let config: IndexConfig = serde_json::from_str(json).unwrap();

        assert_eq!(config.duplicate_urls, DuplicateUrlPolicy::Reject);
        assert!(config.keep_index_url);
        assert_eq!(config.default_language, "unknown"); // default
        assert_eq!(config.index_chunk_size, 40_000);
    }

    #[test]
    fn test_config_rejects_bad_values() {
        let mut config = IndexConfig::default();
        config.index_chunk_size = 0;
        assert!(config.validate().is_err());

        let mut config = IndexConfig::default();
        config.force_language = Some("en us".to_string());
        assert!(config.validate().is_err());

        let mut config = IndexConfig::default();
        config.exclude_selectors = vec!["[[nope".to_string()];
        assert!(config.validate().is_err());

        let mut config = IndexConfig::default();
        config.glob = "**/*.{html".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_from_site() {
        let dir = TempDir::new().unwrap();
        let config = IndexConfig::load_from_site(dir.path()).unwrap();
        assert_eq!(config.glob, "**/*.{html}");

        fs::write(
            dir.path().join(CONFIG_FILE),
            r#"{"default_language": "fr", "exclude_selectors": [".nav"]}"#,
        )
        .unwrap();
        let config = IndexConfig::load_from_site(dir.path()).unwrap();
        assert_eq!(config.default_language, "fr");
        assert_eq!(config.exclude_selectors, vec![".nav".to_string()]);
    }
}
