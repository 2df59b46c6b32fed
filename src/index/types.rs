use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Unique identifier for a document within its language partition
pub type DocId = u32;

/// Ordinal of a page within one serialized language partition
pub type PageIndex = u32;

/// An HTML file to index that may or may not exist on disk
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HtmlFile {
    /// Path relative to the site root; the result URL is derived from it
    pub path: String,
    /// Source HTML
    pub content: String,
}

/// A record that is not backed by an HTML file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CustomRecord {
    /// Output URL, never rewritten
    pub url: String,
    /// Raw text content
    pub content: String,
    /// Partition key, used verbatim
    pub language: String,
    #[serde(default)]
    pub meta: Option<BTreeMap<String, String>>,
    #[serde(default)]
    pub filters: Option<BTreeMap<String, Vec<String>>>,
    #[serde(default)]
    pub sort: Option<BTreeMap<String, String>>,
}

/// A location inside a page that can be linked to directly
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Anchor {
    pub element: String,
    pub id: String,
    pub text: String,
    /// Token position at which the element's text starts
    pub location: u32,
}

/// Uniform representation of anything that can be indexed
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Document {
    pub url: String,
    pub language: String,
    /// Plain text that gets tokenized
    pub content: String,
    pub meta: BTreeMap<String, String>,
    pub filters: BTreeMap<String, BTreeSet<String>>,
    pub sort: BTreeMap<String, String>,
    pub anchors: Vec<Anchor>,
}

/// Details about a file that has been successfully added to the index
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewFile {
    pub unique_words: usize,
    pub url: String,
    pub meta: BTreeMap<String, String>,
}

/// Outcome of a batch insertion
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexingResponse {
    pub errors: Vec<String>,
    pub page_count: usize,
}
