//! HTML extraction with the scraper crate.
//!
//! Turns a page into plain text plus the annotations sitefind understands:
//!
//! - `data-sitefind-body` restricts indexing to the marked elements
//! - `data-sitefind-ignore` drops an element and its subtree
//! - `data-sitefind-meta`, `data-sitefind-filter`, `data-sitefind-sort` attach
//!   values, written as a comma-separated list of `key`, `key:value` or
//!   `key[attr]` entries

use crate::error::{Result, SitefindError};
use crate::index::types::Anchor;
use crate::utils::tokenize;
use regex::Regex;
use scraper::node::Node;
use scraper::{ElementRef, Html, Selector};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::LazyLock;

const BODY_ATTR: &str = "data-sitefind-body";
const IGNORE_ATTR: &str = "data-sitefind-ignore";
const META_ATTR: &str = "data-sitefind-meta";
const FILTER_ATTR: &str = "data-sitefind-filter";
const SORT_ATTR: &str = "data-sitefind-sort";

/// Elements whose content is never indexed
const SKIPPED_ELEMENTS: &[&str] = &[
    "script", "style", "noscript", "template", "svg", "iframe", "head",
];

/// Elements that do not introduce a word boundary
const INLINE_ELEMENTS: &[&str] = &[
    "a", "abbr", "b", "bdi", "bdo", "cite", "code", "data", "dfn", "em", "i", "kbd", "mark", "q",
    "s", "samp", "small", "span", "strong", "sub", "sup", "time", "u", "var", "wbr",
];

static ANNOTATION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*([^:\[\]]+?)\s*(?:\[\s*([^\]]+?)\s*\])?\s*(?::(.*))?$")
        .expect("annotation pattern is valid")
});

/// Everything extracted from one HTML page
#[derive(Debug, Clone, Default)]
pub struct ExtractedPage {
    /// Trimmed, lowercased `<html lang>`
    pub language: Option<String>,
    pub content: String,
    pub meta: BTreeMap<String, String>,
    pub filters: BTreeMap<String, BTreeSet<String>>,
    pub sort: BTreeMap<String, String>,
    pub anchors: Vec<Anchor>,
}

/// Compiled selectors reused across pages
pub struct HtmlExtractor {
    root: Selector,
    excludes: Vec<Selector>,
    body_marker: Selector,
    meta: Selector,
    filter: Selector,
    sort: Selector,
    h1: Selector,
    title: Selector,
}

fn compile(selector: &str) -> Result<Selector> {
    Selector::parse(selector)
        .map_err(|e| SitefindError::invalid_field(format!("invalid selector {:?}: {:?}", selector, e)))
}

impl HtmlExtractor {
    pub fn new(root_selector: &str, exclude_selectors: &[String]) -> Result<Self> {
        Ok(Self {
            root: compile(root_selector)?,
            excludes: exclude_selectors
                .iter()
                .map(|s| compile(s))
                .collect::<Result<_>>()?,
            body_marker: compile(&format!("[{}]", BODY_ATTR))?,
            meta: compile(&format!("[{}]", META_ATTR))?,
            filter: compile(&format!("[{}]", FILTER_ATTR))?,
            sort: compile(&format!("[{}]", SORT_ATTR))?,
            h1: compile("h1")?,
            title: compile("title")?,
        })
    }

    /// Extract text, annotations and anchors from an HTML document
    pub fn extract(&self, html: &str) -> ExtractedPage {
        let document = Html::parse_document(html);
        let mut page = ExtractedPage {
            language: document
                .root_element()
                .value()
                .attr("lang")
                .map(|lang| lang.trim().to_lowercase())
                .filter(|lang| !lang.is_empty()),
            ..Default::default()
        };

        let mut text = TextBuffer::default();
        let mut anchors = Vec::new();
        for region in self.indexed_regions(&document) {
            self.collect_text(region, &mut text, &mut anchors);
            text.boundary();
        }
        page.anchors = locate_anchors(&text.out, anchors);
        page.content = text.out;

        for element in document.select(&self.meta) {
            for (key, value) in annotations(element, META_ATTR) {
                page.meta.insert(key, value);
            }
        }
        for element in document.select(&self.filter) {
            for (key, value) in annotations(element, FILTER_ATTR) {
                page.filters.entry(key).or_default().insert(value);
            }
        }
        for element in document.select(&self.sort) {
            for (key, value) in annotations(element, SORT_ATTR) {
                page.sort.insert(key, value);
            }
        }

        if !page.meta.contains_key("title") {
            let title = document
                .select(&self.h1)
                .chain(document.select(&self.title))
                .map(|el| collapse_whitespace(&el.text().collect::<String>()))
                .find(|t| !t.is_empty());
            if let Some(title) = title {
                page.meta.insert("title".to_string(), title);
            }
        }

        page
    }

    /// Elements marked as body, or the first root selector match
    fn indexed_regions<'a>(&self, document: &'a Html) -> Vec<ElementRef<'a>> {
        let marked: Vec<_> = document
            .select(&self.body_marker)
            .filter(|el| {
                !el.ancestors()
                    .filter_map(ElementRef::wrap)
                    .any(|a| a.value().attr(BODY_ATTR).is_some())
            })
            .collect();
        if !marked.is_empty() {
            return marked;
        }
        document.select(&self.root).take(1).collect()
    }

    fn is_skipped(&self, element: ElementRef) -> bool {
        SKIPPED_ELEMENTS.contains(&element.value().name())
            || element.value().attr(IGNORE_ATTR).is_some()
            || self.excludes.iter().any(|s| s.matches(&element))
    }

    fn collect_text(
        &self,
        element: ElementRef,
        text: &mut TextBuffer,
        anchors: &mut Vec<(usize, Anchor)>,
    ) {
        if self.is_skipped(element) {
            return;
        }

        let name = element.value().name();
        let inline = INLINE_ELEMENTS.contains(&name);
        if !inline {
            text.boundary();
        }

        if let Some(id) = element.value().id() {
            anchors.push((
                text.out.len(),
                Anchor {
                    element: name.to_string(),
                    id: id.to_string(),
                    text: collapse_whitespace(&element.text().collect::<String>()),
                    location: 0,
                },
            ));
        }

        for child in element.children() {
            match child.value() {
                Node::Text(t) => text.push(t),
                Node::Element(_) => {
                    if let Some(child_element) = ElementRef::wrap(child) {
                        self.collect_text(child_element, text, anchors);
                    }
                }
                _ => {}
            }
        }

        if !inline {
            text.boundary();
        }
    }
}

/// Accumulates text, collapsing whitespace runs to single spaces
#[derive(Default)]
struct TextBuffer {
    out: String,
    pending_space: bool,
}

impl TextBuffer {
    fn push(&mut self, text: &str) {
        for ch in text.chars() {
            if ch.is_whitespace() {
                self.pending_space = true;
            } else {
                if self.pending_space && !self.out.is_empty() {
                    self.out.push(' ');
                }
                self.pending_space = false;
                self.out.push(ch);
            }
        }
    }

    fn boundary(&mut self) {
        self.pending_space = true;
    }
}

/// Convert anchor byte offsets into token positions
fn locate_anchors(content: &str, anchors: Vec<(usize, Anchor)>) -> Vec<Anchor> {
    let mut location = 0u32;
    let mut prev = 0usize;
    anchors
        .into_iter()
        .map(|(offset, mut anchor)| {
            location += tokenize(&content[prev..offset]).count() as u32;
            prev = offset;
            anchor.location = location;
            anchor
        })
        .collect()
}

/// Parse the `key`, `key:value`, `key[attr]` entries of an annotation attribute
fn annotations(element: ElementRef, attr: &str) -> Vec<(String, String)> {
    let Some(list) = element.value().attr(attr) else {
        return Vec::new();
    };

    list.split(',')
        .filter_map(|entry| {
            let caps = ANNOTATION.captures(entry)?;
            let key = caps.get(1)?.as_str().trim().to_string();
            let value = if let Some(literal) = caps.get(3) {
                literal.as_str().trim().to_string()
            } else if let Some(source) = caps.get(2) {
                element.value().attr(source.as_str())?.trim().to_string()
            } else {
                collapse_whitespace(&element.text().collect::<String>())
            };
            (!key.is_empty() && !value.is_empty()).then_some((key, value))
        })
        .collect()
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn extractor() -> HtmlExtractor {
        HtmlExtractor::new("html", &[]).unwrap()
    }

    #[test]
    fn test_extract_basic_page() {
        let page = extractor().extract(
            r#"<html lang="EN"><head><title>Site</title></head>
               <body><h1>Meet the team</h1><p>We build <b>fast</b> search.</p></body></html>"#,
        );
        assert_eq!(page.language.as_deref(), Some("en"));
        assert_eq!(page.content, "Meet the team We build fast search.");
        assert_eq!(page.meta["title"], "Meet the team");
    }

    #[test]
    fn test_inline_elements_do_not_split_words() {
        let page = extractor().extract("<p>sea<b>rch</b></p><p>next</p>");
        assert_eq!(page.content, "search next");
    }

    #[test]
    fn test_skips_scripts_and_ignored_elements() {
        let page = extractor().extract(
            r#"<body><p>Good content</p><script>alert('bad');</script>
               <nav data-sitefind-ignore><a>Menu</a></nav></body>"#,
        );
        assert_eq!(page.content, "Good content");
    }

    #[test]
    fn test_exclude_selectors() {
        let extractor = HtmlExtractor::new("html", &[".sidebar".to_string()]).unwrap();
        let page = extractor.extract(r#"<main>Article</main><div class="sidebar">Ads</div>"#);
        assert_eq!(page.content, "Article");
    }

    #[test]
    fn test_body_marker_restricts_region() {
        let page = extractor().extract(
            r#"<header>Logo</header>
               <article data-sitefind-body>Real <div data-sitefind-body>text</div></article>
               <footer>Copyright</footer>"#,
        );
        assert_eq!(page.content, "Real text");
    }

    #[test]
    fn test_annotations() {
        let page = extractor().extract(
            r#"<html><body>
                <h1 data-sitefind-meta="title">Release notes</h1>
                <img data-sitefind-meta="image[src], kind:changelog" src="/cover.png">
                <span data-sitefind-filter="tag">rust</span>
                <span data-sitefind-filter="tag:search, year:2024"></span>
                <span data-sitefind-sort="date:2024-03-01, weight[data-w]" data-w="10"></span>
            </body></html>"#,
        );
        assert_eq!(page.meta["title"], "Release notes");
        assert_eq!(page.meta["image"], "/cover.png");
        assert_eq!(page.meta["kind"], "changelog");
        let tags: Vec<_> = page.filters["tag"].iter().cloned().collect();
        assert_eq!(tags, vec!["rust", "search"]);
        assert!(page.filters["year"].contains("2024"));
        assert_eq!(page.sort["date"], "2024-03-01");
        assert_eq!(page.sort["weight"], "10");
    }

    #[test]
    fn test_title_falls_back_to_title_tag() {
        let page = extractor().extract("<html><head><title> Docs </title></head><body>x</body></html>");
        assert_eq!(page.meta["title"], "Docs");
    }

    #[test]
    fn test_anchors_record_token_location() {
        let page = extractor().extract(
            r#"<body><p>one two</p><h2 id="install">Install it</h2><p>three</p><span id="end">x</span></body>"#,
        );
        assert_eq!(page.anchors.len(), 2);
        assert_eq!(page.anchors[0].id, "install");
        assert_eq!(page.anchors[0].element, "h2");
        assert_eq!(page.anchors[0].text, "Install it");
        assert_eq!(page.anchors[0].location, 2);
        assert_eq!(page.anchors[1].location, 5);
    }

    #[test]
    fn test_missing_lang() {
        let page = extractor().extract("<html lang=' '><body>hi</body></html>");
        assert!(page.language.is_none());
    }
}
