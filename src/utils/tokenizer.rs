//! Word tokenizer shared by indexing and bundle lookups.
//!
//! Policy, applied identically everywhere:
//! 1. Split on Unicode (UAX #29) word boundaries. Hyphens split words,
//!    apostrophes and decimal points inside a word do not, and each CJK
//!    ideograph is its own word.
//! 2. NFKD-decompose, drop combining marks (`Café` -> `cafe`), lowercase.
//! 3. Strip every remaining non-alphanumeric character (`don't` -> `dont`).
//! 4. Drop empty words and words longer than [`MAX_TOKEN_LENGTH`] bytes.
//!
//! Positions count emitted tokens only, starting at 0.

use std::collections::{BTreeMap, HashSet};
use unicode_normalization::UnicodeNormalization;
use unicode_normalization::char::is_combining_mark;
use unicode_segmentation::{UnicodeSegmentation, UnicodeWords};

/// Maximum token length to store in the index.
/// Tokens longer than this are likely base64, hashes, or other non-searchable content.
pub const MAX_TOKEN_LENGTH: usize = 128;

/// A normalized word and its ordinal position in the source text
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub word: String,
    pub position: u32,
}

/// Lazy token stream over a borrowed text.
///
/// Calling [`tokenize`] again on the same text restarts the stream and yields
/// the same sequence.
pub struct Tokens<'a> {
    words: UnicodeWords<'a>,
    position: u32,
}

impl Iterator for Tokens<'_> {
    type Item = Token;

    fn next(&mut self) -> Option<Token> {
        for raw in self.words.by_ref() {
            if let Some(word) = normalize_word(raw) {
                let token = Token {
                    word,
                    position: self.position,
                };
                self.position += 1;
                return Some(token);
            }
        }
        None
    }
}

/// Tokenize text into normalized words with positions
pub fn tokenize(text: &str) -> Tokens<'_> {
    Tokens {
        words: text.unicode_words(),
        position: 0,
    }
}

/// Normalize one raw word; `None` if nothing indexable remains
pub fn normalize_word(raw: &str) -> Option<String> {
    let word: String = raw
        .nfkd()
        .filter(|c| !is_combining_mark(*c))
        .flat_map(char::to_lowercase)
        .filter(|c| c.is_alphanumeric())
        .collect();

    if word.is_empty() || word.len() > MAX_TOKEN_LENGTH {
        None
    } else {
        Some(word)
    }
}

/// Group token positions by word, in word order
pub fn term_positions(text: &str) -> BTreeMap<String, Vec<u32>> {
    let mut terms: BTreeMap<String, Vec<u32>> = BTreeMap::new();
    for token in tokenize(text) {
        terms.entry(token.word).or_default().push(token.position);
    }
    terms
}

/// Count distinct normalized words in a text
pub fn unique_words(text: &str) -> usize {
    tokenize(text).map(|t| t.word).collect::<HashSet<_>>().len()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn words(text: &str) -> Vec<String> {
        tokenize(text).map(|t| t.word).collect()
    }

    #[test]
    fn test_basic_sentence() {
        let tokens: Vec<Token> = tokenize("Meet the team").collect();
        assert_eq!(
            tokens,
            vec![
                Token { word: "meet".into(), position: 0 },
                Token { word: "the".into(), position: 1 },
                Token { word: "team".into(), position: 2 },
            ]
        );
    }

    #[test]
    fn test_punctuation_and_case() {
        assert_eq!(words("Hello, World! Hello."), vec!["hello", "world", "hello"]);
        assert_eq!(unique_words("Hello, World! Hello."), 2);
    }

    #[test]
    fn test_hyphens_split() {
        assert_eq!(words("well-known e-mail"), vec!["well", "known", "e", "mail"]);
    }

    #[test]
    fn test_inner_punctuation_removed() {
        assert_eq!(words("Don't stop"), vec!["dont", "stop"]);
        assert_eq!(words("3.14 and 1,000"), vec!["314", "and", "1000"]);
        assert_eq!(words("snake_case_word"), vec!["snakecaseword"]);
    }

    #[test]
    fn test_diacritics_folded() {
        assert_eq!(words("Café Crème"), vec!["cafe", "creme"]);
        assert_eq!(words("Ｔｅａｍ"), vec!["team"]); // fullwidth compatibility form
    }

    #[test]
    fn test_cjk_ideographs_are_words() {
        assert_eq!(words("日本語"), vec!["日", "本", "語"]);
    }

    #[test]
    fn test_degenerate_input() {
        assert!(words("").is_empty());
        assert!(words("!!! --- ...").is_empty());
        assert!(words("🎉🎉").is_empty());
        assert_eq!(unique_words("  \n\t "), 0);
    }

    #[test]
    fn test_overlong_word_dropped_without_position() {
        let long = "a".repeat(MAX_TOKEN_LENGTH + 1);
        let text = format!("before {} after", long);
        let tokens: Vec<Token> = tokenize(&text).collect();
        assert_eq!(tokens.len(), 2);
        assert_eq!(tokens[1], Token { word: "after".into(), position: 1 });
    }

    #[test]
    fn test_tokenization_is_repeatable() {
        let text = "The quick brown fox jumps over the lazy dog. THE END";
        let first: Vec<Token> = tokenize(text).collect();
        let second: Vec<Token> = tokenize(text).collect();
        assert_eq!(first, second);
        assert_eq!(unique_words(text), unique_words(text));
        assert_eq!(unique_words(text), 9);
    }

    #[test]
    fn test_term_positions() {
        let terms = term_positions("to be or not to be");
        assert_eq!(terms["to"], vec![0, 4]);
        assert_eq!(terms["be"], vec![1, 5]);
        assert_eq!(terms.len(), 4);
    }
}
