//! Utility functions and data structures.
//!
//! ## Modules
//!
//! - [`encoding`] - Varints, delta lists and binary fragment framing
//! - [`progress`] - Progress bars, no-op without the `progress` feature
//! - [`tokenizer`] - Word segmentation and normalization
//!
//! ## Key Functions
//!
//! ```
//! use sitefind::utils::{normalize_word, tokenize};
//!
//! let words: Vec<_> = tokenize("Café Crème, well-known").map(|t| t.word).collect();
//! assert_eq!(words, ["cafe", "creme", "well", "known"]);
//!
//! assert_eq!(normalize_word("Don't").as_deref(), Some("dont"));
//! ```

pub mod encoding;
pub mod progress;
pub mod tokenizer;

pub use encoding::*;
pub use tokenizer::*;
