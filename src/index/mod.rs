pub mod build;
pub mod bundle;
pub mod html;
pub mod normalize;
pub mod partition;
pub mod reader;
pub mod stats;
pub mod types;
pub mod writer;

pub use bundle::{Bundle, BundleFile, Manifest};
pub use normalize::Normalizer;
pub use reader::BundleReader;
pub use types::*;
pub use writer::IndexWriter;
