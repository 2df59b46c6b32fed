//! # sitefind - static search index builder
//!
//! sitefind turns a set of HTML pages or free-form text records into a
//! compact bundle of files that a client-side runtime can load and query
//! without a server.
//!
//! ## Architecture
//!
//! - [`index`] - normalization, language partitions, the index writer,
//!   directory ingestion, bundle serialization and decoding
//! - [`service`] - cloneable [`Index`] handle serializing all mutations
//!   through one worker thread
//! - [`config`] - [`IndexConfig`], loadable from `sitefind.json`
//! - [`error`] - [`SitefindError`] and the crate [`Result`]
//! - [`utils`] - tokenizer, binary encoding, progress bars
//!
//! ## Quick Start
//!
//! ```no_run
//! use sitefind::{create_index, CustomRecord, WriteOptions};
//!
//! let index = create_index().index.expect("index");
//! let added = index.add_custom_record(CustomRecord {
//!     url: "/about/".into(),
//!     content: "Meet the team".into(),
//!     language: "en".into(),
//!     ..Default::default()
//! });
//! assert!(added.errors.is_empty());
//!
//! let written = index.write_files(Some(WriteOptions {
//!     bundle_path: Some("public/_sitefind".into()),
//! }));
//! println!("bundle at {:?}", written.bundle_path);
//! ```
//!
//! ## Bundle
//!
//! Each language gets its own meta, index, filter and sort fragments plus
//! one JSON fragment per page, all named after a CRC-32 of their content and
//! tied together by `sitefind-entry.json`. Page numbering depends only on
//! URLs, so the same content always produces the same bytes.

pub mod config;
pub mod error;
pub mod index;
pub mod service;
pub mod utils;

pub use config::{DuplicateUrlPolicy, IndexConfig};
pub use error::{Result, SitefindError};
pub use index::{BundleFile, BundleReader, CustomRecord, HtmlFile, IndexingResponse, NewFile};
pub use service::{
    DirectoryOptions, GetFilesResponse, Index, NewFileResponse, NewIndexResponse, SiteDirectory,
    WriteFilesResponse, WriteOptions, create_index,
};
