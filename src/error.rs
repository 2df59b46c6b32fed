//! Error types for sitefind.
//!
//! Every fallible library operation returns [`Result`], whose error is the
//! [`SitefindError`] enum. The service layer turns these into the
//! human-readable strings carried in each response's `errors` list.

use std::io;

use thiserror::Error;

/// The main error type for sitefind operations.
#[derive(Error, Debug)]
pub enum SitefindError {
    /// An input document could not be turned into a [`Document`](crate::index::Document).
    #[error("Normalization error: {0}")]
    Normalization(String),

    /// A required field was missing, empty, malformed or duplicated.
    #[error("Invalid field: {0}")]
    InvalidField(String),

    /// Filesystem failure while walking a directory or writing a bundle.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The engine could not allocate a new index.
    #[error("Initialization error: {0}")]
    Initialization(String),

    /// JSON encoding or decoding failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A glob pattern failed to compile.
    #[error("Glob error: {0}")]
    Glob(#[from] globset::Error),

    /// Directory traversal failed.
    #[error("Walk error: {0}")]
    Walk(#[from] ignore::Error),

    /// A bundle fragment failed validation while being decoded.
    #[error("Corrupt bundle: {0}")]
    Corrupt(String),
}

/// Result type alias for sitefind operations.
pub type Result<T> = std::result::Result<T, SitefindError>;

impl SitefindError {
    /// Create a new normalization error.
    pub fn normalization<S: Into<String>>(msg: S) -> Self {
        SitefindError::Normalization(msg.into())
    }

    /// Create a new invalid field error.
    pub fn invalid_field<S: Into<String>>(msg: S) -> Self {
        SitefindError::InvalidField(msg.into())
    }

    /// Create a new initialization error.
    pub fn initialization<S: Into<String>>(msg: S) -> Self {
        SitefindError::Initialization(msg.into())
    }

    /// Create a new corrupt bundle error.
    pub fn corrupt<S: Into<String>>(msg: S) -> Self {
        SitefindError::Corrupt(msg.into())
    }

    /// Whether the error concerns a single document rather than the engine.
    ///
    /// Batch ingestion records these and keeps going.
    pub fn is_per_document(&self) -> bool {
        matches!(
            self,
            SitefindError::Normalization(_) | SitefindError::InvalidField(_) | SitefindError::Io(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = SitefindError::invalid_field("language must not be empty");
        assert_eq!(err.to_string(), "Invalid field: language must not be empty");

        let err = SitefindError::normalization("not UTF-8");
        assert_eq!(err.to_string(), "Normalization error: not UTF-8");
    }

    #[test]
    fn test_io_error_conversion() {
        let io_error = io::Error::new(io::ErrorKind::PermissionDenied, "denied");
        let err = SitefindError::from(io_error);
        assert!(matches!(err, SitefindError::Io(_)));
        assert!(err.is_per_document());
        assert!(!SitefindError::initialization("no threads").is_per_document());
    }
}
