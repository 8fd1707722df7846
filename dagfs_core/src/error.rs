//! Error types for dagfs_core.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias using dagfs_core's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while building, storing, or resolving a DAG.
#[derive(Error, Debug)]
pub enum Error {
    /// I/O error occurred during file operations.
    #[error("I/O error: {source}")]
    Io {
        #[from]
        source: std::io::Error,
    },

    /// Object not found in the content store.
    #[error("Object not found: {hash}")]
    ObjectNotFound { hash: String },

    /// The content store rejected an operation.
    #[error("Store error: {reason}")]
    Store { reason: String },

    /// Stored object file is corrupted or invalid.
    #[error("Corrupted object at {path}: {reason}")]
    CorruptedObject { path: PathBuf, reason: String },

    /// Store is invalid or not initialized.
    #[error("Invalid store at {path}: {reason}")]
    InvalidStore { path: PathBuf, reason: String },

    /// Stored bytes do not decode to a valid object.
    #[error("Decode error: {reason}")]
    Decode { reason: String },

    /// Fetched bytes hash to a different digest than the one requested.
    #[error("Digest mismatch: expected {expected}, got {actual}")]
    DigestMismatch { expected: String, actual: String },

    /// A path segment has no matching link, or descends below a file.
    #[error("Path not found: {segment} (in {path})")]
    PathNotFound { path: String, segment: String },

    /// The path cannot be resolved to file content.
    #[error("Invalid path {path:?}: {reason}")]
    InvalidPath { path: String, reason: String },

    /// Invalid link (bad name, duplicate entry, wrong kind).
    #[error("Invalid link: {reason}")]
    InvalidLink { reason: String },

    /// A source file produced a different number of bytes than it declared.
    #[error("Size mismatch for {name}: declared {expected} bytes, read {actual}")]
    SizeMismatch {
        name: String,
        expected: u64,
        actual: u64,
    },

    /// A source file could not be opened or read while encoding it.
    #[error("Failed to read source {name}: {source}")]
    SourceRead {
        name: String,
        #[source]
        source: std::io::Error,
    },

    /// Builder configuration is unusable.
    #[error("Invalid configuration: {reason}")]
    InvalidConfig { reason: String },

    /// Filesystem entry that cannot be ingested (symlink, socket, ...).
    #[error("Unsupported source: {path}")]
    UnsupportedSource { path: PathBuf },

    /// Path already exists (for materialization).
    #[error("Path already exists: {path}")]
    PathExists { path: PathBuf },

    /// Invalid hash format or encoding.
    #[error("Invalid hash: {reason}")]
    InvalidHash { reason: String },

    /// Unsupported algorithm.
    #[error("Unsupported algorithm: {algorithm}")]
    UnsupportedAlgorithm { algorithm: String },
}

impl Error {
    /// Create an ObjectNotFound error.
    pub fn object_not_found(hash: impl Into<String>) -> Self {
        Error::ObjectNotFound { hash: hash.into() }
    }

    /// Create a Store error.
    pub fn store(reason: impl Into<String>) -> Self {
        Error::Store {
            reason: reason.into(),
        }
    }

    /// Create a CorruptedObject error.
    pub fn corrupted_object(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Error::CorruptedObject {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Create an InvalidStore error.
    pub fn invalid_store(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Error::InvalidStore {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Create a Decode error.
    pub fn decode(reason: impl Into<String>) -> Self {
        Error::Decode {
            reason: reason.into(),
        }
    }

    /// Create a DigestMismatch error.
    pub fn digest_mismatch(expected: impl Into<String>, actual: impl Into<String>) -> Self {
        Error::DigestMismatch {
            expected: expected.into(),
            actual: actual.into(),
        }
    }

    /// Create a PathNotFound error.
    pub fn path_not_found(path: impl Into<String>, segment: impl Into<String>) -> Self {
        Error::PathNotFound {
            path: path.into(),
            segment: segment.into(),
        }
    }

    /// Create an InvalidPath error.
    pub fn invalid_path(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Error::InvalidPath {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Create an InvalidLink error.
    pub fn invalid_link(reason: impl Into<String>) -> Self {
        Error::InvalidLink {
            reason: reason.into(),
        }
    }

    /// Create an InvalidConfig error.
    pub fn invalid_config(reason: impl Into<String>) -> Self {
        Error::InvalidConfig {
            reason: reason.into(),
        }
    }

    /// Create a PathExists error.
    pub fn path_exists(path: impl Into<PathBuf>) -> Self {
        Error::PathExists { path: path.into() }
    }

    /// Create an InvalidHash error.
    pub fn invalid_hash(reason: impl Into<String>) -> Self {
        Error::InvalidHash {
            reason: reason.into(),
        }
    }

    /// Create a SourceRead error.
    pub fn source_read(name: impl Into<String>, source: std::io::Error) -> Self {
        Error::SourceRead {
            name: name.into(),
            source,
        }
    }

    /// Create an UnsupportedAlgorithm error.
    pub fn unsupported_algorithm(algorithm: impl Into<String>) -> Self {
        Error::UnsupportedAlgorithm {
            algorithm: algorithm.into(),
        }
    }

    /// True for failures that originate in the content store. Reading a
    /// source file reports [`Error::SourceRead`] instead, so `Io` here only
    /// comes from store and filesystem bookkeeping.
    pub fn is_store_error(&self) -> bool {
        matches!(
            self,
            Error::Io { .. }
                | Error::ObjectNotFound { .. }
                | Error::Store { .. }
                | Error::CorruptedObject { .. }
                | Error::InvalidStore { .. }
        )
    }

    /// True for stored bytes that fail to decode or verify.
    pub fn is_decode_error(&self) -> bool {
        matches!(self, Error::Decode { .. } | Error::DigestMismatch { .. })
    }
}

// Additional From implementations for external error types

impl From<tempfile::PersistError> for Error {
    fn from(err: tempfile::PersistError) -> Self {
        Error::Io { source: err.error }
    }
}

impl From<ignore::Error> for Error {
    fn from(err: ignore::Error) -> Self {
        // ignore::Error can wrap an io::Error or be a path error
        match err.io_error() {
            Some(io_err) => Error::Io {
                source: std::io::Error::new(io_err.kind(), io_err.to_string()),
            },
            None => Error::Io {
                source: std::io::Error::other(err.to_string()),
            },
        }
    }
}
