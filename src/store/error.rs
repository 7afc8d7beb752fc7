//! Error types for the file store.

use std::path::PathBuf;

use thiserror::Error;

/// Errors raised by [`FileStore`](super::FileStore) and
/// [`SaveTarget`](super::SaveTarget) implementations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// File system error on a specific path.
    #[error("IO error on {path}: {source}")]
    Io {
        /// Path the operation was applied to.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// A store-relative name that escapes the store root or is empty.
    #[error("invalid store name: {name:?}")]
    InvalidName {
        /// The rejected name.
        name: String,
    },

    /// Sidecar serialization failed.
    #[error("JSON serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
}

impl StoreError {
    /// Creates an IO error.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Creates an invalid name error.
    pub fn invalid_name(name: impl Into<String>) -> Self {
        Self::InvalidName { name: name.into() }
    }

    /// True when the error is a missing file or directory.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::Io { source, .. } if source.kind() == std::io::ErrorKind::NotFound)
    }
}
