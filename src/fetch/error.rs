//! Error types for the fetch subsystem.
//!
//! Overflowing the capture ceiling and meeting a master playlist are not
//! errors and have no variant here.

use thiserror::Error;

use crate::playlist::PlaylistError;
use crate::store::StoreError;

/// Errors that end a fetch or a download job.
#[derive(Debug, Error)]
pub enum FetchError {
    /// The server answered 404. Never retried.
    #[error("not found: {url}")]
    NotFound {
        /// The missing resource.
        url: String,
    },

    /// Non-2xx responses persisted past the attempt limit.
    #[error("HTTP {status} from {url} after {attempts} attempts")]
    RetryExhausted {
        /// The failing URL.
        url: String,
        /// Status of the last attempt.
        status: u16,
        /// Attempts made.
        attempts: u32,
    },

    /// Non-2xx response on a path that does not retry.
    #[error("HTTP {status} downloading {url}")]
    HttpStatus {
        /// The failing URL.
        url: String,
        /// The HTTP status code.
        status: u16,
    },

    /// Network-level failure (DNS, refused connection, TLS, reset body).
    #[error("network error fetching {url}: {source}")]
    Transport {
        /// The URL being fetched.
        url: String,
        /// The underlying network error.
        #[source]
        source: reqwest::Error,
    },

    /// Request timed out.
    #[error("timeout fetching {url}")]
    Timeout {
        /// The URL that timed out.
        url: String,
    },

    /// The URL is malformed.
    #[error("invalid URL: {url}")]
    InvalidUrl {
        /// The invalid URL string.
        url: String,
    },

    /// The manifest itself could not be downloaded.
    #[error("manifest unavailable (HTTP {status}): {url}")]
    ManifestUnavailable {
        /// Manifest URL.
        url: String,
        /// Status returned.
        status: u16,
    },

    /// The requested variant does not exist in the master playlist.
    #[error("variant {index} out of range ({available} available)")]
    VariantOutOfRange {
        /// Requested 0-based index.
        index: usize,
        /// Number of variants listed.
        available: usize,
    },

    /// Writing or saving the artifact failed.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// The manifest could not be parsed.
    #[error(transparent)]
    Playlist(#[from] PlaylistError),
}

impl FetchError {
    /// Creates a not-found error.
    pub fn not_found(url: impl Into<String>) -> Self {
        Self::NotFound { url: url.into() }
    }

    /// Creates a retry-exhausted error.
    pub fn retry_exhausted(url: impl Into<String>, status: u16, attempts: u32) -> Self {
        Self::RetryExhausted {
            url: url.into(),
            status,
            attempts,
        }
    }

    /// Creates an HTTP status error.
    pub fn http_status(url: impl Into<String>, status: u16) -> Self {
        Self::HttpStatus {
            url: url.into(),
            status,
        }
    }

    /// Classifies a reqwest error as timeout or transport failure.
    pub fn transport(url: impl Into<String>, source: reqwest::Error) -> Self {
        let url = url.into();
        if source.is_timeout() {
            Self::Timeout { url }
        } else {
            Self::Transport { url, source }
        }
    }

    /// Creates an invalid URL error.
    pub fn invalid_url(url: impl Into<String>) -> Self {
        Self::InvalidUrl { url: url.into() }
    }

    /// Creates a manifest-unavailable error.
    pub fn manifest_unavailable(url: impl Into<String>, status: u16) -> Self {
        Self::ManifestUnavailable {
            url: url.into(),
            status,
        }
    }
}

// No From<reqwest::Error>: every network error needs the URL it happened on.
