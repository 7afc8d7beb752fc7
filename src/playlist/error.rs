//! Error types for manifest parsing.

use thiserror::Error;

/// Errors raised while turning manifest text into absolute URLs.
#[derive(Debug, Error)]
pub enum PlaylistError {
    /// The manifest's own URL cannot serve as a base for relative references.
    #[error("invalid manifest URL: {url}")]
    InvalidBaseUrl {
        /// The rejected base URL.
        url: String,
    },

    /// A URI line could not be resolved against the manifest URL.
    #[error("invalid URI on manifest line {line}: {reason}")]
    InvalidSegmentUrl {
        /// 1-based line number in the manifest text.
        line: usize,
        /// Parser message.
        reason: String,
    },
}

impl PlaylistError {
    /// Creates an invalid base URL error.
    pub fn invalid_base(url: impl Into<String>) -> Self {
        Self::InvalidBaseUrl { url: url.into() }
    }

    /// Creates an invalid segment URI error.
    pub fn invalid_segment(line: usize, reason: impl std::fmt::Display) -> Self {
        Self::InvalidSegmentUrl {
            line,
            reason: reason.to_string(),
        }
    }
}
