//! Fetch capability consumed by the segment engine.

use async_trait::async_trait;
use bytes::Bytes;

use super::error::FetchError;
use crate::capture::event::Header;
use crate::capture::session::SessionToken;

/// Per-job request options.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FetchOptions {
    /// Headers as the caller set them, rewrite aliases included.
    pub headers: Vec<Header>,
}

impl FetchOptions {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a plain header.
    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push(Header::new(name, value));
        self
    }

    /// Adds a header under the session alias, so it replaces any header of
    /// the same name at send time (for `Origin`, `Referer` and friends).
    #[must_use]
    pub fn rewritten(mut self, session: &SessionToken, name: &str, value: impl Into<String>) -> Self {
        self.headers.push(Header::new(session.prefixed(name), value));
        self
    }
}

/// Status and body of one fetch. The body is empty for non-2xx responses.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegmentResponse {
    pub status: u16,
    pub body: Bytes,
}

impl SegmentResponse {
    #[must_use]
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Anything that can fetch a URL into memory.
///
/// Errors are for failures without a response (transport, timeout, bad URL);
/// any HTTP status comes back as a [`SegmentResponse`].
#[async_trait]
pub trait SegmentSource: Send + Sync {
    async fn fetch(&self, url: &str, options: &FetchOptions) -> Result<SegmentResponse, FetchError>;
}
