//! reqwest-backed HTTP client.
//!
//! Every request goes through the session header rewrite before it is sent,
//! so headers added under the session alias replace their plain namesakes.

use std::pin::Pin;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::{Stream, StreamExt};
use reqwest::Client;
use reqwest::header::{CONTENT_LENGTH, CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue};
use tracing::{debug, instrument, warn};
use url::Url;

use super::error::FetchError;
use super::retry::{LinearBackoff, fetch_with_retry};
use super::source::{FetchOptions, SegmentResponse, SegmentSource};
use crate::capture::session::SessionToken;
use crate::settings::{DEFAULT_CONNECT_TIMEOUT, DEFAULT_READ_TIMEOUT};
use crate::user_agent;

/// Response body as a stream of chunks.
pub type BodyStream = Pin<Box<dyn Stream<Item = Result<Bytes, FetchError>> + Send>>;

/// Opened response whose body has not been read yet.
pub struct StreamingResponse {
    /// Normalized content-type, empty when absent.
    pub content_type: String,
    /// Declared body length, if any.
    pub content_length: Option<u64>,
    pub body: BodyStream,
}

impl std::fmt::Debug for StreamingResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamingResponse")
            .field("content_type", &self.content_type)
            .field("content_length", &self.content_length)
            .finish_non_exhaustive()
    }
}

/// HTTP client shared by manifest, segment and chunked downloads.
///
/// Cheap to clone; clones share the connection pool.
#[derive(Debug, Clone)]
pub struct HttpClient {
    client: Client,
    session: SessionToken,
}

impl HttpClient {
    /// Creates a client with the default timeouts (30 s connect, 5 min read).
    ///
    /// # Panics
    ///
    /// Panics if the HTTP client builder fails with the static configuration.
    /// This should never happen in practice.
    #[must_use]
    pub fn new(session: SessionToken) -> Self {
        Self::with_timeouts(session, DEFAULT_CONNECT_TIMEOUT, DEFAULT_READ_TIMEOUT)
    }

    /// Creates a client with explicit timeouts.
    ///
    /// # Panics
    ///
    /// Panics if the HTTP client builder fails with the supplied configuration.
    #[must_use]
    #[allow(clippy::expect_used)]
    pub fn with_timeouts(session: SessionToken, connect_timeout: Duration, read_timeout: Duration) -> Self {
        let client = Client::builder()
            .connect_timeout(connect_timeout)
            .timeout(read_timeout)
            .gzip(true)
            .user_agent(user_agent::default_user_agent())
            .build()
            .expect("failed to build HTTP client with static configuration");
        Self { client, session }
    }

    #[must_use]
    pub fn session(&self) -> &SessionToken {
        &self.session
    }

    /// Header map actually sent for `options`, after the session rewrite.
    ///
    /// Headers whose name or value reqwest rejects are skipped with a warning.
    #[must_use]
    pub fn outgoing_headers(&self, options: &FetchOptions) -> HeaderMap {
        let mut map = HeaderMap::new();
        for header in self.session.rewrite_headers(&options.headers) {
            let name = HeaderName::from_bytes(header.name.as_bytes());
            let value = HeaderValue::from_str(&header.value);
            match (name, value) {
                (Ok(name), Ok(value)) => {
                    map.append(name, value);
                }
                _ => warn!(header = %header.name, "skipping header reqwest cannot send"),
            }
        }
        map
    }

    async fn send(&self, url: &str, options: &FetchOptions) -> Result<reqwest::Response, FetchError> {
        let parsed = Url::parse(url).map_err(|_| FetchError::invalid_url(url))?;
        self.client
            .get(parsed)
            .headers(self.outgoing_headers(options))
            .send()
            .await
            .map_err(|e| FetchError::transport(url, e))
    }

    /// Single-fetch convenience path with linear backoff on non-2xx.
    ///
    /// # Errors
    ///
    /// See [`fetch_with_retry`].
    #[instrument(skip(self, options, backoff), fields(url = %url))]
    pub async fn fetch_with_retry(
        &self,
        url: &str,
        options: &FetchOptions,
        backoff: &LinearBackoff,
    ) -> Result<Bytes, FetchError> {
        fetch_with_retry(self, url, options, backoff).await
    }

    /// Opens `url` for chunk-by-chunk reading.
    ///
    /// # Errors
    ///
    /// [`FetchError::NotFound`] on 404, [`FetchError::HttpStatus`] on any
    /// other non-2xx status, transport errors as they happen.
    #[instrument(skip(self, options), fields(url = %url))]
    pub async fn open_stream(&self, url: &str, options: &FetchOptions) -> Result<StreamingResponse, FetchError> {
        let response = self.send(url, options).await?;
        let status = response.status().as_u16();
        if status == 404 {
            return Err(FetchError::not_found(url));
        }
        if !response.status().is_success() {
            return Err(FetchError::http_status(url, status));
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(crate::classify::normalize_content_type)
            .unwrap_or_default();
        let content_length = response
            .headers()
            .get(CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<u64>().ok());
        debug!(%content_type, ?content_length, "stream opened");

        let owned_url = url.to_string();
        let body = response
            .bytes_stream()
            .map(move |chunk| chunk.map_err(|e| FetchError::transport(owned_url.clone(), e)));
        Ok(StreamingResponse {
            content_type,
            content_length,
            body: Box::pin(body),
        })
    }
}

#[async_trait]
impl SegmentSource for HttpClient {
    async fn fetch(&self, url: &str, options: &FetchOptions) -> Result<SegmentResponse, FetchError> {
        let response = self.send(url, options).await?;
        let status = response.status().as_u16();
        if !response.status().is_success() {
            debug!(url, status, "non-success response");
            return Ok(SegmentResponse {
                status,
                body: Bytes::new(),
            });
        }
        let body = response
            .bytes()
            .await
            .map_err(|e| FetchError::transport(url, e))?;
        Ok(SegmentResponse { status, body })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, ResponseTemplate};

    use super::*;
    use crate::test_support::socket_guard::start_mock_server_or_skip;

    fn client() -> HttpClient {
        HttpClient::new(SessionToken::from_token("tok"))
    }

    #[test]
    fn test_outgoing_headers_apply_rewrite() {
        let client = client();
        let options = FetchOptions::new()
            .header("Referer", "https://page/")
            .rewritten(client.session(), "Referer", "https://video/");
        let map = client.outgoing_headers(&options);
        assert_eq!(map.get_all("referer").iter().count(), 1);
        assert_eq!(map["referer"], "https://video/");
    }

    #[test]
    fn test_outgoing_headers_skip_invalid() {
        let options = FetchOptions::new().header("bad header", "x").header("Ok", "y");
        let map = client().outgoing_headers(&options);
        assert_eq!(map.len(), 1);
    }

    #[tokio::test]
    async fn test_fetch_returns_body_and_status() {
        let Some(mock_server) = start_mock_server_or_skip().await else {
            return;
        };
        Mock::given(method("GET"))
            .and(path("/seg1.ts"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"segment-one"))
            .mount(&mock_server)
            .await;

        let response = client()
            .fetch(&format!("{}/seg1.ts", mock_server.uri()), &FetchOptions::default())
            .await
            .unwrap();
        assert_eq!(response.status, 200);
        assert_eq!(response.body, Bytes::from_static(b"segment-one"));
    }

    #[tokio::test]
    async fn test_fetch_sends_rewritten_origin() {
        let Some(mock_server) = start_mock_server_or_skip().await else {
            return;
        };
        Mock::given(method("GET"))
            .and(path("/protected.ts"))
            .and(header("origin", "https://video.example"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"ok"))
            .mount(&mock_server)
            .await;

        let client = client();
        let options = FetchOptions::new().rewritten(client.session(), "Origin", "https://video.example");
        let response = client
            .fetch(&format!("{}/protected.ts", mock_server.uri()), &options)
            .await
            .unwrap();
        assert_eq!(response.status, 200);
    }

    #[tokio::test]
    async fn test_fetch_with_retry_maps_404() {
        let Some(mock_server) = start_mock_server_or_skip().await else {
            return;
        };
        Mock::given(method("GET"))
            .and(path("/missing.ts"))
            .respond_with(ResponseTemplate::new(404))
            .expect(1)
            .mount(&mock_server)
            .await;

        let err = client()
            .fetch_with_retry(
                &format!("{}/missing.ts", mock_server.uri()),
                &FetchOptions::default(),
                &LinearBackoff::new(3, Duration::from_millis(1)),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_invalid_url_is_reported() {
        let err = client()
            .fetch("not-a-valid-url", &FetchOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::InvalidUrl { .. }));
    }

    #[tokio::test]
    async fn test_open_stream_reports_metadata() {
        let Some(mock_server) = start_mock_server_or_skip().await else {
            return;
        };
        Mock::given(method("GET"))
            .and(path("/clip.mp4"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("Content-Type", "video/MP4; codecs=avc1")
                    .set_body_bytes(vec![7u8; 4096]),
            )
            .mount(&mock_server)
            .await;

        let mut response = client()
            .open_stream(&format!("{}/clip.mp4", mock_server.uri()), &FetchOptions::default())
            .await
            .unwrap();
        assert_eq!(response.content_type, "video/mp4");
        let mut total = 0;
        while let Some(chunk) = response.body.next().await {
            total += chunk.unwrap().len();
        }
        assert_eq!(total, 4096);
    }

    #[tokio::test]
    async fn test_open_stream_rejects_server_error() {
        let Some(mock_server) = start_mock_server_or_skip().await else {
            return;
        };
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&mock_server)
            .await;

        let err = client()
            .open_stream(&format!("{}/x", mock_server.uri()), &FetchOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::HttpStatus { status: 500, .. }));
    }
}
