//! Linear backoff for non-2xx segment responses.
//!
//! # Overview
//!
//! Only HTTP responses outside 2xx are retried. A 404 is terminal right away
//! ([`FetchError::NotFound`]), and network-level failures propagate as they
//! are. Attempt `n` that fails waits `n * interval` before attempt `n + 1`;
//! once `max_attempts` attempts have failed the fetch ends with
//! [`FetchError::RetryExhausted`].
//!
//! # Example
//!
//! ```
//! use std::time::Duration;
//! use netmon_core::fetch::{LinearBackoff, RetryDecision};
//!
//! let backoff = LinearBackoff::default();
//! assert_eq!(
//!     backoff.should_retry(503, 2),
//!     RetryDecision::Retry { delay: Duration::from_secs(2), attempt: 3 }
//! );
//! assert!(matches!(backoff.should_retry(404, 1), RetryDecision::DoNotRetry { .. }));
//! ```

use std::time::Duration;

use bytes::Bytes;
use tracing::{debug, instrument, warn};

use super::constants::{DEFAULT_MAX_ATTEMPTS, DEFAULT_RETRY_INTERVAL};
use super::error::FetchError;
use super::source::{FetchOptions, SegmentSource};

/// Decision after a failed attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryDecision {
    /// Retry after `delay`; `attempt` is the number of the next attempt.
    Retry { delay: Duration, attempt: u32 },

    /// Give up.
    DoNotRetry {
        /// Human-readable reason.
        reason: String,
    },
}

/// Linear backoff policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinearBackoff {
    max_attempts: u32,
    interval: Duration,
}

impl Default for LinearBackoff {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            interval: DEFAULT_RETRY_INTERVAL,
        }
    }
}

impl LinearBackoff {
    /// `max_attempts` is clamped to at least 1.
    #[must_use]
    pub fn new(max_attempts: u32, interval: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            interval,
        }
    }

    #[must_use]
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    #[must_use]
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Delay after failed attempt `attempt` (1-based).
    #[must_use]
    pub fn delay(&self, attempt: u32) -> Duration {
        self.interval.saturating_mul(attempt)
    }

    /// Decides what follows a failed attempt that returned `status`.
    #[must_use]
    pub fn should_retry(&self, status: u16, attempt: u32) -> RetryDecision {
        if status == 404 {
            return RetryDecision::DoNotRetry {
                reason: "not found".to_string(),
            };
        }
        if attempt >= self.max_attempts {
            return RetryDecision::DoNotRetry {
                reason: format!("max attempts ({}) exhausted", self.max_attempts),
            };
        }
        RetryDecision::Retry {
            delay: self.delay(attempt),
            attempt: attempt + 1,
        }
    }
}

/// Fetches `url` with the backoff applied to non-2xx responses.
///
/// # Errors
///
/// - [`FetchError::NotFound`] on 404, without retry
/// - [`FetchError::RetryExhausted`] when every attempt returned non-2xx
/// - any error of the source itself (transport, timeout, invalid URL), unretried
#[instrument(level = "debug", skip(source, options, backoff))]
pub async fn fetch_with_retry<S>(
    source: &S,
    url: &str,
    options: &FetchOptions,
    backoff: &LinearBackoff,
) -> Result<Bytes, FetchError>
where
    S: SegmentSource + ?Sized,
{
    let mut attempt = 1;
    loop {
        let response = source.fetch(url, options).await?;
        if response.is_success() {
            return Ok(response.body);
        }
        if response.status == 404 {
            return Err(FetchError::not_found(url));
        }
        match backoff.should_retry(response.status, attempt) {
            RetryDecision::Retry { delay, attempt: next } => {
                debug!(
                    status = response.status,
                    attempt,
                    delay_ms = delay.as_millis(),
                    "retrying segment"
                );
                tokio::time::sleep(delay).await;
                attempt = next;
            }
            RetryDecision::DoNotRetry { reason } => {
                warn!(status = response.status, attempt, %reason, "giving up on segment");
                return Err(FetchError::retry_exhausted(url, response.status, attempt));
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;

    use super::*;
    use crate::fetch::source::SegmentResponse;

    /// Answers with a scripted status sequence, then 200.
    struct Scripted {
        statuses: Mutex<Vec<u16>>,
        calls: Mutex<u32>,
    }

    impl Scripted {
        fn new(statuses: &[u16]) -> Self {
            Self {
                statuses: Mutex::new(statuses.iter().rev().copied().collect()),
                calls: Mutex::new(0),
            }
        }
        fn calls(&self) -> u32 {
            *self.calls.lock().unwrap()
        }
    }

    #[async_trait]
    impl SegmentSource for Scripted {
        async fn fetch(&self, _url: &str, _options: &FetchOptions) -> Result<SegmentResponse, FetchError> {
            *self.calls.lock().unwrap() += 1;
            let status = self.statuses.lock().unwrap().pop().unwrap_or(200);
            Ok(SegmentResponse {
                status,
                body: Bytes::from_static(b"ok"),
            })
        }
    }

    fn fast() -> LinearBackoff {
        LinearBackoff::new(3, Duration::from_millis(1))
    }

    #[test]
    fn test_delay_is_linear() {
        let backoff = LinearBackoff::default();
        assert_eq!(backoff.delay(1), Duration::from_secs(1));
        assert_eq!(backoff.delay(2), Duration::from_secs(2));
        assert_eq!(backoff.delay(3), Duration::from_secs(3));
    }

    #[test]
    fn test_last_attempt_is_not_retried() {
        let backoff = LinearBackoff::default();
        assert!(matches!(backoff.should_retry(500, 3), RetryDecision::DoNotRetry { .. }));
        assert_eq!(
            backoff.should_retry(500, 1),
            RetryDecision::Retry {
                delay: Duration::from_secs(1),
                attempt: 2
            }
        );
    }

    #[test]
    fn test_new_clamps_attempts() {
        assert_eq!(LinearBackoff::new(0, Duration::ZERO).max_attempts(), 1);
    }

    #[tokio::test]
    async fn test_recovers_after_transient_statuses() {
        let source = Scripted::new(&[503, 502]);
        let body = fetch_with_retry(&source, "https://h/s.ts", &FetchOptions::default(), &fast())
            .await
            .unwrap();
        assert_eq!(body, Bytes::from_static(b"ok"));
        assert_eq!(source.calls(), 3);
    }

    #[tokio::test]
    async fn test_exhausts_after_max_attempts() {
        let source = Scripted::new(&[500, 500, 500, 500]);
        let err = fetch_with_retry(&source, "https://h/s.ts", &FetchOptions::default(), &fast())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            FetchError::RetryExhausted {
                status: 500,
                attempts: 3,
                ..
            }
        ));
        assert_eq!(source.calls(), 3);
    }

    #[tokio::test]
    async fn test_not_found_is_terminal() {
        let source = Scripted::new(&[404]);
        let err = fetch_with_retry(&source, "https://h/s.ts", &FetchOptions::default(), &fast())
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::NotFound { .. }));
        assert_eq!(source.calls(), 1);
    }
}
