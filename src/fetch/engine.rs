//! Bounded concurrent segment fetcher.
//!
//! # Concurrency Model
//!
//! - A pull queue holds the indices not yet launched
//! - At most `max_concurrency` fetches are in flight; each completion pulls
//!   the next index right away
//! - Everything runs on the calling task through `FuturesUnordered`, no spawns
//!
//! # Cancellation
//!
//! The [`CancelFlag`] is checked before every launch and the observer can
//! stop the job after any completion. Fetches already in flight are dropped
//! when the job resolves; cancellation is never an error.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::StreamExt;
use futures_util::stream::FuturesUnordered;
use tracing::{debug, info, instrument};

use super::error::FetchError;
use super::retry::{LinearBackoff, fetch_with_retry};
use super::source::{FetchOptions, SegmentSource};
use crate::settings::{DEFAULT_CONCURRENCY, MAX_CONCURRENCY, MIN_CONCURRENCY};

/// Error type for fetcher construction.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Invalid concurrency value provided.
    #[error(
        "invalid concurrency value {value}: must be between {MIN_CONCURRENCY} and {MAX_CONCURRENCY}"
    )]
    InvalidConcurrency {
        /// The invalid value that was provided.
        value: usize,
    },
}

/// Shared cooperative cancellation flag.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Fetched bodies keyed by position in the URL list.
///
/// Observers may take bodies out once consumed; [`completed`](Self::completed)
/// keeps counting them.
#[derive(Debug, Default)]
pub struct SegmentResults {
    blobs: HashMap<usize, Bytes>,
    completed: usize,
    total: usize,
}

impl SegmentResults {
    #[must_use]
    pub fn new(total: usize) -> Self {
        Self {
            blobs: HashMap::new(),
            completed: 0,
            total,
        }
    }

    pub(crate) fn insert(&mut self, index: usize, body: Bytes) {
        self.blobs.insert(index, body);
        self.completed += 1;
    }

    /// Removes and returns the body at `index`, if it has landed.
    pub fn take(&mut self, index: usize) -> Option<Bytes> {
        self.blobs.remove(&index)
    }

    #[must_use]
    pub fn contains(&self, index: usize) -> bool {
        self.blobs.contains_key(&index)
    }

    /// Segments fetched so far.
    #[must_use]
    pub fn completed(&self) -> usize {
        self.completed
    }

    #[must_use]
    pub fn total(&self) -> usize {
        self.total
    }

    /// Bodies held and not yet taken.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.blobs.len()
    }
}

/// Receives every landed segment. Returning `false` cancels the job.
#[async_trait]
pub trait FetchObserver: Send {
    async fn on_segment(&mut self, results: &mut SegmentResults) -> bool;
}

/// How a job that did not fail ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchOutcome {
    /// Every URL has a result.
    Completed,
    /// Stopped by the cancel flag or the observer.
    Cancelled,
}

/// Fetches URL lists with bounded concurrency and per-URL linear backoff.
#[derive(Debug, Clone)]
pub struct ConcurrentFetcher {
    max_concurrency: usize,
    backoff: LinearBackoff,
}

impl Default for ConcurrentFetcher {
    fn default() -> Self {
        Self {
            max_concurrency: DEFAULT_CONCURRENCY,
            backoff: LinearBackoff::default(),
        }
    }
}

impl ConcurrentFetcher {
    /// # Errors
    ///
    /// Returns [`EngineError::InvalidConcurrency`] outside 1..=32.
    #[instrument(level = "debug", skip(backoff))]
    pub fn new(max_concurrency: usize, backoff: LinearBackoff) -> Result<Self, EngineError> {
        if !(MIN_CONCURRENCY..=MAX_CONCURRENCY).contains(&max_concurrency) {
            return Err(EngineError::InvalidConcurrency {
                value: max_concurrency,
            });
        }
        Ok(Self {
            max_concurrency,
            backoff,
        })
    }

    #[must_use]
    pub fn max_concurrency(&self) -> usize {
        self.max_concurrency
    }

    #[must_use]
    pub fn backoff(&self) -> &LinearBackoff {
        &self.backoff
    }

    /// Fetches every URL, reporting each landed body to `observer`.
    ///
    /// # Errors
    ///
    /// The first segment failure ([`FetchError::NotFound`],
    /// [`FetchError::RetryExhausted`] or a transport error) fails the whole
    /// job; fetches still in flight are dropped.
    #[instrument(skip_all, fields(segments = urls.len(), max = self.max_concurrency))]
    pub async fn fetch_all<S, O>(
        &self,
        source: &S,
        urls: &[String],
        options: &FetchOptions,
        observer: &mut O,
        cancel: &CancelFlag,
    ) -> Result<FetchOutcome, FetchError>
    where
        S: SegmentSource + ?Sized,
        O: FetchObserver + ?Sized,
    {
        let mut queue: VecDeque<usize> = (0..urls.len()).collect();
        let mut in_flight = FuturesUnordered::new();
        let mut results = SegmentResults::new(urls.len());

        loop {
            while in_flight.len() < self.max_concurrency && !queue.is_empty() {
                if cancel.is_cancelled() {
                    info!(done = results.completed(), "fetch cancelled");
                    return Ok(FetchOutcome::Cancelled);
                }
                let Some(index) = queue.pop_front() else {
                    break;
                };
                let url = urls[index].as_str();
                let backoff = &self.backoff;
                in_flight.push(async move {
                    fetch_with_retry(source, url, options, backoff)
                        .await
                        .map(|body| (index, body))
                });
            }

            let Some(landed) = in_flight.next().await else {
                break;
            };
            let (index, body) = landed?;
            debug!(index, bytes = body.len(), "segment fetched");
            results.insert(index, body);

            if !observer.on_segment(&mut results).await {
                info!(done = results.completed(), "fetch stopped by observer");
                return Ok(FetchOutcome::Cancelled);
            }
        }

        debug!(segments = results.completed(), "all segments fetched");
        Ok(FetchOutcome::Completed)
    }
}
