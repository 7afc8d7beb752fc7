//! Size-capped accumulation of streamed response bodies.
//!
//! A [`CaptureBuffer`] keeps every chunk of a response until the running
//! length passes the ceiling, then drops its chunk list for good. The
//! transfer itself is never affected: [`TappedStream`] forwards every item of
//! the wrapped stream unchanged and only reports what it saw once the stream
//! ends.

use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::Bytes;
use futures_util::Stream;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, trace};

use super::event::{BodyCapture, LifecycleEvent, RequestId, TabId};

/// Per-request accumulator.
///
/// Invariants: when `chunks` is `None` the observed length passed the ceiling
/// at the time of truncation; when present, the chunks concatenate to exactly
/// `length` bytes.
#[derive(Debug, Clone)]
pub struct CaptureBuffer {
    ceiling: u64,
    length: u64,
    chunks: Option<Vec<Bytes>>,
}

impl CaptureBuffer {
    /// Creates an empty buffer that retains at most `ceiling` bytes.
    #[must_use]
    pub fn new(ceiling: u64) -> Self {
        Self {
            ceiling,
            length: 0,
            chunks: Some(Vec::new()),
        }
    }

    /// Records one chunk. Returns false once the buffer has overflowed.
    pub fn push(&mut self, chunk: &Bytes) -> bool {
        self.length += chunk.len() as u64;
        if self.length > self.ceiling {
            if self.chunks.take().is_some() {
                debug!(
                    length = self.length,
                    ceiling = self.ceiling,
                    "capture ceiling exceeded, dropping buffered chunks"
                );
            }
            return false;
        }
        if let Some(chunks) = self.chunks.as_mut() {
            chunks.push(chunk.clone());
        }
        self.chunks.is_some()
    }

    /// Total bytes observed so far.
    #[must_use]
    pub fn length(&self) -> u64 {
        self.length
    }

    /// Configured ceiling in bytes.
    #[must_use]
    pub fn ceiling(&self) -> u64 {
        self.ceiling
    }

    /// True once the chunk list has been dropped.
    #[must_use]
    pub fn is_overflowed(&self) -> bool {
        self.chunks.is_none()
    }

    /// Buffered chunks, if still under the ceiling.
    #[must_use]
    pub fn chunks(&self) -> Option<&[Bytes]> {
        self.chunks.as_deref()
    }

    /// Consumes the buffer into the completion record for `id`.
    #[must_use]
    pub fn into_capture(self, id: RequestId, tab_id: TabId, success: bool) -> BodyCapture {
        BodyCapture {
            id,
            tab_id,
            length: self.length,
            chunks: self.chunks,
            success,
        }
    }
}

/// Where a tap reports its result when the body stream ends.
#[derive(Debug)]
pub(crate) struct TapReport {
    pub(crate) id: RequestId,
    pub(crate) tab_id: TabId,
    pub(crate) buffer: CaptureBuffer,
    pub(crate) events: UnboundedSender<LifecycleEvent>,
}

impl TapReport {
    fn send(self, success: bool) {
        trace!(id = %self.id, length = self.buffer.length(), success, "body tap finished");
        let capture = self.buffer.into_capture(self.id, self.tab_id, success);
        // The consumer may already be gone; the body stream is unaffected.
        let _ = self.events.send(LifecycleEvent::BodyCaptured(capture));
    }
}

/// Transparent tap over a response body stream.
///
/// Every item is yielded unchanged. On the first error or at end of stream a
/// `body-captured` event is emitted exactly once. A tap built without a report
/// target is a plain pass-through.
pub struct TappedStream<S> {
    inner: S,
    report: Option<TapReport>,
}

impl<S> TappedStream<S> {
    pub(crate) fn new(inner: S, report: Option<TapReport>) -> Self {
        Self { inner, report }
    }

    /// Wraps `inner` without capturing anything.
    pub fn passthrough(inner: S) -> Self {
        Self::new(inner, None)
    }

    /// True when this tap will emit a `body-captured` event.
    #[must_use]
    pub fn is_capturing(&self) -> bool {
        self.report.is_some()
    }
}

impl<S, E> Stream for TappedStream<S>
where
    S: Stream<Item = Result<Bytes, E>> + Unpin,
{
    type Item = Result<Bytes, E>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = &mut *self;
        let polled = Pin::new(&mut this.inner).poll_next(cx);
        match &polled {
            Poll::Ready(Some(Ok(chunk))) => {
                if let Some(report) = this.report.as_mut() {
                    report.buffer.push(chunk);
                }
            }
            Poll::Ready(Some(Err(_))) => {
                if let Some(report) = this.report.take() {
                    report.send(false);
                }
            }
            Poll::Ready(None) => {
                if let Some(report) = this.report.take() {
                    report.send(true);
                }
            }
            Poll::Pending => {}
        }
        polled
    }
}

impl<S> Drop for TappedStream<S> {
    fn drop(&mut self) {
        // A body abandoned mid-transfer counts as a failed capture.
        if let Some(report) = self.report.take() {
            report.send(false);
        }
    }
}
