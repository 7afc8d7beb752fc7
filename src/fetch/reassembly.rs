//! In-order writer over out-of-order segment completions.

use tracing::trace;

use super::engine::SegmentResults;
use crate::store::{SequentialWriter, StoreError};

/// Writes segments to a sink strictly in list order.
///
/// After every landed segment, [`advance`](Self::advance) writes as many
/// consecutive segments as are available from the cursor on, taking them out
/// of the result map.
pub struct ReassemblyWriter {
    sink: Box<dyn SequentialWriter>,
    next: usize,
    total: usize,
}

impl std::fmt::Debug for ReassemblyWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReassemblyWriter")
            .field("next", &self.next)
            .field("total", &self.total)
            .field("written", &self.sink.written())
            .finish_non_exhaustive()
    }
}

impl ReassemblyWriter {
    #[must_use]
    pub fn new(sink: Box<dyn SequentialWriter>, total: usize) -> Self {
        Self { sink, next: 0, total }
    }

    /// Writes every consecutive segment available at the cursor.
    ///
    /// Returns how many segments were written.
    ///
    /// # Errors
    ///
    /// Propagates sink write failures; the cursor stays on the failed segment.
    pub async fn advance(&mut self, results: &mut SegmentResults) -> Result<usize, StoreError> {
        let mut written = 0;
        while self.next < self.total {
            let Some(body) = results.take(self.next) else {
                break;
            };
            self.sink.write(&body).await?;
            trace!(index = self.next, bytes = body.len(), "segment written");
            self.next += 1;
            written += 1;
        }
        Ok(written)
    }

    /// Index of the next segment to write.
    #[must_use]
    pub fn next_index(&self) -> usize {
        self.next
    }

    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.next == self.total
    }

    /// Closes the sink. Consumes the writer, so this happens once.
    ///
    /// # Errors
    ///
    /// Propagates the sink's flush/close failure.
    pub async fn close(self) -> Result<u64, StoreError> {
        self.sink.close().await
    }
}
