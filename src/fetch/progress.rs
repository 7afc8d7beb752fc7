//! Progress reports shared by the chunked and segmented downloaders.

/// One progress tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Progress {
    /// Bytes pumped so far; `total` is the declared length, if any.
    Bytes { done: u64, total: Option<u64> },
    /// Segments fetched so far out of the playlist length.
    Segments { done: usize, total: usize },
}

/// Progress callback. Invoked on the downloading task, so keep it cheap.
pub type ProgressFn = dyn Fn(Progress) + Send + Sync;

/// Callback that drops every report.
pub fn no_progress(_: Progress) {}
