//! Constants for the fetch subsystem (retry, progress cadence).

use std::time::Duration;

/// Attempts per segment, including the first.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Unit of the linear backoff: attempt `n` waits `n * interval`.
pub const DEFAULT_RETRY_INTERVAL: Duration = Duration::from_secs(1);
