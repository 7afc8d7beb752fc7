//! Download side: HTTP fetches, segmented HLS jobs and chunked saves.
//!
//! # Features
//!
//! - Session header rewrite applied to every outgoing request
//! - Bounded concurrent segment fetching with per-URL linear backoff
//! - In-order reassembly of out-of-order segment completions
//! - Chunk-by-chunk downloads of single resources with a small-file fast path
//! - Cooperative cancellation through a shared [`CancelFlag`]
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use netmon_core::capture::SessionToken;
//! use netmon_core::fetch::{CancelFlag, FetchOptions, HlsDownloader, HlsOutcome, HttpClient, no_progress};
//! use netmon_core::store::{DirectorySaveTarget, LocalFileStore};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let session = SessionToken::generate();
//! let hls = HlsDownloader::new(
//!     Arc::new(HttpClient::new(session.clone())),
//!     Arc::new(LocalFileStore::new("/tmp/netmon")),
//!     Arc::new(DirectorySaveTarget::new("./saved")),
//!     session,
//! );
//! let outcome = hls
//!     .download(
//!         "clip",
//!         "https://cdn.example/live/index.m3u8",
//!         &FetchOptions::default(),
//!         None,
//!         &CancelFlag::new(),
//!         &no_progress,
//!     )
//!     .await?;
//! if let HlsOutcome::Saved(saved) = outcome {
//!     println!("Saved: {}", saved.media.display());
//! }
//! # Ok(())
//! # }
//! ```

mod chunked;
mod client;
mod constants;
mod engine;
mod error;
pub mod filename;
mod hls;
mod progress;
mod reassembly;
mod retry;
mod source;

pub use chunked::{ChunkedDownloader, ChunkedOutcome, TempArtifact};
pub use client::{BodyStream, HttpClient, StreamingResponse};
pub use constants::{DEFAULT_MAX_ATTEMPTS, DEFAULT_RETRY_INTERVAL};
pub use engine::{
    CancelFlag, ConcurrentFetcher, EngineError, FetchObserver, FetchOutcome, SegmentResults,
};
pub use error::FetchError;
pub use hls::{HlsDownloader, HlsOutcome, SavedStream};
pub use progress::{Progress, ProgressFn, no_progress};
pub use reassembly::ReassemblyWriter;
pub use retry::{LinearBackoff, RetryDecision, fetch_with_retry};
pub use source::{FetchOptions, SegmentResponse, SegmentSource};
