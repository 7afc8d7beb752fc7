//! netmon core library
//!
//! Captures and classifies browser network traffic and turns what it sees
//! into files: segmented HLS streams are fetched concurrently and reassembled
//! in order, single resources are pumped chunk by chunk.
//!
//! # Architecture
//!
//! - [`capture`] - interception side (body tap, header rewrite, events) and
//!   consumer side (correlator, batched dispatcher)
//! - [`classify`] - content-type classification and manifest sniffing
//! - [`playlist`] - media and master playlist parsing
//! - [`fetch`] - HTTP client, bounded concurrent fetcher, reassembly, HLS and
//!   chunked downloaders
//! - [`store`] - work-directory file store and save targets
//! - [`sidecar`] - metadata written next to reassembled streams
//! - [`export`] - curl command, detail dump and body preview of a record
//! - [`settings`] - settings bundle and the snapshots derived from it

// Clippy lints - strict for library code
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod capture;
pub mod classify;
pub mod export;
pub mod fetch;
pub mod playlist;
pub mod settings;
pub mod sidecar;
pub mod store;
mod user_agent;

#[cfg(test)]
pub(crate) mod test_support;

// Re-export commonly used types
pub use capture::{Dispatcher, Interceptor, LifecycleEvent, RequestRecord, RowSink, SessionToken};
pub use classify::Kind;
pub use fetch::{
    CancelFlag, ChunkedDownloader, ChunkedOutcome, ConcurrentFetcher, FetchError, FetchOptions,
    HlsDownloader, HlsOutcome, HttpClient, LinearBackoff,
};
pub use playlist::{Manifest, analyze_manifest};
pub use settings::Settings;
pub use store::{DirectorySaveTarget, LocalFileStore, StoreError};
