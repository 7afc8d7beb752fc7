//! File-store capability used by the download side.
//!
//! Downloads are assembled in a work directory of a [`FileStore`] through a
//! [`SequentialWriter`], then handed to a [`SaveTarget`] that decides where
//! the finished file ends up. The store offers no partial-write recovery.

mod error;
mod local;
mod save;

use std::path::PathBuf;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::io::AsyncRead;

pub use error::StoreError;
pub use local::LocalFileStore;
pub use save::DirectorySaveTarget;

/// Name of the work directory downloads are assembled in.
pub const WORK_DIR: &str = "downloads";

/// Boxed reader over a stored file.
pub type StoreReader = Box<dyn AsyncRead + Send + Unpin>;

/// Append-only writer. Consumed by [`close`](SequentialWriter::close), so it
/// is closed at most once.
#[async_trait]
pub trait SequentialWriter: Send {
    /// Appends `chunk`.
    async fn write(&mut self, chunk: &[u8]) -> Result<(), StoreError>;

    /// Flushes and closes, returning the total bytes written.
    async fn close(self: Box<Self>) -> Result<u64, StoreError>;

    /// Bytes written so far.
    fn written(&self) -> u64;
}

/// Directory and file operations on store-relative names (`dir/file`).
#[async_trait]
pub trait FileStore: Send + Sync {
    async fn create_dir(&self, name: &str) -> Result<(), StoreError>;

    /// Creates (or truncates) a file and returns a writer over it.
    async fn create_file(&self, name: &str) -> Result<Box<dyn SequentialWriter>, StoreError>;

    /// Reads a finished file fully into memory.
    async fn read_file(&self, name: &str) -> Result<Bytes, StoreError>;

    /// Opens a finished file for streaming reads.
    async fn open_reader(&self, name: &str) -> Result<StoreReader, StoreError>;

    async fn remove_file(&self, name: &str) -> Result<(), StoreError>;

    /// Removes a directory and everything in it.
    async fn remove_dir(&self, name: &str) -> Result<(), StoreError>;
}

/// Where finished artifacts are saved. Returns the final location.
#[async_trait]
pub trait SaveTarget: Send + Sync {
    async fn save(&self, name: &str, data: Bytes) -> Result<PathBuf, StoreError>;

    async fn save_from(&self, name: &str, reader: StoreReader) -> Result<PathBuf, StoreError>;
}

/// Joins a work-directory entry name.
#[must_use]
pub fn work_path(file_name: &str) -> String {
    format!("{WORK_DIR}/{file_name}")
}
