//! Chunk-by-chunk download of a single non-segmented resource.
//!
//! The body is pumped straight into a work-directory file. Small results are
//! read back and saved right away; larger ones stay staged as a
//! [`TempArtifact`] whose save and removal are left to the caller.

use std::path::PathBuf;
use std::sync::Arc;

use futures_util::StreamExt;
use tracing::{debug, info, instrument, warn};
use url::Url;

use super::client::{BodyStream, HttpClient};
use super::engine::CancelFlag;
use super::error::FetchError;
use super::filename::{filename_from_url, temp_entry_name};
use super::progress::{Progress, ProgressFn};
use super::source::FetchOptions;
use crate::settings::DEFAULT_SMALL_FILE_THRESHOLD_BYTES;
use crate::store::{FileStore, SaveTarget, SequentialWriter, StoreError, WORK_DIR, work_path};

/// A finished or cancelled download still sitting in the work directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TempArtifact {
    /// Entry name inside the file store.
    pub store_name: String,
    /// Name the save step should use.
    pub suggested_name: String,
    pub size: u64,
}

impl TempArtifact {
    /// Streams the artifact into `target` under its suggested name.
    ///
    /// The artifact stays in the store; call [`remove`](Self::remove) once the
    /// save is known to be done.
    ///
    /// # Errors
    ///
    /// Store read or target write failures.
    pub async fn save(&self, store: &dyn FileStore, target: &dyn SaveTarget) -> Result<PathBuf, StoreError> {
        let reader = store.open_reader(&self.store_name).await?;
        target.save_from(&self.suggested_name, reader).await
    }

    /// Deletes the temporary file.
    ///
    /// # Errors
    ///
    /// Returns the store's removal failure.
    pub async fn remove(self, store: &dyn FileStore) -> Result<(), StoreError> {
        store.remove_file(&self.store_name).await?;
        debug!(name = %self.store_name, "temporary artifact removed");
        Ok(())
    }
}

/// How a chunked download ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChunkedOutcome {
    /// Below the small-file threshold: saved and the temp file discarded.
    Saved(PathBuf),
    /// Complete but large: left in the work directory.
    Staged(TempArtifact),
    /// Stopped by the cancel flag; holds what was written so far.
    Cancelled(TempArtifact),
}

enum PumpEnd {
    Finished(u64),
    Cancelled(u64),
}

/// Downloads single resources through the shared HTTP client.
pub struct ChunkedDownloader {
    client: HttpClient,
    store: Arc<dyn FileStore>,
    target: Arc<dyn SaveTarget>,
    small_file_threshold: u64,
}

impl std::fmt::Debug for ChunkedDownloader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChunkedDownloader")
            .field("small_file_threshold", &self.small_file_threshold)
            .finish_non_exhaustive()
    }
}

impl ChunkedDownloader {
    #[must_use]
    pub fn new(client: HttpClient, store: Arc<dyn FileStore>, target: Arc<dyn SaveTarget>) -> Self {
        Self {
            client,
            store,
            target,
            small_file_threshold: DEFAULT_SMALL_FILE_THRESHOLD_BYTES,
        }
    }

    /// Sets the size below which results are saved immediately.
    #[must_use]
    pub fn with_small_file_threshold(mut self, bytes: u64) -> Self {
        self.small_file_threshold = bytes;
        self
    }

    #[must_use]
    pub fn store(&self) -> &Arc<dyn FileStore> {
        &self.store
    }

    #[must_use]
    pub fn target(&self) -> &Arc<dyn SaveTarget> {
        &self.target
    }

    /// Downloads `url` chunk by chunk.
    ///
    /// `cancel` is checked before each chunk is written. The temporary file is
    /// always closed. A failed download leaves its partial file in the work
    /// directory; the entry name is logged at `warn`.
    ///
    /// # Errors
    ///
    /// Open failures from [`HttpClient::open_stream`], transport errors while
    /// pumping and store failures.
    #[instrument(skip(self, options, cancel, progress), fields(url = %url))]
    pub async fn download(
        &self,
        url: &str,
        options: &FetchOptions,
        cancel: &CancelFlag,
        progress: &ProgressFn,
    ) -> Result<ChunkedOutcome, FetchError> {
        let parsed = Url::parse(url).map_err(|_| FetchError::invalid_url(url))?;
        let response = self.client.open_stream(url, options).await?;
        let suggested_name = filename_from_url(&parsed, &response.content_type);
        let store_name = work_path(&temp_entry_name());

        self.store.create_dir(WORK_DIR).await?;
        let mut writer = self.store.create_file(&store_name).await?;
        let pumped = pump(
            writer.as_mut(),
            response.body,
            response.content_length,
            cancel,
            progress,
        )
        .await;
        let closed = writer.close().await;

        let end = match (pumped, closed) {
            (Ok(end), Ok(_)) => end,
            (Err(e), _) => {
                warn!(name = %store_name, error = %e, "download failed, partial file kept");
                return Err(e);
            }
            (Ok(_), Err(e)) => {
                warn!(name = %store_name, error = %e, "closing download failed, partial file kept");
                return Err(e.into());
            }
        };

        let size = match end {
            PumpEnd::Cancelled(size) => {
                info!(bytes = size, "download cancelled");
                return Ok(ChunkedOutcome::Cancelled(TempArtifact {
                    store_name,
                    suggested_name,
                    size,
                }));
            }
            PumpEnd::Finished(size) => size,
        };

        if size < self.small_file_threshold {
            let data = self.store.read_file(&store_name).await?;
            let path = self.target.save(&suggested_name, data).await?;
            self.store.remove_file(&store_name).await?;
            info!(bytes = size, path = %path.display(), "saved");
            return Ok(ChunkedOutcome::Saved(path));
        }

        info!(bytes = size, name = %store_name, "staged for save");
        Ok(ChunkedOutcome::Staged(TempArtifact {
            store_name,
            suggested_name,
            size,
        }))
    }
}

async fn pump(
    writer: &mut dyn SequentialWriter,
    mut body: BodyStream,
    total: Option<u64>,
    cancel: &CancelFlag,
    progress: &ProgressFn,
) -> Result<PumpEnd, FetchError> {
    let mut done: u64 = 0;
    while let Some(chunk) = body.next().await {
        if cancel.is_cancelled() {
            return Ok(PumpEnd::Cancelled(done));
        }
        let chunk = chunk?;
        writer.write(&chunk).await?;
        done += chunk.len() as u64;
        progress(Progress::Bytes { done, total });
    }
    Ok(PumpEnd::Finished(done))
}
