//! HLS job orchestration.
//!
//! Loads a manifest, stops at the variant decision point for master
//! playlists, then fetches the segments with the [`ConcurrentFetcher`] while a
//! [`ReassemblyWriter`] appends them to a work-directory file in order. Only a
//! job that completes is saved, as `<timestamp>.bin` plus an optional
//! `<timestamp>.json` sidecar.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info, instrument, warn};
use url::Url;

use super::engine::{CancelFlag, ConcurrentFetcher, FetchObserver, FetchOutcome, SegmentResults};
use super::error::FetchError;
use super::filename::{SEGMENTED_EXTENSION, SIDECAR_EXTENSION, temp_entry_name, timestamp_stem};
use super::progress::{Progress, ProgressFn};
use super::reassembly::ReassemblyWriter;
use super::source::{FetchOptions, SegmentSource};
use crate::capture::session::SessionToken;
use crate::playlist::{Manifest, SegmentPlaylist, VariantMap, analyze_manifest};
use crate::sidecar::MetaInfo;
use crate::store::{FileStore, SaveTarget, StoreError, WORK_DIR, work_path};

/// Files written by a completed job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SavedStream {
    pub media: PathBuf,
    pub sidecar: Option<PathBuf>,
    pub segments: usize,
    pub bytes: u64,
}

/// How an HLS job ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HlsOutcome {
    Saved(SavedStream),
    /// Master playlist without a selected variant.
    NeedsVariant(VariantMap),
    /// Cancelled; nothing was saved.
    Cancelled,
}

/// Feeds landed segments to the reassembly writer.
struct ReassemblyObserver<'a> {
    writer: ReassemblyWriter,
    cancel: &'a CancelFlag,
    progress: &'a ProgressFn,
    failure: Option<StoreError>,
}

#[async_trait]
impl<'a> FetchObserver for ReassemblyObserver<'a> {
    async fn on_segment(&mut self, results: &mut SegmentResults) -> bool {
        (self.progress)(Progress::Segments {
            done: results.completed(),
            total: results.total(),
        });
        if self.cancel.is_cancelled() {
            return false;
        }
        match self.writer.advance(results).await {
            Ok(_) => true,
            Err(e) => {
                self.failure = Some(e);
                false
            }
        }
    }
}

/// Runs HLS jobs against a segment source and a pair of stores.
pub struct HlsDownloader {
    source: Arc<dyn SegmentSource>,
    store: Arc<dyn FileStore>,
    target: Arc<dyn SaveTarget>,
    fetcher: ConcurrentFetcher,
    session: SessionToken,
    sidecar: bool,
}

impl std::fmt::Debug for HlsDownloader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HlsDownloader")
            .field("fetcher", &self.fetcher)
            .field("sidecar", &self.sidecar)
            .finish_non_exhaustive()
    }
}

impl HlsDownloader {
    #[must_use]
    pub fn new(
        source: Arc<dyn SegmentSource>,
        store: Arc<dyn FileStore>,
        target: Arc<dyn SaveTarget>,
        session: SessionToken,
    ) -> Self {
        Self {
            source,
            store,
            target,
            fetcher: ConcurrentFetcher::default(),
            session,
            sidecar: true,
        }
    }

    #[must_use]
    pub fn with_fetcher(mut self, fetcher: ConcurrentFetcher) -> Self {
        self.fetcher = fetcher;
        self
    }

    /// Enables or disables the `.json` sidecar.
    #[must_use]
    pub fn with_sidecar(mut self, enabled: bool) -> Self {
        self.sidecar = enabled;
        self
    }

    /// Fetches and parses the manifest at `url`. No retries.
    ///
    /// # Errors
    ///
    /// [`FetchError::ManifestUnavailable`] on a non-2xx response, transport
    /// errors and playlist parse failures.
    #[instrument(skip(self, options), fields(url = %url))]
    pub async fn load_manifest(&self, url: &str, options: &FetchOptions) -> Result<Manifest, FetchError> {
        let base = Url::parse(url).map_err(|_| FetchError::invalid_url(url))?;
        let response = self.source.fetch(url, options).await?;
        if !response.is_success() {
            return Err(FetchError::manifest_unavailable(url, response.status));
        }
        let text = String::from_utf8_lossy(&response.body);
        Ok(analyze_manifest(&text, &base)?)
    }

    /// Loads `url` and downloads the stream it describes.
    ///
    /// For a master playlist, `variant` picks a rendition by listing index;
    /// without one the variant map is returned for the caller to choose.
    ///
    /// # Errors
    ///
    /// [`FetchError::VariantOutOfRange`] for a bad index, plus everything
    /// [`load_manifest`](Self::load_manifest) and
    /// [`download_stream`](Self::download_stream) return.
    #[instrument(skip(self, options, cancel, progress), fields(title = %title, url = %url))]
    pub async fn download(
        &self,
        title: &str,
        url: &str,
        options: &FetchOptions,
        variant: Option<usize>,
        cancel: &CancelFlag,
        progress: &ProgressFn,
    ) -> Result<HlsOutcome, FetchError> {
        let manifest = self.load_manifest(url, options).await.inspect_err(|e| {
            if matches!(e, FetchError::ManifestUnavailable { .. }) {
                warn!(%title, error = %e, "failed to download");
            }
        })?;

        let playlist = match manifest {
            Manifest::Media(playlist) => playlist,
            Manifest::Master(variants) => {
                let Some(index) = variant else {
                    info!(variants = variants.len(), "variant selection required");
                    return Ok(HlsOutcome::NeedsVariant(variants));
                };
                let chosen = variants.get(index).ok_or(FetchError::VariantOutOfRange {
                    index,
                    available: variants.len(),
                })?;
                debug!(index, descriptor = %chosen.descriptor, "variant selected");
                match self.load_manifest(chosen.url.as_str(), options).await? {
                    Manifest::Media(playlist) => playlist,
                    Manifest::Master(nested) => return Ok(HlsOutcome::NeedsVariant(nested)),
                }
            }
        };

        self.download_stream(title, &playlist, options, cancel, progress).await
    }

    /// Fetches every segment of `playlist` and saves the reassembled stream.
    ///
    /// The work file is closed once the fetch job settles, whatever the
    /// result, and removed afterwards. Nothing is saved on cancellation.
    ///
    /// # Errors
    ///
    /// The first segment failure, reassembly write failures and save failures.
    #[instrument(skip_all, fields(title = %title, segments = playlist.len()))]
    pub async fn download_stream(
        &self,
        title: &str,
        playlist: &SegmentPlaylist,
        options: &FetchOptions,
        cancel: &CancelFlag,
        progress: &ProgressFn,
    ) -> Result<HlsOutcome, FetchError> {
        let urls = playlist.urls();
        let store_name = work_path(&temp_entry_name());
        self.store.create_dir(WORK_DIR).await?;
        let sink = self.store.create_file(&store_name).await?;

        let mut observer = ReassemblyObserver {
            writer: ReassemblyWriter::new(sink, urls.len()),
            cancel,
            progress,
            failure: None,
        };
        let fetched = self
            .fetcher
            .fetch_all(self.source.as_ref(), &urls, options, &mut observer, cancel)
            .await;
        let ReassemblyObserver { writer, failure, .. } = observer;
        let complete = writer.is_complete();
        let closed = writer.close().await;

        let settled = match (fetched, failure, closed) {
            (Err(e), _, _) => Err(e),
            (_, Some(e), _) | (_, None, Err(e)) => Err(e.into()),
            (Ok(outcome), None, Ok(bytes)) => Ok((outcome, bytes)),
        };
        let saved = match settled {
            Ok((FetchOutcome::Completed, bytes)) if complete && !cancel.is_cancelled() => {
                self.save(playlist, options, &store_name, bytes).await
            }
            Ok(_) => {
                info!("download cancelled, nothing saved");
                Ok(HlsOutcome::Cancelled)
            }
            Err(e) => Err(e),
        };
        self.discard(&store_name).await;
        saved
    }

    async fn save(
        &self,
        playlist: &SegmentPlaylist,
        options: &FetchOptions,
        store_name: &str,
        bytes: u64,
    ) -> Result<HlsOutcome, FetchError> {
        let stem = timestamp_stem();
        let reader = self.store.open_reader(store_name).await?;
        let media = self
            .target
            .save_from(&format!("{stem}.{SEGMENTED_EXTENSION}"), reader)
            .await?;

        let sidecar = if self.sidecar {
            let meta = MetaInfo::new(&self.session, &options.headers, playlist.directives.clone());
            let path = self
                .target
                .save(&format!("{stem}.{SIDECAR_EXTENSION}"), meta.to_json()?)
                .await?;
            Some(path)
        } else {
            None
        };

        info!(media = %media.display(), bytes, segments = playlist.len(), "stream saved");
        Ok(HlsOutcome::Saved(SavedStream {
            media,
            sidecar,
            segments: playlist.len(),
            bytes,
        }))
    }

    async fn discard(&self, store_name: &str) {
        if let Err(e) = self.store.remove_file(store_name).await {
            warn!(name = %store_name, error = %e, "failed to remove work file");
        }
    }
}
