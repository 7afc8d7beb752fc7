//! Final destination for finished artifacts.

use std::path::PathBuf;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;
use tracing::{info, instrument};

use super::{SaveTarget, StoreError, StoreReader};
use crate::fetch::filename::resolve_unique_path;

/// Saves into one directory, never overwriting: a taken name becomes
/// `name_2.ext`, `name_3.ext`, ...
#[derive(Debug, Clone)]
pub struct DirectorySaveTarget {
    dir: PathBuf,
}

impl DirectorySaveTarget {
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    #[must_use]
    pub fn dir(&self) -> &std::path::Path {
        &self.dir
    }

    async fn open_unique(&self, name: &str) -> Result<(PathBuf, fs::File), StoreError> {
        fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| StoreError::io(self.dir.clone(), e))?;
        let path = resolve_unique_path(&self.dir, name);
        let file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .await
            .map_err(|e| StoreError::io(path.clone(), e))?;
        Ok((path, file))
    }
}

#[async_trait]
impl SaveTarget for DirectorySaveTarget {
    #[instrument(skip(self, data), fields(bytes = data.len()))]
    async fn save(&self, name: &str, data: Bytes) -> Result<PathBuf, StoreError> {
        let (path, mut file) = self.open_unique(name).await?;
        file.write_all(&data)
            .await
            .map_err(|e| StoreError::io(path.clone(), e))?;
        file.flush()
            .await
            .map_err(|e| StoreError::io(path.clone(), e))?;
        info!(path = %path.display(), "saved");
        Ok(path)
    }

    #[instrument(skip(self, reader))]
    async fn save_from(&self, name: &str, mut reader: StoreReader) -> Result<PathBuf, StoreError> {
        let (path, mut file) = self.open_unique(name).await?;
        let bytes = tokio::io::copy(&mut reader, &mut file)
            .await
            .map_err(|e| StoreError::io(path.clone(), e))?;
        file.flush()
            .await
            .map_err(|e| StoreError::io(path.clone(), e))?;
        info!(path = %path.display(), bytes, "saved");
        Ok(path)
    }
}
