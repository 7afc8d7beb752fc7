//! Local-disk file store rooted at one directory.

use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use bytes::Bytes;
use tokio::fs::{self, File};
use tokio::io::{AsyncWriteExt, BufWriter};
use tracing::{debug, instrument};

use super::{FileStore, SequentialWriter, StoreError, StoreReader};

/// [`FileStore`] over `tokio::fs`. Every name is relative to `root`.
#[derive(Debug, Clone)]
pub struct LocalFileStore {
    root: PathBuf,
}

impl LocalFileStore {
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Maps a store-relative name to a path under `root`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::InvalidName`] for empty, absolute or
    /// parent-relative names.
    pub fn resolve(&self, name: &str) -> Result<PathBuf, StoreError> {
        let relative = Path::new(name);
        let mut components = relative.components().peekable();
        if components.peek().is_none() {
            return Err(StoreError::invalid_name(name));
        }
        if !components.all(|c| matches!(c, Component::Normal(_))) {
            return Err(StoreError::invalid_name(name));
        }
        Ok(self.root.join(relative))
    }

    /// Removes `name` with everything in it and recreates it empty.
    ///
    /// Leftovers from an interrupted earlier run are discarded this way.
    #[instrument(skip(self), fields(root = %self.root.display()))]
    pub async fn reset_dir(&self, name: &str) -> Result<(), StoreError> {
        match self.remove_dir(name).await {
            Ok(()) => debug!("work directory cleared"),
            Err(e) if e.is_not_found() => {}
            Err(e) => return Err(e),
        }
        self.create_dir(name).await
    }
}

#[async_trait]
impl FileStore for LocalFileStore {
    async fn create_dir(&self, name: &str) -> Result<(), StoreError> {
        let path = self.resolve(name)?;
        fs::create_dir_all(&path)
            .await
            .map_err(|e| StoreError::io(path, e))
    }

    async fn create_file(&self, name: &str) -> Result<Box<dyn SequentialWriter>, StoreError> {
        let path = self.resolve(name)?;
        let file = File::create(&path)
            .await
            .map_err(|e| StoreError::io(path.clone(), e))?;
        Ok(Box::new(LocalWriter {
            file: BufWriter::new(file),
            path,
            written: 0,
        }))
    }

    async fn read_file(&self, name: &str) -> Result<Bytes, StoreError> {
        let path = self.resolve(name)?;
        fs::read(&path)
            .await
            .map(Bytes::from)
            .map_err(|e| StoreError::io(path, e))
    }

    async fn open_reader(&self, name: &str) -> Result<StoreReader, StoreError> {
        let path = self.resolve(name)?;
        let file = File::open(&path)
            .await
            .map_err(|e| StoreError::io(path, e))?;
        Ok(Box::new(file))
    }

    async fn remove_file(&self, name: &str) -> Result<(), StoreError> {
        let path = self.resolve(name)?;
        fs::remove_file(&path)
            .await
            .map_err(|e| StoreError::io(path, e))
    }

    async fn remove_dir(&self, name: &str) -> Result<(), StoreError> {
        let path = self.resolve(name)?;
        fs::remove_dir_all(&path)
            .await
            .map_err(|e| StoreError::io(path, e))
    }
}

/// Buffered append-only writer over one local file.
struct LocalWriter {
    file: BufWriter<File>,
    path: PathBuf,
    written: u64,
}

#[async_trait]
impl SequentialWriter for LocalWriter {
    async fn write(&mut self, chunk: &[u8]) -> Result<(), StoreError> {
        self.file
            .write_all(chunk)
            .await
            .map_err(|e| StoreError::io(self.path.clone(), e))?;
        self.written += chunk.len() as u64;
        Ok(())
    }

    async fn close(mut self: Box<Self>) -> Result<u64, StoreError> {
        self.file
            .flush()
            .await
            .map_err(|e| StoreError::io(self.path.clone(), e))?;
        self.file
            .get_mut()
            .sync_all()
            .await
            .map_err(|e| StoreError::io(self.path.clone(), e))?;
        debug!(path = %self.path.display(), bytes = self.written, "writer closed");
        Ok(self.written)
    }

    fn written(&self) -> u64 {
        self.written
    }
}
