use std::io::{ErrorKind, SeekFrom};
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs;
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tracing::debug;

use crate::error::{StoreError, StoreResult};
use crate::traits::{Backend, BackendWriter, BlobReader, ReadOptions};

/// Filesystem backend rooted at a local directory.
///
/// Each `/`-separated key segment becomes a path component below the root.
/// Keys containing `.`/`..` segments or absolute paths are rejected so no
/// key can address anything outside the root.
#[derive(Clone, Debug)]
pub struct LocalBackend {
    root: PathBuf,
}

impl LocalBackend {
    /// Create a backend rooted at `root`. The directory is created lazily.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// The root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Map a key onto a path below the root.
    pub fn path_for(&self, key: &str) -> StoreResult<PathBuf> {
        if key.starts_with('/') || key.contains('\\') {
            return Err(StoreError::InvalidKey(key.to_string()));
        }
        let mut path = self.root.clone();
        let mut segments = 0;
        for segment in key.split('/').filter(|s| !s.is_empty()) {
            if segment == "." || segment == ".." {
                return Err(StoreError::InvalidKey(key.to_string()));
            }
            path.push(segment);
            segments += 1;
        }
        if segments == 0 {
            return Err(StoreError::InvalidKey(key.to_string()));
        }
        Ok(path)
    }

    async fn ensure_parent(&self, path: &Path, key: &str) -> StoreResult<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| StoreError::backend("mkdir", key, e))?;
        }
        Ok(())
    }
}

fn not_found_or(op: &'static str, key: &str, err: std::io::Error) -> StoreError {
    if err.kind() == ErrorKind::NotFound {
        StoreError::NotFound(key.to_string())
    } else {
        StoreError::backend(op, key, err)
    }
}

#[async_trait]
impl Backend for LocalBackend {
    async fn create_write_stream(&self, key: &str) -> StoreResult<BackendWriter> {
        let path = self.path_for(key)?;
        self.ensure_parent(&path, key).await?;
        let file = fs::File::create(&path)
            .await
            .map_err(|e| StoreError::backend("create", key, e))?;
        debug!(path = %path.display(), "opened local write stream");
        Ok(Box::pin(file))
    }

    async fn create_read_stream(&self, key: &str, options: &ReadOptions) -> StoreResult<BlobReader> {
        let path = self.path_for(key)?;
        let mut file = fs::File::open(&path)
            .await
            .map_err(|e| not_found_or("open", key, e))?;
        if options.offset > 0 {
            file.seek(SeekFrom::Start(options.offset))
                .await
                .map_err(|e| StoreError::backend("seek", key, e))?;
        }
        match options.length {
            Some(len) => Ok(Box::pin(file.take(len))),
            None => Ok(Box::pin(file)),
        }
    }

    async fn rename(&self, from: &str, to: &str) -> StoreResult<()> {
        let src = self.path_for(from)?;
        let dst = self.path_for(to)?;
        self.ensure_parent(&dst, to).await?;
        fs::rename(&src, &dst)
            .await
            .map_err(|e| not_found_or("rename", from, e))?;
        debug!(from = %src.display(), to = %dst.display(), "renamed local object");
        Ok(())
    }

    async fn exists(&self, key: &str) -> StoreResult<bool> {
        let path = self.path_for(key)?;
        match fs::metadata(&path).await {
            Ok(meta) => Ok(meta.is_file()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(StoreError::backend("stat", key, e)),
        }
    }

    async fn remove(&self, key: &str) -> StoreResult<()> {
        let path = self.path_for(key)?;
        fs::remove_file(&path)
            .await
            .map_err(|e| not_found_or("remove", key, e))
    }

    async fn prepare_namespace(&self, key: &str) -> StoreResult<()> {
        let path = self.path_for(key)?;
        fs::create_dir_all(&path)
            .await
            .map_err(|e| StoreError::backend("mkdir", key, e))
    }
}
