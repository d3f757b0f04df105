use std::collections::HashMap;
use std::io::Cursor;
use std::pin::Pin;
use std::sync::{Arc, RwLock};
use std::task::{Context, Poll};

use async_trait::async_trait;
use tokio::io::AsyncWrite;

use crate::error::{StoreError, StoreResult};
use crate::traits::{Backend, BackendWriter, BlobReader, ReadOptions};

type ObjectMap = Arc<RwLock<HashMap<String, Arc<[u8]>>>>;

/// In-memory, HashMap-based backend.
///
/// Intended for tests and embedding. Cloning shares the same object map, so a
/// clone kept by the caller observes everything written through the store.
/// Like an object store, an object becomes visible only when its write stream
/// is shut down.
#[derive(Clone, Default)]
pub struct MemoryBackend {
    objects: ObjectMap,
}

impl MemoryBackend {
    /// Create a new empty backend.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of objects currently stored.
    pub fn len(&self) -> usize {
        self.objects.read().expect("lock poisoned").len()
    }

    /// Returns `true` if the backend is empty.
    pub fn is_empty(&self) -> bool {
        self.objects.read().expect("lock poisoned").is_empty()
    }

    /// Sorted list of all keys.
    pub fn keys(&self) -> Vec<String> {
        let map = self.objects.read().expect("lock poisoned");
        let mut keys: Vec<String> = map.keys().cloned().collect();
        keys.sort();
        keys
    }

    /// Copy of the object at `key`, if any.
    pub fn get(&self, key: &str) -> Option<Vec<u8>> {
        let map = self.objects.read().expect("lock poisoned");
        map.get(key).map(|data| data.to_vec())
    }

    /// Store an object directly, bypassing write streams.
    pub fn insert(&self, key: impl Into<String>, data: impl Into<Vec<u8>>) {
        let data: Vec<u8> = data.into();
        let data: Arc<[u8]> = data.into();
        self.objects
            .write()
            .expect("lock poisoned")
            .insert(key.into(), data);
    }
}

#[async_trait]
impl Backend for MemoryBackend {
    async fn create_write_stream(&self, key: &str) -> StoreResult<BackendWriter> {
        Ok(Box::pin(MemoryWriter {
            key: key.to_string(),
            buf: Vec::new(),
            objects: Arc::clone(&self.objects),
            closed: false,
        }))
    }

    async fn create_read_stream(&self, key: &str, options: &ReadOptions) -> StoreResult<BlobReader> {
        let map = self.objects.read().expect("lock poisoned");
        let data = map
            .get(key)
            .ok_or_else(|| StoreError::NotFound(key.to_string()))?;
        Ok(Box::pin(Cursor::new(options.slice(data).to_vec())))
    }

    async fn rename(&self, from: &str, to: &str) -> StoreResult<()> {
        let mut map = self.objects.write().expect("lock poisoned");
        let data = map
            .remove(from)
            .ok_or_else(|| StoreError::NotFound(from.to_string()))?;
        map.insert(to.to_string(), data);
        Ok(())
    }

    async fn exists(&self, key: &str) -> StoreResult<bool> {
        Ok(self.objects.read().expect("lock poisoned").contains_key(key))
    }

    async fn remove(&self, key: &str) -> StoreResult<()> {
        let mut map = self.objects.write().expect("lock poisoned");
        map.remove(key)
            .map(|_| ())
            .ok_or_else(|| StoreError::NotFound(key.to_string()))
    }
}

impl std::fmt::Debug for MemoryBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryBackend")
            .field("object_count", &self.len())
            .finish()
    }
}

/// Buffers writes and publishes the object on shutdown.
struct MemoryWriter {
    key: String,
    buf: Vec<u8>,
    objects: ObjectMap,
    closed: bool,
}

impl AsyncWrite for MemoryWriter {
    fn poll_write(
        mut self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        data: &[u8],
    ) -> Poll<std::io::Result<usize>> {
        if self.closed {
            return Poll::Ready(Err(std::io::ErrorKind::BrokenPipe.into()));
        }
        self.buf.extend_from_slice(data);
        Poll::Ready(Ok(data.len()))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        if self.closed {
            return Poll::Ready(Ok(()));
        }
        self.closed = true;
        let data: Arc<[u8]> = std::mem::take(&mut self.buf).into();
        let key = self.key.clone();
        self.objects
            .write()
            .map_err(|_| std::io::Error::other("lock poisoned"))?
            .insert(key, data);
        Poll::Ready(Ok(()))
    }
}
