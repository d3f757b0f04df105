use std::pin::Pin;

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncWrite};

use crate::error::StoreResult;

/// Write half handed out by a backend. Closing it (`shutdown`) commits the object.
pub type BackendWriter = Pin<Box<dyn AsyncWrite + Send>>;

/// Read stream over a stored object.
pub type BlobReader = Pin<Box<dyn AsyncRead + Send>>;

/// Byte range of a read. The default reads the whole object.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ReadOptions {
    /// First byte to return.
    pub offset: u64,
    /// Maximum number of bytes to return; `None` reads to the end.
    pub length: Option<u64>,
}

impl ReadOptions {
    /// Read `length` bytes starting at `offset`.
    pub fn range(offset: u64, length: u64) -> Self {
        Self {
            offset,
            length: Some(length),
        }
    }

    /// Apply the range to an in-memory object, clamping to its bounds.
    pub fn slice<'a>(&self, data: &'a [u8]) -> &'a [u8] {
        let start = usize::try_from(self.offset).unwrap_or(usize::MAX).min(data.len());
        let end = match self.length {
            Some(len) => start.saturating_add(usize::try_from(len).unwrap_or(usize::MAX)),
            None => data.len(),
        };
        &data[start..end.min(data.len())]
    }
}

/// Key/value blob backend.
///
/// Keys are opaque `/`-separated strings. Implementations must satisfy:
/// - An object written through [`create_write_stream`](Self::create_write_stream)
///   becomes readable once the writer has been shut down.
/// - [`rename`](Self::rename) relocates an existing object; a missing source
///   is a not-found error.
/// - Not-found conditions are reported, never silently ignored.
#[async_trait]
pub trait Backend: Send + Sync {
    /// Open a write stream that will create (or replace) the object at `key`.
    async fn create_write_stream(&self, key: &str) -> StoreResult<BackendWriter>;

    /// Open a read stream over the object at `key`.
    async fn create_read_stream(&self, key: &str, options: &ReadOptions) -> StoreResult<BlobReader>;

    /// Move the object at `from` to `to`.
    async fn rename(&self, from: &str, to: &str) -> StoreResult<()>;

    /// Check whether an object exists at `key`.
    async fn exists(&self, key: &str) -> StoreResult<bool>;

    /// Delete the object at `key`.
    async fn remove(&self, key: &str) -> StoreResult<()>;

    /// Prepare a namespace root before objects are written under it.
    ///
    /// Object stores have no directories, so the default does nothing.
    async fn prepare_namespace(&self, _key: &str) -> StoreResult<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_reads_everything() {
        assert_eq!(ReadOptions::default().slice(b"hello"), b"hello");
    }

    #[test]
    fn range_is_clamped() {
        assert_eq!(ReadOptions::range(1, 3).slice(b"hello"), b"ell");
        assert_eq!(ReadOptions::range(3, 100).slice(b"hello"), b"lo");
        assert_eq!(ReadOptions::range(10, 2).slice(b"hello"), b"");
    }

    #[test]
    fn offset_without_length() {
        let options = ReadOptions {
            offset: 2,
            length: None,
        };
        assert_eq!(options.slice(b"hello"), b"llo");
    }
}
