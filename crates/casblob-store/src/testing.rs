//! Instrumented backend for unit tests.

use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::AsyncWrite;
use tokio::sync::Notify;

use crate::error::{StoreError, StoreResult};
use crate::memory::MemoryBackend;
use crate::traits::{Backend, BackendWriter, BlobReader, ReadOptions};

pub(crate) fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();
}

fn injected(what: &str) -> std::io::Error {
    std::io::Error::other(format!("injected {what} failure"))
}

/// Wraps a [`MemoryBackend`], counts calls and injects failures.
#[derive(Default)]
pub(crate) struct TestBackend {
    pub inner: MemoryBackend,
    pub prepare_calls: AtomicUsize,
    pub write_streams: AtomicUsize,
    pub renames: AtomicUsize,
    pub fail_prepare: AtomicBool,
    pub fail_write: AtomicBool,
    pub fail_close: AtomicBool,
    pub fail_rename: AtomicBool,
    /// Write streams accept one byte and then never make progress again.
    pub stall_write: AtomicBool,
    /// Number of `poll_write` calls parked by `stall_write`.
    pub stalled: Arc<AtomicUsize>,
    /// Backend write streams not yet dropped.
    pub open_streams: Arc<AtomicUsize>,
    pub prepare_delay: Option<Duration>,
    pub prepare_gate: Option<Arc<Notify>>,
    pub rename_gate: Option<Arc<Notify>>,
}

impl TestBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_prepare_delay(mut self, delay: Duration) -> Self {
        self.prepare_delay = Some(delay);
        self
    }

    pub fn with_prepare_gate(mut self, gate: Arc<Notify>) -> Self {
        self.prepare_gate = Some(gate);
        self
    }

    pub fn with_rename_gate(mut self, gate: Arc<Notify>) -> Self {
        self.rename_gate = Some(gate);
        self
    }

    pub fn count(counter: &AtomicUsize) -> usize {
        counter.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Backend for TestBackend {
    async fn create_write_stream(&self, key: &str) -> StoreResult<BackendWriter> {
        self.write_streams.fetch_add(1, Ordering::SeqCst);
        let inner = self.inner.create_write_stream(key).await?;
        self.open_streams.fetch_add(1, Ordering::SeqCst);
        Ok(Box::pin(FaultyWriter {
            inner,
            fail_write: self.fail_write.load(Ordering::SeqCst),
            fail_close: self.fail_close.load(Ordering::SeqCst),
            stall: self.stall_write.load(Ordering::SeqCst),
            accepted: 0,
            stalled: Arc::clone(&self.stalled),
            open_streams: Arc::clone(&self.open_streams),
        }))
    }

    async fn create_read_stream(&self, key: &str, options: &ReadOptions) -> StoreResult<BlobReader> {
        self.inner.create_read_stream(key, options).await
    }

    async fn rename(&self, from: &str, to: &str) -> StoreResult<()> {
        self.renames.fetch_add(1, Ordering::SeqCst);
        if let Some(gate) = &self.rename_gate {
            gate.notified().await;
        }
        if self.fail_rename.load(Ordering::SeqCst) {
            return Err(StoreError::backend("rename", from, injected("rename")));
        }
        self.inner.rename(from, to).await
    }

    async fn exists(&self, key: &str) -> StoreResult<bool> {
        self.inner.exists(key).await
    }

    async fn remove(&self, key: &str) -> StoreResult<()> {
        self.inner.remove(key).await
    }

    async fn prepare_namespace(&self, key: &str) -> StoreResult<()> {
        self.prepare_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.prepare_delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(gate) = &self.prepare_gate {
            gate.notified().await;
        }
        if self.fail_prepare.load(Ordering::SeqCst) {
            return Err(StoreError::backend("prepare", key, injected("prepare")));
        }
        Ok(())
    }
}

struct FaultyWriter {
    inner: BackendWriter,
    fail_write: bool,
    fail_close: bool,
    stall: bool,
    accepted: usize,
    stalled: Arc<AtomicUsize>,
    open_streams: Arc<AtomicUsize>,
}

impl Drop for FaultyWriter {
    fn drop(&mut self) {
        self.open_streams.fetch_sub(1, Ordering::SeqCst);
    }
}

impl AsyncWrite for FaultyWriter {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        data: &[u8],
    ) -> Poll<std::io::Result<usize>> {
        if self.fail_write {
            return Poll::Ready(Err(injected("write")));
        }
        if self.stall {
            if self.accepted > 0 {
                self.stalled.fetch_add(1, Ordering::SeqCst);
                return Poll::Pending;
            }
            let res = self.inner.as_mut().poll_write(cx, &data[..data.len().min(1)]);
            if let Poll::Ready(Ok(n)) = res {
                self.accepted += n;
            }
            return res;
        }
        self.inner.as_mut().poll_write(cx, data)
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        self.inner.as_mut().poll_flush(cx)
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        if self.fail_close {
            return Poll::Ready(Err(injected("close")));
        }
        self.inner.as_mut().poll_shutdown(cx)
    }
}
