//! Staged, content-addressed writes.
//!
//! A [`BlobWriter`] streams payload into a fresh key under the staging
//! namespace while hashing it. [`BlobWriter::finalize`] closes the staged
//! object, fixes the digest, waits out the settle policy and moves the object
//! to `prefix/xx/yyyy...`. Nothing is ever written to a permanent key
//! directly.
//!
//! ```text
//! Uninitialized --write/finalize--> Active --finalize--> Finalizing --move ok--> Finalized
//!        \                            |                      |
//!         +------------- error / destroy -------------------+--> Destroyed
//! ```
//!
//! Once the move has been issued the write is committing: a destroy from a
//! [`DestroyHandle`] no longer has any effect and the move's outcome is what
//! gets reported.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex};

use casblob_crypto::DigestAccumulator;
use casblob_types::{BlobInfo, Digest};
use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::{StoreError, StoreResult};
use crate::path;
use crate::store::StoreInner;
use crate::traits::BackendWriter;

/// Observer notified exactly once with the outcome of a write.
pub type CompletionCallback = Box<dyn FnOnce(Result<&BlobInfo, &StoreError>) + Send + 'static>;

/// Writer-local part of an open staging session. The backend stream itself
/// lives in [`Shared`] so a destroy from another task can release it.
struct Session {
    temp_key: String,
    hasher: DigestAccumulator,
    size: u64,
}

enum WriterState {
    Uninitialized,
    Active(Session),
    Finalizing { digest: Digest, size: u64 },
    Finalized(BlobInfo),
    Destroyed,
}

impl WriterState {
    fn name(&self) -> &'static str {
        match self {
            Self::Uninitialized => "uninitialized",
            Self::Active(_) => "active",
            Self::Finalizing { .. } => "finalizing",
            Self::Finalized(_) => "finalized",
            Self::Destroyed => "destroyed",
        }
    }
}

const PHASE_OPEN: u8 = 0;
const PHASE_COMMITTING: u8 = 1;
const PHASE_DESTROYED: u8 = 2;

/// State shared between a writer and its [`DestroyHandle`]s.
struct Shared {
    phase: AtomicU8,
    cancel: CancellationToken,
    stream: Mutex<Option<BackendWriter>>,
    completion: Mutex<Option<CompletionCallback>>,
}

impl Shared {
    fn new(completion: Option<CompletionCallback>) -> Self {
        Self {
            phase: AtomicU8::new(PHASE_OPEN),
            cancel: CancellationToken::new(),
            stream: Mutex::new(None),
            completion: Mutex::new(completion),
        }
    }

    fn is_destroyed(&self) -> bool {
        self.phase.load(Ordering::SeqCst) == PHASE_DESTROYED
    }

    /// Enter the committing phase; fails if the writer was destroyed first.
    fn begin_commit(&self) -> bool {
        self.phase
            .compare_exchange(PHASE_OPEN, PHASE_COMMITTING, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    fn take_stream(&self) -> Option<BackendWriter> {
        self.stream.lock().expect("lock poisoned").take()
    }

    fn put_stream(&self, stream: BackendWriter) {
        *self.stream.lock().expect("lock poisoned") = Some(stream);
    }

    fn release_stream(&self) {
        drop(self.take_stream());
    }

    fn complete(&self, outcome: Result<&BlobInfo, &StoreError>) {
        let callback = self.completion.lock().expect("lock poisoned").take();
        if let Some(callback) = callback {
            callback(outcome);
        }
    }

    fn tear_down(&self, err: &StoreError) {
        self.cancel.cancel();
        self.release_stream();
        self.complete(Err(err));
    }

    /// Destroy on request. A no-op once destroyed or committing.
    fn destroy(&self, err: Option<StoreError>) {
        if !self.begin_destroy() {
            return;
        }
        match &err {
            Some(e) => warn!(error = %e, "blob writer destroyed"),
            None => debug!("blob writer destroyed"),
        }
        self.tear_down(&err.unwrap_or(StoreError::Destroyed));
    }

    fn begin_destroy(&self) -> bool {
        self.phase
            .compare_exchange(PHASE_OPEN, PHASE_DESTROYED, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    /// Destroy after a failure, including a failed move; returns `false` if
    /// the writer was already destroyed.
    fn abort(&self, err: &StoreError) -> bool {
        if self.phase.swap(PHASE_DESTROYED, Ordering::SeqCst) == PHASE_DESTROYED {
            return false;
        }
        self.tear_down(err);
        true
    }
}

/// Cloneable handle that destroys a [`BlobWriter`] from another task.
///
/// A write or finalize in progress on the writer fails with
/// [`StoreError::Destroyed`]; so does every later call. The backend stream is
/// released right away. A move that has already been issued to the backend is
/// not interrupted, and destroying after that point does nothing.
#[derive(Clone)]
pub struct DestroyHandle {
    shared: Arc<Shared>,
}

impl DestroyHandle {
    /// Destroy the writer, reporting `err` (or "stream destroyed") to its
    /// completion callback. Destroying twice is a no-op.
    pub fn destroy(&self, err: Option<StoreError>) {
        self.shared.destroy(err);
    }

    pub fn is_destroyed(&self) -> bool {
        self.shared.is_destroyed()
    }
}

impl std::fmt::Debug for DestroyHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DestroyHandle")
            .field("destroyed", &self.is_destroyed())
            .finish()
    }
}

/// Streaming writer that stores its payload under the payload's digest.
///
/// Chunks are processed strictly in order: `write` takes `&mut self` and
/// returns only after the backend has accepted the chunk. Dropping a `write`
/// or `finalize` future before it completes destroys the writer. Create one
/// through [`BlobStore::create_write_stream`](crate::BlobStore::create_write_stream).
pub struct BlobWriter {
    ctx: Arc<StoreInner>,
    state: WriterState,
    shared: Arc<Shared>,
}

impl BlobWriter {
    pub(crate) fn new(ctx: Arc<StoreInner>, completion: Option<CompletionCallback>) -> Self {
        Self {
            ctx,
            state: WriterState::Uninitialized,
            shared: Arc::new(Shared::new(completion)),
        }
    }

    /// Write the next chunk of payload.
    ///
    /// The first call opens the staging session. An empty chunk is valid
    /// payload of length zero.
    pub async fn write(&mut self, chunk: &[u8]) -> StoreResult<()> {
        self.ensure_session().await?;
        // The session stays out of `self.state` until the backend has taken
        // the whole chunk, so a write dropped halfway leaves `Destroyed`.
        let mut session = match std::mem::replace(&mut self.state, WriterState::Destroyed) {
            WriterState::Active(session) => session,
            other => {
                self.state = other;
                return Err(StoreError::Destroyed);
            }
        };
        let Some(mut stream) = self.shared.take_stream() else {
            return Err(self.fail(StoreError::Destroyed));
        };

        let written = tokio::select! {
            biased;
            _ = self.shared.cancel.cancelled() => Err(StoreError::Destroyed),
            res = stream.write_all(chunk) => {
                res.map_err(|e| StoreError::backend("write", &session.temp_key, e))
            }
        };
        if let Err(e) = written {
            drop(stream);
            return Err(self.fail(e));
        }

        session.hasher.update(chunk);
        session.size += chunk.len() as u64;
        debug!(key = %session.temp_key, len = chunk.len(), total = session.size, "chunk staged");

        self.shared.put_stream(stream);
        if self.shared.is_destroyed() {
            self.shared.release_stream();
            return Err(StoreError::Destroyed);
        }
        self.state = WriterState::Active(session);
        Ok(())
    }

    /// Finish the write: close the staged object, compute the digest and move
    /// the object to its content-addressed key.
    ///
    /// Finalizing without any prior write stores the empty blob. On a move
    /// failure the staged object is left where it is.
    pub async fn finalize(&mut self) -> StoreResult<BlobInfo> {
        self.ensure_session().await?;
        let session = match std::mem::replace(&mut self.state, WriterState::Destroyed) {
            WriterState::Active(session) => session,
            other => {
                self.state = other;
                return Err(StoreError::Destroyed);
            }
        };
        let Session {
            temp_key,
            hasher,
            size,
        } = session;
        let Some(mut stream) = self.shared.take_stream() else {
            return Err(self.fail(StoreError::Destroyed));
        };

        let closed = tokio::select! {
            biased;
            _ = self.shared.cancel.cancelled() => Err(StoreError::Destroyed),
            res = stream.shutdown() => res.map_err(|e| StoreError::backend("close", &temp_key, e)),
        };
        drop(stream);
        if let Err(e) = closed {
            return Err(self.fail(e));
        }

        let digest = hasher.finalize();
        debug!(key = %temp_key, %digest, size, "staged object closed");
        self.state = WriterState::Finalizing {
            digest: digest.clone(),
            size,
        };

        let ctx = Arc::clone(&self.ctx);
        let settled = tokio::select! {
            biased;
            _ = self.shared.cancel.cancelled() => false,
            _ = ctx.settle.wait(ctx.backend.as_ref(), &temp_key) => true,
        };
        if !settled || !self.shared.begin_commit() {
            return Err(self.fail(StoreError::Destroyed));
        }

        let target = path::derive_key(&ctx.prefix, Some(digest.as_str()));
        debug!(from = %temp_key, to = %target, "moving staged object");
        if let Err(e) = ctx.backend.rename(&temp_key, &target).await {
            return Err(self.fail(e));
        }

        let info = BlobInfo { digest, size };
        info!(digest = %info.digest, size, key = %target, "blob stored");
        self.state = WriterState::Finalized(info.clone());
        self.shared.complete(Ok(&info));
        Ok(info)
    }

    /// Destroy the writer, releasing its backend stream.
    ///
    /// `err` is reported to the completion callback; without one the callback
    /// sees "stream destroyed". Destroying twice is a no-op.
    pub fn destroy(&mut self, err: Option<StoreError>) {
        if !matches!(self.state, WriterState::Finalized(_)) {
            self.state = WriterState::Destroyed;
        }
        self.shared.destroy(err);
    }

    /// A handle that can destroy this writer from another task.
    pub fn destroy_handle(&self) -> DestroyHandle {
        DestroyHandle {
            shared: Arc::clone(&self.shared),
        }
    }

    /// The digest, once finalize has computed it.
    pub fn digest(&self) -> Option<&Digest> {
        match &self.state {
            WriterState::Finalizing { digest, .. } => Some(digest),
            WriterState::Finalized(info) => Some(&info.digest),
            _ => None,
        }
    }

    /// Payload bytes accepted so far.
    pub fn size(&self) -> u64 {
        match &self.state {
            WriterState::Active(session) => session.size,
            WriterState::Finalizing { size, .. } => *size,
            WriterState::Finalized(info) => info.size,
            WriterState::Uninitialized | WriterState::Destroyed => 0,
        }
    }

    /// The staging key of an open session.
    pub fn temp_key(&self) -> Option<&str> {
        match &self.state {
            WriterState::Active(session) => Some(&session.temp_key),
            _ => None,
        }
    }

    pub fn is_destroyed(&self) -> bool {
        matches!(self.state, WriterState::Destroyed) || self.shared.is_destroyed()
    }

    pub fn is_finalized(&self) -> bool {
        matches!(self.state, WriterState::Finalized(_))
    }

    /// Open the staging session if this is the first operation, and reject
    /// anything on a writer that can no longer accept payload.
    async fn ensure_session(&mut self) -> StoreResult<()> {
        if self.shared.is_destroyed() {
            self.state = WriterState::Destroyed;
            return Err(StoreError::Destroyed);
        }
        match self.state {
            WriterState::Active(_) => return Ok(()),
            WriterState::Uninitialized => {}
            WriterState::Finalized(_) => return Err(StoreError::Destroyed),
            // Left behind by a write or finalize that was dropped midway.
            WriterState::Finalizing { .. } | WriterState::Destroyed => {
                return Err(self.fail(StoreError::Destroyed));
            }
        }

        let ctx = Arc::clone(&self.ctx);
        let root = match ctx.temp.resolve(ctx.backend.as_ref()).await {
            Ok(root) => root,
            Err(e) => return Err(self.fail(e)),
        };
        // Destroyed while the namespace was being prepared.
        if self.shared.is_destroyed() {
            self.state = WriterState::Destroyed;
            return Err(StoreError::Destroyed);
        }

        let temp_key = path::temp_key(root);
        let stream = match ctx.backend.create_write_stream(&temp_key).await {
            Ok(stream) => stream,
            Err(e) => return Err(self.fail(e)),
        };
        self.shared.put_stream(stream);
        if self.shared.is_destroyed() {
            self.shared.release_stream();
            self.state = WriterState::Destroyed;
            return Err(StoreError::Destroyed);
        }

        debug!(key = %temp_key, algo = %ctx.algo, "staging session opened");
        self.state = WriterState::Active(Session {
            temp_key,
            hasher: DigestAccumulator::new(ctx.algo),
            size: 0,
        });
        Ok(())
    }

    /// Tear down after an error and report it to the completion callback.
    fn fail(&mut self, err: StoreError) -> StoreError {
        self.state = WriterState::Destroyed;
        if self.shared.abort(&err) {
            warn!(error = %err, "blob write failed");
        }
        err
    }
}

impl Drop for BlobWriter {
    fn drop(&mut self) {
        if !matches!(self.state, WriterState::Finalized(_)) && self.shared.abort(&StoreError::Destroyed) {
            debug!(state = self.state.name(), "unfinished blob writer dropped");
        }
    }
}

impl std::fmt::Debug for BlobWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BlobWriter")
            .field("state", &self.state.name())
            .field("size", &self.size())
            .field("digest", &self.digest())
            .finish()
    }
}
