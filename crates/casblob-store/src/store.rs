use std::sync::Arc;

use casblob_types::{BlobInfo, BlobRef, Digest, HashAlgorithm};
use tokio::io::{AsyncRead, AsyncReadExt};
use tracing::debug;

use crate::config::StoreConfig;
use crate::error::{StoreError, StoreResult};
use crate::namespace::TempNamespace;
use crate::path;
use crate::settle::SettlePolicy;
use crate::traits::{Backend, BlobReader, ReadOptions};
use crate::writer::{BlobWriter, CompletionCallback};

/// Chunk size used when copying from a reader into a writer.
const COPY_CHUNK: usize = 64 * 1024;

/// State shared by a store and every writer it creates.
pub(crate) struct StoreInner {
    pub(crate) backend: Arc<dyn Backend>,
    pub(crate) algo: HashAlgorithm,
    pub(crate) prefix: String,
    pub(crate) settle: SettlePolicy,
    pub(crate) temp: TempNamespace,
}

/// Content-addressed blob store over a [`Backend`].
///
/// Writes go through a [`BlobWriter`] that stages the payload and moves it to
/// `prefix/xx/yyyy...` once its digest is known. Reads, existence checks and
/// deletes derive the same key from a [`BlobRef`] and hand it to the backend
/// without any pre-validation, so not-found errors come straight from the
/// backend.
///
/// Cloning is cheap; clones share the backend and the staging namespace.
#[derive(Clone)]
pub struct BlobStore {
    inner: Arc<StoreInner>,
}

impl BlobStore {
    /// Create a store over an existing backend handle.
    ///
    /// `config.backend` is ignored; everything else applies.
    pub fn new(backend: Arc<dyn Backend>, config: StoreConfig) -> StoreResult<Self> {
        config.validate()?;
        let temp = TempNamespace::new(&config.prefix);
        debug!(prefix = %config.prefix, algo = %config.algo, temp_root = temp.root(), "blob store created");
        Ok(Self {
            inner: Arc::new(StoreInner {
                backend,
                algo: config.algo,
                prefix: config.prefix,
                settle: config.settle,
                temp,
            }),
        })
    }

    /// Create a store and the backend its configuration names.
    ///
    /// A bare path converts into a local-directory configuration:
    /// `BlobStore::open("/var/lib/blobs")`.
    pub fn open(config: impl Into<StoreConfig>) -> StoreResult<Self> {
        let config = config.into();
        let backend = config.backend.build();
        Self::new(backend, config)
    }

    /// Start a new staged write.
    pub fn create_write_stream(&self) -> BlobWriter {
        BlobWriter::new(Arc::clone(&self.inner), None)
    }

    /// Start a new staged write whose outcome is also reported to `on_complete`.
    ///
    /// The callback runs exactly once: with the [`BlobInfo`] after a
    /// successful finalize, or with the error that destroyed the writer
    /// (including [`StoreError::Destroyed`] when it is dropped unfinished).
    pub fn create_write_stream_with<F>(&self, on_complete: F) -> BlobWriter
    where
        F: FnOnce(Result<&BlobInfo, &StoreError>) + Send + 'static,
    {
        let callback: CompletionCallback = Box::new(on_complete);
        BlobWriter::new(Arc::clone(&self.inner), Some(callback))
    }

    /// Open a read stream over a stored blob.
    pub async fn create_read_stream(
        &self,
        blob: impl Into<BlobRef>,
        options: ReadOptions,
    ) -> StoreResult<BlobReader> {
        let key = self.key_for(blob);
        self.inner.backend.create_read_stream(&key, &options).await
    }

    /// Check whether a blob is stored.
    pub async fn exists(&self, blob: impl Into<BlobRef>) -> StoreResult<bool> {
        let key = self.key_for(blob);
        self.inner.backend.exists(&key).await
    }

    /// Delete a stored blob.
    pub async fn remove(&self, blob: impl Into<BlobRef>) -> StoreResult<()> {
        let key = self.key_for(blob);
        self.inner.backend.remove(&key).await?;
        debug!(key = %key, "blob removed");
        Ok(())
    }

    /// Store `data` in a single write.
    pub async fn put(&self, data: &[u8]) -> StoreResult<BlobInfo> {
        let mut writer = self.create_write_stream();
        writer.write(data).await?;
        writer.finalize().await
    }

    /// Store everything `reader` yields.
    pub async fn put_reader<R>(&self, mut reader: R) -> StoreResult<BlobInfo>
    where
        R: AsyncRead + Unpin + Send,
    {
        let mut writer = self.create_write_stream();
        let mut buf = vec![0u8; COPY_CHUNK];
        loop {
            let n = match reader.read(&mut buf).await {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) => {
                    writer.destroy(None);
                    return Err(StoreError::Io(e));
                }
            };
            writer.write(&buf[..n]).await?;
        }
        writer.finalize().await
    }

    /// Read a whole blob into memory.
    pub async fn get(&self, blob: impl Into<BlobRef>) -> StoreResult<Vec<u8>> {
        let key = self.key_for(blob);
        let mut reader = self
            .inner
            .backend
            .create_read_stream(&key, &ReadOptions::default())
            .await?;
        let mut out = Vec::new();
        reader
            .read_to_end(&mut out)
            .await
            .map_err(|e| StoreError::backend("read", &key, e))?;
        Ok(out)
    }

    /// Backend key a blob reference resolves to.
    pub fn key_for(&self, blob: impl Into<BlobRef>) -> String {
        path::derive_key(&self.inner.prefix, Some(blob.into().as_str()))
    }

    /// Parse caller-supplied hex as a digest of this store's algorithm.
    pub fn parse_digest(&self, hex: &str) -> StoreResult<Digest> {
        Ok(Digest::for_algorithm(hex, self.inner.algo)?)
    }

    /// Root key of the staging namespace.
    pub fn temp_root(&self) -> &str {
        self.inner.temp.root()
    }

    pub fn algorithm(&self) -> HashAlgorithm {
        self.inner.algo
    }

    pub fn prefix(&self) -> &str {
        &self.inner.prefix
    }

    pub fn settle_policy(&self) -> &SettlePolicy {
        &self.inner.settle
    }

    /// The backend handle shared by this store.
    pub fn backend(&self) -> &Arc<dyn Backend> {
        &self.inner.backend
    }
}

impl std::fmt::Debug for BlobStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BlobStore")
            .field("prefix", &self.inner.prefix)
            .field("algo", &self.inner.algo)
            .field("settle", &self.inner.settle)
            .field("temp_ready", &self.inner.temp.is_ready())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryBackend;
    use crate::testing::{init_tracing, TestBackend};
    use casblob_types::{Digest, TypeError};
    use std::time::Duration;

    const HELLO_SHA256: &str = "a948904f2f0f479b8f8197694b30184b0d2ed1c1cd2a1ec0fb85d299a192a447";

    fn memory_store() -> (BlobStore, MemoryBackend) {
        init_tracing();
        let backend = MemoryBackend::new();
        let config = StoreConfig::default().with_settle(SettlePolicy::None);
        let store = BlobStore::new(Arc::new(backend.clone()), config).unwrap();
        (store, backend)
    }

    async fn read_all(mut reader: BlobReader) -> Vec<u8> {
        let mut out = Vec::new();
        reader.read_to_end(&mut out).await.unwrap();
        out
    }

    #[tokio::test]
    async fn write_then_read_by_digest() {
        let (store, _backend) = memory_store();
        let mut w = store.create_write_stream();
        w.write(b"hello ").await.unwrap();
        w.write(b"world\n").await.unwrap();
        let info = w.finalize().await.unwrap();
        assert_eq!(info.size, 12);
        assert_eq!(info.digest.as_str(), HELLO_SHA256);

        let reader = store
            .create_read_stream(&info.digest, ReadOptions::default())
            .await
            .unwrap();
        assert_eq!(read_all(reader).await, b"hello world\n");
        // A plain string key resolves the same way.
        assert_eq!(store.get(HELLO_SHA256).await.unwrap(), b"hello world\n");
    }

    #[tokio::test]
    async fn same_bytes_same_digest_and_key() {
        let (store, backend) = memory_store();
        let a = store.put(b"repeatable").await.unwrap();
        let b = store.put(b"repeatable").await.unwrap();
        assert_eq!(a, b);
        assert_eq!(store.key_for(&a), store.key_for(&b));
        assert_eq!(backend.len(), 1);
    }

    #[tokio::test]
    async fn range_read_is_forwarded() {
        let (store, _backend) = memory_store();
        let info = store.put(b"hello world\n").await.unwrap();
        let reader = store
            .create_read_stream(&info, ReadOptions::range(6, 5))
            .await
            .unwrap();
        assert_eq!(read_all(reader).await, b"world");
    }

    #[tokio::test]
    async fn exists_and_remove_use_derived_key() {
        let (store, backend) = memory_store();
        let info = store.put(b"to be removed").await.unwrap();
        assert!(store.exists(&info).await.unwrap());
        assert!(backend.get(&store.key_for(&info)).is_some());

        store.remove(&info).await.unwrap();
        assert!(!store.exists(&info).await.unwrap());
        assert!(store.remove(&info).await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn missing_blob_read_fails_without_precheck() {
        let (store, _backend) = memory_store();
        let digest = Digest::parse(HELLO_SHA256).unwrap();
        let err = store
            .create_read_stream(&digest, ReadOptions::default())
            .await
            .err()
            .unwrap();
        assert!(err.is_not_found());
        assert!(!store.exists(&digest).await.unwrap());
    }

    #[tokio::test]
    async fn key_layout() {
        let (store, _backend) = memory_store();
        assert_eq!(store.temp_root(), "blobs/tmp");
        assert_eq!(
            store.key_for(HELLO_SHA256),
            format!("blobs/a9/{}", &HELLO_SHA256[2..])
        );
    }

    #[tokio::test]
    async fn custom_prefix() {
        init_tracing();
        let backend = MemoryBackend::new();
        let config = StoreConfig::default()
            .with_prefix("cas/objects")
            .with_settle(SettlePolicy::None);
        let store = BlobStore::new(Arc::new(backend.clone()), config).unwrap();
        let info = store.put(b"hello world\n").await.unwrap();
        assert_eq!(
            backend.keys(),
            vec![format!("cas/objects/a9/{}", &info.digest.as_str()[2..])]
        );
    }

    #[tokio::test]
    async fn parse_digest_checks_store_algorithm() {
        let (store, _backend) = memory_store();
        let digest = store.parse_digest(HELLO_SHA256).unwrap();
        assert!(store.get(&digest).await.unwrap_err().is_not_found());

        assert!(matches!(
            store.parse_digest(&HELLO_SHA256[..40]),
            Err(StoreError::Type(TypeError::InvalidLength { expected: 64, actual: 40 }))
        ));
        assert!(matches!(
            store.parse_digest("not-hex"),
            Err(StoreError::Type(_))
        ));
    }

    #[test]
    fn empty_prefix_is_rejected() {
        let config = StoreConfig::default().with_prefix("");
        let err = BlobStore::new(Arc::new(MemoryBackend::new()), config).unwrap_err();
        assert!(matches!(err, StoreError::Config(_)));
    }

    #[tokio::test]
    async fn put_reader_streams_in_chunks() {
        let (store, _backend) = memory_store();
        let data: Vec<u8> = (0..200_000u32).map(|i| (i % 251) as u8).collect();
        let info = store.put_reader(&data[..]).await.unwrap();
        assert_eq!(info.size, data.len() as u64);
        assert_eq!(info.digest, casblob_crypto::hash(HashAlgorithm::Sha256, &data));
        assert_eq!(store.get(&info).await.unwrap(), data);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_writers_do_not_interfere() {
        init_tracing();
        let backend = Arc::new(TestBackend::new().with_prepare_delay(Duration::from_millis(30)));
        let config = StoreConfig::default().with_settle(SettlePolicy::None);
        let store = BlobStore::new(backend.clone(), config).unwrap();

        let tasks: Vec<_> = (0..8u8)
            .map(|i| {
                let store = store.clone();
                tokio::spawn(async move {
                    let payload = vec![i; 1000 + i as usize];
                    let mut w = store.create_write_stream();
                    for chunk in payload.chunks(100) {
                        w.write(chunk).await.unwrap();
                        tokio::task::yield_now().await;
                    }
                    (payload, w.finalize().await.unwrap())
                })
            })
            .collect();

        for task in tasks {
            let (payload, info) = task.await.unwrap();
            assert_eq!(info.digest, casblob_crypto::hash(HashAlgorithm::Sha256, &payload));
            assert_eq!(info.size, payload.len() as u64);
            assert_eq!(store.get(&info).await.unwrap(), payload);
        }
        assert_eq!(TestBackend::count(&backend.prepare_calls), 1);
        assert_eq!(TestBackend::count(&backend.write_streams), 8);
        assert_eq!(backend.inner.len(), 8);
    }

    #[tokio::test]
    async fn local_store_from_bare_path() {
        init_tracing();
        let dir = tempfile::tempdir().unwrap();
        let config = StoreConfig::from(dir.path()).with_settle(SettlePolicy::None);
        let store = BlobStore::open(config).unwrap();

        let info = store.put(b"hello world\n").await.unwrap();
        assert_eq!(info.digest.as_str(), HELLO_SHA256);
        let on_disk = dir.path().join("blobs").join("a9").join(&HELLO_SHA256[2..]);
        assert_eq!(std::fs::read(on_disk).unwrap(), b"hello world\n");
        assert!(dir.path().join("blobs/tmp").is_dir());
        assert_eq!(std::fs::read_dir(dir.path().join("blobs/tmp")).unwrap().count(), 0);
    }

    #[test]
    fn open_defaults_to_memory() {
        let store = BlobStore::open(StoreConfig::default()).unwrap();
        assert_eq!(store.prefix(), "blobs");
        assert_eq!(store.algorithm(), HashAlgorithm::Sha256);
        assert_eq!(store.settle_policy(), &SettlePolicy::Delay { millis: 1000 });
    }

    mod props {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #![proptest_config(ProptestConfig::with_cases(64))]

            #[test]
            fn round_trip(chunks in proptest::collection::vec(
                proptest::collection::vec(any::<u8>(), 0..300), 0..8)
            ) {
                let rt = tokio::runtime::Builder::new_current_thread()
                    .enable_all()
                    .build()
                    .unwrap();
                let (info, read_back) = rt.block_on(async {
                    let (store, _backend) = memory_store();
                    let mut w = store.create_write_stream();
                    for chunk in &chunks {
                        w.write(chunk).await.unwrap();
                    }
                    let info = w.finalize().await.unwrap();
                    let read_back = store.get(&info).await.unwrap();
                    (info, read_back)
                });
                let expected: Vec<u8> = chunks.concat();
                prop_assert_eq!(info.size, expected.len() as u64);
                prop_assert_eq!(read_back, expected);
            }
        }
    }
}
