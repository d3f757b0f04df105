use tokio::sync::OnceCell;
use tracing::info;

use crate::error::StoreResult;
use crate::path;
use crate::traits::Backend;

/// The staging namespace (`prefix/tmp`), prepared at most once.
///
/// Concurrent first callers share a single in-flight preparation; later
/// callers get the memoized root without touching the backend. A failed
/// preparation is not memoized and is retried by the next caller.
#[derive(Debug)]
pub(crate) struct TempNamespace {
    root: String,
    ready: OnceCell<()>,
}

impl TempNamespace {
    pub(crate) fn new(prefix: &str) -> Self {
        Self {
            root: path::temp_root(prefix),
            ready: OnceCell::new(),
        }
    }

    /// The staging root key, whether or not it has been prepared yet.
    pub(crate) fn root(&self) -> &str {
        &self.root
    }

    pub(crate) fn is_ready(&self) -> bool {
        self.ready.initialized()
    }

    /// Prepare the namespace on first use and return its root key.
    pub(crate) async fn resolve(&self, backend: &dyn Backend) -> StoreResult<&str> {
        self.ready
            .get_or_try_init(|| async {
                backend.prepare_namespace(&self.root).await?;
                info!(root = %self.root, "staging namespace ready");
                Ok::<(), crate::error::StoreError>(())
            })
            .await?;
        Ok(&self.root)
    }
}
