use std::path::{Path, PathBuf};
use std::sync::Arc;

use casblob_types::HashAlgorithm;
use serde::{Deserialize, Serialize};

use crate::error::{StoreError, StoreResult};
use crate::local::LocalBackend;
use crate::memory::MemoryBackend;
use crate::settle::SettlePolicy;
use crate::traits::Backend;

/// Default namespace prefix.
pub const DEFAULT_PREFIX: &str = "blobs";

/// Which built-in backend a store runs on.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BackendConfig {
    /// Process-local [`MemoryBackend`].
    #[default]
    Memory,
    /// [`LocalBackend`] rooted at a directory.
    Local { root: PathBuf },
}

impl BackendConfig {
    /// Instantiate the backend.
    pub fn build(&self) -> Arc<dyn Backend> {
        match self {
            Self::Memory => Arc::new(MemoryBackend::new()),
            Self::Local { root } => Arc::new(LocalBackend::new(root.clone())),
        }
    }
}

/// Blob store configuration.
///
/// ```toml
/// algo = "sha256"
/// prefix = "blobs"
///
/// [backend]
/// type = "local"
/// root = "/var/lib/casblob"
///
/// [settle]
/// mode = "delay"
/// millis = 1000
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub algo: HashAlgorithm,
    pub prefix: String,
    pub backend: BackendConfig,
    pub settle: SettlePolicy,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            algo: HashAlgorithm::default(),
            prefix: DEFAULT_PREFIX.to_string(),
            backend: BackendConfig::default(),
            settle: SettlePolicy::default(),
        }
    }
}

impl StoreConfig {
    /// Local-directory store with default settings.
    pub fn local(root: impl Into<PathBuf>) -> Self {
        Self {
            backend: BackendConfig::Local { root: root.into() },
            ..Self::default()
        }
    }

    pub fn with_algo(mut self, algo: HashAlgorithm) -> Self {
        self.algo = algo;
        self
    }

    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    pub fn with_settle(mut self, settle: SettlePolicy) -> Self {
        self.settle = settle;
        self
    }

    /// Parse a TOML document. Missing fields take their defaults.
    pub fn from_toml_str(s: &str) -> StoreResult<Self> {
        let config: Self = toml::from_str(s).map_err(|e| StoreError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Read and parse a TOML file.
    pub fn load(path: &Path) -> StoreResult<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            StoreError::Config(format!("cannot read {}: {e}", path.display()))
        })?;
        Self::from_toml_str(&text)
    }

    /// Check invariants the store relies on.
    pub fn validate(&self) -> StoreResult<()> {
        if self.prefix.trim_matches('/').is_empty() {
            return Err(StoreError::Config("prefix must not be empty".into()));
        }
        Ok(())
    }
}

/// A bare string is shorthand for a local directory.
impl From<&str> for StoreConfig {
    fn from(root: &str) -> Self {
        Self::local(root)
    }
}

impl From<PathBuf> for StoreConfig {
    fn from(root: PathBuf) -> Self {
        Self::local(root)
    }
}

impl From<&Path> for StoreConfig {
    fn from(root: &Path) -> Self {
        Self::local(root)
    }
}
