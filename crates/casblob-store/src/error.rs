use casblob_types::TypeError;

/// Errors from blob store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The writer was destroyed, finalized, or failed earlier.
    #[error("stream destroyed")]
    Destroyed,

    /// The backend has no object at the given key.
    #[error("object not found: {0}")]
    NotFound(String),

    /// The key cannot be mapped onto the backend namespace.
    #[error("invalid key: {0}")]
    InvalidKey(String),

    /// A backend operation failed.
    #[error("backend {op} failed for {key}: {source}")]
    Backend {
        op: &'static str,
        key: String,
        #[source]
        source: std::io::Error,
    },

    /// I/O error outside of a keyed backend operation.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid or unreadable store configuration.
    #[error("configuration error: {0}")]
    Config(String),

    /// Malformed digest or algorithm name.
    #[error("type error: {0}")]
    Type(#[from] TypeError),
}

impl StoreError {
    /// Wrap an I/O error raised by `op` on `key`.
    pub fn backend(op: &'static str, key: &str, source: std::io::Error) -> Self {
        Self::Backend {
            op,
            key: key.to_string(),
            source,
        }
    }

    /// Returns `true` for not-found conditions passed through from a backend.
    pub fn is_not_found(&self) -> bool {
        match self {
            Self::NotFound(_) => true,
            Self::Backend { source, .. } | Self::Io(source) => {
                source.kind() == std::io::ErrorKind::NotFound
            }
            _ => false,
        }
    }
}

/// Result alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;
