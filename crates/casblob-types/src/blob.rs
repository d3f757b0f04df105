use std::fmt;

use serde::{Deserialize, Serialize};

use crate::object::Digest;

/// Completion record of a finished write.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BlobInfo {
    /// Digest of the stored content; also its retrieval key.
    pub digest: Digest,
    /// Number of payload bytes written.
    pub size: u64,
}

/// A reference to a stored blob, as accepted by read, exists and remove.
///
/// Both variants go through the same path derivation: a `Key` is an
/// unchecked string (typically a digest obtained elsewhere), a `Digest` is a
/// validated one.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BlobRef {
    Key(String),
    Digest(Digest),
}

impl BlobRef {
    /// The string handed to path derivation.
    pub fn as_str(&self) -> &str {
        match self {
            Self::Key(key) => key,
            Self::Digest(digest) => digest.as_str(),
        }
    }
}

impl fmt::Display for BlobRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<&str> for BlobRef {
    fn from(key: &str) -> Self {
        Self::Key(key.to_string())
    }
}

impl From<String> for BlobRef {
    fn from(key: String) -> Self {
        Self::Key(key)
    }
}

impl From<Digest> for BlobRef {
    fn from(digest: Digest) -> Self {
        Self::Digest(digest)
    }
}

impl From<&Digest> for BlobRef {
    fn from(digest: &Digest) -> Self {
        Self::Digest(digest.clone())
    }
}

impl From<&BlobInfo> for BlobRef {
    fn from(info: &BlobInfo) -> Self {
        Self::Digest(info.digest.clone())
    }
}
