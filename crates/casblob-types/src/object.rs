use std::fmt;

use serde::{Deserialize, Serialize};

use crate::algorithm::HashAlgorithm;
use crate::error::TypeError;

/// Content-addressed identifier for a stored blob.
///
/// A `Digest` is the lowercase hex encoding of a blob's hash. Identical
/// content hashed with the same algorithm always produces the same `Digest`,
/// and the digest is the only stable identity a blob has.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Digest(String);

impl Digest {
    /// Hex-encode a finished hash.
    pub fn from_bytes(hash: &[u8]) -> Self {
        Self(hex::encode(hash))
    }

    /// Parse a digest of any length from a lowercase hex string.
    pub fn parse(s: &str) -> Result<Self, TypeError> {
        if s.is_empty() || s.len() % 2 != 0 {
            return Err(TypeError::InvalidHex(format!("odd or empty length {}", s.len())));
        }
        if let Some(c) = s.chars().find(|c| !matches!(c, '0'..='9' | 'a'..='f')) {
            return Err(TypeError::InvalidHex(format!("unexpected character {c:?}")));
        }
        Ok(Self(s.to_string()))
    }

    /// Parse a digest and check its length against `algo`.
    pub fn for_algorithm(s: &str, algo: HashAlgorithm) -> Result<Self, TypeError> {
        let digest = Self::parse(s)?;
        if digest.0.len() != algo.hex_len() {
            return Err(TypeError::InvalidLength {
                expected: algo.hex_len(),
                actual: digest.0.len(),
            });
        }
        Ok(digest)
    }

    /// The full hex string.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Decoded hash bytes.
    pub fn to_bytes(&self) -> Vec<u8> {
        // Construction guarantees valid hex.
        hex::decode(&self.0).unwrap_or_default()
    }

    /// Short hex representation (first 8 characters).
    pub fn short_hex(&self) -> &str {
        &self.0[..self.0.len().min(8)]
    }

    /// Number of hex characters.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Always `false` for a constructed digest.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Digest({})", self.short_hex())
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Digest {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for Digest {
    type Error = TypeError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::parse(&s)
    }
}

impl From<Digest> for String {
    fn from(digest: Digest) -> Self {
        digest.0
    }
}

impl std::str::FromStr for Digest {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}
