use casblob_types::{Digest, HashAlgorithm};
use sha2::Digest as _;

enum Inner {
    Sha256(sha2::Sha256),
    Sha512(sha2::Sha512),
    Blake3(Box<blake3::Hasher>),
}

/// Incremental content hasher.
///
/// Bytes are absorbed in order with [`update`](Self::update); the digest is
/// produced once by [`finalize`](Self::finalize), which consumes the
/// accumulator so nothing can be fed to it afterwards.
pub struct DigestAccumulator {
    algo: HashAlgorithm,
    inner: Inner,
    bytes_hashed: u64,
}

impl DigestAccumulator {
    /// Create an accumulator for `algo`.
    pub fn new(algo: HashAlgorithm) -> Self {
        let inner = match algo {
            HashAlgorithm::Sha256 => Inner::Sha256(sha2::Sha256::new()),
            HashAlgorithm::Sha512 => Inner::Sha512(sha2::Sha512::new()),
            HashAlgorithm::Blake3 => Inner::Blake3(Box::new(blake3::Hasher::new())),
        };
        Self {
            algo,
            inner,
            bytes_hashed: 0,
        }
    }

    /// Absorb the next chunk of content.
    pub fn update(&mut self, data: &[u8]) {
        match &mut self.inner {
            Inner::Sha256(h) => h.update(data),
            Inner::Sha512(h) => h.update(data),
            Inner::Blake3(h) => {
                h.update(data);
            }
        }
        self.bytes_hashed += data.len() as u64;
    }

    /// Finish hashing and return the lowercase hex digest.
    pub fn finalize(self) -> Digest {
        match self.inner {
            Inner::Sha256(h) => Digest::from_bytes(&h.finalize()),
            Inner::Sha512(h) => Digest::from_bytes(&h.finalize()),
            Inner::Blake3(h) => Digest::from_bytes(h.finalize().as_bytes()),
        }
    }

    /// The algorithm this accumulator computes.
    pub fn algorithm(&self) -> HashAlgorithm {
        self.algo
    }

    /// Total bytes absorbed so far.
    pub fn bytes_hashed(&self) -> u64 {
        self.bytes_hashed
    }
}

impl Default for DigestAccumulator {
    fn default() -> Self {
        Self::new(HashAlgorithm::default())
    }
}

impl std::fmt::Debug for DigestAccumulator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DigestAccumulator")
            .field("algo", &self.algo)
            .field("bytes_hashed", &self.bytes_hashed)
            .finish()
    }
}

/// One-shot digest of `data`.
pub fn hash(algo: HashAlgorithm, data: &[u8]) -> Digest {
    let mut acc = DigestAccumulator::new(algo);
    acc.update(data);
    acc.finalize()
}

#[cfg(test)]
mod tests {
    use super::*;

    const EMPTY_SHA256: &str = "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855";
    const HELLO_SHA256: &str = "a948904f2f0f479b8f8197694b30184b0d2ed1c1cd2a1ec0fb85d299a192a447";
    const EMPTY_SHA512: &str = "cf83e1357eefb8bdf1542850d66d8007d620e4050b5715dc83f4a921d36ce9ce\
                                47d0d13c5d85f2b0ff8318d2877eec2f63b931bd47417a81a538327af927da3e";
    const EMPTY_BLAKE3: &str = "af1349b9f5f9a1a6a0404dea36dcc9499bcb25c9adc112b7cc9a93cae41f3262";

    #[test]
    fn empty_input_digests() {
        assert_eq!(hash(HashAlgorithm::Sha256, b"").as_str(), EMPTY_SHA256);
        assert_eq!(hash(HashAlgorithm::Sha512, b"").as_str(), EMPTY_SHA512);
        assert_eq!(hash(HashAlgorithm::Blake3, b"").as_str(), EMPTY_BLAKE3);
    }

    #[test]
    fn chunked_matches_known_vector() {
        let mut acc = DigestAccumulator::default();
        acc.update(b"hello ");
        acc.update(b"world\n");
        assert_eq!(acc.bytes_hashed(), 12);
        assert_eq!(acc.finalize().as_str(), HELLO_SHA256);
    }

    #[test]
    fn empty_updates_do_not_change_digest() {
        let mut acc = DigestAccumulator::new(HashAlgorithm::Sha256);
        acc.update(b"");
        acc.update(b"hello world\n");
        acc.update(b"");
        assert_eq!(acc.finalize().as_str(), HELLO_SHA256);
    }

    #[test]
    fn digest_length_follows_algorithm() {
        for algo in HashAlgorithm::ALL {
            let digest = hash(algo, b"data");
            assert_eq!(digest.len(), algo.hex_len());
            assert_eq!(DigestAccumulator::new(algo).algorithm(), algo);
        }
    }

    #[test]
    fn blake3_matches_reference() {
        let expected = hex::encode(blake3::hash(b"test").as_bytes());
        assert_eq!(hash(HashAlgorithm::Blake3, b"test").as_str(), expected);
    }

    mod props {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn split_point_does_not_matter(
                data in proptest::collection::vec(any::<u8>(), 0..512),
                split in any::<prop::sample::Index>(),
            ) {
                let at = split.index(data.len() + 1);
                let mut acc = DigestAccumulator::default();
                acc.update(&data[..at]);
                acc.update(&data[at..]);
                prop_assert_eq!(acc.finalize(), hash(HashAlgorithm::Sha256, &data));
            }
        }
    }
}
