//! Streaming digest computation for casblob.
//!
//! Wraps established hash implementations (`sha2`, `blake3`) behind a single
//! accumulator that yields a lowercase hex [`Digest`](casblob_types::Digest).
//! No custom cryptography.

pub mod hasher;

pub use hasher::{hash, DigestAccumulator};
