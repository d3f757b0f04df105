//! Foundation types for casblob.
//!
//! Every other casblob crate depends on `casblob-types`.
//!
//! # Key Types
//!
//! - [`Digest`] -- Lowercase hex content digest, the identity of a stored blob
//! - [`HashAlgorithm`] -- Algorithm that produced a digest (SHA-256 by default)
//! - [`BlobRef`] -- Reference accepted by read, exists and remove
//! - [`BlobInfo`] -- `{ digest, size }` record produced by a finished write

pub mod algorithm;
pub mod blob;
pub mod error;
pub mod object;

pub use algorithm::HashAlgorithm;
pub use blob::{BlobInfo, BlobRef};
pub use error::TypeError;
pub use object::Digest;
