//! Content-addressed blob storage over a key/value backend.
//!
//! A [`BlobWriter`] streams bytes to a temporary key while hashing them; on
//! [`finalize`](BlobWriter::finalize) the staged object is moved to a key
//! derived from its digest, and the digest becomes its retrieval key.
//! [`BlobStore`] reads, checks and deletes blobs through the same derivation.
//!
//! # Key Layout
//!
//! ```text
//! <prefix>/tmp/<millis>-<random>     staged, partially written objects
//! <prefix>/<xx>/<remaining digest>   finalized objects
//! ```
//!
//! The permanent layout is the one persistent format this crate defines and
//! stays stable across releases.
//!
//! # Backends
//!
//! All backends implement the [`Backend`] trait:
//!
//! - [`MemoryBackend`] -- `HashMap`-based backend for tests and embedding
//! - [`LocalBackend`] -- directory tree on the local filesystem
//!
//! # Design Rules
//!
//! 1. Permanent keys are only ever created by moving a staged object.
//! 2. The digest is known only after every chunk has been written and the
//!    staged object closed.
//! 3. Chunks of one writer are processed strictly in order; writers are
//!    independent of each other.
//! 4. No retries, no cleanup of orphaned staged objects.
//! 5. All backend errors are propagated, never silently ignored.

pub mod config;
pub mod error;
pub mod local;
pub mod memory;
pub mod path;
pub mod settle;
pub mod store;
pub mod traits;
pub mod writer;

mod namespace;
#[cfg(test)]
mod testing;

// Re-export primary types at crate root for ergonomic imports.
pub use casblob_types::{BlobInfo, BlobRef, Digest, HashAlgorithm};
pub use config::{BackendConfig, StoreConfig, DEFAULT_PREFIX};
pub use error::{StoreError, StoreResult};
pub use local::LocalBackend;
pub use memory::MemoryBackend;
pub use path::derive_key;
pub use settle::SettlePolicy;
pub use store::BlobStore;
pub use traits::{Backend, BackendWriter, BlobReader, ReadOptions};
pub use writer::{BlobWriter, CompletionCallback, DestroyHandle};
