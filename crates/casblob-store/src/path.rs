//! Backend key derivation.
//!
//! Permanent objects live at `prefix/xx/yyyy...` where `xx` is the first two
//! characters of the digest and `yyyy...` the rest. Staged objects live under
//! `prefix/tmp/`. Keys always use `/`, whatever the host platform.

use std::time::{SystemTime, UNIX_EPOCH};

use rand::Rng;

/// Name of the staging sub-namespace under the prefix.
pub const TEMP_SEGMENT: &str = "tmp";

/// Characters of the digest used as the shard segment.
pub const SHARD_LEN: usize = 2;

/// Derive the backend key for `digest` under `prefix`.
///
/// With no digest (or an empty one) the prefix itself is returned.
pub fn derive_key(prefix: &str, digest: Option<&str>) -> String {
    let prefix = prefix.trim_end_matches('/');
    let digest = match digest {
        Some(d) if !d.is_empty() => d,
        _ => return prefix.to_string(),
    };
    match digest.char_indices().nth(SHARD_LEN) {
        Some((split, _)) => format!("{prefix}/{}/{}", &digest[..split], &digest[split..]),
        None => format!("{prefix}/{digest}"),
    }
}

/// Root of the staging namespace for `prefix`.
pub fn temp_root(prefix: &str) -> String {
    format!("{}/{TEMP_SEGMENT}", derive_key(prefix, None))
}

/// A fresh staging key under `root`: millisecond timestamp plus a random suffix.
pub fn temp_key(root: &str) -> String {
    let millis = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or_default();
    let suffix: u64 = rand::thread_rng().gen();
    format!("{}/{millis}-{suffix}", root.trim_end_matches('/'))
}
