//! Short SHA256 keys.
//!
//! Used for session caches keyed by test identity and for content
//! fingerprints when merging shards.

use sha2::{Digest, Sha256};

/// Number of hex characters kept in a short hash.
const SHORT_HASH_LEN: usize = 7;

/// Full hex SHA256 of the given parts, separated by null bytes.
#[must_use]
pub fn hash_parts<S: AsRef<str>>(parts: &[S]) -> String {
    let mut hasher = Sha256::new();
    for part in parts {
        let value = part.as_ref();
        if value.contains('\0') {
            hasher.update(value.replace('\0', " ").as_bytes());
        } else {
            hasher.update(value.as_bytes());
        }
        hasher.update(b"\x00");
    }
    format!("{:x}", hasher.finalize())
}

/// First seven hex characters of the SHA256 of the given parts.
#[must_use]
pub fn short_hash<S: AsRef<str>>(parts: &[S]) -> String {
    let mut full = hash_parts(parts);
    full.truncate(SHORT_HASH_LEN);
    full
}
