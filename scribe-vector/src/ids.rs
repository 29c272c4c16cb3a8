//! Deterministic point identifiers and content hashes.
//!
//! Point ids are a pure function of the logical source key (a URL, document
//! id, post id) and the chunk index, so re-indexing identical content always
//! addresses the same point and overwrites instead of duplicating.

use sha2::{Digest, Sha256};

/// Point ids keep the high bit clear so they remain valid for backends and
/// JSON consumers that treat identifiers as signed 64-bit integers.
pub const POINT_ID_MASK: u64 = i64::MAX as u64;

/// Derive the point id for a single-point source (one point per logical key).
///
/// Stable across processes and restarts. Any input, including the empty
/// string, produces a valid id.
pub fn point_id(logical_key: &str) -> u64 {
    let mut hasher = Sha256::new();
    hasher.update((logical_key.len() as u64).to_be_bytes());
    hasher.update(logical_key.as_bytes());
    digest_to_id(hasher)
}

/// Derive the point id for one chunk of a multi-chunk source.
///
/// The key is length-prefixed before the index is appended, so distinct
/// (key, index) pairs cannot collide by concatenation.
pub fn chunk_point_id(logical_key: &str, chunk_index: u64) -> u64 {
    let mut hasher = Sha256::new();
    hasher.update((logical_key.len() as u64).to_be_bytes());
    hasher.update(logical_key.as_bytes());
    hasher.update(chunk_index.to_be_bytes());
    digest_to_id(hasher)
}

/// Hex SHA-256 of a chunk's text, stored in payloads for re-crawl
/// change detection.
pub fn content_hash(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    format!("{:x}", hasher.finalize())
}

fn digest_to_id(hasher: Sha256) -> u64 {
    let digest = hasher.finalize();
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&digest[..8]);
    u64::from_be_bytes(bytes) & POINT_ID_MASK
}
