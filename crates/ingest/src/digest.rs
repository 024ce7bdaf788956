//! Content digests and the duplicate classifier.
//!
//! Two payloads that claim the same instance identifier are compared by
//! their SHA-256 digests.
//!
//! # Algorithm
//!
//! ```text
//! SHA-256(payload_bytes) -> lowercase hex
//! ```
//!
//! The digest is an equality check between submissions from cooperating
//! clients. It is not used for integrity or authentication.
//!
//! # Examples
//!
//! ```rust
//! use ingest::{content_digest, same_content};
//!
//! let digest = content_digest(b"<data/>");
//! assert_eq!(digest.len(), 64);
//!
//! assert!(same_content(b"<data/>", b"<data/>"));
//! assert!(!same_content(b"<data/>", b"<data />"));
//! ```
use sha2::{Digest, Sha256};

/// Hex SHA-256 of raw payload bytes.
pub fn content_digest(payload: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(payload);
    hex::encode(hasher.finalize())
}

/// Whether two payloads carry identical content.
pub fn same_content(a: &[u8], b: &[u8]) -> bool {
    content_digest(a) == content_digest(b)
}
