//! Shared SHA-256 hex digest utility.
//!
//! Attachment manifests key files by content digest, which is what makes
//! `attach_and_activate` idempotent: re-attaching identical bytes is a
//! no-op rather than a duplicate manifest entry.

use sha2::{Digest, Sha256};

/// Compute a SHA-256 hex digest of the given bytes.
pub fn sha256_hex(data: &[u8]) -> String {
    let hash = Sha256::digest(data);
    format!("{hash:x}")
}
