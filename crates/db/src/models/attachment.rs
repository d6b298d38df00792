//! Attached-file models for job input manifests.

use serde::{Deserialize, Serialize};
use triage_core::types::{DbId, Timestamp};

/// A file attached to a job. Immutable once attached.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Attachment {
    pub id: DbId,
    pub job_id: DbId,
    /// Opaque object-storage handle, resolved by the storage collaborator.
    pub storage_key: String,
    pub filename: String,
    pub size_bytes: i64,
    /// SHA-256 hex digest of the file content. Manifest entries are
    /// keyed by this digest, which makes re-attachment idempotent.
    pub checksum: String,
    pub created_at: Timestamp,
}

/// An uploaded file awaiting attachment. Carries no job reference yet;
/// the Job Store binds it during `attach_and_activate`.
#[derive(Debug, Clone)]
pub struct NewAttachment {
    pub storage_key: String,
    pub filename: String,
    pub size_bytes: i64,
    pub checksum: String,
}
