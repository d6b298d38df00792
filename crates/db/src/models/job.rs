//! Job entity models and DTOs for the analysis engine (PRD-07).

use serde::{Deserialize, Serialize};
use triage_core::types::{DbId, Timestamp};

use super::attachment::Attachment;
use super::status::JobStatus;

/// One analysis request: an uploaded artifact set moving through the
/// `draft → pending → running → terminal` lifecycle.
///
/// Owned exclusively by the Job Store. Other components read snapshots
/// and mutate only through the named store operations.
#[derive(Debug, Clone, Serialize)]
pub struct Job {
    pub id: DbId,
    pub status: JobStatus,
    pub owner: String,
    /// Analysis provider selection, passed through to the provider layer.
    pub provider: String,
    pub model: String,
    /// Higher priority is scheduled first; ties break oldest-first.
    pub priority: i32,
    /// Ordered input manifest. Non-empty for every non-draft job.
    pub manifest: Vec<Attachment>,
    /// Name of the worker that claimed this job, once `running`.
    pub worker: Option<String>,
    /// Cooperative cancellation hint, consulted at stage boundaries.
    pub cancel_requested: bool,
    pub result: Option<serde_json::Value>,
    pub error_message: Option<String>,
    pub progress_percent: i16,
    pub progress_message: Option<String>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
    pub claimed_at: Option<Timestamp>,
    pub completed_at: Option<Timestamp>,
}

/// Fields for creating a draft job.
#[derive(Debug, Clone, Deserialize)]
pub struct NewJob {
    pub owner: String,
    pub provider: String,
    pub model: String,
    pub priority: i32,
}

/// Terminal outcome recorded by `finalize`.
#[derive(Debug, Clone)]
pub enum JobOutcome {
    Completed { result: serde_json::Value },
    Failed { error: String },
    Cancelled,
}

impl JobOutcome {
    /// The terminal status this outcome resolves to.
    pub fn status(&self) -> JobStatus {
        match self {
            Self::Completed { .. } => JobStatus::Completed,
            Self::Failed { .. } => JobStatus::Failed,
            Self::Cancelled => JobStatus::Cancelled,
        }
    }
}

/// Result of a cancellation request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelOutcome {
    /// The job was `pending` and is now `cancelled`.
    Cancelled,
    /// The job is `running`; the flag is set and the pipeline will stop
    /// at the next stage boundary.
    CancelRequested,
}

/// Query parameters for job listing.
#[derive(Debug, Default, Deserialize)]
pub struct JobListQuery {
    /// Filter by lifecycle status.
    pub status: Option<JobStatus>,
    /// Maximum number of results. Defaults to 50, capped at 100.
    pub limit: Option<i64>,
    /// Number of results to skip. Defaults to 0.
    pub offset: Option<i64>,
}

/// Maximum page size for job listing.
pub const MAX_LIMIT: i64 = 100;

/// Default page size for job listing.
pub const DEFAULT_LIMIT: i64 = 50;
