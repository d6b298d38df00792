//! Store contracts for jobs and events.
//!
//! All lifecycle mutations flow through [`JobStore`]; event appends flow
//! through [`EventStore`]. The traits are object-safe so application
//! state can hold `Arc<dyn JobStore>` and tests can inject the memory
//! backend where production wires PostgreSQL.

mod memory;
mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

use async_trait::async_trait;
use triage_core::types::DbId;

use crate::models::attachment::NewAttachment;
use crate::models::event::{JobEvent, NewJobEvent};
use crate::models::job::{CancelOutcome, Job, JobListQuery, JobOutcome, NewJob};

/// Errors surfaced by store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Unknown job: {0}")]
    UnknownJob(DbId),

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Single source of truth for job existence and state transitions.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Create a job in `draft` with an empty manifest. Always succeeds.
    async fn create_draft(&self, new: NewJob) -> Result<Job, StoreError>;

    /// Atomically append a file to the manifest and, if the job is still
    /// `draft`, transition it to `pending` — one indivisible unit, so no
    /// observer ever sees `pending` with an empty manifest.
    ///
    /// Idempotent per content checksum: re-attaching identical bytes
    /// neither duplicates the manifest entry nor re-fires the transition.
    ///
    /// Errors: [`StoreError::UnknownJob`]; [`StoreError::InvalidState`]
    /// unless the job is `draft` or `pending`.
    async fn attach_and_activate(
        &self,
        job_id: DbId,
        file: NewAttachment,
    ) -> Result<Job, StoreError>;

    /// Atomically claim the highest-priority, oldest-created `pending`
    /// job for `worker`, moving it to `running`. Returns `None` when no
    /// job is eligible. Two concurrent callers never both receive the
    /// same job.
    async fn claim_next_pending(&self, worker: &str) -> Result<Option<Job>, StoreError>;

    /// Record a terminal outcome. Fails with [`StoreError::InvalidState`]
    /// unless the job is currently `running`.
    async fn finalize(&self, job_id: DbId, outcome: JobOutcome) -> Result<Job, StoreError>;

    /// Cancel a `pending` job immediately, or flag a `running` job for
    /// cooperative cancellation at the next stage boundary.
    async fn request_cancel(&self, job_id: DbId) -> Result<CancelOutcome, StoreError>;

    /// Fetch a job snapshot.
    async fn get(&self, job_id: DbId) -> Result<Job, StoreError>;

    /// Whether cancellation has been requested for a job.
    async fn cancel_requested(&self, job_id: DbId) -> Result<bool, StoreError>;

    /// Update the denormalized progress fields on the job row.
    async fn update_progress(
        &self,
        job_id: DbId,
        percent: i16,
        message: Option<&str>,
    ) -> Result<(), StoreError>;

    /// List jobs, newest first, with optional status filter and paging.
    async fn list(&self, query: &JobListQuery) -> Result<Vec<Job>, StoreError>;
}

/// Durable, append-only, per-job ordered event storage.
#[async_trait]
pub trait EventStore: Send + Sync {
    /// Append an event, assigning the next per-job sequence number.
    /// The write is durable before this method returns.
    async fn append(&self, job_id: DbId, event: NewJobEvent) -> Result<JobEvent, StoreError>;

    /// All events for `job_id` with `sequence > after_sequence`, in
    /// sequence order.
    async fn list_from(&self, job_id: DbId, after_sequence: i64)
        -> Result<Vec<JobEvent>, StoreError>;
}
