//! PostgreSQL store backend (sqlx).
//!
//! Claim exclusivity uses `SELECT ... FOR UPDATE SKIP LOCKED` inside a
//! single conditional UPDATE, so concurrent workers never double-claim.
//! Event appends lock the owning job row to serialize per-job sequence
//! assignment.

use async_trait::async_trait;
use sqlx::{FromRow, PgPool, Postgres, Transaction};
use triage_core::types::{DbId, Timestamp};

use crate::models::attachment::{Attachment, NewAttachment};
use crate::models::event::{EventKind, JobEvent, NewJobEvent};
use crate::models::job::{
    CancelOutcome, Job, JobListQuery, JobOutcome, NewJob, DEFAULT_LIMIT, MAX_LIMIT,
};
use crate::models::status::{JobStatus, StatusId};

use super::{EventStore, JobStore, StoreError};

/// Column list for `jobs` queries.
const JOB_COLUMNS: &str = "\
    id, status_id, owner, provider, model, priority, worker, \
    cancel_requested, result, error_message, \
    progress_percent, progress_message, \
    created_at, updated_at, claimed_at, completed_at";

/// Column list for `job_events` queries.
const EVENT_COLUMNS: &str = "\
    id, job_id, sequence, kind, stage, message, progress_percent, detail, created_at";

/// A row from the `jobs` table, before the manifest is loaded.
#[derive(Debug, FromRow)]
struct JobRow {
    id: DbId,
    status_id: StatusId,
    owner: String,
    provider: String,
    model: String,
    priority: i32,
    worker: Option<String>,
    cancel_requested: bool,
    result: Option<serde_json::Value>,
    error_message: Option<String>,
    progress_percent: i16,
    progress_message: Option<String>,
    created_at: Timestamp,
    updated_at: Timestamp,
    claimed_at: Option<Timestamp>,
    completed_at: Option<Timestamp>,
}

impl JobRow {
    fn into_job(self, manifest: Vec<Attachment>) -> Result<Job, StoreError> {
        let status = JobStatus::from_id(self.status_id).ok_or_else(|| {
            StoreError::Database(sqlx::Error::Decode(
                format!("unknown status id {}", self.status_id).into(),
            ))
        })?;
        Ok(Job {
            id: self.id,
            status,
            owner: self.owner,
            provider: self.provider,
            model: self.model,
            priority: self.priority,
            manifest,
            worker: self.worker,
            cancel_requested: self.cancel_requested,
            result: self.result,
            error_message: self.error_message,
            progress_percent: self.progress_percent,
            progress_message: self.progress_message,
            created_at: self.created_at,
            updated_at: self.updated_at,
            claimed_at: self.claimed_at,
            completed_at: self.completed_at,
        })
    }
}

/// A row from the `job_events` table.
#[derive(Debug, FromRow)]
struct EventRow {
    id: DbId,
    job_id: DbId,
    sequence: i64,
    kind: String,
    stage: Option<String>,
    message: String,
    progress_percent: i16,
    detail: serde_json::Value,
    created_at: Timestamp,
}

impl EventRow {
    fn into_event(self) -> Result<JobEvent, StoreError> {
        let kind = EventKind::from_str(&self.kind).ok_or_else(|| {
            StoreError::Database(sqlx::Error::Decode(
                format!("unknown event kind {:?}", self.kind).into(),
            ))
        })?;
        Ok(JobEvent {
            id: self.id,
            job_id: self.job_id,
            sequence: self.sequence,
            kind,
            stage: self.stage,
            message: self.message,
            progress_percent: self.progress_percent,
            detail: self.detail,
            created_at: self.created_at,
        })
    }
}

/// PostgreSQL-backed [`JobStore`] + [`EventStore`].
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn manifest(&self, job_id: DbId) -> Result<Vec<Attachment>, StoreError> {
        let rows = sqlx::query_as::<_, AttachmentRow>(
            "SELECT id, job_id, storage_key, filename, size_bytes, checksum, created_at \
             FROM job_attachments WHERE job_id = $1 ORDER BY id",
        )
        .bind(job_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(AttachmentRow::into_attachment).collect())
    }

    async fn fetch_job(&self, job_id: DbId) -> Result<Job, StoreError> {
        let query = format!("SELECT {JOB_COLUMNS} FROM jobs WHERE id = $1");
        let row = sqlx::query_as::<_, JobRow>(&query)
            .bind(job_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(StoreError::UnknownJob(job_id))?;
        let manifest = self.manifest(job_id).await?;
        row.into_job(manifest)
    }

    /// Lock the job row inside `tx` and return its current status.
    async fn lock_job(
        tx: &mut Transaction<'_, Postgres>,
        job_id: DbId,
    ) -> Result<JobStatus, StoreError> {
        let status_id: Option<StatusId> =
            sqlx::query_scalar("SELECT status_id FROM jobs WHERE id = $1 FOR UPDATE")
                .bind(job_id)
                .fetch_optional(&mut **tx)
                .await?;
        let status_id = status_id.ok_or(StoreError::UnknownJob(job_id))?;
        JobStatus::from_id(status_id).ok_or_else(|| {
            StoreError::Database(sqlx::Error::Decode(
                format!("unknown status id {status_id}").into(),
            ))
        })
    }
}

#[derive(Debug, FromRow)]
struct AttachmentRow {
    id: DbId,
    job_id: DbId,
    storage_key: String,
    filename: String,
    size_bytes: i64,
    checksum: String,
    created_at: Timestamp,
}

impl AttachmentRow {
    fn into_attachment(self) -> Attachment {
        Attachment {
            id: self.id,
            job_id: self.job_id,
            storage_key: self.storage_key,
            filename: self.filename,
            size_bytes: self.size_bytes,
            checksum: self.checksum,
            created_at: self.created_at,
        }
    }
}

#[async_trait]
impl JobStore for PgStore {
    async fn create_draft(&self, new: NewJob) -> Result<Job, StoreError> {
        let query = format!(
            "INSERT INTO jobs (status_id, owner, provider, model, priority) \
             VALUES ($1, $2, $3, $4, $5) \
             RETURNING {JOB_COLUMNS}"
        );
        let row = sqlx::query_as::<_, JobRow>(&query)
            .bind(JobStatus::Draft.id())
            .bind(&new.owner)
            .bind(&new.provider)
            .bind(&new.model)
            .bind(new.priority)
            .fetch_one(&self.pool)
            .await?;
        row.into_job(Vec::new())
    }

    async fn attach_and_activate(
        &self,
        job_id: DbId,
        file: NewAttachment,
    ) -> Result<Job, StoreError> {
        let mut tx = self.pool.begin().await?;

        let status = Self::lock_job(&mut tx, job_id).await?;
        if !matches!(status, JobStatus::Draft | JobStatus::Pending) {
            return Err(StoreError::InvalidState(format!(
                "cannot attach files to a {} job",
                status.label()
            )));
        }

        let already_attached: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM job_attachments WHERE job_id = $1 AND checksum = $2)",
        )
        .bind(job_id)
        .bind(&file.checksum)
        .fetch_one(&mut *tx)
        .await?;

        if !already_attached {
            sqlx::query(
                "INSERT INTO job_attachments (job_id, storage_key, filename, size_bytes, checksum) \
                 VALUES ($1, $2, $3, $4, $5)",
            )
            .bind(job_id)
            .bind(&file.storage_key)
            .bind(&file.filename)
            .bind(file.size_bytes)
            .bind(&file.checksum)
            .execute(&mut *tx)
            .await?;

            if status == JobStatus::Draft {
                sqlx::query("UPDATE jobs SET status_id = $2, updated_at = NOW() WHERE id = $1")
                    .bind(job_id)
                    .bind(JobStatus::Pending.id())
                    .execute(&mut *tx)
                    .await?;
            } else {
                sqlx::query("UPDATE jobs SET updated_at = NOW() WHERE id = $1")
                    .bind(job_id)
                    .execute(&mut *tx)
                    .await?;
            }
        }

        tx.commit().await?;
        self.fetch_job(job_id).await
    }

    async fn claim_next_pending(&self, worker: &str) -> Result<Option<Job>, StoreError> {
        let query = format!(
            "UPDATE jobs \
             SET status_id = $1, worker = $2, claimed_at = NOW(), updated_at = NOW() \
             WHERE id = ( \
                 SELECT id FROM jobs \
                 WHERE status_id = $3 \
                 ORDER BY priority DESC, created_at ASC, id ASC \
                 LIMIT 1 \
                 FOR UPDATE SKIP LOCKED \
             ) \
             RETURNING {JOB_COLUMNS}"
        );
        let row = sqlx::query_as::<_, JobRow>(&query)
            .bind(JobStatus::Running.id())
            .bind(worker)
            .bind(JobStatus::Pending.id())
            .fetch_optional(&self.pool)
            .await?;

        match row {
            None => Ok(None),
            Some(row) => {
                let manifest = self.manifest(row.id).await?;
                Ok(Some(row.into_job(manifest)?))
            }
        }
    }

    async fn finalize(&self, job_id: DbId, outcome: JobOutcome) -> Result<Job, StoreError> {
        let status = outcome.status();
        let (result, error_message) = match &outcome {
            JobOutcome::Completed { result } => (Some(result.clone()), None),
            JobOutcome::Failed { error } => (None, Some(error.clone())),
            JobOutcome::Cancelled => (None, None),
        };

        let query = format!(
            "UPDATE jobs \
             SET status_id = $2, result = $3, error_message = $4, \
                 progress_percent = CASE WHEN $2 = $5 THEN 100 ELSE progress_percent END, \
                 completed_at = NOW(), updated_at = NOW() \
             WHERE id = $1 AND status_id = $6 \
             RETURNING {JOB_COLUMNS}"
        );
        let row = sqlx::query_as::<_, JobRow>(&query)
            .bind(job_id)
            .bind(status.id())
            .bind(result)
            .bind(error_message)
            .bind(JobStatus::Completed.id())
            .bind(JobStatus::Running.id())
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => {
                let manifest = self.manifest(job_id).await?;
                row.into_job(manifest)
            }
            None => {
                // Distinguish "no such job" from "wrong state".
                let current = self.fetch_job(job_id).await?;
                Err(StoreError::InvalidState(format!(
                    "cannot finalize a {} job",
                    current.status.label()
                )))
            }
        }
    }

    async fn request_cancel(&self, job_id: DbId) -> Result<CancelOutcome, StoreError> {
        let cancelled = sqlx::query(
            "UPDATE jobs SET status_id = $2, completed_at = NOW(), updated_at = NOW() \
             WHERE id = $1 AND status_id = $3",
        )
        .bind(job_id)
        .bind(JobStatus::Cancelled.id())
        .bind(JobStatus::Pending.id())
        .execute(&self.pool)
        .await?;
        if cancelled.rows_affected() > 0 {
            return Ok(CancelOutcome::Cancelled);
        }

        let flagged = sqlx::query(
            "UPDATE jobs SET cancel_requested = TRUE, updated_at = NOW() \
             WHERE id = $1 AND status_id = $2",
        )
        .bind(job_id)
        .bind(JobStatus::Running.id())
        .execute(&self.pool)
        .await?;
        if flagged.rows_affected() > 0 {
            return Ok(CancelOutcome::CancelRequested);
        }

        let current = self.fetch_job(job_id).await?;
        Err(StoreError::InvalidState(format!(
            "cannot cancel a {} job",
            current.status.label()
        )))
    }

    async fn get(&self, job_id: DbId) -> Result<Job, StoreError> {
        self.fetch_job(job_id).await
    }

    async fn cancel_requested(&self, job_id: DbId) -> Result<bool, StoreError> {
        sqlx::query_scalar("SELECT cancel_requested FROM jobs WHERE id = $1")
            .bind(job_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(StoreError::UnknownJob(job_id))
    }

    async fn update_progress(
        &self,
        job_id: DbId,
        percent: i16,
        message: Option<&str>,
    ) -> Result<(), StoreError> {
        sqlx::query(
            "UPDATE jobs SET progress_percent = $2, progress_message = $3, updated_at = NOW() \
             WHERE id = $1",
        )
        .bind(job_id)
        .bind(percent)
        .bind(message)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn list(&self, query: &JobListQuery) -> Result<Vec<Job>, StoreError> {
        let limit = query.limit.unwrap_or(DEFAULT_LIMIT).min(MAX_LIMIT);
        let offset = query.offset.unwrap_or(0);

        let sql = if query.status.is_some() {
            format!(
                "SELECT {JOB_COLUMNS} FROM jobs WHERE status_id = $1 \
                 ORDER BY created_at DESC, id DESC LIMIT $2 OFFSET $3"
            )
        } else {
            format!(
                "SELECT {JOB_COLUMNS} FROM jobs \
                 ORDER BY created_at DESC, id DESC LIMIT $1 OFFSET $2"
            )
        };

        let mut q = sqlx::query_as::<_, JobRow>(&sql);
        if let Some(status) = query.status {
            q = q.bind(status.id());
        }
        let rows = q.bind(limit).bind(offset).fetch_all(&self.pool).await?;

        let mut jobs = Vec::with_capacity(rows.len());
        for row in rows {
            let manifest = self.manifest(row.id).await?;
            jobs.push(row.into_job(manifest)?);
        }
        Ok(jobs)
    }
}

#[async_trait]
impl EventStore for PgStore {
    async fn append(&self, job_id: DbId, event: NewJobEvent) -> Result<JobEvent, StoreError> {
        let mut tx = self.pool.begin().await?;

        // Lock the job row so concurrent appenders serialize and the
        // per-job sequence has no gaps or duplicates.
        Self::lock_job(&mut tx, job_id).await?;

        let next_sequence: i64 = sqlx::query_scalar(
            "SELECT COALESCE(MAX(sequence), 0) + 1 FROM job_events WHERE job_id = $1",
        )
        .bind(job_id)
        .fetch_one(&mut *tx)
        .await?;

        let query = format!(
            "INSERT INTO job_events (job_id, sequence, kind, stage, message, progress_percent, detail) \
             VALUES ($1, $2, $3, $4, $5, $6, $7) \
             RETURNING {EVENT_COLUMNS}"
        );
        let row = sqlx::query_as::<_, EventRow>(&query)
            .bind(job_id)
            .bind(next_sequence)
            .bind(event.kind.as_str())
            .bind(&event.stage)
            .bind(&event.message)
            .bind(event.progress_percent)
            .bind(&event.detail)
            .fetch_one(&mut *tx)
            .await?;

        tx.commit().await?;
        row.into_event()
    }

    async fn list_from(
        &self,
        job_id: DbId,
        after_sequence: i64,
    ) -> Result<Vec<JobEvent>, StoreError> {
        let query = format!(
            "SELECT {EVENT_COLUMNS} FROM job_events \
             WHERE job_id = $1 AND sequence > $2 \
             ORDER BY sequence ASC"
        );
        let rows = sqlx::query_as::<_, EventRow>(&query)
            .bind(job_id)
            .bind(after_sequence)
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(EventRow::into_event).collect()
    }
}
