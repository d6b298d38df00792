//! In-memory store backend.
//!
//! Backs tests and local development. A single mutex over the whole
//! table makes every store operation atomic, which is exactly the
//! compare-and-swap discipline the claim and attach operations require;
//! the guard is never held across an await point.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::Mutex;
use triage_core::types::DbId;

use crate::models::attachment::{Attachment, NewAttachment};
use crate::models::event::{JobEvent, NewJobEvent};
use crate::models::job::{
    CancelOutcome, Job, JobListQuery, JobOutcome, NewJob, DEFAULT_LIMIT, MAX_LIMIT,
};
use crate::models::status::JobStatus;

use super::{EventStore, JobStore, StoreError};

#[derive(Default)]
struct Inner {
    jobs: HashMap<DbId, Job>,
    events: HashMap<DbId, Vec<JobEvent>>,
    next_job_id: DbId,
    next_attachment_id: DbId,
    next_event_id: DbId,
}

impl Inner {
    fn job_mut(&mut self, job_id: DbId) -> Result<&mut Job, StoreError> {
        self.jobs.get_mut(&job_id).ok_or(StoreError::UnknownJob(job_id))
    }
}

/// In-memory [`JobStore`] + [`EventStore`] implementation.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl JobStore for MemoryStore {
    async fn create_draft(&self, new: NewJob) -> Result<Job, StoreError> {
        let mut inner = self.inner.lock().await;
        inner.next_job_id += 1;
        let now = chrono::Utc::now();
        let job = Job {
            id: inner.next_job_id,
            status: JobStatus::Draft,
            owner: new.owner,
            provider: new.provider,
            model: new.model,
            priority: new.priority,
            manifest: Vec::new(),
            worker: None,
            cancel_requested: false,
            result: None,
            error_message: None,
            progress_percent: 0,
            progress_message: None,
            created_at: now,
            updated_at: now,
            claimed_at: None,
            completed_at: None,
        };
        inner.jobs.insert(job.id, job.clone());
        Ok(job)
    }

    async fn attach_and_activate(
        &self,
        job_id: DbId,
        file: NewAttachment,
    ) -> Result<Job, StoreError> {
        let mut inner = self.inner.lock().await;
        inner.next_attachment_id += 1;
        let attachment_id = inner.next_attachment_id;
        let job = inner.job_mut(job_id)?;

        if !matches!(job.status, JobStatus::Draft | JobStatus::Pending) {
            return Err(StoreError::InvalidState(format!(
                "cannot attach files to a {} job",
                job.status.label()
            )));
        }

        // Idempotent per checksum: identical content is a no-op.
        if job.manifest.iter().any(|a| a.checksum == file.checksum) {
            return Ok(job.clone());
        }

        let now = chrono::Utc::now();
        job.manifest.push(Attachment {
            id: attachment_id,
            job_id,
            storage_key: file.storage_key,
            filename: file.filename,
            size_bytes: file.size_bytes,
            checksum: file.checksum,
            created_at: now,
        });
        if job.status == JobStatus::Draft {
            job.status = JobStatus::Pending;
        }
        job.updated_at = now;
        Ok(job.clone())
    }

    async fn claim_next_pending(&self, worker: &str) -> Result<Option<Job>, StoreError> {
        let mut inner = self.inner.lock().await;
        let candidate = inner
            .jobs
            .values()
            .filter(|j| j.status == JobStatus::Pending)
            .min_by(|a, b| {
                b.priority
                    .cmp(&a.priority)
                    .then(a.created_at.cmp(&b.created_at))
                    .then(a.id.cmp(&b.id))
            })
            .map(|j| j.id);

        let Some(id) = candidate else {
            return Ok(None);
        };

        let now = chrono::Utc::now();
        let job = inner.job_mut(id)?;
        job.status = JobStatus::Running;
        job.worker = Some(worker.to_string());
        job.claimed_at = Some(now);
        job.updated_at = now;
        Ok(Some(job.clone()))
    }

    async fn finalize(&self, job_id: DbId, outcome: JobOutcome) -> Result<Job, StoreError> {
        let mut inner = self.inner.lock().await;
        let job = inner.job_mut(job_id)?;

        if job.status != JobStatus::Running {
            return Err(StoreError::InvalidState(format!(
                "cannot finalize a {} job",
                job.status.label()
            )));
        }

        let now = chrono::Utc::now();
        match outcome {
            JobOutcome::Completed { result } => {
                job.status = JobStatus::Completed;
                job.result = Some(result);
                job.progress_percent = 100;
            }
            JobOutcome::Failed { error } => {
                job.status = JobStatus::Failed;
                job.error_message = Some(error);
            }
            JobOutcome::Cancelled => {
                job.status = JobStatus::Cancelled;
            }
        }
        job.completed_at = Some(now);
        job.updated_at = now;
        Ok(job.clone())
    }

    async fn request_cancel(&self, job_id: DbId) -> Result<CancelOutcome, StoreError> {
        let mut inner = self.inner.lock().await;
        let job = inner.job_mut(job_id)?;
        let now = chrono::Utc::now();

        match job.status {
            JobStatus::Pending => {
                job.status = JobStatus::Cancelled;
                job.completed_at = Some(now);
                job.updated_at = now;
                Ok(CancelOutcome::Cancelled)
            }
            JobStatus::Running => {
                job.cancel_requested = true;
                job.updated_at = now;
                Ok(CancelOutcome::CancelRequested)
            }
            other => Err(StoreError::InvalidState(format!(
                "cannot cancel a {} job",
                other.label()
            ))),
        }
    }

    async fn get(&self, job_id: DbId) -> Result<Job, StoreError> {
        let inner = self.inner.lock().await;
        inner
            .jobs
            .get(&job_id)
            .cloned()
            .ok_or(StoreError::UnknownJob(job_id))
    }

    async fn cancel_requested(&self, job_id: DbId) -> Result<bool, StoreError> {
        Ok(self.get(job_id).await?.cancel_requested)
    }

    async fn update_progress(
        &self,
        job_id: DbId,
        percent: i16,
        message: Option<&str>,
    ) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().await;
        let job = inner.job_mut(job_id)?;
        job.progress_percent = percent;
        job.progress_message = message.map(str::to_string);
        job.updated_at = chrono::Utc::now();
        Ok(())
    }

    async fn list(&self, query: &JobListQuery) -> Result<Vec<Job>, StoreError> {
        let inner = self.inner.lock().await;
        let limit = query.limit.unwrap_or(DEFAULT_LIMIT).min(MAX_LIMIT).max(0) as usize;
        let offset = query.offset.unwrap_or(0).max(0) as usize;

        let mut jobs: Vec<Job> = inner
            .jobs
            .values()
            .filter(|j| query.status.map_or(true, |s| j.status == s))
            .cloned()
            .collect();
        jobs.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(jobs.into_iter().skip(offset).take(limit).collect())
    }
}

#[async_trait]
impl EventStore for MemoryStore {
    async fn append(&self, job_id: DbId, event: NewJobEvent) -> Result<JobEvent, StoreError> {
        let mut inner = self.inner.lock().await;
        if !inner.jobs.contains_key(&job_id) {
            return Err(StoreError::UnknownJob(job_id));
        }
        inner.next_event_id += 1;
        let id = inner.next_event_id;
        let log = inner.events.entry(job_id).or_default();
        let stored = JobEvent {
            id,
            job_id,
            sequence: log.len() as i64 + 1,
            kind: event.kind,
            stage: event.stage,
            message: event.message,
            progress_percent: event.progress_percent,
            detail: event.detail,
            created_at: chrono::Utc::now(),
        };
        log.push(stored.clone());
        Ok(stored)
    }

    async fn list_from(
        &self,
        job_id: DbId,
        after_sequence: i64,
    ) -> Result<Vec<JobEvent>, StoreError> {
        let inner = self.inner.lock().await;
        if !inner.jobs.contains_key(&job_id) {
            return Err(StoreError::UnknownJob(job_id));
        }
        Ok(inner
            .events
            .get(&job_id)
            .map(|log| {
                log.iter()
                    .filter(|e| e.sequence > after_sequence)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
