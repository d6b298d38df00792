//! Upload coordination: the only path that creates jobs from artifacts.
//!
//! The coordinator validates everything before touching the Job Store,
//! uploads bytes to object storage, and then relies on the store's
//! atomic `attach_and_activate` for the draft→pending transition — so
//! there is no window in which a `pending` job has an empty manifest.

use std::sync::Arc;

use triage_core::hashing::sha256_hex;
use triage_core::types::DbId;
use triage_core::upload::validate_upload_file;
use triage_db::models::attachment::NewAttachment;
use triage_db::models::event::NewJobEvent;
use triage_db::models::job::{Job, NewJob};
use triage_db::models::status::JobStatus;
use triage_db::store::JobStore;
use triage_events::EventLog;
use triage_providers::{ObjectStorage, ProviderError};

use crate::error::{AppError, AppResult};

/// A submission: provider/model selection plus an optional existing
/// draft to extend with more files.
#[derive(Debug, Clone)]
pub struct UploadRequest {
    pub owner: String,
    pub provider: String,
    pub model: String,
    pub priority: i32,
    /// Reuse an existing draft job instead of creating a new one.
    /// Lets multi-file jobs accumulate files across requests.
    pub draft_job_id: Option<DbId>,
}

/// One uploaded file, already read off the wire.
#[derive(Debug, Clone)]
pub struct UploadFile {
    pub filename: String,
    pub bytes: Vec<u8>,
}

/// Bridges artifact ingestion into the job lifecycle.
pub struct UploadCoordinator {
    jobs: Arc<dyn JobStore>,
    log: Arc<EventLog>,
    storage: Arc<dyn ObjectStorage>,
    max_upload_bytes: usize,
}

impl UploadCoordinator {
    pub fn new(
        jobs: Arc<dyn JobStore>,
        log: Arc<EventLog>,
        storage: Arc<dyn ObjectStorage>,
        max_upload_bytes: usize,
    ) -> Self {
        Self {
            jobs,
            log,
            storage,
            max_upload_bytes,
        }
    }

    /// Submit files for analysis. Returns the activated job.
    ///
    /// Validation happens before any mutation: a failed submission
    /// leaves no new job behind and an explicit draft untouched. A
    /// transient storage failure surfaces as [`AppError::Retryable`],
    /// also without job mutation.
    pub async fn submit(&self, request: UploadRequest, files: Vec<UploadFile>) -> AppResult<Job> {
        if files.is_empty() {
            return Err(AppError::Validation(
                "at least one file is required".to_string(),
            ));
        }
        for file in &files {
            validate_upload_file(&file.filename, &file.bytes, self.max_upload_bytes)?;
        }

        // Fail fast on an unknown or already-active draft id, before
        // any bytes hit storage.
        if let Some(id) = request.draft_job_id {
            let job = self.jobs.get(id).await?;
            if !matches!(job.status, JobStatus::Draft | JobStatus::Pending) {
                return Err(AppError::Store(
                    triage_db::store::StoreError::InvalidState(format!(
                        "cannot add files to a {} job",
                        job.status.label()
                    )),
                ));
            }
        }

        // Upload every file before any job mutation, so a storage
        // failure leaves no half-created job behind.
        let mut attachments = Vec::with_capacity(files.len());
        for file in files {
            let checksum = sha256_hex(&file.bytes);
            let size_bytes = file.bytes.len() as i64;
            let storage_key = self.storage.put(file.bytes).await.map_err(map_upstream)?;
            attachments.push(NewAttachment {
                storage_key,
                filename: file.filename,
                size_bytes,
                checksum,
            });
        }

        let job_id = match request.draft_job_id {
            Some(id) => id,
            None => {
                self.jobs
                    .create_draft(NewJob {
                        owner: request.owner,
                        provider: request.provider,
                        model: request.model,
                        priority: request.priority,
                    })
                    .await?
                    .id
            }
        };

        let mut job = self.jobs.get(job_id).await?;
        let was_draft = job.status == JobStatus::Draft;
        for attachment in attachments {
            job = self.jobs.attach_and_activate(job_id, attachment).await?;
        }

        if was_draft && job.status == JobStatus::Pending {
            self.log
                .append(
                    job_id,
                    NewJobEvent::lifecycle(JobStatus::Pending, 0, "Queued for analysis"),
                )
                .await?;
        }

        tracing::info!(
            job_id,
            files = job.manifest.len(),
            status = job.status.label(),
            "Submission accepted",
        );
        Ok(job)
    }
}

/// Storage failures during submission: transient ones are retryable for
/// the caller, permanent ones are validation-shaped.
fn map_upstream(err: ProviderError) -> AppError {
    match err {
        ProviderError::Transient(msg) => AppError::Retryable(msg),
        ProviderError::Permanent(msg) => AppError::Internal(msg),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
