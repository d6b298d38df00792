//! The pipeline executor: drives one `running` job through the stage
//! sequence to a terminal state.
//!
//! Failure discipline (the propagation policy for the whole engine):
//! stage errors never escape this module — they become a `stage-failed`
//! event plus a `failed` finalization. `run` returns `Err` only when the
//! store or event log itself fails, which the scheduler handles.

use std::sync::Arc;

use triage_core::types::DbId;
use triage_db::models::event::NewJobEvent;
use triage_db::models::job::{Job, JobOutcome};
use triage_db::models::status::JobStatus;
use triage_db::store::{JobStore, StoreError};
use triage_events::EventLog;

use crate::context::{ProviderSet, StageContext};
use crate::error::StageError;
use crate::retry::next_delay;
use crate::stage::{registry, StageDescriptor, StageOutcome};

/// Runs the ordered analysis stages for claimed jobs.
pub struct PipelineExecutor {
    stages: Vec<StageDescriptor>,
    jobs: Arc<dyn JobStore>,
    log: Arc<EventLog>,
    providers: Arc<ProviderSet>,
}

impl PipelineExecutor {
    /// Build an executor over a custom stage list. Tests use this to
    /// inject short timeouts or misbehaving handlers.
    pub fn new(
        stages: Vec<StageDescriptor>,
        jobs: Arc<dyn JobStore>,
        log: Arc<EventLog>,
        providers: Arc<ProviderSet>,
    ) -> Self {
        Self {
            stages,
            jobs,
            log,
            providers,
        }
    }

    /// Build an executor over the standard stage registry.
    pub fn standard(
        jobs: Arc<dyn JobStore>,
        log: Arc<EventLog>,
        providers: Arc<ProviderSet>,
    ) -> Self {
        Self::new(registry(), jobs, log, providers)
    }

    /// Run a claimed job to a terminal state.
    ///
    /// The job must already be `running` (the scheduler claims before
    /// invoking). Stage errors are converted into events and a terminal
    /// status; `Err` means the store or log itself failed mid-flight.
    pub async fn run(&self, job: Job) -> Result<(), StoreError> {
        let job_id = job.id;
        let mut ctx = StageContext::new(job, Arc::clone(&self.providers));

        for stage in &self.stages {
            // Cancellation is cooperative and observed only here, at
            // stage boundaries; in-flight stages always finish.
            if self.jobs.cancel_requested(job_id).await? {
                let job = self.jobs.finalize(job_id, JobOutcome::Cancelled).await?;
                tracing::info!(job_id, before_stage = stage.name, "Job cancelled on request");
                self.log
                    .append(
                        job_id,
                        NewJobEvent::lifecycle(
                            JobStatus::Cancelled,
                            job.progress_percent,
                            "Cancelled on request",
                        ),
                    )
                    .await?;
                return Ok(());
            }

            self.log
                .append(
                    job_id,
                    NewJobEvent::stage_started(stage.name, stage.progress_start),
                )
                .await?;
            self.jobs
                .update_progress(job_id, stage.progress_start, Some(stage.name))
                .await?;

            match self.run_stage(job_id, stage, &mut ctx).await {
                Ok((outcome, attempts)) => {
                    let mut detail = outcome.detail;
                    if attempts > 1 {
                        if let Some(object) = detail.as_object_mut() {
                            object.insert("attempts".to_string(), attempts.into());
                        }
                    }
                    self.log
                        .append(
                            job_id,
                            NewJobEvent::stage_completed(
                                stage.name,
                                stage.progress_end,
                                outcome.summary.clone(),
                                detail,
                            ),
                        )
                        .await?;
                    self.jobs
                        .update_progress(job_id, stage.progress_end, Some(&outcome.summary))
                        .await?;
                }
                Err(err) => {
                    tracing::error!(job_id, stage = stage.name, error = %err, "Stage failed");
                    self.log
                        .append(
                            job_id,
                            NewJobEvent::stage_failed(
                                stage.name,
                                stage.progress_start,
                                err.to_string(),
                                serde_json::json!({ "error": err.to_string() }),
                            ),
                        )
                        .await?;
                    let error = format!("stage {} failed: {err}", stage.name);
                    let job = self.jobs.finalize(job_id, JobOutcome::Failed { error }).await?;
                    self.log
                        .append(
                            job_id,
                            NewJobEvent::lifecycle(
                                JobStatus::Failed,
                                job.progress_percent,
                                format!("Analysis failed at stage {}", stage.name),
                            ),
                        )
                        .await?;
                    return Ok(());
                }
            }
        }

        let result = ctx.artifacts.report.take().unwrap_or(serde_json::Value::Null);
        self.jobs
            .finalize(job_id, JobOutcome::Completed { result })
            .await?;
        tracing::info!(job_id, "Analysis completed");
        self.log
            .append(
                job_id,
                NewJobEvent::lifecycle(JobStatus::Completed, 100, "Analysis completed"),
            )
            .await?;
        Ok(())
    }

    /// Run one stage with its retry policy and timeout.
    ///
    /// Retries are invisible to the event stream; the attempt count is
    /// returned so the completion event can record it.
    async fn run_stage(
        &self,
        job_id: DbId,
        stage: &StageDescriptor,
        ctx: &mut StageContext,
    ) -> Result<(StageOutcome, u32), StageError> {
        let mut attempt = 0u32;
        let mut delay = stage.retry.initial_delay;

        loop {
            attempt += 1;
            let result = match tokio::time::timeout(stage.timeout, stage.handler.run(ctx)).await {
                Ok(result) => result,
                Err(_) => Err(StageError::Transient(format!(
                    "stage timed out after {:?}",
                    stage.timeout
                ))),
            };

            match result {
                Ok(outcome) => return Ok((outcome, attempt)),
                Err(err) if err.is_transient() && attempt < stage.retry.max_attempts => {
                    tracing::warn!(
                        job_id,
                        stage = stage.name,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "Transient stage failure, retrying",
                    );
                    tokio::time::sleep(delay).await;
                    delay = next_delay(delay, &stage.retry);
                }
                Err(StageError::Transient(msg)) => {
                    // Exhausted retries convert transient into permanent.
                    return Err(StageError::Permanent(format!(
                        "{msg} (after {attempt} attempts)"
                    )));
                }
                Err(err) => return Err(err),
            }
        }
    }
}
