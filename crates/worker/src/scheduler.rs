//! Polling worker scheduler.
//!
//! Each worker instance runs one scheduler loop: tick, claim, execute,
//! repeat. Exclusivity lives entirely in the store's atomic claim, so
//! any number of workers may poll the same store concurrently. A worker
//! processes one job at a time; only after the executor returns does it
//! claim again.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use triage_core::types::DbId;
use triage_db::models::event::NewJobEvent;
use triage_db::models::job::JobOutcome;
use triage_db::models::status::JobStatus;
use triage_db::store::{JobStore, StoreError};
use triage_events::EventLog;
use triage_pipeline::PipelineExecutor;

/// Message recorded when a job is force-failed by the scheduler after
/// an unexpected fault. Deliberately generic: the real error went to the
/// server log, not to the user-visible event stream.
const INTERNAL_ERROR_MESSAGE: &str = "Internal error during analysis";

/// Default polling interval for the scheduler loop.
const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Scheduler tunables.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Name recorded on claimed jobs; shows up in job snapshots.
    pub worker_name: String,
    pub poll_interval: Duration,
}

impl SchedulerConfig {
    /// Load from `WORKER_NAME` / `POLL_INTERVAL_SECS` with defaults.
    pub fn from_env() -> Self {
        let worker_name = std::env::var("WORKER_NAME")
            .unwrap_or_else(|_| format!("worker-{}", std::process::id()));
        let poll_interval = std::env::var("POLL_INTERVAL_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
            .map(Duration::from_secs)
            .unwrap_or(DEFAULT_POLL_INTERVAL);
        Self {
            worker_name,
            poll_interval,
        }
    }
}

/// Converts `pending` jobs into pipeline executions.
pub struct WorkerScheduler {
    jobs: Arc<dyn JobStore>,
    log: Arc<EventLog>,
    executor: Arc<PipelineExecutor>,
    config: SchedulerConfig,
}

impl WorkerScheduler {
    pub fn new(
        jobs: Arc<dyn JobStore>,
        log: Arc<EventLog>,
        executor: Arc<PipelineExecutor>,
        config: SchedulerConfig,
    ) -> Self {
        Self {
            jobs,
            log,
            executor,
            config,
        }
    }

    /// Run the scheduler loop until the cancellation token is triggered.
    pub async fn run(&self, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(self.config.poll_interval);
        tracing::info!(
            worker = %self.config.worker_name,
            poll_interval_ms = self.config.poll_interval.as_millis() as u64,
            "Worker scheduler started",
        );

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::info!(worker = %self.config.worker_name, "Worker scheduler shutting down");
                    break;
                }
                _ = ticker.tick() => {
                    // A single job's failure must never stop the loop.
                    if let Err(e) = self.poll_once().await {
                        tracing::error!(error = %e, "Poll cycle failed");
                    }
                }
            }
        }
    }

    /// One poll cycle: claim and execute jobs until none are pending.
    /// Returns how many jobs were processed.
    pub async fn poll_once(&self) -> Result<usize, StoreError> {
        let mut processed = 0usize;

        while let Some(job) = self
            .jobs
            .claim_next_pending(&self.config.worker_name)
            .await?
        {
            processed += 1;
            let job_id = job.id;
            tracing::info!(job_id, worker = %self.config.worker_name, "Job claimed");
            self.log
                .append(
                    job_id,
                    NewJobEvent::lifecycle(
                        JobStatus::Running,
                        job.progress_percent,
                        format!("Claimed by {}", self.config.worker_name),
                    ),
                )
                .await?;

            // The executor runs in its own task so a panic surfaces as a
            // JoinError here instead of unwinding through the loop.
            let executor = Arc::clone(&self.executor);
            let handle = tokio::spawn(async move { executor.run(job).await });

            match handle.await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    tracing::error!(job_id, error = %e, "Pipeline aborted on store failure");
                    self.force_fail(job_id).await;
                }
                Err(join_error) => {
                    tracing::error!(job_id, error = %join_error, "Pipeline task panicked");
                    self.force_fail(job_id).await;
                }
            }
        }

        Ok(processed)
    }

    /// Force a job into `failed` with a generic internal-error event.
    /// Best effort: the job may already have reached a terminal state.
    async fn force_fail(&self, job_id: DbId) {
        match self
            .jobs
            .finalize(
                job_id,
                JobOutcome::Failed {
                    error: INTERNAL_ERROR_MESSAGE.to_string(),
                },
            )
            .await
        {
            Ok(job) => {
                if let Err(e) = self
                    .log
                    .append(
                        job_id,
                        NewJobEvent::lifecycle(
                            JobStatus::Failed,
                            job.progress_percent,
                            INTERNAL_ERROR_MESSAGE,
                        ),
                    )
                    .await
                {
                    tracing::error!(job_id, error = %e, "Failed to record internal-error event");
                }
            }
            Err(StoreError::InvalidState(_)) => {
                // Already terminal; nothing to repair.
            }
            Err(e) => {
                tracing::error!(job_id, error = %e, "Failed to force-fail job");
            }
        }
    }
}
