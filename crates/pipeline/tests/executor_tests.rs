//! End-to-end executor tests against the in-memory store and scripted
//! providers.

use std::sync::Arc;
use std::time::Duration;

use triage_core::hashing::sha256_hex;
use triage_db::models::attachment::NewAttachment;
use triage_db::models::event::{EventKind, JobEvent};
use triage_db::models::job::{Job, NewJob};
use triage_db::models::status::JobStatus;
use triage_db::store::{EventStore, JobStore, MemoryStore};
use triage_events::EventLog;
use triage_pipeline::{
    registry, PipelineExecutor, ProviderSet, StageContext, StageDescriptor, StageError,
    StageHandler, StageOutcome,
};
use triage_providers::testing::{FlakyEmbedder, ScriptedAnalyst};
use triage_providers::{AnalysisProvider, EmbeddingProvider, HashEmbedder, MemoryStorage, ObjectStorage};

const SAMPLE_LOG: &str = "\
2026-08-01 10:00:00 INFO  gateway started
2026-08-01 10:00:05 ERROR upstream timeout after 30s
2026-08-01 10:00:06 ERROR upstream timeout after 31s
2026-08-01 10:00:09 ERROR connection refused from 10.0.0.7
2026-08-01 10:00:12 INFO  circuit breaker opened";

struct Harness {
    store: Arc<MemoryStore>,
    storage: Arc<MemoryStorage>,
    log: Arc<EventLog>,
}

impl Harness {
    fn new() -> Self {
        let store = Arc::new(MemoryStore::new());
        let log = Arc::new(EventLog::new(
            Arc::clone(&store) as Arc<dyn EventStore>
        ));
        Self {
            store,
            storage: Arc::new(MemoryStorage::new()),
            log,
        }
    }

    fn providers(
        &self,
        embedder: Arc<dyn EmbeddingProvider>,
        analyst: Arc<dyn AnalysisProvider>,
    ) -> Arc<ProviderSet> {
        Arc::new(ProviderSet {
            storage: Arc::clone(&self.storage) as Arc<dyn ObjectStorage>,
            embedder,
            analyst,
        })
    }

    fn executor(&self, providers: Arc<ProviderSet>) -> PipelineExecutor {
        PipelineExecutor::standard(
            Arc::clone(&self.store) as Arc<dyn JobStore>,
            Arc::clone(&self.log),
            providers,
        )
    }

    /// Upload `content`, create a job around it, and claim it so the
    /// executor sees a `running` job, the way the scheduler would hand
    /// it over.
    async fn running_job(&self, content: &str) -> Job {
        let draft = self
            .store
            .create_draft(NewJob {
                owner: "ops".to_string(),
                provider: "openai".to_string(),
                model: "gpt-test".to_string(),
                priority: 0,
            })
            .await
            .unwrap();
        let key = self.storage.put(content.as_bytes().to_vec()).await.unwrap();
        self.store
            .attach_and_activate(
                draft.id,
                NewAttachment {
                    storage_key: key,
                    filename: "incident.log".to_string(),
                    size_bytes: content.len() as i64,
                    checksum: sha256_hex(content.as_bytes()),
                },
            )
            .await
            .unwrap();
        self.store
            .claim_next_pending("test-worker")
            .await
            .unwrap()
            .expect("job should be claimable")
    }

    async fn events(&self, job_id: i64) -> Vec<JobEvent> {
        self.store.list_from(job_id, 0).await.unwrap()
    }
}

fn stage_events<'a>(events: &'a [JobEvent], kind: EventKind) -> Vec<&'a JobEvent> {
    events.iter().filter(|e| e.kind == kind).collect()
}

#[tokio::test]
async fn full_pipeline_completes_with_paired_stage_events() {
    let harness = Harness::new();
    let providers = harness.providers(
        Arc::new(HashEmbedder::new()),
        Arc::new(ScriptedAnalyst::always("The gateway lost its upstream.")),
    );
    let executor = harness.executor(providers);

    let job = harness.running_job(SAMPLE_LOG).await;
    executor.run(job.clone()).await.unwrap();

    let done = harness.store.get(job.id).await.unwrap();
    assert_eq!(done.status, JobStatus::Completed);
    assert_eq!(done.progress_percent, 100);
    let result = done.result.expect("completed job carries the report");
    assert_eq!(result["narrative"], "The gateway lost its upstream.");

    let events = harness.events(job.id).await;
    let started = stage_events(&events, EventKind::StageStarted);
    let completed = stage_events(&events, EventKind::StageCompleted);
    assert_eq!(started.len(), 8);
    assert_eq!(completed.len(), 8);
    assert!(stage_events(&events, EventKind::StageFailed).is_empty());

    // Fixed order, started/completed pair per stage.
    let expected = ["classify", "redact", "chunk", "embed", "store", "correlate", "analyze", "report"];
    for (event, name) in started.iter().zip(expected) {
        assert_eq!(event.stage.as_deref(), Some(name));
    }
    for (event, name) in completed.iter().zip(expected) {
        assert_eq!(event.stage.as_deref(), Some(name));
    }

    // Terminal lifecycle event closes the stream at 100.
    let last = events.last().unwrap();
    assert_eq!(last.kind, EventKind::LifecycleTransition);
    assert_eq!(last.progress_percent, 100);
    assert_eq!(last.detail["status"], "completed");
}

#[tokio::test]
async fn progress_is_monotonic_and_reaches_100_only_on_completion() {
    let harness = Harness::new();
    let providers = harness.providers(
        Arc::new(HashEmbedder::new()),
        Arc::new(ScriptedAnalyst::always("narrative")),
    );
    let executor = harness.executor(providers);

    let job = harness.running_job(SAMPLE_LOG).await;
    executor.run(job.clone()).await.unwrap();

    let events = harness.events(job.id).await;
    let progress: Vec<i16> = events.iter().map(|e| e.progress_percent).collect();
    for pair in progress.windows(2) {
        assert!(pair[0] <= pair[1], "progress went backwards: {progress:?}");
    }
    assert_eq!(*progress.last().unwrap(), 100);
}

#[tokio::test(start_paused = true)]
async fn transient_analyze_failures_retry_invisibly() {
    let harness = Harness::new();
    let analyst = Arc::new(ScriptedAnalyst::flaky(2, "recovered narrative"));
    let providers = harness.providers(Arc::new(HashEmbedder::new()), Arc::clone(&analyst) as _);
    let executor = harness.executor(providers);

    let job = harness.running_job(SAMPLE_LOG).await;
    executor.run(job.clone()).await.unwrap();

    // Two transient failures, success on the third attempt.
    assert_eq!(analyst.call_count(), 3);
    assert_eq!(
        harness.store.get(job.id).await.unwrap().status,
        JobStatus::Completed
    );

    // Retries surface as a single started/completed pair.
    let events = harness.events(job.id).await;
    let analyze_started: Vec<_> = events
        .iter()
        .filter(|e| e.kind == EventKind::StageStarted && e.stage.as_deref() == Some("analyze"))
        .collect();
    let analyze_completed: Vec<_> = events
        .iter()
        .filter(|e| e.kind == EventKind::StageCompleted && e.stage.as_deref() == Some("analyze"))
        .collect();
    assert_eq!(analyze_started.len(), 1);
    assert_eq!(analyze_completed.len(), 1);
    assert_eq!(analyze_completed[0].detail["attempts"], 3);
}

#[tokio::test(start_paused = true)]
async fn exhausted_retries_fail_the_job() {
    let harness = Harness::new();
    // More failures than the analyze policy's four attempts.
    let analyst = Arc::new(ScriptedAnalyst::flaky(10, "never reached"));
    let providers = harness.providers(Arc::new(HashEmbedder::new()), analyst as _);
    let executor = harness.executor(providers);

    let job = harness.running_job(SAMPLE_LOG).await;
    executor.run(job.clone()).await.unwrap();

    let done = harness.store.get(job.id).await.unwrap();
    assert_eq!(done.status, JobStatus::Failed);
    assert!(done.error_message.unwrap().contains("analyze"));

    let events = harness.events(job.id).await;
    let failed = stage_events(&events, EventKind::StageFailed);
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].stage.as_deref(), Some("analyze"));
    assert!(failed[0].message.contains("attempts"));
}

#[tokio::test]
async fn empty_content_fails_classify_and_stops_the_sequence() {
    let harness = Harness::new();
    let providers = harness.providers(
        Arc::new(HashEmbedder::new()),
        Arc::new(ScriptedAnalyst::always("unused")),
    );
    let executor = harness.executor(providers);

    let job = harness.running_job("   \n  \n").await;
    executor.run(job.clone()).await.unwrap();

    let done = harness.store.get(job.id).await.unwrap();
    assert_eq!(done.status, JobStatus::Failed);

    let events = harness.events(job.id).await;
    let failed = stage_events(&events, EventKind::StageFailed);
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].stage.as_deref(), Some("classify"));

    // After a stage-failed, no later stage ever starts.
    let failed_seq = failed[0].sequence;
    assert!(events
        .iter()
        .filter(|e| e.kind == EventKind::StageStarted)
        .all(|e| e.sequence < failed_seq));

    let last = events.last().unwrap();
    assert_eq!(last.kind, EventKind::LifecycleTransition);
    assert_eq!(last.detail["status"], "failed");
}

#[tokio::test]
async fn cancellation_is_honored_before_the_next_stage() {
    let harness = Harness::new();
    let providers = harness.providers(
        Arc::new(HashEmbedder::new()),
        Arc::new(ScriptedAnalyst::always("unused")),
    );
    let executor = harness.executor(providers);

    let job = harness.running_job(SAMPLE_LOG).await;
    // Flag arrives while the job is running, before the executor starts.
    harness.store.request_cancel(job.id).await.unwrap();

    executor.run(job.clone()).await.unwrap();

    let done = harness.store.get(job.id).await.unwrap();
    assert_eq!(done.status, JobStatus::Cancelled);

    let events = harness.events(job.id).await;
    assert!(stage_events(&events, EventKind::StageStarted).is_empty());
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].kind, EventKind::LifecycleTransition);
    assert_eq!(events[0].detail["status"], "cancelled");
}

#[tokio::test(start_paused = true)]
async fn flaky_embedder_recovers_within_policy() {
    let harness = Harness::new();
    let providers = harness.providers(
        Arc::new(FlakyEmbedder::new(1)),
        Arc::new(ScriptedAnalyst::always("narrative")),
    );
    let executor = harness.executor(providers);

    let job = harness.running_job(SAMPLE_LOG).await;
    executor.run(job.clone()).await.unwrap();

    assert_eq!(
        harness.store.get(job.id).await.unwrap().status,
        JobStatus::Completed
    );
}

// ---------------------------------------------------------------------------
// Timeout behavior with a custom stage list
// ---------------------------------------------------------------------------

struct StallingStage;

#[async_trait::async_trait]
impl StageHandler for StallingStage {
    async fn run(&self, _ctx: &mut StageContext) -> Result<StageOutcome, StageError> {
        tokio::time::sleep(Duration::from_secs(3600)).await;
        Ok(StageOutcome {
            summary: "never happens".to_string(),
            detail: serde_json::Value::Null,
        })
    }
}

#[tokio::test(start_paused = true)]
async fn stage_timeout_is_transient_then_fails_after_retries() {
    let harness = Harness::new();
    let providers = harness.providers(
        Arc::new(HashEmbedder::new()),
        Arc::new(ScriptedAnalyst::always("unused")),
    );

    let mut stages = registry();
    stages.truncate(1);
    let stalled = StageDescriptor {
        name: "classify",
        progress_start: 0,
        progress_end: 10,
        retry: triage_pipeline::RetryPolicy {
            max_attempts: 2,
            initial_delay: Duration::from_millis(10),
            ..Default::default()
        },
        timeout: Duration::from_millis(50),
        handler: Arc::new(StallingStage),
    };
    stages[0] = stalled;

    let executor = PipelineExecutor::new(
        stages,
        Arc::clone(&harness.store) as Arc<dyn JobStore>,
        Arc::clone(&harness.log),
        providers,
    );

    let job = harness.running_job(SAMPLE_LOG).await;
    executor.run(job.clone()).await.unwrap();

    let done = harness.store.get(job.id).await.unwrap();
    assert_eq!(done.status, JobStatus::Failed);
    assert!(done.error_message.unwrap().contains("timed out"));
}
