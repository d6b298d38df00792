//! Full-lifecycle test: submission through the coordinator, claim and
//! execution through the scheduler, history on the event log.

mod common;

use triage_api::ingest::{UploadFile, UploadRequest};
use triage_db::models::event::EventKind;
use triage_db::models::status::JobStatus;
use triage_db::store::EventStore;

use common::test_app;

const FIVE_LINE_LOG: &str = "\
2026-08-01 10:00:00 INFO  api gateway started
2026-08-01 10:00:05 ERROR upstream timeout after 30s
2026-08-01 10:00:06 ERROR upstream timeout after 45s
2026-08-01 10:00:09 WARN  retry budget exhausted
2026-08-01 10:00:12 INFO  circuit breaker opened";

fn request() -> UploadRequest {
    UploadRequest {
        owner: "ops".to_string(),
        provider: "openai".to_string(),
        model: "gpt-test".to_string(),
        priority: 0,
        draft_job_id: None,
    }
}

#[tokio::test]
async fn one_file_runs_the_whole_lifecycle() {
    let t = test_app();

    let job = t
        .state
        .coordinator
        .submit(
            request(),
            vec![UploadFile {
                filename: "incident.log".to_string(),
                bytes: FIVE_LINE_LOG.as_bytes().to_vec(),
            }],
        )
        .await
        .unwrap();
    assert_eq!(job.status, JobStatus::Pending);

    // One poll cycle takes the job draft→pending→running→completed.
    assert_eq!(t.scheduler.poll_once().await.unwrap(), 1);

    let done = t.state.jobs.get(job.id).await.unwrap();
    assert_eq!(done.status, JobStatus::Completed);
    assert_eq!(done.progress_percent, 100);
    assert_eq!(
        done.result.unwrap()["narrative"],
        "Root cause: upstream outage."
    );

    let events = t.store.list_from(job.id, 0).await.unwrap();

    // Lifecycle transitions for pending, running, completed, in order.
    let lifecycle: Vec<&str> = events
        .iter()
        .filter(|e| e.kind == EventKind::LifecycleTransition)
        .map(|e| e.detail["status"].as_str().unwrap())
        .collect();
    assert_eq!(lifecycle, vec!["pending", "running", "completed"]);

    // A started/completed pair for each of the eight stages.
    let started = events
        .iter()
        .filter(|e| e.kind == EventKind::StageStarted)
        .count();
    let completed = events
        .iter()
        .filter(|e| e.kind == EventKind::StageCompleted)
        .count();
    assert_eq!(started, 8);
    assert_eq!(completed, 8);
    assert!(events.len() >= 19);

    // Sequences are dense from 1 with no ties.
    for (i, event) in events.iter().enumerate() {
        assert_eq!(event.sequence, i as i64 + 1);
    }

    // Progress never decreases and ends at 100.
    let progress: Vec<i16> = events.iter().map(|e| e.progress_percent).collect();
    for pair in progress.windows(2) {
        assert!(pair[0] <= pair[1]);
    }
    assert_eq!(*progress.last().unwrap(), 100);
}

#[tokio::test]
async fn zero_file_submissions_never_reach_the_scheduler() {
    let t = test_app();

    // Files are required at the API boundary, so a manifest-less job can
    // only exist as a draft created directly against the store.
    let draft = t
        .state
        .jobs
        .create_draft(triage_db::models::job::NewJob {
            owner: "ops".to_string(),
            provider: "openai".to_string(),
            model: "gpt-test".to_string(),
            priority: 0,
        })
        .await
        .unwrap();

    assert_eq!(t.scheduler.poll_once().await.unwrap(), 0);
    assert_eq!(
        t.state.jobs.get(draft.id).await.unwrap().status,
        JobStatus::Draft
    );
}

#[tokio::test]
async fn cancelled_job_replays_a_clean_history() {
    let t = test_app();
    let job = t
        .state
        .coordinator
        .submit(
            request(),
            vec![UploadFile {
                filename: "incident.log".to_string(),
                bytes: FIVE_LINE_LOG.as_bytes().to_vec(),
            }],
        )
        .await
        .unwrap();

    t.state.jobs.request_cancel(job.id).await.unwrap();
    t.state
        .log
        .append(
            job.id,
            triage_db::models::event::NewJobEvent::lifecycle(
                JobStatus::Cancelled,
                0,
                "Cancelled before processing",
            ),
        )
        .await
        .unwrap();

    assert_eq!(t.scheduler.poll_once().await.unwrap(), 0);

    let events = t.store.list_from(job.id, 0).await.unwrap();
    // Queued, then cancelled; no stage events at all.
    assert_eq!(events.len(), 2);
    assert!(events
        .iter()
        .all(|e| e.kind == EventKind::LifecycleTransition));
}
