//! Live/replayable progress streams over a job's event log.
//!
//! Each subscriber gets its own forwarding task and unbounded channel,
//! so one slow or disconnected consumer never blocks `append` or the
//! pipeline. The forwarding task subscribes to the bus *before* reading
//! the backlog and deduplicates by sequence number, which closes the
//! window between replay and live tail: no duplicates, no gaps.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, mpsc};
use triage_core::types::DbId;
use triage_db::models::event::JobEvent;
use triage_db::store::{JobStore, StoreError};

use crate::log::EventLog;

/// Tunables for progress streaming.
#[derive(Debug, Clone)]
pub struct StreamConfig {
    /// Idle interval after which a heartbeat is injected so consumers
    /// can tell a quiet stream from a dead connection.
    pub heartbeat_interval: Duration,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval: Duration::from_secs(15),
        }
    }
}

/// One item delivered to a progress subscriber.
#[derive(Debug, Clone)]
pub enum StreamItem {
    Event(JobEvent),
    /// Liveness signal; not persisted and carries no sequence number.
    Heartbeat,
}

/// Serves live/replayable views of job event logs.
pub struct ProgressStream {
    log: Arc<EventLog>,
    jobs: Arc<dyn JobStore>,
    config: StreamConfig,
}

impl ProgressStream {
    pub fn new(log: Arc<EventLog>, jobs: Arc<dyn JobStore>, config: StreamConfig) -> Self {
        Self { log, jobs, config }
    }

    /// Subscribe to a job's events from `after_sequence` (0 = from the
    /// beginning). Returns an error if the job does not exist.
    ///
    /// The returned channel yields the stored backlog first, then live
    /// events, with heartbeats while idle. It closes after the terminal
    /// lifecycle event has been delivered (or immediately, if the job is
    /// already terminal and the caller has seen everything).
    pub async fn subscribe(
        &self,
        job_id: DbId,
        after_sequence: i64,
    ) -> Result<mpsc::UnboundedReceiver<StreamItem>, StoreError> {
        // Surface UnknownJob to the caller instead of an empty stream.
        self.jobs.get(job_id).await?;

        let (tx, rx) = mpsc::unbounded_channel();
        let log = Arc::clone(&self.log);
        let jobs = Arc::clone(&self.jobs);
        let heartbeat = self.config.heartbeat_interval;

        tokio::spawn(async move {
            if let Err(e) = forward(log, jobs, job_id, after_sequence, heartbeat, tx).await {
                tracing::warn!(job_id, error = %e, "Progress stream ended with store error");
            }
        });

        Ok(rx)
    }
}

/// Forwarding loop for one subscriber.
async fn forward(
    log: Arc<EventLog>,
    jobs: Arc<dyn JobStore>,
    job_id: DbId,
    after_sequence: i64,
    heartbeat: Duration,
    tx: mpsc::UnboundedSender<StreamItem>,
) -> Result<(), StoreError> {
    // Subscribe first so nothing appended during replay is missed.
    let mut live = log.subscribe();
    let mut last_sequence = after_sequence;

    for event in log.replay(job_id, after_sequence).await? {
        last_sequence = event.sequence;
        let terminal = event.is_terminal();
        if tx.send(StreamItem::Event(event)).is_err() {
            return Ok(());
        }
        if terminal {
            return Ok(());
        }
    }

    // The terminal event may predate `after_sequence` on a resume.
    if jobs.get(job_id).await?.status.is_terminal() {
        return Ok(());
    }

    let mut ticker = tokio::time::interval(heartbeat);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    ticker.reset(); // skip the immediate first tick

    loop {
        tokio::select! {
            received = live.recv() => match received {
                Ok(event) => {
                    if event.job_id != job_id || event.sequence <= last_sequence {
                        continue;
                    }
                    // A gap here means the bus dropped something for this
                    // job while we were busy; refill from the store.
                    if event.sequence > last_sequence + 1 {
                        for missed in log.replay(job_id, last_sequence).await? {
                            if missed.sequence >= event.sequence {
                                break;
                            }
                            last_sequence = missed.sequence;
                            let terminal = missed.is_terminal();
                            if tx.send(StreamItem::Event(missed)).is_err() {
                                return Ok(());
                            }
                            if terminal {
                                return Ok(());
                            }
                        }
                    }
                    last_sequence = event.sequence;
                    let terminal = event.is_terminal();
                    if tx.send(StreamItem::Event(event)).is_err() {
                        return Ok(());
                    }
                    if terminal {
                        return Ok(());
                    }
                    ticker.reset();
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(job_id, skipped, "Progress stream lagged, resyncing from store");
                    for event in log.replay(job_id, last_sequence).await? {
                        last_sequence = event.sequence;
                        let terminal = event.is_terminal();
                        if tx.send(StreamItem::Event(event)).is_err() {
                            return Ok(());
                        }
                        if terminal {
                            return Ok(());
                        }
                    }
                }
                Err(broadcast::error::RecvError::Closed) => return Ok(()),
            },
            _ = ticker.tick() => {
                if tx.send(StreamItem::Heartbeat).is_err() {
                    return Ok(());
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use triage_db::models::event::NewJobEvent;
    use triage_db::models::job::NewJob;
    use triage_db::models::status::JobStatus;
    use triage_db::store::{EventStore, MemoryStore};

    use super::*;

    struct Fixture {
        store: Arc<MemoryStore>,
        log: Arc<EventLog>,
        stream: ProgressStream,
        job_id: DbId,
    }

    async fn fixture(heartbeat: Duration) -> Fixture {
        let store = Arc::new(MemoryStore::new());
        let job = store
            .create_draft(NewJob {
                owner: "ops".to_string(),
                provider: "openai".to_string(),
                model: "m".to_string(),
                priority: 0,
            })
            .await
            .unwrap();
        let log = Arc::new(EventLog::new(Arc::clone(&store) as Arc<dyn EventStore>));
        let stream = ProgressStream::new(
            Arc::clone(&log),
            Arc::clone(&store) as Arc<dyn JobStore>,
            StreamConfig {
                heartbeat_interval: heartbeat,
            },
        );
        Fixture {
            store,
            log,
            stream,
            job_id: job.id,
        }
    }

    fn sequences(items: &[StreamItem]) -> Vec<i64> {
        items
            .iter()
            .filter_map(|i| match i {
                StreamItem::Event(e) => Some(e.sequence),
                StreamItem::Heartbeat => None,
            })
            .collect()
    }

    #[tokio::test]
    async fn unknown_job_is_an_error() {
        let f = fixture(Duration::from_secs(30)).await;
        assert!(f.stream.subscribe(f.job_id + 100, 0).await.is_err());
    }

    #[tokio::test]
    async fn replay_then_live_without_duplicates_or_gaps() {
        let f = fixture(Duration::from_secs(30)).await;

        // Backlog of three events, subscriber resumes after the first.
        for i in 0..3 {
            f.log
                .append(f.job_id, NewJobEvent::stage_started("classify", i))
                .await
                .unwrap();
        }
        let mut rx = f.stream.subscribe(f.job_id, 1).await.unwrap();

        // Live events, ending with a terminal transition.
        f.log
            .append(f.job_id, NewJobEvent::stage_started("redact", 10))
            .await
            .unwrap();
        f.log
            .append(
                f.job_id,
                NewJobEvent::lifecycle(JobStatus::Completed, 100, "done"),
            )
            .await
            .unwrap();

        let mut items = Vec::new();
        while let Some(item) = rx.recv().await {
            items.push(item);
        }
        assert_eq!(sequences(&items), vec![2, 3, 4, 5]);
    }

    #[tokio::test]
    async fn stream_closes_after_terminal_event() {
        let f = fixture(Duration::from_secs(30)).await;
        let mut rx = f.stream.subscribe(f.job_id, 0).await.unwrap();

        f.log
            .append(
                f.job_id,
                NewJobEvent::lifecycle(JobStatus::Failed, 40, "stage redact failed"),
            )
            .await
            .unwrap();

        let item = rx.recv().await.unwrap();
        match item {
            StreamItem::Event(e) => assert_eq!(e.sequence, 1),
            StreamItem::Heartbeat => panic!("expected event"),
        }
        // Channel closes once the terminal event is delivered.
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn resume_past_terminal_closes_immediately() {
        let f = fixture(Duration::from_secs(30)).await;
        // Drive the job to a terminal status with its terminal event.
        {
            use triage_db::models::attachment::NewAttachment;
            f.store
                .attach_and_activate(
                    f.job_id,
                    NewAttachment {
                        storage_key: "k".to_string(),
                        filename: "a.log".to_string(),
                        size_bytes: 1,
                        checksum: "c".to_string(),
                    },
                )
                .await
                .unwrap();
            f.store.claim_next_pending("w").await.unwrap();
            f.store
                .finalize(
                    f.job_id,
                    triage_db::models::job::JobOutcome::Cancelled,
                )
                .await
                .unwrap();
        }
        f.log
            .append(
                f.job_id,
                NewJobEvent::lifecycle(JobStatus::Cancelled, 0, "cancelled"),
            )
            .await
            .unwrap();

        // The subscriber has already seen sequence 1.
        let mut rx = f.stream.subscribe(f.job_id, 1).await.unwrap();
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn heartbeats_flow_while_idle() {
        let f = fixture(Duration::from_millis(30)).await;
        let mut rx = f.stream.subscribe(f.job_id, 0).await.unwrap();

        let item = tokio::time::timeout(Duration::from_millis(500), rx.recv())
            .await
            .expect("expected a heartbeat before timeout")
            .unwrap();
        assert!(matches!(item, StreamItem::Heartbeat));
    }

    #[tokio::test]
    async fn independent_subscribers_see_the_same_events() {
        let f = fixture(Duration::from_secs(30)).await;
        let mut a = f.stream.subscribe(f.job_id, 0).await.unwrap();
        let mut b = f.stream.subscribe(f.job_id, 0).await.unwrap();

        f.log
            .append(
                f.job_id,
                NewJobEvent::lifecycle(JobStatus::Completed, 100, "done"),
            )
            .await
            .unwrap();

        for rx in [&mut a, &mut b] {
            match rx.recv().await.unwrap() {
                StreamItem::Event(e) => assert_eq!(e.sequence, 1),
                StreamItem::Heartbeat => panic!("expected event"),
            }
            assert!(rx.recv().await.is_none());
        }
    }

    #[tokio::test]
    async fn slow_subscriber_does_not_block_appends() {
        let f = fixture(Duration::from_secs(30)).await;
        // Subscribe and never consume.
        let _rx = f.stream.subscribe(f.job_id, 0).await.unwrap();

        // Appends stay non-blocking regardless.
        for i in 0..200 {
            f.log
                .append(f.job_id, NewJobEvent::stage_started("classify", i % 100))
                .await
                .unwrap();
        }
        let stored = f.log.replay(f.job_id, 0).await.unwrap();
        assert_eq!(stored.len(), 200);
    }
}
