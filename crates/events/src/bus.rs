//! In-process event bus backed by a `tokio::sync::broadcast` channel.
//!
//! [`EventBus`] fans stored [`JobEvent`]s out to live subscribers. It is
//! designed to be shared via `Arc` across the application. Publishing
//! never blocks: slow receivers observe `RecvError::Lagged` and recover
//! by replaying from the event store, which stays the source of truth.

use tokio::sync::broadcast;
use triage_db::models::event::JobEvent;

/// Default buffer capacity for the broadcast channel.
const DEFAULT_CAPACITY: usize = 1024;

/// In-process fan-out bus for job events.
pub struct EventBus {
    sender: broadcast::Sender<JobEvent>,
}

impl EventBus {
    /// Create a bus with a specific channel capacity.
    ///
    /// When the buffer is full, the oldest un-consumed messages are
    /// dropped and slow receivers will observe `RecvError::Lagged`.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish an event to all current subscribers.
    ///
    /// If there are no active subscribers the event is silently dropped;
    /// the event store already holds the durable copy.
    pub fn publish(&self, event: JobEvent) {
        // Ignore the SendError — it only means there are zero receivers.
        let _ = self.sender.send(event);
    }

    /// Subscribe to all events published on this bus.
    pub fn subscribe(&self) -> broadcast::Receiver<JobEvent> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use triage_db::models::event::{EventKind, JobEvent};

    use super::*;

    fn event(job_id: i64, sequence: i64) -> JobEvent {
        JobEvent {
            id: sequence,
            job_id,
            sequence,
            kind: EventKind::StageStarted,
            stage: Some("classify".to_string()),
            message: "Stage classify started".to_string(),
            progress_percent: 0,
            detail: serde_json::Value::Object(Default::default()),
            created_at: chrono::Utc::now(),
        }
    }

    #[tokio::test]
    async fn publish_and_receive_single_subscriber() {
        let bus = EventBus::default();
        let mut rx = bus.subscribe();

        bus.publish(event(7, 1));

        let received = rx.recv().await.expect("should receive the event");
        assert_eq!(received.job_id, 7);
        assert_eq!(received.sequence, 1);
    }

    #[tokio::test]
    async fn multiple_subscribers_receive_same_event() {
        let bus = EventBus::default();
        let mut rx1 = bus.subscribe();
        let mut rx2 = bus.subscribe();

        bus.publish(event(1, 1));

        assert_eq!(rx1.recv().await.unwrap().sequence, 1);
        assert_eq!(rx2.recv().await.unwrap().sequence, 1);
    }

    #[test]
    fn publish_with_no_subscribers_does_not_panic() {
        let bus = EventBus::default();
        bus.publish(event(1, 1));
    }
}
