//! Durable event log with live fan-out.
//!
//! [`EventLog::append`] is the only mutation path for job history. The
//! store write happens before the broadcast: a crash between the two can
//! only lose fan-out, which subscribers recover via replay; an event
//! that was never written is never observable.

use std::sync::Arc;

use tokio::sync::broadcast;
use triage_core::types::DbId;
use triage_db::models::event::{JobEvent, NewJobEvent};
use triage_db::store::{EventStore, StoreError};

use crate::bus::EventBus;

/// Append-only job history, shared by every component that emits events.
pub struct EventLog {
    store: Arc<dyn EventStore>,
    bus: EventBus,
}

impl EventLog {
    pub fn new(store: Arc<dyn EventStore>) -> Self {
        Self {
            store,
            bus: EventBus::default(),
        }
    }

    /// Durably append an event, then broadcast it to live subscribers.
    pub async fn append(&self, job_id: DbId, event: NewJobEvent) -> Result<JobEvent, StoreError> {
        let stored = self.store.append(job_id, event).await?;
        tracing::debug!(
            job_id,
            sequence = stored.sequence,
            kind = stored.kind.as_str(),
            stage = stored.stage.as_deref(),
            "Job event appended",
        );
        self.bus.publish(stored.clone());
        Ok(stored)
    }

    /// Stored events for `job_id` with `sequence > after_sequence`.
    pub async fn replay(
        &self,
        job_id: DbId,
        after_sequence: i64,
    ) -> Result<Vec<JobEvent>, StoreError> {
        self.store.list_from(job_id, after_sequence).await
    }

    /// Subscribe to the live fan-out (all jobs; filter by `job_id`).
    pub fn subscribe(&self) -> broadcast::Receiver<JobEvent> {
        self.bus.subscribe()
    }
}
