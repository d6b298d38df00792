use std::sync::Arc;

use triage_db::store::JobStore;
use triage_events::{EventLog, ProgressStream};

use crate::config::ServerConfig;
use crate::ingest::UploadCoordinator;

/// Shared application state available to all Axum handlers via
/// `State<AppState>`.
///
/// This is cheaply cloneable (inner data is behind `Arc`). The store is
/// a trait object so tests run against the in-memory backend while
/// production wires PostgreSQL.
#[derive(Clone)]
pub struct AppState {
    pub jobs: Arc<dyn JobStore>,
    pub log: Arc<EventLog>,
    pub stream: Arc<ProgressStream>,
    pub coordinator: Arc<UploadCoordinator>,
    pub config: Arc<ServerConfig>,
}
