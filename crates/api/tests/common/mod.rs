//! Shared test fixtures: an app wired to the in-memory store and
//! scripted providers.

use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use triage_api::config::ServerConfig;
use triage_api::ingest::UploadCoordinator;
use triage_api::routes;
use triage_api::state::AppState;
use triage_db::store::{EventStore, JobStore, MemoryStore};
use triage_events::{EventLog, ProgressStream, StreamConfig};
use triage_pipeline::{PipelineExecutor, ProviderSet};
use triage_providers::testing::ScriptedAnalyst;
use triage_providers::{HashEmbedder, MemoryStorage, ObjectStorage};
use triage_worker::{SchedulerConfig, WorkerScheduler};

pub struct TestApp {
    pub app: Router,
    pub state: AppState,
    pub store: Arc<MemoryStore>,
    pub scheduler: WorkerScheduler,
}

pub fn test_app() -> TestApp {
    let store = Arc::new(MemoryStore::new());
    let storage = Arc::new(MemoryStorage::new());
    let jobs: Arc<dyn JobStore> = Arc::clone(&store) as Arc<dyn JobStore>;
    let log = Arc::new(EventLog::new(Arc::clone(&store) as Arc<dyn EventStore>));
    let stream = Arc::new(ProgressStream::new(
        Arc::clone(&log),
        Arc::clone(&jobs),
        StreamConfig {
            heartbeat_interval: Duration::from_secs(30),
        },
    ));
    let coordinator = Arc::new(UploadCoordinator::new(
        Arc::clone(&jobs),
        Arc::clone(&log),
        Arc::clone(&storage) as Arc<dyn ObjectStorage>,
        1024 * 1024,
    ));

    let providers = Arc::new(ProviderSet {
        storage: Arc::clone(&storage) as Arc<dyn ObjectStorage>,
        embedder: Arc::new(HashEmbedder::new()),
        analyst: Arc::new(ScriptedAnalyst::always("Root cause: upstream outage.")),
    });
    let executor = Arc::new(PipelineExecutor::standard(
        Arc::clone(&jobs),
        Arc::clone(&log),
        providers,
    ));
    let scheduler = WorkerScheduler::new(
        Arc::clone(&jobs),
        Arc::clone(&log),
        executor,
        SchedulerConfig {
            worker_name: "test-worker".to_string(),
            poll_interval: Duration::from_millis(10),
        },
    );

    let config = Arc::new(ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        cors_origins: vec![],
        request_timeout_secs: 30,
        max_upload_bytes: 1024 * 1024,
        stream_heartbeat: Duration::from_secs(30),
        embedded_worker: false,
    });

    let state = AppState {
        jobs,
        log,
        stream,
        coordinator,
        config,
    };

    let app = Router::new()
        .merge(routes::health::router())
        .nest("/api/v1", routes::api_routes())
        .with_state(state.clone());

    TestApp {
        app,
        state,
        store,
        scheduler,
    }
}

/// Build a single-file multipart body with the given boundary.
pub fn multipart_body(boundary: &str, filename: &str, content: &str) -> String {
    format!(
        "--{boundary}\r\n\
         Content-Disposition: form-data; name=\"file\"; filename=\"{filename}\"\r\n\
         Content-Type: text/plain\r\n\r\n\
         {content}\r\n\
         --{boundary}--\r\n"
    )
}
