//! Standalone worker binary: polls the job store and runs the pipeline.
//!
//! Any number of these may run against the same database; the store's
//! atomic claim keeps them from stepping on each other.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use triage_db::store::{EventStore, JobStore, PgStore};
use triage_events::EventLog;
use triage_pipeline::PipelineExecutor;
use triage_worker::bootstrap::providers_from_env;
use triage_worker::{SchedulerConfig, WorkerScheduler};

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    // --- Tracing ---
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "triage_worker=debug,triage_pipeline=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // --- Database ---
    let database_url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");
    let pool = triage_db::create_pool(&database_url)
        .await
        .expect("Failed to connect to database");
    triage_db::health_check(&pool)
        .await
        .expect("Database health check failed");
    triage_db::run_migrations(&pool)
        .await
        .expect("Failed to run database migrations");
    tracing::info!("Database ready");

    let store = Arc::new(PgStore::new(pool));
    let jobs: Arc<dyn JobStore> = Arc::clone(&store) as Arc<dyn JobStore>;
    let events: Arc<dyn EventStore> = store;

    // --- Event log & providers ---
    let log = Arc::new(EventLog::new(events));
    let providers = providers_from_env().await;

    // --- Scheduler ---
    let executor = Arc::new(PipelineExecutor::standard(
        Arc::clone(&jobs),
        Arc::clone(&log),
        providers,
    ));
    let config = SchedulerConfig::from_env();
    let scheduler = WorkerScheduler::new(jobs, log, executor, config);

    let cancel = CancellationToken::new();
    let signal_cancel = cancel.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        signal_cancel.cancel();
    });

    scheduler.run(cancel).await;
    tracing::info!("Worker stopped");
}

/// Wait for a termination signal to initiate graceful shutdown.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl-C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received SIGINT (Ctrl-C), shutting down");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, shutting down");
        }
    }
}
