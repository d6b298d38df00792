use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::http::header::{AUTHORIZATION, CONTENT_TYPE};
use axum::http::{HeaderName, Method, StatusCode};
use axum::Router;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::CorsLayer;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tracing::Level;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use triage_api::config::ServerConfig;
use triage_api::ingest::UploadCoordinator;
use triage_api::state::AppState;
use triage_api::routes;
use triage_db::store::{EventStore, JobStore, MemoryStore, PgStore};
use triage_events::{EventLog, ProgressStream, StreamConfig};
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
                .unwrap_or_else(|_| "triage_api=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // --- Configuration ---
    let config = ServerConfig::from_env();
    tracing::info!(host = %config.host, port = %config.port, "Loaded server configuration");

    // --- Store (PostgreSQL when configured, in-memory for local dev) ---
    let (jobs, events): (Arc<dyn JobStore>, Arc<dyn EventStore>) =
        match std::env::var("DATABASE_URL") {
            Ok(database_url) => {
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
                (Arc::clone(&store) as Arc<dyn JobStore>, store as Arc<dyn EventStore>)
            }
            Err(_) => {
                tracing::warn!("DATABASE_URL not set, using in-memory store (state is ephemeral)");
                let store = Arc::new(MemoryStore::new());
                (Arc::clone(&store) as Arc<dyn JobStore>, store as Arc<dyn EventStore>)
            }
        };

    // --- Event log, progress stream, providers ---
    let log = Arc::new(EventLog::new(events));
    let stream = Arc::new(ProgressStream::new(
        Arc::clone(&log),
        Arc::clone(&jobs),
        StreamConfig {
            heartbeat_interval: config.stream_heartbeat,
        },
    ));
    let providers = providers_from_env().await;

    let coordinator = Arc::new(UploadCoordinator::new(
        Arc::clone(&jobs),
        Arc::clone(&log),
        Arc::clone(&providers.storage),
        config.max_upload_bytes,
    ));

    // --- Embedded worker (single-node deployments) ---
    let worker_cancel = tokio_util::sync::CancellationToken::new();
    let worker_handle = if config.embedded_worker {
        let executor = Arc::new(PipelineExecutor::standard(
            Arc::clone(&jobs),
            Arc::clone(&log),
            Arc::clone(&providers),
        ));
        let scheduler = WorkerScheduler::new(
            Arc::clone(&jobs),
            Arc::clone(&log),
            executor,
            SchedulerConfig::from_env(),
        );
        let cancel = worker_cancel.clone();
        tracing::info!("Embedded worker scheduler enabled");
        Some(tokio::spawn(async move { scheduler.run(cancel).await }))
    } else {
        None
    };

    // --- App state ---
    let state = AppState {
        jobs,
        log,
        stream,
        coordinator,
        config: Arc::new(config.clone()),
    };

    // --- CORS ---
    let cors = build_cors_layer(&config);

    // --- Request ID header name ---
    let request_id_header = HeaderName::from_static("x-request-id");

    // --- Router ---
    let app = Router::new()
        // Health check at root level (not under /api/v1).
        .merge(routes::health::router())
        // API v1 routes.
        .nest("/api/v1", routes::api_routes())
        // -- Middleware stack (applied bottom-up) --
        // Panic recovery: catch panics and return 500 JSON.
        .layer(CatchPanicLayer::new())
        // Request timeout.
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            Duration::from_secs(config.request_timeout_secs),
        ))
        // Propagate request ID to response.
        .layer(PropagateRequestIdLayer::new(request_id_header.clone()))
        // Structured request/response tracing.
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        // Set request ID on incoming requests.
        .layer(SetRequestIdLayer::new(request_id_header, MakeRequestUuid))
        // CORS.
        .layer(cors)
        // Shared state.
        .with_state(state);

    // --- Start server ---
    let addr = SocketAddr::new(
        config.host.parse().expect("Invalid HOST address"),
        config.port,
    );
    tracing::info!(%addr, "Starting server");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind to address");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("Server error");

    // --- Post-shutdown cleanup ---
    tracing::info!("Server stopped accepting connections, cleaning up");

    if let Some(handle) = worker_handle {
        worker_cancel.cancel();
        let _ = tokio::time::timeout(Duration::from_secs(5), handle).await;
        tracing::info!("Embedded worker stopped");
    }

    tracing::info!("Graceful shutdown complete");
}

/// Wait for a termination signal to initiate graceful shutdown.
///
/// Handles both SIGINT (Ctrl-C) and SIGTERM (on Unix) so the server
/// shuts down cleanly whether stopped interactively or by a process
/// manager (e.g. systemd, Docker, Kubernetes).
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
            tracing::info!("Received SIGINT (Ctrl-C), starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown");
        }
    }
}

/// Build the CORS middleware layer from server configuration.
///
/// Panics at startup if any configured origin is invalid, which is the
/// desired behaviour -- we want misconfiguration to fail fast.
fn build_cors_layer(config: &ServerConfig) -> CorsLayer {
    let origins: Vec<_> = config
        .cors_origins
        .iter()
        .map(|o| {
            o.parse()
                .unwrap_or_else(|e| panic!("Invalid CORS origin '{o}': {e}"))
        })
        .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST, Method::DELETE])
        .allow_headers([CONTENT_TYPE, AUTHORIZATION])
        .allow_credentials(true)
        .max_age(Duration::from_secs(3600))
}
