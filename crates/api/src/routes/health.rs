use axum::routing::get;
use axum::{Json, Router};

use crate::state::AppState;

/// Root-level health check (not under `/api/v1`).
pub fn router() -> Router<AppState> {
    Router::new().route("/health", get(health))
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}
