pub mod events;
pub mod health;
pub mod jobs;

use axum::Router;

use crate::state::AppState;

/// All `/api/v1` routes.
pub fn api_routes() -> Router<AppState> {
    Router::new().merge(jobs::router()).merge(events::router())
}
