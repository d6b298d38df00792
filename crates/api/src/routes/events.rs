//! WebSocket progress streaming for one job's event log.
//!
//! `GET /api/v1/jobs/{id}/events` upgrades to a WebSocket that delivers
//! the stored backlog (from `?from_sequence=N`, default 0) followed by
//! live events, with heartbeat frames while idle. The socket closes
//! after the terminal lifecycle event; a client that reconnects passes
//! the last sequence it saw and loses nothing.

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, Query, State};
use axum::response::Response;
use axum::routing::get;
use axum::Router;
use serde::Deserialize;
use tokio::sync::mpsc;
use triage_core::types::DbId;
use triage_events::StreamItem;

use crate::error::AppResult;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/jobs/{id}/events", get(stream_events))
}

#[derive(Debug, Deserialize)]
struct EventStreamQuery {
    /// Resume after this sequence number (exclusive).
    from_sequence: Option<i64>,
}

async fn stream_events(
    State(state): State<AppState>,
    Path(id): Path<DbId>,
    Query(query): Query<EventStreamQuery>,
    ws: WebSocketUpgrade,
) -> AppResult<Response> {
    // Subscribe before upgrading so an unknown job is a clean 404
    // instead of an immediately-closed socket.
    let rx = state
        .stream
        .subscribe(id, query.from_sequence.unwrap_or(0))
        .await?;

    Ok(ws.on_upgrade(move |socket| forward(socket, rx)))
}

/// Pump stream items into the socket until the stream ends or the
/// client goes away.
async fn forward(mut socket: WebSocket, mut rx: mpsc::UnboundedReceiver<StreamItem>) {
    while let Some(item) = rx.recv().await {
        let payload = match item {
            StreamItem::Event(event) => serde_json::json!({
                "type": "event",
                "event": event,
            }),
            StreamItem::Heartbeat => serde_json::json!({ "type": "heartbeat" }),
        };
        if socket
            .send(Message::Text(payload.to_string().into()))
            .await
            .is_err()
        {
            // Client disconnected; the stream task notices the dropped
            // receiver and stops on its own.
            return;
        }
    }

    let _ = socket.send(Message::Close(None)).await;
}
