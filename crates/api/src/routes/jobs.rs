//! Handlers for the `/jobs` resource.

use axum::extract::{Multipart, Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use triage_core::types::DbId;
use triage_db::models::event::NewJobEvent;
use triage_db::models::job::{CancelOutcome, JobListQuery};
use triage_db::models::status::JobStatus;

use crate::error::{AppError, AppResult};
use crate::ingest::{UploadFile, UploadRequest};
use crate::response::DataResponse;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/jobs", post(submit).get(list))
        .route("/jobs/{id}", get(get_job))
        .route("/jobs/{id}/cancel", post(cancel))
}

// ---------------------------------------------------------------------------
// Submit
// ---------------------------------------------------------------------------

/// POST /api/v1/jobs
///
/// Multipart form: one or more `file` parts plus optional `owner`,
/// `provider`, `model`, `priority`, and `draft_job_id` fields. Returns
/// the activated job snapshot with `201 Created`.
async fn submit(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> AppResult<impl IntoResponse> {
    let mut request = UploadRequest {
        owner: "anonymous".to_string(),
        provider: "openai".to_string(),
        model: "gpt-4o-mini".to_string(),
        priority: 0,
        draft_job_id: None,
    };
    let mut files = Vec::new();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::BadRequest(format!("malformed multipart body: {e}")))?
    {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "file" => {
                let filename = field
                    .file_name()
                    .unwrap_or("upload.log")
                    .to_string();
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| AppError::BadRequest(format!("failed to read {filename}: {e}")))?;
                files.push(UploadFile {
                    filename,
                    bytes: bytes.to_vec(),
                });
            }
            "owner" => request.owner = text_field(field, "owner").await?,
            "provider" => request.provider = text_field(field, "provider").await?,
            "model" => request.model = text_field(field, "model").await?,
            "priority" => {
                request.priority = text_field(field, "priority")
                    .await?
                    .parse()
                    .map_err(|_| AppError::Validation("priority must be an integer".to_string()))?;
            }
            "draft_job_id" => {
                let id: DbId = text_field(field, "draft_job_id")
                    .await?
                    .parse()
                    .map_err(|_| {
                        AppError::Validation("draft_job_id must be a job id".to_string())
                    })?;
                request.draft_job_id = Some(id);
            }
            other => {
                return Err(AppError::BadRequest(format!(
                    "unexpected multipart field: {other:?}"
                )));
            }
        }
    }

    let job = state.coordinator.submit(request, files).await?;
    Ok((StatusCode::CREATED, Json(DataResponse { data: job })))
}

async fn text_field(field: axum::extract::multipart::Field<'_>, name: &str) -> AppResult<String> {
    field
        .text()
        .await
        .map_err(|e| AppError::BadRequest(format!("invalid {name} field: {e}")))
}

// ---------------------------------------------------------------------------
// Query
// ---------------------------------------------------------------------------

/// GET /api/v1/jobs/{id}
///
/// Job snapshot: status, progress, manifest, result.
async fn get_job(
    State(state): State<AppState>,
    Path(id): Path<DbId>,
) -> AppResult<impl IntoResponse> {
    let job = state.jobs.get(id).await?;
    Ok(Json(DataResponse { data: job }))
}

/// GET /api/v1/jobs
///
/// List jobs, newest first, with optional `status`, `limit`, `offset`.
async fn list(
    State(state): State<AppState>,
    Query(query): Query<JobListQuery>,
) -> AppResult<impl IntoResponse> {
    let jobs = state.jobs.list(&query).await?;
    Ok(Json(DataResponse { data: jobs }))
}

// ---------------------------------------------------------------------------
// Cancel
// ---------------------------------------------------------------------------

/// POST /api/v1/jobs/{id}/cancel
///
/// Pending jobs cancel immediately; running jobs are flagged and stop
/// at the next stage boundary.
async fn cancel(
    State(state): State<AppState>,
    Path(id): Path<DbId>,
) -> AppResult<impl IntoResponse> {
    let outcome = state.jobs.request_cancel(id).await?;

    match outcome {
        CancelOutcome::Cancelled => {
            let job = state.jobs.get(id).await?;
            state
                .log
                .append(
                    id,
                    NewJobEvent::lifecycle(
                        JobStatus::Cancelled,
                        job.progress_percent,
                        "Cancelled before processing",
                    ),
                )
                .await?;
            Ok(Json(DataResponse {
                data: serde_json::json!({ "status": "cancelled" }),
            }))
        }
        CancelOutcome::CancelRequested => Ok(Json(DataResponse {
            data: serde_json::json!({ "status": "cancel-requested" }),
        })),
    }
}
