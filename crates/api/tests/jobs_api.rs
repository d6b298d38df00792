//! HTTP surface tests against the in-memory store.

mod common;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use tower::ServiceExt;

use common::{multipart_body, test_app};

async fn body_json(response: axum::response::Response) -> serde_json::Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn health_endpoint_responds() {
    let t = test_app();
    let response = t
        .app
        .oneshot(Request::get("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["status"], "ok");
}

#[tokio::test]
async fn submit_creates_a_pending_job() {
    let t = test_app();
    let boundary = "triage-test-boundary";
    let body = multipart_body(boundary, "boot.log", "ERROR first\nINFO second");

    let response = t
        .app
        .oneshot(
            Request::post("/api/v1/jobs")
                .header(
                    "content-type",
                    format!("multipart/form-data; boundary={boundary}"),
                )
                .body(Body::from(body))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::CREATED);
    let json = body_json(response).await;
    assert_eq!(json["data"]["status"], "pending");
    assert_eq!(json["data"]["manifest"].as_array().unwrap().len(), 1);
    assert_eq!(json["data"]["manifest"][0]["filename"], "boot.log");
}

#[tokio::test]
async fn submit_without_files_is_a_validation_error() {
    let t = test_app();
    let boundary = "triage-test-boundary";
    // A form with no parts at all.
    let body = format!("--{boundary}--\r\n");

    let response = t
        .app
        .oneshot(
            Request::post("/api/v1/jobs")
                .header(
                    "content-type",
                    format!("multipart/form-data; boundary={boundary}"),
                )
                .body(Body::from(body))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = body_json(response).await;
    assert_eq!(json["code"], "VALIDATION_ERROR");
}

#[tokio::test]
async fn get_unknown_job_is_not_found() {
    let t = test_app();
    let response = t
        .app
        .oneshot(Request::get("/api/v1/jobs/999").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let json = body_json(response).await;
    assert_eq!(json["code"], "NOT_FOUND");
}

#[tokio::test]
async fn snapshot_reflects_store_state() {
    let t = test_app();
    let job = t
        .state
        .coordinator
        .submit(
            triage_api::ingest::UploadRequest {
                owner: "ops".to_string(),
                provider: "openai".to_string(),
                model: "gpt-test".to_string(),
                priority: 3,
                draft_job_id: None,
            },
            vec![triage_api::ingest::UploadFile {
                filename: "a.log".to_string(),
                bytes: b"ERROR boom".to_vec(),
            }],
        )
        .await
        .unwrap();

    let response = t
        .app
        .oneshot(
            Request::get(format!("/api/v1/jobs/{}", job.id))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["data"]["id"], job.id);
    assert_eq!(json["data"]["priority"], 3);
    assert_eq!(json["data"]["owner"], "ops");
}

#[tokio::test]
async fn cancel_pending_job_is_immediate() {
    let t = test_app();
    let job = t
        .state
        .coordinator
        .submit(
            triage_api::ingest::UploadRequest {
                owner: "ops".to_string(),
                provider: "openai".to_string(),
                model: "gpt-test".to_string(),
                priority: 0,
                draft_job_id: None,
            },
            vec![triage_api::ingest::UploadFile {
                filename: "a.log".to_string(),
                bytes: b"ERROR boom".to_vec(),
            }],
        )
        .await
        .unwrap();

    let response = t
        .app
        .clone()
        .oneshot(
            Request::post(format!("/api/v1/jobs/{}/cancel", job.id))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["data"]["status"], "cancelled");

    // Cancelling again is an invalid-state conflict.
    let response = t
        .app
        .oneshot(
            Request::post(format!("/api/v1/jobs/{}/cancel", job.id))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);
    let json = body_json(response).await;
    assert_eq!(json["code"], "INVALID_STATE");
}

#[tokio::test]
async fn list_filters_by_status() {
    let t = test_app();
    for i in 0..2 {
        t.state
            .coordinator
            .submit(
                triage_api::ingest::UploadRequest {
                    owner: "ops".to_string(),
                    provider: "openai".to_string(),
                    model: "gpt-test".to_string(),
                    priority: 0,
                    draft_job_id: None,
                },
                vec![triage_api::ingest::UploadFile {
                    filename: format!("f{i}.log"),
                    bytes: format!("ERROR {i}").into_bytes(),
                }],
            )
            .await
            .unwrap();
    }

    let response = t
        .app
        .oneshot(
            Request::get("/api/v1/jobs?status=pending")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["data"].as_array().unwrap().len(), 2);
}
