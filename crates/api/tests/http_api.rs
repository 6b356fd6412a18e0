//! Integration tests for the HTTP surface.

mod common;

use std::time::Duration;

use assert_matches::assert_matches;
use axum::http::{Method, StatusCode};
use common::{body_bytes, body_json, get, post_json, send, TestApp};
use jobfront_events::{ClientEvent, JobStatusEvent};
use serde_json::json;

// ---------------------------------------------------------------------------
// Test: GET /health returns 200 with expected JSON fields
// ---------------------------------------------------------------------------

#[tokio::test]
async fn health_check_returns_ok_with_json() {
    let t = TestApp::new();
    let response = get(&t.app, "/health").await;

    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers().get("x-request-id").is_some());

    let json = body_json(response).await;
    assert_eq!(json["status"], "ok");
    assert!(json["version"].is_string());
    assert_eq!(json["active_jobs"], 0);
    assert_eq!(json["connections"], 0);
}

// ---------------------------------------------------------------------------
// Test: Unknown route returns 404
// ---------------------------------------------------------------------------

#[tokio::test]
async fn unknown_route_returns_404() {
    let t = TestApp::new();
    let response = get(&t.app, "/this-route-does-not-exist").await;

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

// ---------------------------------------------------------------------------
// Test: job lookups
// ---------------------------------------------------------------------------

#[tokio::test]
async fn get_unknown_job_returns_404_envelope() {
    let t = TestApp::new();
    let response = get(&t.app, "/api/v1/jobs/missing").await;

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let json = body_json(response).await;
    assert_eq!(json["code"], "NOT_FOUND");
    assert!(json["error"].as_str().unwrap().contains("missing"));
}

#[tokio::test]
async fn invalid_job_id_is_a_validation_error() {
    let t = TestApp::new();
    let response = get(&t.app, "/api/v1/jobs/bad.id").await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["code"], "VALIDATION_ERROR");
}

#[tokio::test]
async fn get_job_reports_record_and_activity() {
    let t = TestApp::new();
    t.job("job-1");

    let response = get(&t.app, "/api/v1/jobs/job-1").await;
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["data"]["id"], "job-1");
    assert_eq!(json["data"]["package_filename"], "flow.ppg");
    assert_eq!(json["data"]["active"], false);
}

// ---------------------------------------------------------------------------
// Test: submit runs the job and the result can be downloaded
// ---------------------------------------------------------------------------

#[tokio::test]
async fn submitted_job_result_is_downloadable() {
    let mut t = TestApp::new();
    t.job("job-1");

    let response = send(&t.app, Method::POST, "/api/v1/jobs/job-1/submit", None).await;
    assert_eq!(response.status(), StatusCode::ACCEPTED);
    assert_eq!(body_json(response).await["data"]["admission"], "accepted");

    let uuid = loop {
        match t.next_event("job-1").await.event {
            ClientEvent::Result { uuid, .. } => break uuid,
            ClientEvent::Status { name } => assert!(
                !name.is_terminal(),
                "unexpected terminal status before result: {name:?}"
            ),
            other => panic!("unexpected event: {other:?}"),
        }
    };
    assert_eq!(
        t.next_event("job-1").await.event,
        ClientEvent::status(JobStatusEvent::Completed)
    );

    let response = get(&t.app, &format!("/api/v1/results/{uuid}")).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["content-type"], "application/zip");
    let disposition = response.headers()["content-disposition"].to_str().unwrap().to_string();
    assert!(disposition.contains("job-1-"));
    // Zip local file header magic.
    assert!(body_bytes(response).await.starts_with(b"PK"));
}

#[tokio::test]
async fn submit_unknown_job_returns_404() {
    let t = TestApp::new();
    let response = send(&t.app, Method::POST, "/api/v1/jobs/ghost/submit", None).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn unknown_result_returns_404() {
    let t = TestApp::new();
    let response = get(&t.app, &format!("/api/v1/results/{}", uuid::Uuid::new_v4())).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

// ---------------------------------------------------------------------------
// Test: cancel distinguishes "nothing to cancel"
// ---------------------------------------------------------------------------

#[tokio::test]
async fn cancel_inactive_job_reports_false() {
    let t = TestApp::new();
    t.job("job-1");

    let response = send(&t.app, Method::POST, "/api/v1/jobs/job-1/cancel", None).await;
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["data"]["canceled"], false);
    assert_eq!(json["data"]["job_id"], "job-1");
}

// ---------------------------------------------------------------------------
// Test: worker messages are relayed to the job's group
// ---------------------------------------------------------------------------

#[tokio::test]
async fn message_log_is_published() {
    let mut t = TestApp::new();
    t.job("job-1");

    let response = post_json(
        &t.app,
        "/api/v1/jobs/job-1/messages",
        json!({"content": "rule started", "level": "info"}),
    )
    .await;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    assert_matches!(
        t.next_event("job-1").await.event,
        ClientEvent::MessageLog { content, level: Some(level), header: None }
            if content == "rule started" && level == "info"
    );
}

// ---------------------------------------------------------------------------
// Test: interaction round trip over HTTP
// ---------------------------------------------------------------------------

#[tokio::test]
async fn interaction_request_blocks_until_finished() {
    let mut t = TestApp::new();
    t.job("job-1");

    let app = t.app.clone();
    let waiting = tokio::spawn(async move {
        post_json(
            &app,
            "/api/v1/interactions/job-1/i1/request",
            json!({"mode": "dialog", "content": "<p>Proceed?</p>"}),
        )
        .await
    });

    assert_matches!(
        t.next_event("job-1").await.event,
        ClientEvent::InteractionStart { interaction_id, .. } if interaction_id == "i1"
    );
    let known = body_json(get(&t.app, "/api/v1/interactions/job-1/i1").await).await;
    assert_eq!(known["data"]["known"], true);

    let response = post_json(
        &t.app,
        "/api/v1/interactions/job-1/i1/finish",
        json!({"result": {"proceed": true}}),
    )
    .await;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let response = tokio::time::timeout(Duration::from_secs(5), waiting)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["data"], json!({"proceed": true}));

    let known = body_json(get(&t.app, "/api/v1/interactions/job-1/i1").await).await;
    assert_eq!(known["data"]["known"], false);
}

#[tokio::test]
async fn duplicate_interaction_returns_409() {
    let mut t = TestApp::new();
    t.job("job-1");

    let app = t.app.clone();
    let first = tokio::spawn(async move {
        post_json(
            &app,
            "/api/v1/interactions/job-1/i1/request",
            json!({"mode": "page", "front_address": "http://127.0.0.1:1"}),
        )
        .await
    });
    t.next_event("job-1").await;

    let response = post_json(
        &t.app,
        "/api/v1/interactions/job-1/i1/request",
        json!({"mode": "dialog", "content": "again"}),
    )
    .await;
    assert_eq!(response.status(), StatusCode::CONFLICT);
    assert_eq!(body_json(response).await["code"], "DUPLICATE_INTERACTION");

    post_json(&t.app, "/api/v1/interactions/job-1/i1/finish", json!({"result": 1})).await;
    let response = first.await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn finish_unknown_interaction_returns_404() {
    let t = TestApp::new();
    t.job("job-1");

    let response = post_json(
        &t.app,
        "/api/v1/interactions/job-1/nope/finish",
        json!({"result": null}),
    )
    .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(body_json(response).await["code"], "UNKNOWN_INTERACTION");
}

#[tokio::test]
async fn unknown_interaction_mode_returns_400() {
    let t = TestApp::new();
    t.job("job-1");

    let response = post_json(
        &t.app,
        "/api/v1/interactions/job-1/i1/request",
        json!({"mode": "popup"}),
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = post_json(&t.app, "/api/v1/interactions/job-1/i1/request", json!({})).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn interaction_for_unknown_job_returns_404() {
    let t = TestApp::new();

    let response = post_json(
        &t.app,
        "/api/v1/interactions/ghost/i1/request",
        json!({"mode": "dialog", "content": "x"}),
    )
    .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn proxy_without_interaction_returns_404() {
    let t = TestApp::new();
    t.job("job-1");

    let response = get(&t.app, "/interactive/job-1/i1/index.html").await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(body_json(response).await["code"], "UNKNOWN_INTERACTION");

    let response = send(&t.app, Method::DELETE, "/interactive/job-1/i1/data.json", None).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
