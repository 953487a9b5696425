//! Health Check API Tests

use axum::http::StatusCode;
use pretty_assertions::assert_eq;
use serde_json::Value;

use chat_relay::application::pipeline::PipelineMode;
use chat_relay::domain::DuplicatePolicy;

use crate::common::{eventually, test_settings, TestApp};

#[tokio::test]
async fn test_health_check_returns_ok() {
    let app = TestApp::spawn().await;

    let response = app.server.get("/health").await;

    response.assert_status(StatusCode::OK);
    let body: Value = response.json();
    assert_eq!(body["status"], "healthy");
}

#[tokio::test]
async fn test_liveness_probe() {
    let app = TestApp::spawn().await;

    let response = app.server.get("/health/live").await;

    response.assert_status(StatusCode::OK);
    let body: Value = response.json();
    assert_eq!(body["status"], "alive");
}

#[tokio::test]
async fn test_readiness_reports_store_and_queue() {
    let app = TestApp::spawn().await;
    let _client = app.connect("alice");

    let response = app.server.get("/health/ready").await;

    response.assert_status(StatusCode::OK);
    let body: Value = response.json();
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["checks"]["store"]["message"], "in-memory");
    assert_eq!(body["checks"]["queue"]["status"], "healthy");
    assert_eq!(body["checks"]["websocket"]["active_connections"], 1);
}

#[tokio::test]
async fn test_readiness_unhealthy_when_queue_closed() {
    let app = TestApp::with_settings(
        test_settings(PipelineMode::Fanout, DuplicatePolicy::Prevent),
        false,
    );
    app.queue.close();

    let response = app.server.get("/health/ready").await;

    response.assert_status(StatusCode::SERVICE_UNAVAILABLE);
    let body: Value = response.json();
    assert_eq!(body["checks"]["queue"]["status"], "unhealthy");
}

#[tokio::test]
async fn test_metrics_endpoint_exposes_pipeline_families() {
    let app = TestApp::spawn().await;
    let conversation = app.open_conversation("alice", "bob").await;
    app.send_text("alice", conversation, "hi").await;

    let app = &app;
    let exposed = eventually(|| async move {
        let text = app.server.get("/metrics").await.text();
        text.contains("chat_relay_http_requests_total")
            && text.contains("chat_relay_pipeline_events_total")
    })
    .await;

    assert!(exposed);
}
