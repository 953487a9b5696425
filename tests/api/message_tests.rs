//! Message API Tests

use axum::http::StatusCode;
use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use uuid::Uuid;

use chat_relay::application::pipeline::PipelineMode;
use chat_relay::domain::{derive_submission_id, DuplicatePolicy};

use crate::common::{test_settings, TestApp};

fn idle_app() -> TestApp {
    TestApp::with_settings(
        test_settings(PipelineMode::Fanout, DuplicatePolicy::Prevent),
        false,
    )
}

#[tokio::test]
async fn test_send_message_is_accepted_and_queued() {
    let app = idle_app();
    let conversation = app.open_conversation("alice", "bob").await;

    let response = app
        .send(
            "alice",
            json!({ "conversationId": conversation, "text": "hello", "nonce": "n-1" }),
        )
        .await;

    response.assert_status(StatusCode::ACCEPTED);
    let body: Value = response.json();
    assert!(body["entryId"].as_str().is_some_and(|id| !id.is_empty()));
    assert_eq!(
        body["submissionId"],
        derive_submission_id(conversation, "alice", "n-1").to_string()
    );
    assert_eq!(body["senderId"], "alice");
    assert_eq!(body["kind"], "text");
    assert_eq!(app.queue.published(), 1);

    // Nothing is stored until the pipeline runs
    assert!(app.stored(conversation).await.is_empty());
}

#[tokio::test]
async fn test_send_message_accepts_legacy_field_names() {
    let app = idle_app();
    let conversation = app.open_conversation("alice", "bob").await;

    let response = app
        .send(
            "bob",
            json!({
                "chatId": conversation,
                "image": { "url": "https://files.example.com/a.png", "publicId": "chat/a" },
                "messageType": "image"
            }),
        )
        .await;

    response.assert_status(StatusCode::ACCEPTED);
    let body: Value = response.json();
    assert_eq!(body["kind"], "image");
    assert_eq!(body["image"]["storageKey"], "chat/a");
}

#[tokio::test]
async fn test_send_message_requires_identity() {
    let app = idle_app();
    let conversation = app.open_conversation("alice", "bob").await;

    app.server
        .post("/api/v1/messages")
        .json(&json!({ "conversationId": conversation, "text": "hi" }))
        .await
        .assert_status(StatusCode::UNAUTHORIZED);
    assert_eq!(app.queue.published(), 0);
}

#[tokio::test]
async fn test_send_message_to_unknown_or_foreign_conversation() {
    let app = idle_app();
    let conversation = app.open_conversation("alice", "bob").await;

    app.send_text("alice", Uuid::new_v4(), "hi")
        .await
        .assert_status(StatusCode::NOT_FOUND);
    app.send_text("mallory", conversation, "hi")
        .await
        .assert_status(StatusCode::FORBIDDEN);
    assert_eq!(app.queue.published(), 0);
}

#[tokio::test]
async fn test_send_message_rejects_empty_and_oversized_text() {
    let app = idle_app();
    let conversation = app.open_conversation("alice", "bob").await;

    app.send("alice", json!({ "conversationId": conversation }))
        .await
        .assert_status(StatusCode::BAD_REQUEST);
    app.send_text("alice", conversation, "")
        .await
        .assert_status(StatusCode::BAD_REQUEST);
    app.send_text("alice", conversation, &"x".repeat(4001))
        .await
        .assert_status(StatusCode::BAD_REQUEST);
    assert_eq!(app.queue.published(), 0);

    app.send_text("alice", conversation, &"x".repeat(4000))
        .await
        .assert_status(StatusCode::ACCEPTED);
}

#[tokio::test]
async fn test_send_message_reports_closed_queue() {
    let app = idle_app();
    let conversation = app.open_conversation("alice", "bob").await;
    app.queue.close();

    app.send_text("alice", conversation, "hi")
        .await
        .assert_status(StatusCode::SERVICE_UNAVAILABLE);
}
