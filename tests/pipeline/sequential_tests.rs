//! Sequential Pipeline Tests
//!
//! One worker runs storage, delivery and notification in order.

use pretty_assertions::assert_eq;
use serde_json::json;

use chat_relay::application::pipeline::{PipelineMode, SEQUENTIAL_GROUP, STORAGE_GROUP};
use chat_relay::domain::{DuplicatePolicy, SubmissionQueue, IMAGE_PLACEHOLDER};

use crate::common::{eventually, test_settings, TestApp};

fn sequential_app() -> TestApp {
    TestApp::with_settings(
        test_settings(PipelineMode::Sequential, DuplicatePolicy::Prevent),
        true,
    )
}

#[tokio::test]
async fn test_events_follow_stage_order() {
    let app = sequential_app();
    let conversation = app.open_conversation("alice", "bob").await;
    let mut bob = app.connect("bob");
    app.state.gateway.join(bob.connection_id, conversation);
    app.state.gateway.set_viewing(bob.connection_id, conversation);

    app.send_text("alice", conversation, "in order").await;

    assert!(bob.wait_for("message:read").await.is_some());
    let names: Vec<String> = bob
        .names()
        .into_iter()
        .filter(|n| n.starts_with("message:"))
        .collect();
    assert_eq!(names, vec!["message:new", "message:read"]);

    let stored = app.stored(conversation).await;
    assert_eq!(stored.len(), 1);
    assert!(stored[0].seen);
}

#[tokio::test]
async fn test_single_group_consumes_everything() {
    let app = sequential_app();
    let conversation = app.open_conversation("alice", "bob").await;
    let mut bob = app.connect("bob");

    app.send(
        "alice",
        json!({
            "conversationId": conversation,
            "image": { "url": "https://files.example.com/dog.png", "storageKey": "chat/dog" }
        }),
    )
    .await;

    let refresh = bob.wait_for("chat:refresh").await.expect("chat:refresh");
    assert_eq!(refresh["message"]["text"], IMAGE_PLACEHOLDER);

    let app = &app;
    assert!(eventually(|| async move { app.queue.is_drained(SEQUENTIAL_GROUP) }).await);
    assert_eq!(app.queue.pending(STORAGE_GROUP), 0);
    let stored = app.stored(conversation).await;
    assert_eq!(stored.len(), 1);
    assert!(!stored[0].seen);
}

#[tokio::test]
async fn test_skipped_storage_short_circuits() {
    let app = sequential_app();
    let conversation = app.open_conversation("alice", "bob").await;
    let mut bob = app.connect("bob");
    app.state.gateway.join(bob.connection_id, conversation);

    // A sender outside the conversation never gets stored, delivered or notified
    app.queue
        .publish(
            &json!({ "conversationId": conversation, "senderId": "mallory", "text": "psst" })
                .to_string(),
        )
        .await
        .unwrap();
    app.send_text("alice", conversation, "legit").await;

    let delivered = bob.wait_for("message:new").await.expect("message:new");
    assert_eq!(delivered["message"]["text"], "legit");

    let app = &app;
    assert!(eventually(|| async move { app.queue.is_drained(SEQUENTIAL_GROUP) }).await);
    assert_eq!(bob.events("message:new").len(), 1);
    assert_eq!(app.stored(conversation).await.len(), 1);
}
