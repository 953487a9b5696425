//! Redelivery Tests
//!
//! A storage consumer that dies before acknowledging leaves its entry
//! pending; the next worker reclaims it after the ack timeout.

use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use uuid::Uuid;

use chat_relay::application::pipeline::{
    PipelineMode, StorageStage, SubmissionHandler, DELIVERY_GROUP, NOTIFICATION_GROUP,
    STORAGE_GROUP,
};
use chat_relay::domain::{DuplicatePolicy, MessageRepository, MessageSubmissionEvent, SubmissionQueue};

use crate::common::{eventually, test_settings, TestApp};

/// Publish one submission and run storage for it without acknowledging,
/// as a worker that crashed right after the insert would.
async fn store_without_ack(app: &TestApp, conversation: Uuid) -> Uuid {
    for group in [STORAGE_GROUP, DELIVERY_GROUP, NOTIFICATION_GROUP] {
        app.queue.ensure_group(group).await.unwrap();
    }

    let body: Value = app
        .send(
            "alice",
            json!({ "conversationId": conversation, "text": "survives a crash", "nonce": "n-1" }),
        )
        .await
        .json();
    let submission_id: Uuid = body["submissionId"].as_str().unwrap().parse().unwrap();

    let delivery = app
        .queue
        .receive(STORAGE_GROUP, "crashed-consumer")
        .await
        .unwrap()
        .expect("pending submission");
    let event = MessageSubmissionEvent::decode(delivery.payload.as_bytes()).unwrap();
    let stage = StorageStage::new(
        app.conversations.clone(),
        app.messages.clone(),
        app.settings.pipeline.duplicate_policy,
    );
    stage.handle(&event).await.unwrap();
    assert_eq!(app.queue.pending(STORAGE_GROUP), 1);

    submission_id
}

#[tokio::test]
async fn test_reclaimed_submission_is_stored_once_under_prevent() {
    let mut app = TestApp::with_settings(
        test_settings(PipelineMode::Fanout, DuplicatePolicy::Prevent),
        false,
    );
    let conversation = app.open_conversation("alice", "bob").await;
    let submission_id = store_without_ack(&app, conversation).await;
    assert_eq!(app.messages.count_for_submission(submission_id), 1);

    app.start_pipeline();

    let app_ref = &app;
    assert!(eventually(|| async move { app_ref.queue.is_drained(STORAGE_GROUP) }).await);
    assert_eq!(app.messages.count_for_submission(submission_id), 1);
    assert_eq!(app.stored(conversation).await.len(), 1);
    app.stop_pipeline().await;
}

#[tokio::test]
async fn test_reclaimed_submission_duplicates_under_tolerate() {
    let mut app = TestApp::with_settings(
        test_settings(PipelineMode::Fanout, DuplicatePolicy::Tolerate),
        false,
    );
    let conversation = app.open_conversation("alice", "bob").await;
    let submission_id = store_without_ack(&app, conversation).await;

    app.start_pipeline();

    // At-least-once without idempotent ids: the replay writes a second record
    let app_ref = &app;
    assert!(eventually(|| async move { app_ref.queue.is_drained(STORAGE_GROUP) }).await);
    assert_eq!(app.messages.count_for_submission(submission_id), 2);
    app.stop_pipeline().await;
}

#[tokio::test]
async fn test_client_retry_does_not_unsee_or_re_receipt() {
    let app = TestApp::spawn().await;
    let conversation = app.open_conversation("alice", "bob").await;
    let mut alice = app.connect("alice");
    let bob = app.connect("bob");
    app.state.gateway.join(alice.connection_id, conversation);
    app.state.gateway.join(bob.connection_id, conversation);
    app.state.gateway.set_viewing(bob.connection_id, conversation);

    let first = json!({ "conversationId": conversation, "text": "once", "nonce": "retry-me" });
    app.send("alice", first.clone()).await;
    assert!(alice.wait_for("message:read").await.is_some());

    let seen = app.stored(conversation).await[0].clone();
    assert!(seen.seen);

    // Same nonce, same submission: storage resolves to the existing record
    app.send("alice", first).await;
    let app_ref = &app;
    assert!(
        eventually(|| async move {
            [STORAGE_GROUP, DELIVERY_GROUP, NOTIFICATION_GROUP]
                .iter()
                .all(|g| app_ref.queue.is_drained(g))
                && app_ref.queue.published() == 2
        })
        .await
    );

    let stored = app.messages.find_by_id(seen.id).await.unwrap().unwrap();
    assert!(stored.seen);
    assert_eq!(stored.seen_at, seen.seen_at);
    assert_eq!(app.stored(conversation).await.len(), 1);
    assert_eq!(alice.events("message:read").len(), 1);
}

#[tokio::test]
async fn test_shutdown_stops_workers() {
    let mut app = TestApp::spawn().await;
    let conversation = app.open_conversation("alice", "bob").await;
    app.stop_pipeline().await;

    app.send_text("alice", conversation, "queued while down").await;
    tokio::time::sleep(std::time::Duration::from_millis(100)).await;
    assert!(app.stored(conversation).await.is_empty());

    app.start_pipeline();
    let app_ref = &app;
    assert!(eventually(|| async move { app_ref.stored(conversation).await.len() == 1 }).await);
}
