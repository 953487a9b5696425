//! Fan-out Pipeline Tests
//!
//! Storage, delivery and notification on their own consumer groups.

use axum::http::StatusCode;
use pretty_assertions::assert_eq;
use serde_json::json;

use chat_relay::application::pipeline::{DELIVERY_GROUP, NOTIFICATION_GROUP, STORAGE_GROUP};
use chat_relay::domain::{ConversationRepository, SubmissionQueue, IMAGE_PLACEHOLDER};

use crate::common::{eventually, TestApp};

fn drained(app: &TestApp) -> bool {
    [STORAGE_GROUP, DELIVERY_GROUP, NOTIFICATION_GROUP]
        .iter()
        .all(|group| app.queue.is_drained(group))
}

#[tokio::test]
async fn test_viewing_receiver_gets_message_and_read_receipt() {
    let app = TestApp::spawn().await;
    let conversation = app.open_conversation("alice", "bob").await;
    let mut alice = app.connect("alice");
    let mut bob = app.connect("bob");
    assert!(app.state.gateway.join(alice.connection_id, conversation));
    assert!(app.state.gateway.join(bob.connection_id, conversation));
    assert!(app.state.gateway.set_viewing(bob.connection_id, conversation));

    app.send_text("alice", conversation, "hi bob")
        .await
        .assert_status(StatusCode::ACCEPTED);

    let delivered = bob.wait_for("message:new").await.expect("message:new");
    assert_eq!(delivered["message"]["text"], "hi bob");
    assert_eq!(delivered["senderId"], "alice");

    let message_id = delivered["message"]["id"].clone();
    let receipt = alice.wait_for("message:read").await.expect("message:read");
    assert_eq!(receipt["conversationId"], conversation.to_string());
    assert_eq!(receipt["messageIds"], json!([message_id]));

    let app = &app;
    assert!(
        eventually(|| async move {
            app.stored(conversation)
                .await
                .first()
                .is_some_and(|m| m.seen && m.seen_at.is_some())
        })
        .await
    );
    assert!(bob.events("chat:refresh").is_empty());
}

#[tokio::test]
async fn test_receiver_viewing_elsewhere_gets_refresh_for_image() {
    let app = TestApp::spawn().await;
    let conversation = app.open_conversation("alice", "bob").await;
    let other = app.open_conversation("bob", "carol").await;
    let mut bob = app.connect("bob");
    app.state.gateway.join(bob.connection_id, other);
    app.state.gateway.set_viewing(bob.connection_id, other);

    app.send(
        "alice",
        json!({
            "conversationId": conversation,
            "text": "caption",
            "image": { "url": "https://files.example.com/cat.png", "storageKey": "chat/cat" }
        }),
    )
    .await
    .assert_status(StatusCode::ACCEPTED);

    let refresh = bob.wait_for("chat:refresh").await.expect("chat:refresh");
    assert_eq!(refresh["conversationId"], conversation.to_string());
    assert_eq!(refresh["message"]["text"], IMAGE_PLACEHOLDER);
    assert_eq!(refresh["message"]["kind"], "image");

    let app = &app;
    assert!(eventually(|| async move { drained(app) }).await);
    let stored = app.stored(conversation).await;
    assert_eq!(stored.len(), 1);
    assert!(!stored[0].seen);
    assert_eq!(stored[0].text.as_deref(), Some("caption"));
    assert!(bob.events("message:new").is_empty());
    assert!(bob.events("message:read").is_empty());
}

#[tokio::test]
async fn test_offline_receiver_message_is_only_stored() {
    let app = TestApp::spawn().await;
    let conversation = app.open_conversation("alice", "bob").await;
    let mut alice = app.connect("alice");

    app.send_text("alice", conversation, "are you there?").await;

    let app = &app;
    assert!(
        eventually(|| async move { app.stored(conversation).await.len() == 1 && drained(app) })
            .await
    );
    let stored = app.stored(conversation).await;
    assert!(!stored[0].seen);
    assert_eq!(stored[0].seen_at, None);
    assert_eq!(alice.names(), vec!["getOnlineUsers"]);
}

#[tokio::test]
async fn test_storage_updates_latest_message() {
    let app = TestApp::spawn().await;
    let conversation = app.open_conversation("alice", "bob").await;

    app.send_text("alice", conversation, "first").await;
    app.send_text("bob", conversation, "second").await;

    let app = &app;
    assert!(
        eventually(|| async move {
            app.conversations
                .find_by_id(conversation)
                .await
                .ok()
                .flatten()
                .and_then(|c| c.latest_message)
                .is_some_and(|latest| latest.text == "second" && latest.sender_id == "bob")
        })
        .await
    );
}

#[tokio::test]
async fn test_malformed_payload_is_dropped_without_blocking() {
    let app = TestApp::spawn().await;
    let conversation = app.open_conversation("alice", "bob").await;

    app.queue.publish("{not json").await.unwrap();
    app.queue
        .publish(&json!({ "conversationId": conversation, "senderId": "alice", "text": "" }).to_string())
        .await
        .unwrap();
    app.send_text("alice", conversation, "after the garbage").await;

    let app = &app;
    assert!(
        eventually(|| async move { app.stored(conversation).await.len() == 1 && drained(app) })
            .await
    );
    assert_eq!(app.queue.published(), 3);
    assert_eq!(
        app.stored(conversation).await[0].text.as_deref(),
        Some("after the garbage")
    );
}

#[tokio::test]
async fn test_stale_disconnect_keeps_newer_presence() {
    let app = TestApp::spawn().await;
    let conversation = app.open_conversation("alice", "bob").await;
    let old = app.connect("bob");
    let mut current = app.connect("bob");

    app.state.gateway.disconnect(old.connection_id);

    let presence = app.state.gateway.presence().get("bob").expect("bob online");
    assert_eq!(presence.connection_id, current.connection_id);

    app.send_text("alice", conversation, "still there?").await;
    let refresh = current.wait_for("chat:refresh").await.expect("chat:refresh");
    assert_eq!(refresh["message"]["text"], "still there?");
}
