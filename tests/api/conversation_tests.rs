//! Conversation API Tests

use axum::http::StatusCode;
use pretty_assertions::assert_eq;
use serde_json::{json, Value};

use chat_relay::domain::{ChatMessage, MessageRepository};

use crate::common::{user_header, user_value, TestApp};

#[tokio::test]
async fn test_open_conversation_creates_then_reuses() {
    let app = TestApp::spawn().await;

    let created = app
        .server
        .post("/api/v1/conversations")
        .add_header(user_header(), user_value("alice"))
        .json(&json!({ "otherUserId": "bob" }))
        .await;
    created.assert_status(StatusCode::CREATED);
    let first: Value = created.json();

    let existing = app
        .server
        .post("/api/v1/conversations")
        .add_header(user_header(), user_value("bob"))
        .json(&json!({ "otherUserId": "alice" }))
        .await;
    existing.assert_status(StatusCode::OK);
    let second: Value = existing.json();

    assert_eq!(first["id"], second["id"]);
    assert_eq!(first["participants"], json!(["alice", "bob"]));
}

#[tokio::test]
async fn test_open_conversation_with_self_is_rejected() {
    let app = TestApp::spawn().await;

    let response = app
        .server
        .post("/api/v1/conversations")
        .add_header(user_header(), user_value("alice"))
        .json(&json!({ "otherUserId": "alice" }))
        .await;

    response.assert_status(StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_open_conversation_requires_identity() {
    let app = TestApp::spawn().await;

    let response = app
        .server
        .post("/api/v1/conversations")
        .json(&json!({ "otherUserId": "bob" }))
        .await;

    response.assert_status(StatusCode::UNAUTHORIZED);
    let body: Value = response.json();
    assert_eq!(body["code"], 10003);
}

#[tokio::test]
async fn test_new_conversation_notifies_online_peer() {
    let app = TestApp::spawn().await;
    let mut bob = app.connect("bob");

    let conversation = app.open_conversation("alice", "bob").await;

    let event = bob.wait_for("chat:new").await.expect("chat:new");
    assert_eq!(event["conversationId"], conversation.to_string());
    assert_eq!(event["createdBy"], "alice");
}

#[tokio::test]
async fn test_list_conversations_orders_by_activity_with_unseen_counts() {
    let app = TestApp::spawn().await;
    let with_bob = app.open_conversation("alice", "bob").await;
    let with_carol = app.open_conversation("alice", "carol").await;

    app.send_text("bob", with_bob, "one").await;
    app.send_text("bob", with_bob, "two").await;
    let app_ref = &app;
    assert!(
        crate::common::eventually(|| async move {
            let latest = app_ref
                .conversations_for("alice")
                .await
                .first()
                .map(|c| c["id"].clone());
            latest == Some(json!(with_bob.to_string()))
                && app_ref.stored(with_bob).await.len() == 2
        })
        .await
    );

    let list = app.conversations_for("alice").await;

    assert_eq!(list.len(), 2);
    assert_eq!(list[0]["id"], with_bob.to_string());
    assert_eq!(list[0]["unseenCount"], 2);
    assert_eq!(list[0]["latestMessage"]["text"], "two");
    assert_eq!(list[1]["id"], with_carol.to_string());
    assert_eq!(list[1]["unseenCount"], 0);
}

#[tokio::test]
async fn test_history_marks_peer_messages_seen_and_emits_receipt() {
    let app = TestApp::spawn().await;
    let conversation = app.open_conversation("alice", "bob").await;
    let mut alice = app.connect("alice");
    app.state.gateway.join(alice.connection_id, conversation);

    app.send_text("alice", conversation, "hello").await;
    let app_ref = &app;
    assert!(
        crate::common::eventually(|| async move { app_ref.stored(conversation).await.len() == 1 })
            .await
    );

    let response = app
        .get_as("bob", &format!("/api/v1/conversations/{}/messages", conversation))
        .await;

    response.assert_status(StatusCode::OK);
    let body: Value = response.json();
    let messages: Vec<ChatMessage> = serde_json::from_value(body["messages"].clone()).unwrap();
    assert_eq!(messages.len(), 1);
    assert!(messages[0].seen);
    assert_eq!(body["markedSeen"], json!([messages[0].id.to_string()]));

    let receipt = alice.wait_for("message:read").await.expect("message:read");
    assert_eq!(receipt["messageIds"], json!([messages[0].id.to_string()]));

    // The sender reading their own history flips nothing.
    let again: Value = app
        .get_as("alice", &format!("/api/v1/conversations/{}/messages", conversation))
        .await
        .json();
    assert_eq!(again["markedSeen"], json!([]));
    let stored = app.messages.find_by_id(messages[0].id).await.unwrap().unwrap();
    assert_eq!(stored.seen_at, messages[0].seen_at);
}

#[tokio::test]
async fn test_history_rejects_non_participant_and_bad_id() {
    let app = TestApp::spawn().await;
    let conversation = app.open_conversation("alice", "bob").await;

    app.get_as("mallory", &format!("/api/v1/conversations/{}/messages", conversation))
        .await
        .assert_status(StatusCode::FORBIDDEN);
    app.get_as("alice", &format!("/api/v1/conversations/{}/messages", uuid::Uuid::new_v4()))
        .await
        .assert_status(StatusCode::NOT_FOUND);
    app.get_as("alice", "/api/v1/conversations/not-a-uuid/messages")
        .await
        .assert_status(StatusCode::BAD_REQUEST);
}

impl TestApp {
    async fn conversations_for(&self, user: &str) -> Vec<Value> {
        let response = self.get_as(user, "/api/v1/conversations").await;
        response.assert_status(StatusCode::OK);
        response.json()
    }
}
