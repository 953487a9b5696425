//! Common Test Utilities
//!
//! Application builder over the in-memory bindings, gateway clients and
//! polling helpers.

#![allow(dead_code)]

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use axum::http::{HeaderName, HeaderValue};
use axum_test::{TestResponse, TestServer};
use serde_json::{json, Value};
use tokio::sync::mpsc;
use uuid::Uuid;

use chat_relay::application::pipeline::PipelineMode;
use chat_relay::config::Settings;
use chat_relay::domain::{ChatMessage, ConnectionId, DuplicatePolicy, MessageRepository};
use chat_relay::infrastructure::memory::{
    InMemoryConversationRepository, InMemoryMessageRepository, InMemoryQueue,
};
use chat_relay::infrastructure::presence::InMemoryPresenceRegistry;
use chat_relay::startup::{
    build_router, build_state, spawn_pipeline, AppState, Infrastructure, PipelineHandle,
};

/// How long a test waits for the pipeline before failing
pub const WAIT: Duration = Duration::from_secs(3);

/// Settings tuned for fast tests
pub fn test_settings(mode: PipelineMode, duplicate_policy: DuplicatePolicy) -> Settings {
    let mut settings = Settings::defaults().expect("default settings");
    settings.queue.block_ms = 25;
    settings.queue.ack_timeout_ms = 200;
    settings.queue.reconnect_delay_ms = 50;
    settings.pipeline.mode = mode;
    settings.pipeline.duplicate_policy = duplicate_policy;
    settings.pipeline.lookup_attempts = 5;
    settings.pipeline.lookup_backoff_ms = 20;
    settings.pipeline.seen_settle_ms = 30;
    settings
}

/// Test application with its in-memory backing kept for inspection
pub struct TestApp {
    pub server: TestServer,
    pub state: AppState,
    pub settings: Settings,
    pub infra: Infrastructure,
    pub conversations: Arc<InMemoryConversationRepository>,
    pub messages: Arc<InMemoryMessageRepository>,
    pub queue: Arc<InMemoryQueue>,
    pub presence: Arc<InMemoryPresenceRegistry>,
    pipeline: Option<PipelineHandle>,
}

impl TestApp {
    /// Fan-out pipeline, duplicate prevention, workers running
    pub async fn spawn() -> Self {
        Self::with_settings(test_settings(PipelineMode::Fanout, DuplicatePolicy::Prevent), true)
    }

    pub fn with_settings(settings: Settings, run_pipeline: bool) -> Self {
        let conversations = Arc::new(InMemoryConversationRepository::new());
        let messages = Arc::new(InMemoryMessageRepository::new());
        let queue = Arc::new(InMemoryQueue::new(
            settings.queue.block(),
            settings.queue.ack_timeout(),
        )
        .with_max_len(settings.queue.max_len));
        let presence = Arc::new(InMemoryPresenceRegistry::new());

        let infra = Infrastructure {
            conversations: conversations.clone(),
            messages: messages.clone(),
            queue: queue.clone(),
            presence: presence.clone(),
            db: None,
        };

        let state = build_state(settings.clone(), &infra);
        let server = TestServer::new(build_router(state.clone())).expect("test server");

        let mut app = Self {
            server,
            state,
            settings,
            infra,
            conversations,
            messages,
            queue,
            presence,
            pipeline: None,
        };
        if run_pipeline {
            app.start_pipeline();
        }
        app
    }

    pub fn start_pipeline(&mut self) {
        if self.pipeline.is_none() {
            self.pipeline = Some(spawn_pipeline(
                &self.settings,
                &self.infra,
                self.state.gateway.clone(),
            ));
        }
    }

    pub async fn stop_pipeline(&mut self) {
        if let Some(pipeline) = self.pipeline.take() {
            pipeline.shutdown().await;
        }
    }

    /// Open (or fetch) the conversation between two users over HTTP
    pub async fn open_conversation(&self, caller: &str, other: &str) -> Uuid {
        let response = self
            .server
            .post("/api/v1/conversations")
            .add_header(user_header(), user_value(caller))
            .json(&json!({ "otherUserId": other }))
            .await;
        let body: Value = response.json();
        body["id"].as_str().and_then(|id| id.parse().ok()).expect("conversation id")
    }

    pub async fn send(&self, sender: &str, body: Value) -> TestResponse {
        self.server
            .post("/api/v1/messages")
            .add_header(user_header(), user_value(sender))
            .json(&body)
            .await
    }

    pub async fn send_text(&self, sender: &str, conversation_id: Uuid, text: &str) -> TestResponse {
        self.send(sender, json!({ "conversationId": conversation_id, "text": text }))
            .await
    }

    pub async fn get_as(&self, user: &str, path: &str) -> TestResponse {
        self.server
            .get(path)
            .add_header(user_header(), user_value(user))
            .await
    }

    /// Register a live gateway connection for `user`
    pub fn connect(&self, user: &str) -> Client {
        let (tx, rx) = mpsc::unbounded_channel();
        let connection_id = self.state.gateway.connect(user, tx);
        Client {
            connection_id,
            rx,
            frames: Vec::new(),
        }
    }

    pub async fn stored(&self, conversation_id: Uuid) -> Vec<ChatMessage> {
        self.messages
            .find_by_conversation(conversation_id)
            .await
            .expect("in-memory store")
    }
}

/// Test side of a gateway connection
pub struct Client {
    pub connection_id: ConnectionId,
    rx: mpsc::UnboundedReceiver<String>,
    frames: Vec<Value>,
}

impl Client {
    /// Every frame received so far
    pub fn frames(&mut self) -> &[Value] {
        while let Ok(frame) = self.rx.try_recv() {
            self.frames.push(serde_json::from_str(&frame).expect("json frame"));
        }
        &self.frames
    }

    pub fn events(&mut self, name: &str) -> Vec<Value> {
        self.frames()
            .iter()
            .filter(|f| f["event"] == name)
            .map(|f| f["data"].clone())
            .collect()
    }

    pub fn names(&mut self) -> Vec<String> {
        self.frames()
            .iter()
            .filter_map(|f| f["event"].as_str().map(str::to_owned))
            .collect()
    }

    /// Wait until an event named `name` has arrived and return its payload
    pub async fn wait_for(&mut self, name: &str) -> Option<Value> {
        let deadline = tokio::time::Instant::now() + WAIT;
        loop {
            if let Some(data) = self.events(name).into_iter().next() {
                return Some(data);
            }
            if tokio::time::Instant::now() >= deadline {
                return None;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }
}

/// Poll `check` until it yields true or [`WAIT`] elapses
pub async fn eventually<F, Fut>(mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + WAIT;
    loop {
        if check().await {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

pub fn user_header() -> HeaderName {
    HeaderName::from_static("x-user-id")
}

pub fn user_value(user: &str) -> HeaderValue {
    HeaderValue::from_str(user).expect("header value")
}
