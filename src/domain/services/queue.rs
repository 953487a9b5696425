//! Durable queue contract.
//!
//! At-least-once delivery of submission payloads to named consumer groups.
//! Every group sees every published payload; within a group each payload is
//! handed to one consumer at a time until it is acknowledged.

use async_trait::async_trait;

use crate::shared::error::AppError;

/// Broker failures. All of them are transient from the caller's view.
#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    #[error("broker error: {0}")]
    Broker(String),

    #[error("malformed broker reply: {0}")]
    Protocol(String),

    #[error("queue closed")]
    Closed,
}

impl From<QueueError> for AppError {
    fn from(e: QueueError) -> Self {
        AppError::Unavailable(e.to_string())
    }
}

/// One payload handed to a consumer, pending until acked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueDelivery {
    /// Broker entry id
    pub id: String,
    /// Consumer group the delivery belongs to
    pub group: String,
    pub payload: String,
    /// How many times the entry has been handed out, starting at 1
    pub delivery_count: u64,
}

impl QueueDelivery {
    pub fn is_redelivery(&self) -> bool {
        self.delivery_count > 1
    }
}

#[async_trait]
pub trait SubmissionQueue: Send + Sync {
    /// Append a payload for every consumer group. Returns the entry id.
    async fn publish(&self, payload: &str) -> Result<String, QueueError>;

    /// Create the consumer group if missing. Idempotent.
    async fn ensure_group(&self, group: &str) -> Result<(), QueueError>;

    /// Wait a bounded time for the next delivery of `group`.
    ///
    /// Entries whose previous delivery was nacked or timed out come first.
    async fn receive(&self, group: &str, consumer: &str) -> Result<Option<QueueDelivery>, QueueError>;

    /// Acknowledge: the entry is never handed to this group again.
    async fn ack(&self, delivery: &QueueDelivery) -> Result<(), QueueError>;

    /// Negative acknowledgement: the entry stays pending and is redelivered.
    async fn nack(&self, delivery: &QueueDelivery) -> Result<(), QueueError>;

    /// Broker reachability probe.
    async fn ping(&self) -> Result<(), QueueError>;
}
