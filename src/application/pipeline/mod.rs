//! Submission Pipeline
//!
//! Turns queued submission events into a persisted record, a real-time push
//! and a read-receipt or notification outcome.
//!
//! ## Stages
//!
//! - **StorageStage**: persists the message and the conversation summary
//! - **DeliveryStage**: pushes `message:new` to the conversation room
//! - **NotificationStage**: marks seen for a viewing receiver or sends `chat:refresh`
//!
//! Stages run either as three workers on their own consumer groups
//! ([`PipelineMode::Fanout`]) or chained by one worker
//! ([`PipelineMode::Sequential`]). Both compositions implement
//! [`SubmissionHandler`].

mod delivery_stage;
mod locator;
mod notification_stage;
mod sequential;
mod storage_stage;
mod worker;

#[cfg(test)]
pub(crate) mod testing;

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use uuid::Uuid;

use crate::domain::{DuplicatePolicy, EventValidationError, MessageSubmissionEvent};
use crate::shared::error::AppError;

pub use delivery_stage::DeliveryStage;
pub use locator::{MessageLocator, RetryPolicy};
pub use notification_stage::NotificationStage;
pub use sequential::SequentialPipeline;
pub use storage_stage::StorageStage;
pub use worker::{Disposition, PipelineWorker};

/// Consumer group of the storage stage in fan-out mode.
pub const STORAGE_GROUP: &str = "chat:message:storage";
/// Consumer group of the delivery stage in fan-out mode.
pub const DELIVERY_GROUP: &str = "chat:message:delivery";
/// Consumer group of the notification stage in fan-out mode.
pub const NOTIFICATION_GROUP: &str = "chat:message:notification";
/// Consumer group of the single worker in sequential mode.
pub const SEQUENTIAL_GROUP: &str = "chat:messages";

/// How the stages are scheduled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PipelineMode {
    /// One worker per stage, each on its own consumer group
    #[default]
    Fanout,
    /// One worker running storage, delivery and notification in order
    Sequential,
}

/// Runtime knobs shared by the stages.
#[derive(Debug, Clone)]
pub struct PipelineOptions {
    pub mode: PipelineMode,
    pub duplicate_policy: DuplicatePolicy,
    pub lookup: RetryPolicy,
    /// Wait before a viewing receiver's message is looked up and marked seen
    pub seen_settle: Duration,
}

impl PipelineOptions {
    /// Settle time the notification stage actually uses.
    ///
    /// In sequential mode storage has already completed.
    pub fn effective_seen_settle(&self) -> Duration {
        match self.mode {
            PipelineMode::Fanout => self.seen_settle,
            PipelineMode::Sequential => Duration::ZERO,
        }
    }
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            mode: PipelineMode::Fanout,
            duplicate_policy: DuplicatePolicy::Prevent,
            lookup: RetryPolicy::default(),
            seen_settle: Duration::from_millis(200),
        }
    }
}

/// Why a stage finished without acting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    ConversationNotFound,
    SenderNotParticipant,
    /// The record did not become visible within the lookup budget
    MessageNotVisible,
    ReceiverOffline,
    AlreadySeen,
}

impl SkipReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ConversationNotFound => "conversation_not_found",
            Self::SenderNotParticipant => "sender_not_participant",
            Self::MessageNotVisible => "message_not_visible",
            Self::ReceiverOffline => "receiver_offline",
            Self::AlreadySeen => "already_seen",
        }
    }
}

/// Successful result of handling one submission event.
///
/// Every variant, skips included, is acknowledged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StageOutcome {
    Stored { message_id: Uuid, already_stored: bool },
    Delivered { message_id: Uuid, connections: usize },
    SeenMarked { message_ids: Vec<Uuid> },
    Notified { receiver_id: String },
    Skipped(SkipReason),
    /// Outcomes of a sequential run, in stage order
    Sequence(Vec<StageOutcome>),
}

impl StageOutcome {
    /// Metric label.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Stored { already_stored: false, .. } => "stored",
            Self::Stored { already_stored: true, .. } => "already_stored",
            Self::Delivered { .. } => "delivered",
            Self::SeenMarked { .. } => "seen_marked",
            Self::Notified { .. } => "notified",
            Self::Skipped(_) => "skipped",
            Self::Sequence(_) => "completed",
        }
    }
}

/// Failure while handling a submission event.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("malformed submission: {0}")]
    Malformed(#[from] EventValidationError),

    #[error("store failure: {0}")]
    Store(#[from] AppError),
}

impl PipelineError {
    /// Transient failures are returned to the queue; the rest are dropped.
    pub fn is_retryable(&self) -> bool {
        match self {
            PipelineError::Malformed(_) => false,
            PipelineError::Store(e) => e.is_transient(),
        }
    }
}

/// One role in the pipeline: consumes a submission event.
///
/// Handlers must be safe to re-run for the same event.
#[async_trait]
pub trait SubmissionHandler: Send + Sync {
    /// Stage name used in logs and metrics.
    fn name(&self) -> &'static str;

    async fn handle(&self, event: &MessageSubmissionEvent) -> Result<StageOutcome, PipelineError>;
}
