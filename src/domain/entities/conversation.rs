//! Conversation entity and repository trait.
//!
//! Maps to the `conversations` table in the database schema.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::message::ChatMessage;
use crate::shared::error::AppError;

/// Denormalized summary of the newest message, used for conversation lists.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LatestMessage {
    pub text: String,
    pub sender_id: String,
    pub sent_at: DateTime<Utc>,
}

impl LatestMessage {
    /// Build the summary for a stored message.
    pub fn summarize(message: &ChatMessage) -> Self {
        Self {
            text: message.summary_text(),
            sender_id: message.sender_id.clone(),
            sent_at: message.created_at,
        }
    }

    /// Last-writer-wins on the message timestamp.
    pub fn supersedes(&self, current: Option<&LatestMessage>) -> bool {
        current.map_or(true, |c| self.sent_at >= c.sent_at)
    }
}

/// A conversation between exactly two participants.
///
/// Participants are stored in sorted order so the pair is unique regardless
/// of who opened the conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatConversation {
    pub id: Uuid,
    pub participants: [String; 2],
    pub latest_message: Option<LatestMessage>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ChatConversation {
    /// Create a new conversation between two distinct users.
    pub fn new(first: &str, second: &str) -> Result<Self, AppError> {
        if first.is_empty() || second.is_empty() {
            return Err(AppError::BadRequest("Participant ids must not be empty".into()));
        }
        if first == second {
            return Err(AppError::BadRequest(
                "A conversation needs two different participants".into(),
            ));
        }

        let now = Utc::now();
        Ok(Self {
            id: Uuid::now_v7(),
            participants: Self::participant_key(first, second),
            latest_message: None,
            created_at: now,
            updated_at: now,
        })
    }

    /// Canonical ordering of a participant pair.
    pub fn participant_key(a: &str, b: &str) -> [String; 2] {
        if a <= b {
            [a.to_string(), b.to_string()]
        } else {
            [b.to_string(), a.to_string()]
        }
    }

    pub fn has_participant(&self, user_id: &str) -> bool {
        self.participants.iter().any(|p| p == user_id)
    }

    /// The participant who is not `user_id`, if `user_id` is a participant.
    pub fn peer_of(&self, user_id: &str) -> Option<&str> {
        match &self.participants {
            [a, b] if a == user_id => Some(b.as_str()),
            [a, b] if b == user_id => Some(a.as_str()),
            _ => None,
        }
    }
}

/// Repository trait for conversation data access.
#[async_trait]
pub trait ConversationRepository: Send + Sync {
    /// Find a conversation by id.
    async fn find_by_id(&self, id: Uuid) -> Result<Option<ChatConversation>, AppError>;

    /// Find the conversation between two users, in either order.
    async fn find_by_participants(
        &self,
        a: &str,
        b: &str,
    ) -> Result<Option<ChatConversation>, AppError>;

    /// Insert a conversation unless the pair already has one.
    ///
    /// Returns the stored conversation and whether this call created it.
    async fn create_or_get(
        &self,
        conversation: &ChatConversation,
    ) -> Result<(ChatConversation, bool), AppError>;

    /// Conversations of a user, most recently updated first.
    async fn find_by_participant(&self, user_id: &str) -> Result<Vec<ChatConversation>, AppError>;

    /// Replace the `latestMessage` summary unless the stored one is newer.
    ///
    /// Returns false when the conversation is missing or the summary was stale.
    async fn update_latest_message(&self, id: Uuid, latest: &LatestMessage) -> Result<bool, AppError>;
}
