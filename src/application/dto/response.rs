//! Response DTOs
//!
//! Data structures for API response bodies.

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::application::services::{ConversationSummary, MessageHistory, SubmissionReceipt};
use crate::domain::{ChatConversation, ChatMessage, ImageRef, LatestMessage, MessageKind};

/// Conversation response
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationResponse {
    pub id: Uuid,
    pub participants: [String; 2],
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latest_message: Option<LatestMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unseen_count: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<ChatConversation> for ConversationResponse {
    fn from(conversation: ChatConversation) -> Self {
        Self {
            id: conversation.id,
            participants: conversation.participants,
            latest_message: conversation.latest_message,
            unseen_count: None,
            created_at: conversation.created_at,
            updated_at: conversation.updated_at,
        }
    }
}

impl From<ConversationSummary> for ConversationResponse {
    fn from(summary: ConversationSummary) -> Self {
        Self {
            unseen_count: Some(summary.unseen_count),
            ..Self::from(summary.conversation)
        }
    }
}

/// Accepted submission response
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmissionResponse {
    pub entry_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub submission_id: Option<Uuid>,
    pub conversation_id: Uuid,
    pub sender_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<ImageRef>,
    pub kind: MessageKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub submitted_at: Option<DateTime<Utc>>,
}

impl From<SubmissionReceipt> for SubmissionResponse {
    fn from(receipt: SubmissionReceipt) -> Self {
        let event = receipt.event;
        Self {
            entry_id: receipt.entry_id,
            submission_id: event.submission_id,
            conversation_id: event.conversation_id,
            sender_id: event.sender_id,
            text: event.text,
            image: event.image,
            kind: event.kind,
            submitted_at: event.submitted_at,
        }
    }
}

/// Message history response
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageHistoryResponse {
    pub conversation_id: Uuid,
    pub messages: Vec<ChatMessage>,
    pub marked_seen: Vec<Uuid>,
}

impl MessageHistoryResponse {
    pub fn new(conversation_id: Uuid, history: MessageHistory) -> Self {
        Self {
            conversation_id,
            messages: history.messages,
            marked_seen: history.marked_seen,
        }
    }
}
