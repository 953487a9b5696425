//! Message Service
//!
//! Publishes submissions to the queue and serves conversation history.
//! Reading history or sending `message:read` flips the peer's messages to seen.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use uuid::Uuid;

use crate::domain::{
    ChatConversation, ChatMessage, ConnectionId, ConversationRepository, ImageRef, MessageKind,
    MessageReadEvent, MessageRepository, MessageSubmissionEvent, RealtimeChannel, ServerEvent,
    SubmissionQueue,
};
use crate::shared::error::AppError;

/// Message service trait
#[async_trait]
pub trait MessageService: Send + Sync {
    /// Validate a composed message and place it on the queue.
    async fn submit(&self, sender_id: &str, request: SubmitMessageDto) -> Result<SubmissionReceipt, MessageError>;

    /// Full history, oldest first. Marks the peer's unseen messages seen.
    async fn history(&self, conversation_id: Uuid, reader_id: &str) -> Result<MessageHistory, MessageError>;

    /// Mark listed messages seen on behalf of `reader_id`.
    ///
    /// Returns the ids that flipped. The receipt is emitted to the room,
    /// skipping `origin` when the reader asked over a live connection.
    async fn mark_read(
        &self,
        conversation_id: Uuid,
        reader_id: &str,
        message_ids: &[Uuid],
        origin: Option<ConnectionId>,
    ) -> Result<Vec<Uuid>, MessageError>;
}

/// Submit message request
#[derive(Debug, Clone, Default)]
pub struct SubmitMessageDto {
    pub conversation_id: Uuid,
    pub text: Option<String>,
    pub image: Option<ImageRef>,
    pub kind: Option<MessageKind>,
    /// Client idempotency nonce; a random one is used when absent
    pub nonce: Option<String>,
}

/// Accepted submission
#[derive(Debug, Clone)]
pub struct SubmissionReceipt {
    pub entry_id: String,
    pub event: MessageSubmissionEvent,
}

/// Conversation history
#[derive(Debug, Clone)]
pub struct MessageHistory {
    pub messages: Vec<ChatMessage>,
    pub marked_seen: Vec<Uuid>,
}

/// Message service errors
#[derive(Debug, thiserror::Error)]
pub enum MessageError {
    #[error("Conversation not found")]
    ConversationNotFound,

    #[error("Not a participant of this conversation")]
    Forbidden,

    #[error("Invalid message: {0}")]
    Invalid(String),

    #[error("Unavailable: {0}")]
    Unavailable(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<AppError> for MessageError {
    fn from(e: AppError) -> Self {
        if e.is_transient() {
            MessageError::Unavailable(e.to_string())
        } else {
            MessageError::Internal(e.to_string())
        }
    }
}

impl From<MessageError> for AppError {
    fn from(e: MessageError) -> Self {
        match e {
            MessageError::ConversationNotFound => AppError::NotFound("Conversation not found".into()),
            MessageError::Forbidden => {
                AppError::Forbidden("Not a participant of this conversation".into())
            }
            MessageError::Invalid(msg) => AppError::BadRequest(msg),
            MessageError::Unavailable(msg) => AppError::Unavailable(msg),
            MessageError::Internal(msg) => AppError::Internal(msg),
        }
    }
}

/// MessageService implementation
pub struct MessageServiceImpl {
    conversations: Arc<dyn ConversationRepository>,
    messages: Arc<dyn MessageRepository>,
    queue: Arc<dyn SubmissionQueue>,
    realtime: Arc<dyn RealtimeChannel>,
}

impl MessageServiceImpl {
    pub fn new(
        conversations: Arc<dyn ConversationRepository>,
        messages: Arc<dyn MessageRepository>,
        queue: Arc<dyn SubmissionQueue>,
        realtime: Arc<dyn RealtimeChannel>,
    ) -> Self {
        Self {
            conversations,
            messages,
            queue,
            realtime,
        }
    }

    async fn participant_conversation(
        &self,
        conversation_id: Uuid,
        user_id: &str,
    ) -> Result<ChatConversation, MessageError> {
        let conversation = self
            .conversations
            .find_by_id(conversation_id)
            .await?
            .ok_or(MessageError::ConversationNotFound)?;

        if !conversation.has_participant(user_id) {
            return Err(MessageError::Forbidden);
        }
        Ok(conversation)
    }

    fn emit_read(&self, conversation_id: Uuid, message_ids: Vec<Uuid>, origin: Option<ConnectionId>) {
        let event = ServerEvent::MessageRead(MessageReadEvent {
            conversation_id,
            message_ids,
        });
        match origin {
            Some(connection_id) => self.realtime.emit_to_room_except(conversation_id, connection_id, &event),
            None => self.realtime.emit_to_room(conversation_id, &event),
        };
    }
}

#[async_trait]
impl MessageService for MessageServiceImpl {
    async fn submit(&self, sender_id: &str, request: SubmitMessageDto) -> Result<SubmissionReceipt, MessageError> {
        self.participant_conversation(request.conversation_id, sender_id)
            .await?;

        let nonce = request
            .nonce
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        let mut event = MessageSubmissionEvent::new(
            request.conversation_id,
            sender_id,
            request.text,
            request.image,
            &nonce,
        );
        if let Some(kind) = request.kind {
            event.kind = kind;
        }
        event
            .validate()
            .map_err(|e| MessageError::Invalid(e.to_string()))?;

        let payload = event
            .encode()
            .map_err(|e| MessageError::Internal(e.to_string()))?;
        let entry_id = self
            .queue
            .publish(&payload)
            .await
            .map_err(|e| MessageError::Unavailable(e.to_string()))?;

        tracing::debug!(
            conversation_id = %event.conversation_id,
            submission_id = ?event.submission_id,
            entry_id = %entry_id,
            "Submission published"
        );

        Ok(SubmissionReceipt { entry_id, event })
    }

    async fn history(&self, conversation_id: Uuid, reader_id: &str) -> Result<MessageHistory, MessageError> {
        self.participant_conversation(conversation_id, reader_id)
            .await?;

        let marked_seen = self
            .messages
            .mark_conversation_seen(conversation_id, reader_id, Utc::now())
            .await?;
        if !marked_seen.is_empty() {
            self.emit_read(conversation_id, marked_seen.clone(), None);
        }

        let messages = self.messages.find_by_conversation(conversation_id).await?;
        Ok(MessageHistory {
            messages,
            marked_seen,
        })
    }

    async fn mark_read(
        &self,
        conversation_id: Uuid,
        reader_id: &str,
        message_ids: &[Uuid],
        origin: Option<ConnectionId>,
    ) -> Result<Vec<Uuid>, MessageError> {
        self.participant_conversation(conversation_id, reader_id)
            .await?;

        let flipped = self
            .messages
            .mark_seen_many(conversation_id, reader_id, message_ids, Utc::now())
            .await?;
        if !flipped.is_empty() {
            self.emit_read(conversation_id, flipped.clone(), origin);
        }
        Ok(flipped)
    }
}
