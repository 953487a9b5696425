//! Conversation Service
//!
//! Opens two-party conversations and lists them with unseen counts.

use std::sync::Arc;

use async_trait::async_trait;
use uuid::Uuid;

use crate::domain::{
    ChatConversation, ChatNewEvent, ConversationRepository, MessageRepository, PresenceRegistry,
    RealtimeChannel, ServerEvent,
};
use crate::shared::error::AppError;

/// Conversation service trait
#[async_trait]
pub trait ConversationService: Send + Sync {
    /// Find or create the conversation between the caller and another user.
    ///
    /// Returns the conversation and whether this call created it.
    async fn open_conversation(
        &self,
        caller_id: &str,
        other_user_id: &str,
    ) -> Result<(ChatConversation, bool), ConversationError>;

    /// The caller's conversations, most recently updated first.
    async fn list_conversations(&self, caller_id: &str) -> Result<Vec<ConversationSummary>, ConversationError>;

    /// Load a conversation the caller participates in.
    async fn get_for_participant(
        &self,
        conversation_id: Uuid,
        caller_id: &str,
    ) -> Result<ChatConversation, ConversationError>;
}

/// Conversation with the caller's unread count
#[derive(Debug, Clone)]
pub struct ConversationSummary {
    pub conversation: ChatConversation,
    pub unseen_count: i64,
}

/// Conversation service errors
#[derive(Debug, thiserror::Error)]
pub enum ConversationError {
    #[error("Conversation not found")]
    NotFound,

    #[error("Not a participant of this conversation")]
    Forbidden,

    #[error("Invalid request: {0}")]
    Invalid(String),

    #[error("Store unavailable: {0}")]
    Unavailable(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<AppError> for ConversationError {
    fn from(e: AppError) -> Self {
        match e {
            AppError::BadRequest(msg) => ConversationError::Invalid(msg),
            e @ AppError::Validation(_) => ConversationError::Invalid(e.to_string()),
            e if e.is_transient() => ConversationError::Unavailable(e.to_string()),
            e => ConversationError::Internal(e.to_string()),
        }
    }
}

impl From<ConversationError> for AppError {
    fn from(e: ConversationError) -> Self {
        match e {
            ConversationError::NotFound => AppError::NotFound("Conversation not found".into()),
            ConversationError::Forbidden => {
                AppError::Forbidden("Not a participant of this conversation".into())
            }
            ConversationError::Invalid(msg) => AppError::BadRequest(msg),
            ConversationError::Unavailable(msg) => AppError::Unavailable(msg),
            ConversationError::Internal(msg) => AppError::Internal(msg),
        }
    }
}

/// ConversationService implementation
pub struct ConversationServiceImpl {
    conversations: Arc<dyn ConversationRepository>,
    messages: Arc<dyn MessageRepository>,
    presence: Arc<dyn PresenceRegistry>,
    realtime: Arc<dyn RealtimeChannel>,
}

impl ConversationServiceImpl {
    pub fn new(
        conversations: Arc<dyn ConversationRepository>,
        messages: Arc<dyn MessageRepository>,
        presence: Arc<dyn PresenceRegistry>,
        realtime: Arc<dyn RealtimeChannel>,
    ) -> Self {
        Self {
            conversations,
            messages,
            presence,
            realtime,
        }
    }
}

#[async_trait]
impl ConversationService for ConversationServiceImpl {
    async fn open_conversation(
        &self,
        caller_id: &str,
        other_user_id: &str,
    ) -> Result<(ChatConversation, bool), ConversationError> {
        let candidate = ChatConversation::new(caller_id, other_user_id)?;
        let (conversation, created) = self.conversations.create_or_get(&candidate).await?;

        if created {
            tracing::info!(
                conversation_id = %conversation.id,
                created_by = %caller_id,
                "Conversation created"
            );
            if let Some(presence) = self.presence.get(other_user_id) {
                let event = ServerEvent::ChatNew(ChatNewEvent {
                    conversation_id: conversation.id,
                    created_by: caller_id.to_string(),
                });
                self.realtime.emit_to_connection(presence.connection_id, &event);
            }
        }

        Ok((conversation, created))
    }

    async fn list_conversations(&self, caller_id: &str) -> Result<Vec<ConversationSummary>, ConversationError> {
        let conversations = self.conversations.find_by_participant(caller_id).await?;

        let mut summaries = Vec::with_capacity(conversations.len());
        for conversation in conversations {
            let unseen_count = self.messages.count_unseen(conversation.id, caller_id).await?;
            summaries.push(ConversationSummary {
                conversation,
                unseen_count,
            });
        }
        Ok(summaries)
    }

    async fn get_for_participant(
        &self,
        conversation_id: Uuid,
        caller_id: &str,
    ) -> Result<ChatConversation, ConversationError> {
        let conversation = self
            .conversations
            .find_by_id(conversation_id)
            .await?
            .ok_or(ConversationError::NotFound)?;

        if !conversation.has_participant(caller_id) {
            return Err(ConversationError::Forbidden);
        }
        Ok(conversation)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::pipeline::testing::{RecordingChannel, Target};
    use crate::infrastructure::memory::{InMemoryConversationRepository, InMemoryMessageRepository};
    use crate::infrastructure::presence::InMemoryPresenceRegistry;

    struct Fixture {
        presence: Arc<InMemoryPresenceRegistry>,
        channel: Arc<RecordingChannel>,
        service: ConversationServiceImpl,
    }

    fn fixture() -> Fixture {
        let presence = Arc::new(InMemoryPresenceRegistry::new());
        let channel = Arc::new(RecordingChannel::new());
        let service = ConversationServiceImpl::new(
            Arc::new(InMemoryConversationRepository::new()),
            Arc::new(InMemoryMessageRepository::new()),
            presence.clone(),
            channel.clone(),
        );
        Fixture {
            presence,
            channel,
            service,
        }
    }

    #[tokio::test]
    async fn test_open_notifies_online_peer_once() {
        let f = fixture();
        let bob = Uuid::new_v4();
        f.presence.register("bob", bob);

        let (first, created) = f.service.open_conversation("alice", "bob").await.unwrap();
        assert!(created);
        let (second, created) = f.service.open_conversation("bob", "alice").await.unwrap();
        assert!(!created);
        assert_eq!(first.id, second.id);

        let emitted = f.channel.emitted();
        assert_eq!(emitted.len(), 1);
        assert_eq!(emitted[0].0, Target::Connection(bob));
        assert_eq!(emitted[0].1.event_name(), "chat:new");
    }

    #[tokio::test]
    async fn test_open_with_self_is_rejected() {
        let f = fixture();
        let err = f.service.open_conversation("alice", "alice").await.unwrap_err();
        assert!(matches!(err, ConversationError::Invalid(_)));
    }

    #[tokio::test]
    async fn test_outsider_is_forbidden() {
        let f = fixture();
        let (conversation, _) = f.service.open_conversation("alice", "bob").await.unwrap();

        let err = f
            .service
            .get_for_participant(conversation.id, "mallory")
            .await
            .unwrap_err();
        assert!(matches!(err, ConversationError::Forbidden));

        let err = f
            .service
            .get_for_participant(Uuid::now_v7(), "alice")
            .await
            .unwrap_err();
        assert!(matches!(err, ConversationError::NotFound));
    }
}
