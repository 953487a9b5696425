//! In-memory repositories.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use uuid::Uuid;

use crate::domain::{
    ChatConversation, ChatMessage, ConversationRepository, InsertOutcome, LatestMessage,
    MessageRepository,
};
use crate::shared::error::AppError;

/// Conversations keyed by id.
#[derive(Default)]
pub struct InMemoryConversationRepository {
    conversations: RwLock<HashMap<Uuid, ChatConversation>>,
}

impl InMemoryConversationRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ConversationRepository for InMemoryConversationRepository {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<ChatConversation>, AppError> {
        Ok(self.conversations.read().get(&id).cloned())
    }

    async fn find_by_participants(&self, a: &str, b: &str) -> Result<Option<ChatConversation>, AppError> {
        let key = ChatConversation::participant_key(a, b);
        Ok(self
            .conversations
            .read()
            .values()
            .find(|c| c.participants == key)
            .cloned())
    }

    async fn create_or_get(
        &self,
        conversation: &ChatConversation,
    ) -> Result<(ChatConversation, bool), AppError> {
        let mut conversations = self.conversations.write();
        if let Some(existing) = conversations
            .values()
            .find(|c| c.participants == conversation.participants)
        {
            return Ok((existing.clone(), false));
        }
        conversations.insert(conversation.id, conversation.clone());
        Ok((conversation.clone(), true))
    }

    async fn find_by_participant(&self, user_id: &str) -> Result<Vec<ChatConversation>, AppError> {
        let mut found: Vec<ChatConversation> = self
            .conversations
            .read()
            .values()
            .filter(|c| c.has_participant(user_id))
            .cloned()
            .collect();
        found.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(found)
    }

    async fn update_latest_message(&self, id: Uuid, latest: &LatestMessage) -> Result<bool, AppError> {
        let mut conversations = self.conversations.write();
        let Some(conversation) = conversations.get_mut(&id) else {
            return Ok(false);
        };
        if !latest.supersedes(conversation.latest_message.as_ref()) {
            return Ok(false);
        }
        conversation.latest_message = Some(latest.clone());
        conversation.updated_at = conversation.updated_at.max(latest.sent_at);
        Ok(true)
    }
}

/// Messages in insertion order.
#[derive(Default)]
pub struct InMemoryMessageRepository {
    messages: RwLock<Vec<ChatMessage>>,
}

impl InMemoryMessageRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored records, duplicates included.
    pub fn len(&self) -> usize {
        self.messages.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.read().is_empty()
    }

    /// Records persisted for a submission.
    pub fn count_for_submission(&self, submission_id: Uuid) -> usize {
        self.messages
            .read()
            .iter()
            .filter(|m| m.submission_id == Some(submission_id))
            .count()
    }
}

#[async_trait]
impl MessageRepository for InMemoryMessageRepository {
    async fn insert(&self, message: &ChatMessage) -> Result<InsertOutcome, AppError> {
        let mut messages = self.messages.write();
        if let Some(existing) = messages.iter().find(|m| m.id == message.id) {
            return Ok(InsertOutcome::AlreadyStored(existing.clone()));
        }
        messages.push(message.clone());
        Ok(InsertOutcome::Inserted(message.clone()))
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<ChatMessage>, AppError> {
        Ok(self.messages.read().iter().find(|m| m.id == id).cloned())
    }

    async fn find_by_submission(&self, submission_id: Uuid) -> Result<Option<ChatMessage>, AppError> {
        Ok(self
            .messages
            .read()
            .iter()
            .rev()
            .find(|m| m.submission_id == Some(submission_id))
            .cloned())
    }

    async fn find_recent_from_sender(
        &self,
        conversation_id: Uuid,
        sender_id: &str,
        limit: i64,
    ) -> Result<Vec<ChatMessage>, AppError> {
        let mut found: Vec<ChatMessage> = self
            .messages
            .read()
            .iter()
            .rev()
            .filter(|m| m.conversation_id == conversation_id && m.sender_id == sender_id)
            .cloned()
            .collect();
        found.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        found.truncate(limit.max(0) as usize);
        Ok(found)
    }

    async fn find_by_conversation(&self, conversation_id: Uuid) -> Result<Vec<ChatMessage>, AppError> {
        let mut found: Vec<ChatMessage> = self
            .messages
            .read()
            .iter()
            .filter(|m| m.conversation_id == conversation_id)
            .cloned()
            .collect();
        found.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(found)
    }

    async fn mark_seen(&self, id: Uuid, at: DateTime<Utc>) -> Result<bool, AppError> {
        Ok(self
            .messages
            .write()
            .iter_mut()
            .find(|m| m.id == id)
            .is_some_and(|m| m.mark_seen(at)))
    }

    async fn mark_seen_many(
        &self,
        conversation_id: Uuid,
        reader_id: &str,
        ids: &[Uuid],
        at: DateTime<Utc>,
    ) -> Result<Vec<Uuid>, AppError> {
        let mut flipped = Vec::new();
        for message in self.messages.write().iter_mut() {
            if message.conversation_id == conversation_id
                && message.sender_id != reader_id
                && ids.contains(&message.id)
                && message.mark_seen(at)
            {
                flipped.push(message.id);
            }
        }
        Ok(flipped)
    }

    async fn mark_conversation_seen(
        &self,
        conversation_id: Uuid,
        reader_id: &str,
        at: DateTime<Utc>,
    ) -> Result<Vec<Uuid>, AppError> {
        let mut flipped = Vec::new();
        for message in self.messages.write().iter_mut() {
            if message.conversation_id == conversation_id
                && message.sender_id != reader_id
                && message.mark_seen(at)
            {
                flipped.push(message.id);
            }
        }
        Ok(flipped)
    }

    async fn count_unseen(&self, conversation_id: Uuid, reader_id: &str) -> Result<i64, AppError> {
        Ok(self
            .messages
            .read()
            .iter()
            .filter(|m| m.conversation_id == conversation_id && m.sender_id != reader_id && !m.seen)
            .count() as i64)
    }
}
