//! Storage stage: persists the message and refreshes the conversation summary.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;

use super::{PipelineError, SkipReason, StageOutcome, SubmissionHandler};
use crate::domain::{
    ConversationRepository, DuplicatePolicy, InsertOutcome, LatestMessage, MessageRepository,
    MessageSubmissionEvent,
};

pub struct StorageStage {
    conversations: Arc<dyn ConversationRepository>,
    messages: Arc<dyn MessageRepository>,
    duplicate_policy: DuplicatePolicy,
}

impl StorageStage {
    pub fn new(
        conversations: Arc<dyn ConversationRepository>,
        messages: Arc<dyn MessageRepository>,
        duplicate_policy: DuplicatePolicy,
    ) -> Self {
        Self {
            conversations,
            messages,
            duplicate_policy,
        }
    }
}

#[async_trait]
impl SubmissionHandler for StorageStage {
    fn name(&self) -> &'static str {
        "storage"
    }

    async fn handle(&self, event: &MessageSubmissionEvent) -> Result<StageOutcome, PipelineError> {
        let Some(conversation) = self.conversations.find_by_id(event.conversation_id).await? else {
            tracing::warn!(
                conversation_id = %event.conversation_id,
                "Conversation not found, dropping submission"
            );
            return Ok(StageOutcome::Skipped(SkipReason::ConversationNotFound));
        };

        if !conversation.has_participant(&event.sender_id) {
            tracing::warn!(
                conversation_id = %event.conversation_id,
                sender_id = %event.sender_id,
                "Sender is not a participant, dropping submission"
            );
            return Ok(StageOutcome::Skipped(SkipReason::SenderNotParticipant));
        }

        let message_id = self.duplicate_policy.message_id(event);
        let record = event.to_message(message_id, Utc::now());
        let outcome = self.messages.insert(&record).await?;
        let already_stored = matches!(outcome, InsertOutcome::AlreadyStored(_));
        let message = outcome.into_message();

        // Also applied for an existing record: a run that died between the
        // insert and this update must still converge.
        let latest = LatestMessage::summarize(&message);
        let applied = self
            .conversations
            .update_latest_message(conversation.id, &latest)
            .await?;

        tracing::debug!(
            conversation_id = %conversation.id,
            message_id = %message.id,
            submission_id = ?event.submission_id,
            already_stored = already_stored,
            summary_applied = applied,
            "Message stored"
        );

        Ok(StageOutcome::Stored {
            message_id: message.id,
            already_stored,
        })
    }
}
