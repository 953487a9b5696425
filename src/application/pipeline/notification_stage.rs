//! Notification stage: read receipt for a viewing receiver, otherwise a
//! `chat:refresh` to the receiver's connection.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;

use super::{MessageLocator, PipelineError, SkipReason, StageOutcome, SubmissionHandler};
use crate::domain::{
    ChatRefreshEvent, ConversationRepository, MessagePreview, MessageReadEvent, MessageRepository,
    MessageSubmissionEvent, PresenceRegistry, RealtimeChannel, ServerEvent, SubmissionState,
};

pub struct NotificationStage {
    conversations: Arc<dyn ConversationRepository>,
    messages: Arc<dyn MessageRepository>,
    locator: MessageLocator,
    presence: Arc<dyn PresenceRegistry>,
    realtime: Arc<dyn RealtimeChannel>,
    seen_settle: Duration,
}

/// Logs each state change of one submission.
struct Transitions<'a> {
    event: &'a MessageSubmissionEvent,
    state: SubmissionState,
}

impl<'a> Transitions<'a> {
    fn start(event: &'a MessageSubmissionEvent) -> Self {
        Self {
            event,
            state: SubmissionState::Received,
        }
    }

    fn advance(&mut self, next: SubmissionState) {
        debug_assert!(
            self.state.can_transition_to(next),
            "invalid transition {:?} -> {:?}",
            self.state,
            next
        );
        tracing::trace!(
            conversation_id = %self.event.conversation_id,
            submission_id = ?self.event.submission_id,
            from = ?self.state,
            to = ?next,
            "Submission state"
        );
        self.state = next;
    }

    fn finish(mut self, next: SubmissionState, outcome: StageOutcome) -> StageOutcome {
        self.advance(next);
        outcome
    }
}

impl NotificationStage {
    pub fn new(
        conversations: Arc<dyn ConversationRepository>,
        messages: Arc<dyn MessageRepository>,
        locator: MessageLocator,
        presence: Arc<dyn PresenceRegistry>,
        realtime: Arc<dyn RealtimeChannel>,
        seen_settle: Duration,
    ) -> Self {
        Self {
            conversations,
            messages,
            locator,
            presence,
            realtime,
            seen_settle,
        }
    }

    async fn mark_seen(
        &self,
        event: &MessageSubmissionEvent,
        transitions: Transitions<'_>,
    ) -> Result<StageOutcome, PipelineError> {
        if !self.seen_settle.is_zero() {
            tokio::time::sleep(self.seen_settle).await;
        }

        let Some(message) = self.locator.locate(event).await? else {
            tracing::warn!(
                conversation_id = %event.conversation_id,
                submission_id = ?event.submission_id,
                "Message not found, cannot mark as seen"
            );
            return Ok(transitions.finish(
                SubmissionState::NoOp,
                StageOutcome::Skipped(SkipReason::MessageNotVisible),
            ));
        };

        if !self.messages.mark_seen(message.id, Utc::now()).await? {
            return Ok(transitions.finish(
                SubmissionState::NoOp,
                StageOutcome::Skipped(SkipReason::AlreadySeen),
            ));
        }

        let receipt = ServerEvent::MessageRead(MessageReadEvent {
            conversation_id: event.conversation_id,
            message_ids: vec![message.id],
        });
        self.realtime.emit_to_room(event.conversation_id, &receipt);

        tracing::debug!(
            conversation_id = %event.conversation_id,
            message_id = %message.id,
            "Message marked as seen"
        );

        Ok(transitions.finish(
            SubmissionState::SeenMarked,
            StageOutcome::SeenMarked {
                message_ids: vec![message.id],
            },
        ))
    }

    async fn preview(&self, event: &MessageSubmissionEvent) -> Result<MessagePreview, PipelineError> {
        if let Some(message) = self.locator.lookup_once(event).await? {
            return Ok(MessagePreview::from(&message));
        }
        Ok(MessagePreview {
            id: None,
            text: event.summary_text(),
            sender_id: event.sender_id.clone(),
            kind: event.kind,
            created_at: event.submitted_at.unwrap_or_else(Utc::now),
        })
    }
}

#[async_trait]
impl SubmissionHandler for NotificationStage {
    fn name(&self) -> &'static str {
        "notification"
    }

    async fn handle(&self, event: &MessageSubmissionEvent) -> Result<StageOutcome, PipelineError> {
        let mut transitions = Transitions::start(event);

        let Some(conversation) = self.conversations.find_by_id(event.conversation_id).await? else {
            tracing::warn!(conversation_id = %event.conversation_id, "Conversation not found");
            return Ok(transitions.finish(
                SubmissionState::NoOp,
                StageOutcome::Skipped(SkipReason::ConversationNotFound),
            ));
        };

        let Some(receiver_id) = conversation.peer_of(&event.sender_id) else {
            tracing::warn!(
                conversation_id = %event.conversation_id,
                sender_id = %event.sender_id,
                "Receiver could not be resolved"
            );
            return Ok(transitions.finish(
                SubmissionState::NoOp,
                StageOutcome::Skipped(SkipReason::SenderNotParticipant),
            ));
        };
        transitions.advance(SubmissionState::PeerResolved);

        let Some(presence) = self.presence.get(receiver_id) else {
            // Offline push would hook in here.
            tracing::debug!(receiver_id = %receiver_id, "Receiver offline");
            return Ok(transitions.finish(
                SubmissionState::NoOp,
                StageOutcome::Skipped(SkipReason::ReceiverOffline),
            ));
        };

        let viewing = presence.is_viewing(conversation.id)
            && self.realtime.is_in_room(presence.connection_id, conversation.id);

        if viewing {
            return self.mark_seen(event, transitions).await;
        }

        if presence.is_viewing(conversation.id) {
            tracing::debug!(
                receiver_id = %receiver_id,
                connection_id = %presence.connection_id,
                "Receiver claims to view the conversation but is not in the room"
            );
        }

        let refresh = ServerEvent::ChatRefresh(ChatRefreshEvent {
            conversation_id: conversation.id,
            message: self.preview(event).await?,
        });
        self.realtime.emit_to_connection(presence.connection_id, &refresh);

        Ok(transitions.finish(
            SubmissionState::Notified,
            StageOutcome::Notified {
                receiver_id: receiver_id.to_string(),
            },
        ))
    }
}
