//! Delivery stage: pushes the stored message to the conversation room.

use std::sync::Arc;

use async_trait::async_trait;

use super::{MessageLocator, PipelineError, SkipReason, StageOutcome, SubmissionHandler};
use crate::domain::{MessageNewEvent, MessageSubmissionEvent, RealtimeChannel, ServerEvent};

/// Fail-open: a record that never shows up within the lookup budget is
/// logged and acknowledged. Clients recover it from history.
pub struct DeliveryStage {
    locator: MessageLocator,
    realtime: Arc<dyn RealtimeChannel>,
}

impl DeliveryStage {
    pub fn new(locator: MessageLocator, realtime: Arc<dyn RealtimeChannel>) -> Self {
        Self { locator, realtime }
    }
}

#[async_trait]
impl SubmissionHandler for DeliveryStage {
    fn name(&self) -> &'static str {
        "delivery"
    }

    async fn handle(&self, event: &MessageSubmissionEvent) -> Result<StageOutcome, PipelineError> {
        let Some(message) = self.locator.locate(event).await? else {
            tracing::warn!(
                conversation_id = %event.conversation_id,
                sender_id = %event.sender_id,
                submission_id = ?event.submission_id,
                attempts = self.locator.policy().attempts,
                "Message not found after retries, skipping real-time delivery"
            );
            return Ok(StageOutcome::Skipped(SkipReason::MessageNotVisible));
        };

        let message_id = message.id;
        let payload = ServerEvent::MessageNew(MessageNewEvent {
            conversation_id: message.conversation_id,
            sender_id: message.sender_id.clone(),
            message,
        });
        let connections = self.realtime.emit_to_room(event.conversation_id, &payload);

        tracing::debug!(
            conversation_id = %event.conversation_id,
            message_id = %message_id,
            connections = connections,
            "Message delivered"
        );

        Ok(StageOutcome::Delivered {
            message_id,
            connections,
        })
    }
}
