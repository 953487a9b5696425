//! Finds the persisted record of a submission.
//!
//! Storage may not have run yet when delivery or notification look for the
//! record, so lookups are retried on a fixed, bounded schedule.

use std::sync::Arc;
use std::time::Duration;

use crate::domain::{ChatMessage, MessageRepository, MessageSubmissionEvent};
use crate::infrastructure::metrics;
use crate::shared::error::AppError;

/// Recent messages from the sender scanned by a content match.
const HEURISTIC_WINDOW: i64 = 10;

/// Fixed-count, fixed-backoff retry schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            backoff: Duration::from_millis(100),
        }
    }
}

impl RetryPolicy {
    /// No retries, a single lookup.
    pub fn once() -> Self {
        Self {
            attempts: 1,
            backoff: Duration::ZERO,
        }
    }
}

#[derive(Clone)]
pub struct MessageLocator {
    messages: Arc<dyn MessageRepository>,
    policy: RetryPolicy,
}

impl MessageLocator {
    pub fn new(messages: Arc<dyn MessageRepository>, policy: RetryPolicy) -> Self {
        Self { messages, policy }
    }

    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    /// Look the record up, retrying until found or the budget runs out.
    ///
    /// `Ok(None)` means the record never became visible. Store errors are
    /// returned immediately.
    pub async fn locate(&self, event: &MessageSubmissionEvent) -> Result<Option<ChatMessage>, AppError> {
        let attempts = self.policy.attempts.max(1);
        for attempt in 1..=attempts {
            let found = self.lookup_once(event).await?;
            metrics::record_lookup_attempt(found.is_some());

            if found.is_some() {
                return Ok(found);
            }

            tracing::debug!(
                conversation_id = %event.conversation_id,
                attempt = attempt,
                attempts = attempts,
                "Message not visible yet"
            );

            if attempt < attempts && !self.policy.backoff.is_zero() {
                tokio::time::sleep(self.policy.backoff).await;
            }
        }
        Ok(None)
    }

    /// A single lookup.
    ///
    /// Events carrying a submission id are an exact lookup. Older events fall
    /// back to the newest message from the sender with the same content.
    pub async fn lookup_once(&self, event: &MessageSubmissionEvent) -> Result<Option<ChatMessage>, AppError> {
        if let Some(submission_id) = event.submission_id {
            return self.messages.find_by_submission(submission_id).await;
        }

        let recent = self
            .messages
            .find_recent_from_sender(event.conversation_id, &event.sender_id, HEURISTIC_WINDOW)
            .await?;

        Ok(recent
            .into_iter()
            .find(|m| m.matches_content(event.text.as_deref(), event.image.as_ref())))
    }
}
