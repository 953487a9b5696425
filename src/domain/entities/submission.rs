//! Message submission events.
//!
//! A submission is the queued description of a message that has not been
//! persisted yet. Every pipeline stage keys off the same event.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::message::{summary_text, ChatMessage, ImageRef, MessageKind};

/// Namespace for submission ids derived from client nonces.
const SUBMISSION_NAMESPACE: Uuid = Uuid::from_u128(0x5c1e_a7a2_93f4_4b1d_8d0e_61f2_3b94_c7a1);

/// Namespace for message ids derived from submission ids.
const MESSAGE_NAMESPACE: Uuid = Uuid::from_u128(0x0b7d_4e21_c6a8_4f53_9e17_2a5c_d803_f64e);

/// Deterministic submission id for `(conversation, sender, nonce)`.
pub fn derive_submission_id(conversation_id: Uuid, sender_id: &str, nonce: &str) -> Uuid {
    let name = format!("{}:{}:{}", conversation_id, sender_id, nonce);
    Uuid::new_v5(&SUBMISSION_NAMESPACE, name.as_bytes())
}

/// Deterministic message id for a submission.
pub fn message_id_for_submission(submission_id: Uuid) -> Uuid {
    Uuid::new_v5(&MESSAGE_NAMESPACE, submission_id.as_bytes())
}

/// How the storage stage treats redelivered submissions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DuplicatePolicy {
    /// Message ids are derived from the submission id, so a redelivery
    /// resolves to the record written the first time.
    #[default]
    Prevent,
    /// Every storage run writes a fresh record; redelivery may duplicate.
    Tolerate,
}

impl DuplicatePolicy {
    /// Message id for a storage run of `event`.
    pub fn message_id(&self, event: &MessageSubmissionEvent) -> Uuid {
        match (self, event.submission_id) {
            (Self::Prevent, Some(submission_id)) => message_id_for_submission(submission_id),
            _ => Uuid::now_v7(),
        }
    }
}

/// Rejection reasons for a submission payload.
#[derive(Debug, thiserror::Error)]
pub enum EventValidationError {
    #[error("invalid submission payload: {0}")]
    Json(#[from] serde_json::Error),

    #[error("submission has no sender")]
    MissingSender,

    #[error("submission has neither text nor an image")]
    Empty,

    #[error("image submission without an image reference")]
    MissingImage,
}

/// Payload placed on the durable queue for every composed message.
///
/// Field aliases accept payloads from producers that still use the
/// `chatId` / `messageType` names.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageSubmissionEvent {
    #[serde(alias = "chatId")]
    pub conversation_id: Uuid,

    pub sender_id: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<ImageRef>,

    #[serde(default, alias = "messageType")]
    pub kind: MessageKind,

    /// Always false on submission; stored records start unseen regardless.
    #[serde(default)]
    pub seen: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub submission_id: Option<Uuid>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub submitted_at: Option<DateTime<Utc>>,
}

impl MessageSubmissionEvent {
    /// Build a submission with a submission id derived from `nonce`.
    pub fn new(
        conversation_id: Uuid,
        sender_id: impl Into<String>,
        text: Option<String>,
        image: Option<ImageRef>,
        nonce: &str,
    ) -> Self {
        let sender_id = sender_id.into();
        let kind = if image.is_some() {
            MessageKind::Image
        } else {
            MessageKind::Text
        };

        Self {
            submission_id: Some(derive_submission_id(conversation_id, &sender_id, nonce)),
            conversation_id,
            sender_id,
            text,
            image,
            kind,
            seen: false,
            submitted_at: Some(Utc::now()),
        }
    }

    /// Parse and validate a raw queue payload.
    pub fn decode(payload: &[u8]) -> Result<Self, EventValidationError> {
        let event: Self = serde_json::from_slice(payload)?;
        event.validate()?;
        Ok(event)
    }

    pub fn encode(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn validate(&self) -> Result<(), EventValidationError> {
        if self.sender_id.trim().is_empty() {
            return Err(EventValidationError::MissingSender);
        }
        if self.kind == MessageKind::Image && self.image.is_none() {
            return Err(EventValidationError::MissingImage);
        }
        let has_text = self.text.as_deref().is_some_and(|t| !t.is_empty());
        if !has_text && self.image.is_none() {
            return Err(EventValidationError::Empty);
        }
        Ok(())
    }

    pub fn summary_text(&self) -> String {
        summary_text(self.text.as_deref(), self.image.as_ref())
    }

    /// The record the storage stage writes for this submission.
    pub fn to_message(&self, id: Uuid, stored_at: DateTime<Utc>) -> ChatMessage {
        ChatMessage {
            id,
            conversation_id: self.conversation_id,
            sender_id: self.sender_id.clone(),
            text: self.text.clone(),
            image: self.image.clone(),
            kind: self.kind,
            seen: false,
            seen_at: None,
            submission_id: self.submission_id,
            created_at: self.submitted_at.unwrap_or(stored_at),
        }
    }
}

/// Progress of one submission through the notification stage.
///
/// `Received → PeerResolved → {SeenMarked | Notified | NoOp} → Acknowledged`.
/// Missing entities short-circuit from `Received` straight to `NoOp`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmissionState {
    Received,
    PeerResolved,
    SeenMarked,
    Notified,
    NoOp,
    Acknowledged,
}

impl SubmissionState {
    pub fn can_transition_to(self, next: SubmissionState) -> bool {
        use SubmissionState::*;
        matches!(
            (self, next),
            (Received, PeerResolved)
                | (Received, NoOp)
                | (PeerResolved, SeenMarked)
                | (PeerResolved, Notified)
                | (PeerResolved, NoOp)
                | (SeenMarked, Acknowledged)
                | (Notified, Acknowledged)
                | (NoOp, Acknowledged)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            SubmissionState::SeenMarked | SubmissionState::Notified | SubmissionState::NoOp
        )
    }
}
