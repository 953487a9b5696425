//! Chat message entity and repository trait.
//!
//! Maps to the `messages` table in the database schema.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::shared::error::AppError;

/// Summary text shown in conversation lists for image messages.
pub const IMAGE_PLACEHOLDER: &str = "📷 Image";

/// Message kinds matching the `kind` column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    /// Plain text message
    #[default]
    Text,
    /// Image with an optional caption
    Image,
    Audio,
    Video,
    Location,
    VoiceNote,
    /// Generated by the service rather than a participant
    System,
}

impl MessageKind {
    /// Convert from database string representation.
    pub fn from_str(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "text" => Self::Text,
            "image" => Self::Image,
            "audio" => Self::Audio,
            "video" => Self::Video,
            "location" => Self::Location,
            "voice_note" => Self::VoiceNote,
            "system" => Self::System,
            _ => Self::Text,
        }
    }

    /// Convert to database string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Image => "image",
            Self::Audio => "audio",
            Self::Video => "video",
            Self::Location => "location",
            Self::VoiceNote => "voice_note",
            Self::System => "system",
        }
    }
}

impl std::fmt::Display for MessageKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Reference to an uploaded image held by the external file store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageRef {
    pub url: String,
    /// Key of the object in the file store. Older producers call it `publicId`.
    #[serde(alias = "publicId")]
    pub storage_key: String,
}

/// Text used for the conversation summary of a message.
///
/// Image messages always summarize as [`IMAGE_PLACEHOLDER`], even with a caption.
pub fn summary_text(text: Option<&str>, image: Option<&ImageRef>) -> String {
    match image {
        Some(_) => IMAGE_PLACEHOLDER.to_string(),
        None => text.unwrap_or_default().to_string(),
    }
}

/// A message in a two-party conversation.
///
/// Maps to the `messages` table:
/// - id: UUID PRIMARY KEY
/// - conversation_id: UUID NOT NULL REFERENCES conversations(id)
/// - sender_id: TEXT NOT NULL
/// - text: TEXT NULL
/// - image_url / image_storage_key: TEXT NULL (both or neither)
/// - kind: TEXT NOT NULL DEFAULT 'text'
/// - seen: BOOLEAN NOT NULL DEFAULT FALSE
/// - seen_at: TIMESTAMPTZ NULL (set iff seen)
/// - submission_id: UUID NULL
/// - created_at: TIMESTAMPTZ NOT NULL
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    pub id: Uuid,
    pub conversation_id: Uuid,
    pub sender_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<ImageRef>,
    pub kind: MessageKind,
    pub seen: bool,
    pub seen_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub submission_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

impl ChatMessage {
    /// A message must carry text or an image.
    pub fn has_content(&self) -> bool {
        self.image.is_some() || self.text.as_deref().is_some_and(|t| !t.is_empty())
    }

    /// Summary used for `latestMessage`.
    pub fn summary_text(&self) -> String {
        summary_text(self.text.as_deref(), self.image.as_ref())
    }

    /// Whether this record carries the given content.
    ///
    /// Image messages are matched by storage key, text messages by exact text.
    pub fn matches_content(&self, text: Option<&str>, image: Option<&ImageRef>) -> bool {
        match image {
            Some(wanted) => self
                .image
                .as_ref()
                .is_some_and(|own| own.storage_key == wanted.storage_key),
            None => match text {
                Some(wanted) if !wanted.is_empty() => self.text.as_deref() == Some(wanted),
                _ => false,
            },
        }
    }

    /// Flip the message to seen. Returns false if it already was.
    ///
    /// `seen` never goes back to false and `seen_at` keeps the first timestamp.
    pub fn mark_seen(&mut self, at: DateTime<Utc>) -> bool {
        if self.seen {
            return false;
        }
        self.seen = true;
        self.seen_at = Some(at);
        true
    }
}

/// Result of persisting a message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InsertOutcome {
    /// A new record was written
    Inserted(ChatMessage),
    /// A record with the same id already existed; it is returned unchanged
    AlreadyStored(ChatMessage),
}

impl InsertOutcome {
    pub fn message(&self) -> &ChatMessage {
        match self {
            Self::Inserted(m) | Self::AlreadyStored(m) => m,
        }
    }

    pub fn into_message(self) -> ChatMessage {
        match self {
            Self::Inserted(m) | Self::AlreadyStored(m) => m,
        }
    }
}

/// Repository trait for message data access.
#[async_trait]
pub trait MessageRepository: Send + Sync {
    /// Insert a message. An existing record with the same id is left untouched.
    async fn insert(&self, message: &ChatMessage) -> Result<InsertOutcome, AppError>;

    /// Find a message by id.
    async fn find_by_id(&self, id: Uuid) -> Result<Option<ChatMessage>, AppError>;

    /// Most recent message persisted for a submission.
    async fn find_by_submission(&self, submission_id: Uuid) -> Result<Option<ChatMessage>, AppError>;

    /// Messages from `sender_id` in a conversation, newest first.
    async fn find_recent_from_sender(
        &self,
        conversation_id: Uuid,
        sender_id: &str,
        limit: i64,
    ) -> Result<Vec<ChatMessage>, AppError>;

    /// Full history of a conversation, oldest first.
    async fn find_by_conversation(&self, conversation_id: Uuid) -> Result<Vec<ChatMessage>, AppError>;

    /// Mark one message seen. Returns true only if this call flipped it.
    async fn mark_seen(&self, id: Uuid, at: DateTime<Utc>) -> Result<bool, AppError>;

    /// Mark the listed messages of a conversation seen on behalf of `reader_id`.
    ///
    /// Only unseen messages sent by someone other than the reader flip.
    /// Returns the ids that flipped.
    async fn mark_seen_many(
        &self,
        conversation_id: Uuid,
        reader_id: &str,
        ids: &[Uuid],
        at: DateTime<Utc>,
    ) -> Result<Vec<Uuid>, AppError>;

    /// Mark every unseen message addressed to `reader_id` seen. Returns the ids that flipped.
    async fn mark_conversation_seen(
        &self,
        conversation_id: Uuid,
        reader_id: &str,
        at: DateTime<Utc>,
    ) -> Result<Vec<Uuid>, AppError>;

    /// Number of unseen messages addressed to `reader_id`.
    async fn count_unseen(&self, conversation_id: Uuid, reader_id: &str) -> Result<i64, AppError>;
}
