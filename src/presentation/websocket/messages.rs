//! WebSocket Message Types
//!
//! Inbound client frames. Outbound frames are [`ServerEvent`](crate::domain::ServerEvent)s.

use serde::Deserialize;
use uuid::Uuid;

/// Incoming gateway message: `{"event": "<name>", "data": <payload>}`
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum ClientEvent {
    #[serde(rename = "join:chat")]
    JoinChat(Uuid),

    #[serde(rename = "leave:chat")]
    LeaveChat(Uuid),

    #[serde(rename = "viewing:chat")]
    ViewingChat(Uuid),

    #[serde(rename = "not:viewing:chat")]
    NotViewingChat,

    #[serde(rename = "typing:start")]
    TypingStart(TypingPayload),

    #[serde(rename = "typing:stop")]
    TypingStop(TypingPayload),

    #[serde(rename = "message:read")]
    MessageRead(MessageReadPayload),
}

impl ClientEvent {
    pub fn parse(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::JoinChat(_) => "join:chat",
            Self::LeaveChat(_) => "leave:chat",
            Self::ViewingChat(_) => "viewing:chat",
            Self::NotViewingChat => "not:viewing:chat",
            Self::TypingStart(_) => "typing:start",
            Self::TypingStop(_) => "typing:stop",
            Self::MessageRead(_) => "message:read",
        }
    }
}

/// Typing indicator payload. A client-supplied `userId` is accepted and ignored.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TypingPayload {
    #[serde(alias = "chatId")]
    pub conversation_id: Uuid,
    #[serde(default)]
    pub user_id: Option<String>,
}

/// Read receipt payload
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageReadPayload {
    #[serde(alias = "chatId")]
    pub conversation_id: Uuid,
    pub message_ids: Vec<Uuid>,
}
