//! Server-to-client real-time events.
//!
//! Serialized as `{"event": "<name>", "data": <payload>}` frames.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::entities::{ChatMessage, MessageKind};

/// Events pushed from the server to connected clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum ServerEvent {
    #[serde(rename = "getOnlineUsers")]
    OnlineUsers(Vec<String>),

    #[serde(rename = "message:new")]
    MessageNew(MessageNewEvent),

    #[serde(rename = "message:read")]
    MessageRead(MessageReadEvent),

    #[serde(rename = "chat:refresh")]
    ChatRefresh(ChatRefreshEvent),

    #[serde(rename = "chat:new")]
    ChatNew(ChatNewEvent),

    #[serde(rename = "typing:status")]
    TypingStatus(TypingStatusEvent),

    #[serde(rename = "user:joined:room")]
    UserJoinedRoom(UserJoinedRoomEvent),
}

impl ServerEvent {
    /// Get the event name for dispatch
    pub fn event_name(&self) -> &'static str {
        match self {
            ServerEvent::OnlineUsers(_) => "getOnlineUsers",
            ServerEvent::MessageNew(_) => "message:new",
            ServerEvent::MessageRead(_) => "message:read",
            ServerEvent::ChatRefresh(_) => "chat:refresh",
            ServerEvent::ChatNew(_) => "chat:new",
            ServerEvent::TypingStatus(_) => "typing:status",
            ServerEvent::UserJoinedRoom(_) => "user:joined:room",
        }
    }

    pub fn to_frame(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

// Event payload structs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageNewEvent {
    pub message: ChatMessage,
    pub conversation_id: Uuid,
    pub sender_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageReadEvent {
    pub conversation_id: Uuid,
    pub message_ids: Vec<Uuid>,
}

/// Enough of a message to update a conversation list without a fetch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessagePreview {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<Uuid>,
    pub text: String,
    pub sender_id: String,
    pub kind: MessageKind,
    pub created_at: DateTime<Utc>,
}

impl From<&ChatMessage> for MessagePreview {
    fn from(message: &ChatMessage) -> Self {
        Self {
            id: Some(message.id),
            text: message.summary_text(),
            sender_id: message.sender_id.clone(),
            kind: message.kind,
            created_at: message.created_at,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatRefreshEvent {
    pub conversation_id: Uuid,
    pub message: MessagePreview,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatNewEvent {
    pub conversation_id: Uuid,
    pub created_by: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TypingStatusEvent {
    pub conversation_id: Uuid,
    pub user_id: String,
    pub is_typing: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserJoinedRoomEvent {
    pub conversation_id: Uuid,
    pub user_id: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_frame_shape() {
        let conversation_id = Uuid::nil();
        let event = ServerEvent::MessageRead(MessageReadEvent {
            conversation_id,
            message_ids: vec![],
        });
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(
            value,
            json!({
                "event": "message:read",
                "data": { "conversationId": conversation_id, "messageIds": [] }
            })
        );
    }

    #[test]
    fn test_online_users_frame() {
        let event = ServerEvent::OnlineUsers(vec!["alice".into(), "bob".into()]);
        assert_eq!(event.event_name(), "getOnlineUsers");
        assert_eq!(
            event.to_frame().unwrap(),
            r#"{"event":"getOnlineUsers","data":["alice","bob"]}"#
        );
    }
}
