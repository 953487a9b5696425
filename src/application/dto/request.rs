//! Request DTOs
//!
//! Data structures for API request bodies.

use serde::Deserialize;
use uuid::Uuid;
use validator::Validate;

use crate::application::services::SubmitMessageDto;
use crate::domain::{ImageRef, MessageKind};

/// Maximum characters in a text message.
pub const MAX_TEXT_LENGTH: u64 = 4000;

/// Open conversation request
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct OpenConversationRequest {
    #[validate(length(min = 1, max = 128, message = "Other user id must be 1-128 characters"))]
    pub other_user_id: String,
}

/// Image attached to a message
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ImageRequest {
    #[validate(url(message = "Image url must be a valid URL"))]
    pub url: String,

    #[serde(alias = "publicId")]
    #[validate(length(min = 1, max = 512, message = "Storage key must be 1-512 characters"))]
    pub storage_key: String,
}

/// Send message request
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct SendMessageRequest {
    #[serde(alias = "chatId")]
    pub conversation_id: Uuid,

    #[validate(length(max = 4000, message = "Text must be at most 4000 characters"))]
    pub text: Option<String>,

    #[validate(nested)]
    pub image: Option<ImageRequest>,

    #[serde(alias = "messageType")]
    pub kind: Option<MessageKind>,

    #[validate(length(min = 1, max = 128, message = "Nonce must be 1-128 characters"))]
    pub nonce: Option<String>,
}

impl From<SendMessageRequest> for SubmitMessageDto {
    fn from(request: SendMessageRequest) -> Self {
        Self {
            conversation_id: request.conversation_id,
            text: request.text,
            image: request.image.map(|i| ImageRef {
                url: i.url,
                storage_key: i.storage_key,
            }),
            kind: request.kind,
            nonce: request.nonce,
        }
    }
}
