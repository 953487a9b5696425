//! Conversation Handlers

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use validator::Validate;

use crate::application::dto::request::OpenConversationRequest;
use crate::application::dto::response::{ConversationResponse, MessageHistoryResponse};
use crate::presentation::http::extractors::{parse_id, CurrentUser};
use crate::shared::error::AppError;
use crate::startup::AppState;

/// Find or create the caller's conversation with another user
///
/// 201 when this request created it, 200 when it already existed.
pub async fn open_conversation(
    State(state): State<AppState>,
    caller: CurrentUser,
    Json(body): Json<OpenConversationRequest>,
) -> Result<(StatusCode, Json<ConversationResponse>), AppError> {
    body.validate()?;

    let (conversation, created) = state
        .conversations
        .open_conversation(&caller.user_id, &body.other_user_id)
        .await?;

    let status = if created {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };
    Ok((status, Json(ConversationResponse::from(conversation))))
}

/// List the caller's conversations, most recently updated first
pub async fn list_conversations(
    State(state): State<AppState>,
    caller: CurrentUser,
) -> Result<Json<Vec<ConversationResponse>>, AppError> {
    let summaries = state.conversations.list_conversations(&caller.user_id).await?;

    Ok(Json(
        summaries.into_iter().map(ConversationResponse::from).collect(),
    ))
}

/// Conversation history; marks the peer's unseen messages seen
pub async fn get_messages(
    State(state): State<AppState>,
    caller: CurrentUser,
    Path(conversation_id): Path<String>,
) -> Result<Json<MessageHistoryResponse>, AppError> {
    let conversation_id = parse_id(&conversation_id, "conversation")?;

    let history = state
        .messages
        .history(conversation_id, &caller.user_id)
        .await?;

    Ok(Json(MessageHistoryResponse::new(conversation_id, history)))
}
