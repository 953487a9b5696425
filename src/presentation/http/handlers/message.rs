//! Message Handlers

use axum::{extract::State, http::StatusCode, Json};
use validator::Validate;

use crate::application::dto::request::SendMessageRequest;
use crate::application::dto::response::SubmissionResponse;
use crate::presentation::http::extractors::CurrentUser;
use crate::shared::error::AppError;
use crate::startup::AppState;

/// Accept a message for asynchronous delivery
///
/// Answers 202 once the submission is on the queue; storage and delivery
/// happen in the pipeline.
pub async fn send_message(
    State(state): State<AppState>,
    sender: CurrentUser,
    Json(body): Json<SendMessageRequest>,
) -> Result<(StatusCode, Json<SubmissionResponse>), AppError> {
    body.validate()?;

    let receipt = state
        .messages
        .submit(&sender.user_id, body.into())
        .await?;

    tracing::debug!(
        entry_id = %receipt.entry_id,
        conversation_id = %receipt.event.conversation_id,
        "Submission accepted"
    );

    Ok((StatusCode::ACCEPTED, Json(SubmissionResponse::from(receipt))))
}
