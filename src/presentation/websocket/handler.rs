//! WebSocket Connection Handler
//!
//! One task per connection: registers it with the gateway, dispatches
//! client events and forwards server events queued by the gateway.

use std::time::Duration;

use axum::{
    extract::{
        ws::{Message, WebSocket},
        Query, State, WebSocketUpgrade,
    },
    response::Response,
};
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::mpsc;
use tokio::time::interval;
use uuid::Uuid;

use super::messages::{ClientEvent, MessageReadPayload};
use super::session::SessionState;
use crate::domain::{RealtimeChannel, ServerEvent, TypingStatusEvent, UserJoinedRoomEvent};
use crate::shared::error::AppError;
use crate::startup::AppState;

/// Connection query parameters
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GatewayQuery {
    pub user_id: Option<String>,
}

/// WebSocket upgrade handler
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(query): Query<GatewayQuery>,
    State(state): State<AppState>,
) -> Result<Response, AppError> {
    let user_id = query
        .user_id
        .filter(|id| !id.trim().is_empty())
        .ok_or_else(|| AppError::Unauthorized("Missing userId".into()))?;

    let max_message_size = state.settings.websocket.max_message_size;
    Ok(ws
        .max_message_size(max_message_size)
        .on_upgrade(move |socket| handle_socket(socket, user_id, state)))
}

/// Handle individual WebSocket connection
async fn handle_socket(socket: WebSocket, user_id: String, state: AppState) {
    // Split socket for concurrent read/write
    let (mut sender, mut receiver) = socket.split();

    // Frames queued by the gateway for this connection
    let (tx, mut rx) = mpsc::unbounded_channel::<String>();

    let sender_task = tokio::spawn(async move {
        while let Some(frame) = rx.recv().await {
            if sender.send(Message::Text(frame.into())).await.is_err() {
                break;
            }
        }
    });

    let connection_id = state.gateway.connect(&user_id, tx);
    let mut session = SessionState::new(user_id, connection_id);

    let idle_timeout = state.settings.websocket.idle_timeout();
    let mut idle_check = interval(idle_check_period(idle_timeout));
    idle_check.tick().await; // Skip first immediate tick

    loop {
        tokio::select! {
            msg = receiver.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        session.touch();
                        dispatch(&state, &session, text.as_str()).await;
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        tracing::debug!(connection_id = %connection_id, "Connection closed");
                        break;
                    }
                    Some(Ok(_)) => {
                        // Ping, pong and binary frames only count as activity
                        session.touch();
                    }
                    Some(Err(e)) => {
                        tracing::debug!(connection_id = %connection_id, error = %e, "WebSocket error");
                        break;
                    }
                }
            }

            _ = idle_check.tick() => {
                if session.is_idle(idle_timeout) {
                    tracing::info!(
                        connection_id = %connection_id,
                        user_id = %session.user_id,
                        "Idle timeout, closing connection"
                    );
                    break;
                }
            }
        }
    }

    // Cleanup
    state.gateway.disconnect(connection_id);
    sender_task.abort();

    tracing::info!(
        user_id = %session.user_id,
        connection_id = %connection_id,
        frames = session.frames_received,
        "User disconnected"
    );
}

fn idle_check_period(idle_timeout: Duration) -> Duration {
    (idle_timeout / 4).max(Duration::from_secs(1))
}

/// Handle one inbound text frame. Malformed frames are logged and ignored.
async fn dispatch(state: &AppState, session: &SessionState, text: &str) {
    let event = match ClientEvent::parse(text) {
        Ok(event) => event,
        Err(e) => {
            tracing::debug!(
                connection_id = %session.connection_id,
                error = %e,
                "Ignoring malformed frame"
            );
            return;
        }
    };

    tracing::trace!(connection_id = %session.connection_id, event = event.name(), "Client event");

    match event {
        ClientEvent::JoinChat(conversation_id) => join_chat(state, session, conversation_id).await,
        ClientEvent::LeaveChat(conversation_id) => {
            state.gateway.leave(session.connection_id, conversation_id);
        }
        ClientEvent::ViewingChat(conversation_id) => {
            if !state.gateway.set_viewing(session.connection_id, conversation_id) {
                tracing::debug!(
                    connection_id = %session.connection_id,
                    "Viewing update from a superseded connection"
                );
            }
        }
        ClientEvent::NotViewingChat => {
            state.gateway.clear_viewing(session.connection_id);
        }
        ClientEvent::TypingStart(payload) => relay_typing(state, session, payload.conversation_id, true),
        ClientEvent::TypingStop(payload) => relay_typing(state, session, payload.conversation_id, false),
        ClientEvent::MessageRead(payload) => mark_read(state, session, payload).await,
    }
}

/// Only participants may join a conversation room.
async fn join_chat(state: &AppState, session: &SessionState, conversation_id: Uuid) {
    if let Err(e) = state
        .conversations
        .get_for_participant(conversation_id, &session.user_id)
        .await
    {
        tracing::debug!(
            connection_id = %session.connection_id,
            conversation_id = %conversation_id,
            error = %e,
            "Join refused"
        );
        return;
    }

    state.gateway.join(session.connection_id, conversation_id);
    state.gateway.emit_to_room_except(
        conversation_id,
        session.connection_id,
        &ServerEvent::UserJoinedRoom(UserJoinedRoomEvent {
            conversation_id,
            user_id: session.user_id.clone(),
        }),
    );
}

/// Relay to the other room members under the connection's own identity.
fn relay_typing(state: &AppState, session: &SessionState, conversation_id: Uuid, is_typing: bool) {
    if !state.gateway.is_in_room(session.connection_id, conversation_id) {
        return;
    }
    state.gateway.emit_to_room_except(
        conversation_id,
        session.connection_id,
        &ServerEvent::TypingStatus(TypingStatusEvent {
            conversation_id,
            user_id: session.user_id.clone(),
            is_typing,
        }),
    );
}

async fn mark_read(state: &AppState, session: &SessionState, payload: MessageReadPayload) {
    let result = state
        .messages
        .mark_read(
            payload.conversation_id,
            &session.user_id,
            &payload.message_ids,
            Some(session.connection_id),
        )
        .await;

    match result {
        Ok(flipped) => tracing::debug!(
            conversation_id = %payload.conversation_id,
            flipped = flipped.len(),
            "Read receipt applied"
        ),
        Err(e) => tracing::warn!(
            conversation_id = %payload.conversation_id,
            user_id = %session.user_id,
            error = %e,
            "Read receipt failed"
        ),
    }
}
