//! Real-time channel contract used by the pipeline stages.

use uuid::Uuid;

use crate::domain::entities::ConnectionId;
use crate::domain::events::ServerEvent;

/// Room that every connection viewing a conversation joins.
pub fn room_name(conversation_id: Uuid) -> String {
    format!("chat:{}", conversation_id)
}

/// Room membership and event emission for live connections.
///
/// Emission is fire-and-forget: a send to a connection that went away is
/// dropped. Return values count the connections the event was queued for.
pub trait RealtimeChannel: Send + Sync {
    fn emit_to_room(&self, conversation_id: Uuid, event: &ServerEvent) -> usize;

    /// Emit to every room member except `except`.
    fn emit_to_room_except(
        &self,
        conversation_id: Uuid,
        except: ConnectionId,
        event: &ServerEvent,
    ) -> usize;

    fn emit_to_connection(&self, connection_id: ConnectionId, event: &ServerEvent) -> bool;

    /// Rooms the connection currently belongs to.
    fn rooms_of(&self, connection_id: ConnectionId) -> Vec<String>;

    fn is_in_room(&self, connection_id: ConnectionId, conversation_id: Uuid) -> bool {
        let room = room_name(conversation_id);
        self.rooms_of(connection_id).iter().any(|r| *r == room)
    }
}
