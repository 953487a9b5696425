//! WebSocket Gateway
//!
//! Tracks live connections and conversation rooms, keeps the presence
//! registry in step with connects and disconnects, and routes server events.

use std::collections::HashSet;
use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::domain::{room_name, ConnectionId, PresenceRegistry, RealtimeChannel, ServerEvent};
use crate::infrastructure::metrics;

/// Connected session with its outbound frame sender
pub struct ConnectedSession {
    pub user_id: String,
    pub connection_id: ConnectionId,
    sender: mpsc::UnboundedSender<String>,
    /// Joined rooms; `None` once the connection is torn down
    rooms: Mutex<Option<HashSet<String>>>,
}

impl ConnectedSession {
    fn send(&self, frame: &str) -> bool {
        self.sender.send(frame.to_owned()).is_ok()
    }
}

/// WebSocket gateway managing all connections
pub struct Gateway {
    /// Active sessions by connection id
    sessions: DashMap<ConnectionId, Arc<ConnectedSession>>,
    /// Room name to member connections
    rooms: DashMap<String, HashSet<ConnectionId>>,
    presence: Arc<dyn PresenceRegistry>,
}

impl Gateway {
    pub fn new(presence: Arc<dyn PresenceRegistry>) -> Self {
        Self {
            sessions: DashMap::new(),
            rooms: DashMap::new(),
            presence,
        }
    }

    pub fn presence(&self) -> &Arc<dyn PresenceRegistry> {
        &self.presence
    }

    /// Register a new connection for `user_id` and announce the online list.
    ///
    /// The new connection replaces any earlier one in the presence registry.
    pub fn connect(&self, user_id: &str, sender: mpsc::UnboundedSender<String>) -> ConnectionId {
        let connection_id = Uuid::new_v4();
        let session = Arc::new(ConnectedSession {
            user_id: user_id.to_string(),
            connection_id,
            sender,
            rooms: Mutex::new(Some(HashSet::new())),
        });
        self.sessions.insert(connection_id, session);

        if let Some(previous) = self.presence.register(user_id, connection_id) {
            tracing::debug!(
                user_id = %user_id,
                previous_connection = %previous.connection_id,
                connection_id = %connection_id,
                "Presence moved to new connection"
            );
        }
        metrics::set_websocket_connections(self.sessions.len());

        tracing::info!(user_id = %user_id, connection_id = %connection_id, "Connection registered");
        self.broadcast_online_users();
        connection_id
    }

    /// Drop a connection, its room memberships and, if still current, its presence.
    pub fn disconnect(&self, connection_id: ConnectionId) {
        let Some((_, session)) = self.sessions.remove(&connection_id) else {
            return;
        };

        let rooms = session.rooms.lock().take().unwrap_or_default();
        for room in rooms {
            self.remove_from_room(&room, connection_id);
        }

        let deregistered = self
            .presence
            .deregister_if_matches(&session.user_id, connection_id);
        metrics::set_websocket_connections(self.sessions.len());

        tracing::info!(
            user_id = %session.user_id,
            connection_id = %connection_id,
            deregistered,
            "Connection unregistered"
        );
        self.broadcast_online_users();
    }

    /// Add the connection to the conversation room. False if unknown.
    pub fn join(&self, connection_id: ConnectionId, conversation_id: Uuid) -> bool {
        match self.session(connection_id) {
            Some(session) => self.join_session(&session, conversation_id),
            None => false,
        }
    }

    /// The session's room lock is held across both inserts, so a concurrent
    /// disconnect either sees the room or makes this a no-op.
    fn join_session(&self, session: &ConnectedSession, conversation_id: Uuid) -> bool {
        let mut joined = session.rooms.lock();
        let Some(rooms) = joined.as_mut() else {
            return false;
        };
        let room = room_name(conversation_id);
        self.rooms
            .entry(room.clone())
            .or_default()
            .insert(session.connection_id);
        rooms.insert(room);
        true
    }

    pub fn leave(&self, connection_id: ConnectionId, conversation_id: Uuid) -> bool {
        let Some(session) = self.session(connection_id) else {
            return false;
        };
        let room = room_name(conversation_id);
        let was_member = session
            .rooms
            .lock()
            .as_mut()
            .is_some_and(|rooms| rooms.remove(&room));
        self.remove_from_room(&room, connection_id);
        was_member
    }

    /// Record the viewed conversation, if this connection is the user's current one.
    pub fn set_viewing(&self, connection_id: ConnectionId, conversation_id: Uuid) -> bool {
        match self.current_user(connection_id) {
            Some(user_id) => self.presence.set_viewing(&user_id, conversation_id),
            None => false,
        }
    }

    pub fn clear_viewing(&self, connection_id: ConnectionId) -> bool {
        match self.current_user(connection_id) {
            Some(user_id) => self.presence.clear_viewing(&user_id),
            None => false,
        }
    }

    /// Identity a connection was opened with.
    pub fn user_of(&self, connection_id: ConnectionId) -> Option<String> {
        self.sessions.get(&connection_id).map(|s| s.user_id.clone())
    }

    /// Get connection count
    pub fn connection_count(&self) -> usize {
        self.sessions.len()
    }

    /// Send `getOnlineUsers` with the current registry contents to everyone.
    pub fn broadcast_online_users(&self) {
        let event = ServerEvent::OnlineUsers(self.presence.online_users());
        let Some(frame) = Self::encode(&event) else {
            return;
        };
        for session in self.sessions.iter() {
            session.send(&frame);
        }
    }

    fn session(&self, connection_id: ConnectionId) -> Option<Arc<ConnectedSession>> {
        self.sessions.get(&connection_id).map(|s| Arc::clone(s.value()))
    }

    /// User whose presence entry points at this connection.
    fn current_user(&self, connection_id: ConnectionId) -> Option<String> {
        let user_id = self.user_of(connection_id)?;
        let entry = self.presence.get(&user_id)?;
        (entry.connection_id == connection_id).then_some(user_id)
    }

    fn remove_from_room(&self, room: &str, connection_id: ConnectionId) {
        if let Some(mut members) = self.rooms.get_mut(room) {
            members.remove(&connection_id);
        }
        self.rooms.remove_if(room, |_, members| members.is_empty());
    }

    fn room_members(&self, conversation_id: Uuid) -> Vec<ConnectionId> {
        self.rooms
            .get(&room_name(conversation_id))
            .map(|members| members.iter().copied().collect())
            .unwrap_or_default()
    }

    fn encode(event: &ServerEvent) -> Option<String> {
        match event.to_frame() {
            Ok(frame) => Some(frame),
            Err(e) => {
                tracing::error!(event = event.event_name(), error = %e, "Failed to encode event");
                None
            }
        }
    }

    fn send_to_members(&self, members: impl Iterator<Item = ConnectionId>, event: &ServerEvent) -> usize {
        let Some(frame) = Self::encode(event) else {
            return 0;
        };
        members
            .filter_map(|id| self.session(id))
            .filter(|session| session.send(&frame))
            .count()
    }
}

impl RealtimeChannel for Gateway {
    fn emit_to_room(&self, conversation_id: Uuid, event: &ServerEvent) -> usize {
        let members = self.room_members(conversation_id);
        self.send_to_members(members.into_iter(), event)
    }

    fn emit_to_room_except(&self, conversation_id: Uuid, except: ConnectionId, event: &ServerEvent) -> usize {
        let members = self.room_members(conversation_id);
        self.send_to_members(members.into_iter().filter(|id| *id != except), event)
    }

    fn emit_to_connection(&self, connection_id: ConnectionId, event: &ServerEvent) -> bool {
        self.send_to_members(std::iter::once(connection_id), event) == 1
    }

    fn rooms_of(&self, connection_id: ConnectionId) -> Vec<String> {
        self.session(connection_id)
            .and_then(|s| s.rooms.lock().as_ref().map(|rooms| rooms.iter().cloned().collect()))
            .unwrap_or_default()
    }
}
