//! Test doubles for the pipeline stages.

use std::collections::{HashMap, HashSet};

use parking_lot::Mutex;
use uuid::Uuid;

use crate::domain::{room_name, ConnectionId, RealtimeChannel, ServerEvent};

/// Who an emitted event was addressed to.
#[derive(Debug, Clone, PartialEq)]
pub enum Target {
    Room(Uuid),
    Connection(ConnectionId),
}

/// Real-time channel that records emissions instead of sending them.
#[derive(Default)]
pub struct RecordingChannel {
    rooms: Mutex<HashMap<ConnectionId, HashSet<String>>>,
    emitted: Mutex<Vec<(Target, ServerEvent)>>,
}

impl RecordingChannel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn join(&self, connection_id: ConnectionId, conversation_id: Uuid) {
        self.rooms
            .lock()
            .entry(connection_id)
            .or_default()
            .insert(room_name(conversation_id));
    }

    pub fn emitted(&self) -> Vec<(Target, ServerEvent)> {
        self.emitted.lock().clone()
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.emitted.lock().iter().map(|(_, e)| e.event_name()).collect()
    }
}

impl RealtimeChannel for RecordingChannel {
    fn emit_to_room(&self, conversation_id: Uuid, event: &ServerEvent) -> usize {
        self.emitted
            .lock()
            .push((Target::Room(conversation_id), event.clone()));
        let room = room_name(conversation_id);
        self.rooms.lock().values().filter(|r| r.contains(&room)).count()
    }

    fn emit_to_room_except(&self, conversation_id: Uuid, _except: ConnectionId, event: &ServerEvent) -> usize {
        self.emit_to_room(conversation_id, event).saturating_sub(1)
    }

    fn emit_to_connection(&self, connection_id: ConnectionId, event: &ServerEvent) -> bool {
        self.emitted
            .lock()
            .push((Target::Connection(connection_id), event.clone()));
        true
    }

    fn rooms_of(&self, connection_id: ConnectionId) -> Vec<String> {
        self.rooms
            .lock()
            .get(&connection_id)
            .map(|r| r.iter().cloned().collect())
            .unwrap_or_default()
    }
}
