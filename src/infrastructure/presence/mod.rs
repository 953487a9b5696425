//! Presence registry
//!
//! Process-local presence keyed by user identity. Each operation touches a
//! single shard entry, so it is atomic per user without a global lock.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use uuid::Uuid;

use crate::domain::{ConnectionId, PresenceEntry, PresenceRegistry};

#[derive(Default)]
pub struct InMemoryPresenceRegistry {
    entries: DashMap<String, PresenceEntry>,
}

impl InMemoryPresenceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl PresenceRegistry for InMemoryPresenceRegistry {
    fn register(&self, user_id: &str, connection_id: ConnectionId) -> Option<PresenceEntry> {
        let prior = self
            .entries
            .insert(user_id.to_string(), PresenceEntry::new(user_id, connection_id));

        if let Some(prior) = &prior {
            tracing::debug!(
                user_id = %user_id,
                replaced = %prior.connection_id,
                connection_id = %connection_id,
                "Presence replaced"
            );
        }
        prior
    }

    fn deregister_if_matches(&self, user_id: &str, connection_id: ConnectionId) -> bool {
        match self.entries.entry(user_id.to_string()) {
            Entry::Occupied(entry) if entry.get().connection_id == connection_id => {
                entry.remove();
                true
            }
            Entry::Occupied(entry) => {
                tracing::debug!(
                    user_id = %user_id,
                    stale = %connection_id,
                    current = %entry.get().connection_id,
                    "Ignoring stale disconnect"
                );
                false
            }
            Entry::Vacant(_) => false,
        }
    }

    fn set_viewing(&self, user_id: &str, conversation_id: Uuid) -> bool {
        match self.entries.get_mut(user_id) {
            Some(mut entry) => {
                entry.viewing = Some(conversation_id);
                true
            }
            None => false,
        }
    }

    fn clear_viewing(&self, user_id: &str) -> bool {
        match self.entries.get_mut(user_id) {
            Some(mut entry) => {
                entry.viewing = None;
                true
            }
            None => false,
        }
    }

    fn get(&self, user_id: &str) -> Option<PresenceEntry> {
        self.entries.get(user_id).map(|e| e.value().clone())
    }

    fn online_users(&self) -> Vec<String> {
        let mut users: Vec<String> = self.entries.iter().map(|e| e.key().clone()).collect();
        users.sort();
        users
    }
}
