//! Presence entries and the registry contract.
//!
//! Presence is ephemeral and process-local. It is a routing hint for the
//! notification stage, never a source of truth for delivery.

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

/// Identifier of one live real-time connection.
pub type ConnectionId = Uuid;

/// Current connection and viewing state of an online user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PresenceEntry {
    pub user_id: String,
    pub connection_id: ConnectionId,
    /// Conversation the user has open, at most one at a time
    pub viewing: Option<Uuid>,
    pub connected_at: DateTime<Utc>,
}

impl PresenceEntry {
    pub fn new(user_id: impl Into<String>, connection_id: ConnectionId) -> Self {
        Self {
            user_id: user_id.into(),
            connection_id,
            viewing: None,
            connected_at: Utc::now(),
        }
    }

    pub fn is_viewing(&self, conversation_id: Uuid) -> bool {
        self.viewing == Some(conversation_id)
    }
}

/// Keyed store of presence entries.
///
/// All operations are single-key and synchronous. Implementations must make
/// each of them atomic per user.
pub trait PresenceRegistry: Send + Sync {
    /// Make `connection_id` the live connection of `user_id`.
    ///
    /// Any prior connection is replaced and the viewing state reset. Returns
    /// the replaced entry.
    fn register(&self, user_id: &str, connection_id: ConnectionId) -> Option<PresenceEntry>;

    /// Remove the entry only if `connection_id` is still the registered one.
    ///
    /// Returns false when a newer connection owns the entry, so a stale
    /// disconnect cannot clobber it.
    fn deregister_if_matches(&self, user_id: &str, connection_id: ConnectionId) -> bool;

    /// Record the conversation the user is looking at. False if offline.
    fn set_viewing(&self, user_id: &str, conversation_id: Uuid) -> bool;

    /// Clear the viewing state. False if offline.
    fn clear_viewing(&self, user_id: &str) -> bool;

    fn get(&self, user_id: &str) -> Option<PresenceEntry>;

    /// Identities with a registered connection.
    fn online_users(&self) -> Vec<String>;
}
