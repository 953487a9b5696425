//! WebSocket Session Management

use std::time::{Duration, Instant};

use crate::domain::ConnectionId;

/// Per-connection state owned by the connection task
#[derive(Debug)]
pub struct SessionState {
    pub user_id: String,
    pub connection_id: ConnectionId,
    pub frames_received: u64,
    pub last_activity: Instant,
}

impl SessionState {
    pub fn new(user_id: String, connection_id: ConnectionId) -> Self {
        Self {
            user_id,
            connection_id,
            frames_received: 0,
            last_activity: Instant::now(),
        }
    }

    pub fn touch(&mut self) {
        self.frames_received += 1;
        self.last_activity = Instant::now();
    }

    pub fn is_idle(&self, timeout: Duration) -> bool {
        self.last_activity.elapsed() >= timeout
    }
}
