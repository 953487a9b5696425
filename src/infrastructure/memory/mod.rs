//! In-memory bindings
//!
//! Single-process implementations of the store and queue contracts, used for
//! local development (`infrastructure.mode = "memory"`) and as test fixtures.

mod queue;
mod repositories;

pub use queue::InMemoryQueue;
pub use repositories::{InMemoryConversationRepository, InMemoryMessageRepository};
