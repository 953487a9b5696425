//! Repository Implementations
//!
//! PostgreSQL implementations of domain repository traits.
//!
//! ## Available Repositories
//!
//! - **ConversationRepository** - Two-party conversations and their latest-message summary
//! - **MessageRepository** - Idempotent message inserts and seen-state updates
//!
//! ## Usage Example
//!
//! ```rust,ignore
//! use sqlx::PgPool;
//! use chat_relay::infrastructure::repositories::{PgConversationRepository, PgMessageRepository};
//!
//! async fn setup_repositories(pool: PgPool) {
//!     let conversations = PgConversationRepository::new(pool.clone());
//!     let messages = PgMessageRepository::new(pool);
//! }
//! ```

pub mod conversation_repository;
pub mod message_repository;

pub use conversation_repository::PgConversationRepository;
pub use message_repository::PgMessageRepository;
