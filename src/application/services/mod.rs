//! Application Services
//!
//! Business logic services that coordinate domain operations.
//!
//! ## Available Services
//!
//! - **ConversationService**: opening and listing two-party conversations
//! - **MessageService**: publishing submissions, history and read receipts

pub mod conversation_service;
pub mod message_service;

// Re-export conversation service types
pub use conversation_service::{
    ConversationError, ConversationService, ConversationServiceImpl, ConversationSummary,
};

// Re-export message service types
pub use message_service::{
    MessageError, MessageHistory, MessageService, MessageServiceImpl, SubmissionReceipt,
    SubmitMessageDto,
};
