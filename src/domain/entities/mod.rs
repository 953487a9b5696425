//! # Domain Entities
//!
//! Core domain entities of the delivery pipeline.
//!
//! - **ChatConversation**: a two-party conversation with its latest-message summary
//! - **ChatMessage**: a persisted message with monotonic seen state
//! - **MessageSubmissionEvent**: the queued, not-yet-persisted message
//! - **PresenceEntry**: ephemeral connection and viewing state of a user
//!
//! Repository traits are implemented in the infrastructure layer.

mod conversation;
mod message;
mod presence;
mod submission;

pub use conversation::{ChatConversation, ConversationRepository, LatestMessage};

pub use message::{
    summary_text, ChatMessage, ImageRef, InsertOutcome, MessageKind, MessageRepository,
    IMAGE_PLACEHOLDER,
};

pub use presence::{ConnectionId, PresenceEntry, PresenceRegistry};

pub use submission::{
    derive_submission_id, message_id_for_submission, DuplicatePolicy, EventValidationError,
    MessageSubmissionEvent, SubmissionState,
};
