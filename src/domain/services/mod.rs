//! # Domain Services
//!
//! Contracts for the collaborators the pipeline stages talk to.
//!
//! - **SubmissionQueue**: at-least-once queue of submission payloads
//! - **RealtimeChannel**: room membership and event emission

mod queue;
mod realtime;

pub use queue::{QueueDelivery, QueueError, SubmissionQueue};
pub use realtime::{room_name, RealtimeChannel};
