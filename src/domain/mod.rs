//! # Domain Layer
//!
//! Core types of the delivery pipeline, independent of infrastructure.
//!
//! ## Structure
//!
//! - **entities**: conversations, messages, submissions, presence
//! - **events**: server-to-client real-time events
//! - **services**: queue and real-time channel contracts
//!
//! Repository and service traits define the seams; the infrastructure and
//! presentation layers implement them.

pub mod entities;
pub mod events;
pub mod services;

// Re-export commonly used types
pub use entities::*;
pub use events::*;
pub use services::*;
