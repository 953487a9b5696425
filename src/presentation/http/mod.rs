//! HTTP API
//!
//! Producer and history endpoints, health probes and metrics.

pub mod extractors;
pub mod handlers;
pub mod routes;

pub use extractors::{CurrentUser, USER_ID_HEADER};
pub use routes::create_router;
