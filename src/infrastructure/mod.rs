//! Infrastructure Layer
//!
//! Contains implementations of the domain contracts:
//! - Database pool and repositories (PostgreSQL)
//! - Submission queue (Redis Streams)
//! - In-memory store and queue for single-process runs and tests
//! - Presence registry
//! - Prometheus metrics

pub mod database;
pub mod memory;
pub mod metrics;
pub mod presence;
pub mod queue;
pub mod repositories;
