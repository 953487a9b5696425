//! # Chat Relay Library
//!
//! Asynchronous message delivery and presence sync for one-to-one chat:
//! - HTTP producer and history API
//! - Durable submission queue feeding storage, delivery and notification stages
//! - WebSocket gateway for real-time events and read receipts
//! - PostgreSQL store and Redis Streams queue, or in-memory equivalents
//!
//! ## Architecture
//!
//! The crate follows Clean Architecture principles:
//!
//! - **Domain Layer**: Entities, server events and the store, queue, presence
//!   and real-time contracts
//! - **Application Layer**: Pipeline stages, workers, services and DTOs
//! - **Infrastructure Layer**: PostgreSQL, Redis, in-memory and metrics implementations
//! - **Presentation Layer**: HTTP handlers and WebSocket gateway
//!
//! ## Module Structure
//!
//! ```text
//! chat_relay/
//! +-- config/         Configuration management
//! +-- domain/         Entities, events and contracts
//! +-- application/    Pipeline, services and DTOs
//! +-- infrastructure/ Store, queue, presence and metrics implementations
//! +-- presentation/   HTTP routes and WebSocket handlers
//! +-- shared/         Common utilities (errors)
//! ```

// Configuration module
pub mod config;

// Domain layer - Core business logic
pub mod domain;

// Application layer - Pipeline and services
pub mod application;

// Infrastructure layer - External implementations
pub mod infrastructure;

// Presentation layer - HTTP and WebSocket handlers
pub mod presentation;

// Shared utilities
pub mod shared;

// Application startup and state management
pub mod startup;

// Telemetry and observability
pub mod telemetry;
