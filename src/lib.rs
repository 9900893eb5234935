//! # Chat Relay Library
//!
//! This crate provides a horizontally scalable real-time chat relay with:
//! - A WebSocket gateway for real-time communication
//! - Redis pub/sub fan-out across gateway processes
//! - A durable Redis stream as a replayable message log
//! - PostgreSQL persistence drained from the stream by a background consumer
//!
//! ## Architecture
//!
//! The crate follows Clean Architecture principles:
//!
//! - **Domain Layer**: The chat message payload and repository traits
//! - **Infrastructure Layer**: Database, relay, and stream implementations
//! - **Presentation Layer**: HTTP handlers and WebSocket gateway
//!
//! ## Module Structure
//!
//! ```text
//! chat_relay/
//! +-- config/         Configuration management
//! +-- domain/         Chat message payload and repository traits
//! +-- infrastructure/ Database, pub/sub relay, and stream implementations
//! +-- presentation/   HTTP routes and WebSocket handlers
//! +-- shared/         Common utilities (errors)
//! ```

// Configuration module
pub mod config;

// Domain layer - Core message types
pub mod domain;

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
