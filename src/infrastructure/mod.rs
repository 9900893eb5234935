//! Infrastructure Layer
//!
//! Contains implementations for external services including:
//! - Database repositories (PostgreSQL)
//! - Pub/sub relay (Redis)
//! - Durable stream producer/consumer (Redis streams)
//! - Prometheus metrics

pub mod database;
pub mod metrics;
pub mod relay;
pub mod repositories;
pub mod stream;
