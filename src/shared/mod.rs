//! Shared Utilities
//!
//! Common types used across layers.

pub mod error;

pub use error::AppError;
