//! # Domain Layer
//!
//! The domain layer contains the core chat message types and the
//! repository contract for durable storage. It is independent of any
//! external frameworks or infrastructure concerns.

pub mod message;

pub use message::{ChatMessage, MessageRepository, PersistedMessage};

#[cfg(test)]
pub use message::MockMessageRepository;
