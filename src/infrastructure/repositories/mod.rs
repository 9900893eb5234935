//! Repository Implementations
//!
//! PostgreSQL-backed implementations of the domain repository traits.

mod message_repository;

pub use message_repository::PgMessageRepository;
