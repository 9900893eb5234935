//! Pub/Sub Relay Module
//!
//! Redis pub/sub fan-out between gateway processes sharing one logical
//! chat channel. The relay is not a durable queue: a publish only reaches
//! processes that are currently subscribed.
//!
//! Each process holds one publish connection (the shared multiplexed
//! connection manager) and one dedicated subscribe connection held for the
//! process lifetime.

mod publisher;
mod subscriber;

pub use publisher::RelayPublisher;
pub use subscriber::RelaySubscriber;

use redis::aio::ConnectionManager;
use redis::Client;
use tracing::{info, instrument};

use crate::config::RelaySettings;

/// Creates a Redis connection manager with automatic reconnection.
///
/// The connection manager handles automatic reconnection when the
/// connection is lost; it backs the publish side of the relay.
#[instrument(skip(settings), fields(url = %settings.url))]
pub async fn create_relay_client(
    settings: &RelaySettings,
) -> Result<ConnectionManager, redis::RedisError> {
    info!("Connecting to relay...");
    let client = Client::open(settings.url.as_str())?;
    let manager = ConnectionManager::new(client).await?;
    info!("Relay connection established");
    Ok(manager)
}
