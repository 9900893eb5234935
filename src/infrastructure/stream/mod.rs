//! Durable Log Module
//!
//! Redis stream backing for the chat message flow. The stream is an
//! append-only, replayable log retained independently of any consumer's
//! progress; a consumer group tracks how far the persistence consumer has
//! read.

mod consumer;
mod producer;

pub use consumer::StreamConsumer;
pub use producer::StreamProducer;

use redis::aio::ConnectionManager;
use redis::Client;
use tracing::{info, instrument};

use crate::config::LogSettings;

/// Creates a Redis connection manager for the durable log.
///
/// Established once per process and reused for every append and read.
#[instrument(skip(settings), fields(url = %settings.url))]
pub async fn create_log_client(
    settings: &LogSettings,
) -> Result<ConnectionManager, redis::RedisError> {
    info!("Connecting to durable log...");
    let client = Client::open(settings.url.as_str())?;
    let manager = ConnectionManager::new(client).await?;
    info!("Durable log connection established");
    Ok(manager)
}
