//! Relay Publisher
//!
//! Publishes chat messages into the shared fan-out channel.

use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use tracing::trace;

use crate::domain::ChatMessage;
use crate::shared::error::AppError;

/// Publishing half of the pub/sub relay.
///
/// Cheap to clone; all clones share the underlying multiplexed connection.
#[derive(Clone)]
pub struct RelayPublisher {
    conn: ConnectionManager,
    channel: String,
}

impl RelayPublisher {
    pub fn new(conn: ConnectionManager, channel: impl Into<String>) -> Self {
        Self {
            conn,
            channel: channel.into(),
        }
    }

    /// Publish a chat message to the relay channel.
    ///
    /// Best-effort fan-out: delivery only reaches currently subscribed
    /// processes, and no acknowledgement flows back to the sending client.
    pub async fn publish(&self, message: &ChatMessage) -> Result<(), AppError> {
        let payload = serde_json::to_string(message)?;
        let mut conn = self.conn.clone();
        let receivers: i64 = conn.publish(&self.channel, payload).await?;
        trace!(
            channel = %self.channel,
            receivers,
            "Published message to relay"
        );
        Ok(())
    }
}
