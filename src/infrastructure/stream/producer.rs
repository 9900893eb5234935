//! Stream Producer
//!
//! Appends chat messages to the durable log.

use chrono::Utc;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use tracing::trace;

use crate::domain::ChatMessage;
use crate::infrastructure::metrics;
use crate::shared::error::AppError;

/// Producing half of the durable log.
///
/// Cheap to clone; all clones share the underlying multiplexed connection,
/// so one connection per process serves every append.
#[derive(Clone)]
pub struct StreamProducer {
    conn: ConnectionManager,
    stream: String,
}

impl StreamProducer {
    pub fn new(conn: ConnectionManager, stream: impl Into<String>) -> Self {
        Self {
            conn,
            stream: stream.into(),
        }
    }

    /// Append a chat message to the log.
    ///
    /// The record key derives from the send time; the stream assigns its own
    /// monotonic record id. Returns the assigned record id. Callers on the
    /// broadcast path treat failure as logged, counted, and non-fatal; no
    /// application-level retry exists around this call.
    pub async fn append(&self, message: &ChatMessage) -> Result<String, AppError> {
        let key = Utc::now().timestamp_millis().to_string();
        let payload = serde_json::to_string(message)?;

        let mut conn = self.conn.clone();
        let id: String = conn
            .xadd(
                &self.stream,
                "*",
                &[("key", key.as_str()), ("payload", payload.as_str())],
            )
            .await?;

        metrics::LOG_RECORDS_APPENDED.inc();
        trace!(stream = %self.stream, record_id = %id, "Appended record to durable log");
        Ok(id)
    }
}
