//! Chat Message Types
//!
//! The wire/log payload and its persisted form.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::shared::error::AppError;

/// Chat message payload.
///
/// Produced by a client and carried unchanged through the relay channel and
/// the durable log. No identifier or ordering key is attached in transit;
/// the log assigns its own record id and the row store its own surrogate id
/// and timestamp on insert.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub message: String,
    pub username: String,
}

/// A chat message persisted to the row store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersistedMessage {
    pub id: i64,
    pub content: String,
    pub username: String,
    pub created_at: DateTime<Utc>,
}

/// Repository contract for durable message storage.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MessageRepository: Send + Sync {
    /// Insert a message, returning the persisted row with its generated
    /// id and creation timestamp.
    async fn insert(&self, content: &str, username: &str) -> Result<PersistedMessage, AppError>;

    /// Fetch the most recent messages, newest first.
    async fn list_recent(&self, limit: i64) -> Result<Vec<PersistedMessage>, AppError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn chat_message_json_round_trip() {
        let original = ChatMessage {
            message: "hello".into(),
            username: "alice".into(),
        };

        let json = serde_json::to_string(&original).unwrap();
        let decoded: ChatMessage = serde_json::from_str(&json).unwrap();

        assert_eq!(decoded, original);
    }

    #[test]
    fn chat_message_wire_shape() {
        let msg = ChatMessage {
            message: "hi".into(),
            username: "bob".into(),
        };

        let value = serde_json::to_value(&msg).unwrap();
        assert_eq!(value, serde_json::json!({"message": "hi", "username": "bob"}));
    }

    #[test]
    fn chat_message_allows_empty_fields() {
        // Empty values are valid on the wire; the consumer-side guard only
        // applies to empty log record payloads, not empty message text.
        let decoded: ChatMessage =
            serde_json::from_str(r#"{"message":"","username":""}"#).unwrap();
        assert_eq!(decoded.message, "");
        assert_eq!(decoded.username, "");
    }
}
