//! Message Repository Implementation
//!
//! PostgreSQL implementation of durable message storage for the
//! persistence consumer and the history endpoint.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use crate::domain::{MessageRepository, PersistedMessage};
use crate::shared::error::AppError;

/// PostgreSQL message repository implementation.
pub struct PgMessageRepository {
    pool: PgPool,
}

impl PgMessageRepository {
    /// Creates a new PgMessageRepository with the given connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

/// Internal row type for message queries.
/// Maps to the messages table schema defined in the migration.
#[derive(Debug, sqlx::FromRow)]
struct MessageRow {
    id: i64,
    content: String,
    username: String,
    created_at: DateTime<Utc>,
}

impl MessageRow {
    fn into_message(self) -> PersistedMessage {
        PersistedMessage {
            id: self.id,
            content: self.content,
            username: self.username,
            created_at: self.created_at,
        }
    }
}

#[async_trait]
impl MessageRepository for PgMessageRepository {
    /// Insert a message row. The id and timestamp are generated by the
    /// database on insert.
    async fn insert(&self, content: &str, username: &str) -> Result<PersistedMessage, AppError> {
        let row = sqlx::query_as::<_, MessageRow>(
            r#"
            INSERT INTO messages (content, username)
            VALUES ($1, $2)
            RETURNING id, content, username, created_at
            "#,
        )
        .bind(content)
        .bind(username)
        .fetch_one(&self.pool)
        .await?;

        Ok(row.into_message())
    }

    /// Fetch the most recent messages, newest first.
    ///
    /// The limit is capped to prevent excessive queries.
    async fn list_recent(&self, limit: i64) -> Result<Vec<PersistedMessage>, AppError> {
        let limit = limit.clamp(1, 100);

        let rows = sqlx::query_as::<_, MessageRow>(
            r#"
            SELECT id, content, username, created_at
            FROM messages
            ORDER BY id DESC
            LIMIT $1
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(|r| r.into_message()).collect())
    }
}
