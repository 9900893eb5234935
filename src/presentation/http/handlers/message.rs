//! Message History Handler
//!
//! Serves recent persisted messages from the row store.

use axum::{
    extract::{Query, State},
    Json,
};
use serde::{Deserialize, Serialize};

use crate::domain::{MessageRepository, PersistedMessage};
use crate::infrastructure::repositories::PgMessageRepository;
use crate::shared::error::AppError;
use crate::startup::AppState;

/// Query parameters for message history
#[derive(Debug, Deserialize)]
pub struct RecentMessagesQuery {
    #[serde(default = "default_limit")]
    pub limit: i64,
}

fn default_limit() -> i64 {
    50
}

/// Persisted message response body
#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub id: String,
    pub content: String,
    pub username: String,
    pub created_at: String,
}

impl From<PersistedMessage> for MessageResponse {
    fn from(message: PersistedMessage) -> Self {
        Self {
            id: message.id.to_string(),
            content: message.content,
            username: message.username,
            created_at: message.created_at.to_rfc3339(),
        }
    }
}

/// GET /api/v1/messages
///
/// Returns the most recent persisted messages, newest first. The limit is
/// capped at 100.
pub async fn get_recent_messages(
    State(state): State<AppState>,
    Query(query): Query<RecentMessagesQuery>,
) -> Result<Json<Vec<MessageResponse>>, AppError> {
    let repository = PgMessageRepository::new(state.db.clone());
    let messages = repository.list_recent(query.limit).await?;

    Ok(Json(messages.into_iter().map(MessageResponse::from).collect()))
}
