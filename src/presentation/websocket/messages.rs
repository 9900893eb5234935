//! WebSocket Message Types
//!
//! JSON event envelopes exchanged with browser clients.

use serde::{Deserialize, Serialize};

use crate::domain::ChatMessage;

/// Incoming client event
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ClientEvent {
    /// Client submits a chat message for fan-out
    SendMessage(ChatMessage),
}

/// Outgoing server event
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ServerEvent {
    /// A chat message delivered to every connected client
    ReceiveMessage(ChatMessage),
}
