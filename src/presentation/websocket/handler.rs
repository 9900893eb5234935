//! WebSocket Connection Handler
//!
//! Handles individual WebSocket connections: inbound chat events go to the
//! pub/sub relay, relay-delivered events arrive through the gateway's
//! per-session channel.

use axum::{
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    response::Response,
};
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use uuid::Uuid;

use super::messages::{ClientEvent, ServerEvent};
use crate::infrastructure::metrics;
use crate::startup::AppState;

/// WebSocket upgrade handler
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// Handle individual WebSocket connection
async fn handle_socket(socket: WebSocket, state: AppState) {
    let session_id = Uuid::new_v4().to_string();

    tracing::debug!(session_id = %session_id, "New WebSocket connection");

    // Split socket for concurrent read/write
    let (mut sender, mut receiver) = socket.split();

    // Create channel for outgoing messages
    let (tx, mut rx) = mpsc::unbounded_channel::<ServerEvent>();

    // Register with the gateway before entering the read loop so broadcasts
    // from other clients reach this socket immediately
    state.gateway.register_session(session_id.clone(), tx);

    // Spawn task to forward broadcast events from channel to WebSocket
    let sender_task = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            let text = match serde_json::to_string(&event) {
                Ok(t) => t,
                Err(e) => {
                    tracing::error!("Failed to serialize event: {}", e);
                    continue;
                }
            };
            if sender.send(Message::Text(text.into())).await.is_err() {
                break;
            }
        }
    });

    // Main read loop
    while let Some(msg) = receiver.next().await {
        match msg {
            Ok(Message::Text(text)) => {
                handle_client_message(&text, &session_id, &state).await;
            }
            Ok(Message::Close(_)) => {
                tracing::debug!(session_id = %session_id, "Connection closed");
                break;
            }
            Ok(Message::Ping(_)) => {
                // Pong is handled automatically by axum
            }
            Err(e) => {
                tracing::debug!(session_id = %session_id, error = %e, "WebSocket error");
                break;
            }
            _ => {}
        }
    }

    // Cleanup
    state.gateway.unregister_session(&session_id);
    sender_task.abort();

    tracing::debug!(session_id = %session_id, "Session closed");
}

/// Handle one inbound text frame from a client.
///
/// A valid chat event is published to the relay, fire-and-forget: no
/// acknowledgement is returned to the sender, and a failed publish is
/// logged and counted but never fails the connection.
async fn handle_client_message(text: &str, session_id: &str, state: &AppState) {
    match serde_json::from_str::<ClientEvent>(text) {
        Ok(ClientEvent::SendMessage(chat)) => {
            match state.relay.publish(&chat).await {
                Ok(()) => {
                    metrics::RELAY_MESSAGES_PUBLISHED.inc();
                }
                Err(e) => {
                    metrics::RELAY_PUBLISH_FAILURES.inc();
                    tracing::warn!(
                        session_id = %session_id,
                        error = %e,
                        "Failed to publish message to relay"
                    );
                }
            }
        }
        Err(e) => {
            tracing::debug!(
                session_id = %session_id,
                error = %e,
                "Ignoring unrecognized client event"
            );
        }
    }
}
