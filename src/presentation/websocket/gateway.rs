//! WebSocket Gateway
//!
//! Tracks connected sockets and broadcasts relay-delivered messages to all
//! of them. Connections are ephemeral, in-memory state; their lifecycle is
//! bounded by the underlying WebSocket connection.

use dashmap::DashMap;
use tokio::sync::mpsc;

use super::messages::ServerEvent;
use crate::infrastructure::metrics;

/// WebSocket gateway managing all connections of this process.
pub struct Gateway {
    /// Active sessions by session_id, each with its outbound message sender
    sessions: DashMap<String, mpsc::UnboundedSender<ServerEvent>>,
}

impl Gateway {
    pub fn new() -> Self {
        Self {
            sessions: DashMap::new(),
        }
    }

    /// Register a new connected session
    pub fn register_session(&self, session_id: String, sender: mpsc::UnboundedSender<ServerEvent>) {
        self.sessions.insert(session_id.clone(), sender);
        metrics::WEBSOCKET_CONNECTIONS_ACTIVE.set(self.sessions.len() as i64);
        tracing::info!(session_id = %session_id, "Session registered");
    }

    /// Unregister a session
    pub fn unregister_session(&self, session_id: &str) {
        if self.sessions.remove(session_id).is_some() {
            metrics::WEBSOCKET_CONNECTIONS_ACTIVE.set(self.sessions.len() as i64);
            tracing::info!(session_id = %session_id, "Session unregistered");
        }
    }

    /// Broadcast an event to every connected session.
    ///
    /// Sessions whose socket task has already gone away are pruned.
    /// Returns the number of sessions the event was delivered to.
    pub fn broadcast(&self, event: ServerEvent) -> usize {
        let mut delivered = 0;
        let mut stale = Vec::new();

        for session in self.sessions.iter() {
            if session.value().send(event.clone()).is_ok() {
                delivered += 1;
            } else {
                stale.push(session.key().clone());
            }
        }

        for session_id in stale {
            self.unregister_session(&session_id);
        }

        delivered
    }

    /// Get session count
    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }
}

impl Default for Gateway {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ChatMessage;
    use pretty_assertions::assert_eq;

    fn chat(message: &str, username: &str) -> ServerEvent {
        ServerEvent::ReceiveMessage(ChatMessage {
            message: message.into(),
            username: username.into(),
        })
    }

    #[tokio::test]
    async fn broadcast_reaches_every_session() {
        let gateway = Gateway::new();
        let (tx_a, mut rx_a) = mpsc::unbounded_channel();
        let (tx_b, mut rx_b) = mpsc::unbounded_channel();
        gateway.register_session("a".into(), tx_a);
        gateway.register_session("b".into(), tx_b);

        let delivered = gateway.broadcast(chat("hello", "alice"));
        assert_eq!(delivered, 2);

        assert_eq!(rx_a.recv().await.unwrap(), chat("hello", "alice"));
        assert_eq!(rx_b.recv().await.unwrap(), chat("hello", "alice"));
    }

    #[tokio::test]
    async fn unregistered_session_receives_nothing() {
        let gateway = Gateway::new();
        let (tx, mut rx) = mpsc::unbounded_channel();
        gateway.register_session("a".into(), tx);
        gateway.unregister_session("a");

        assert_eq!(gateway.broadcast(chat("hello", "alice")), 0);
        assert!(rx.try_recv().is_err());
        assert_eq!(gateway.session_count(), 0);
    }

    #[tokio::test]
    async fn dead_sessions_are_pruned_on_broadcast() {
        let gateway = Gateway::new();
        let (tx_live, mut rx_live) = mpsc::unbounded_channel();
        let (tx_dead, rx_dead) = mpsc::unbounded_channel();
        gateway.register_session("live".into(), tx_live);
        gateway.register_session("dead".into(), tx_dead);
        drop(rx_dead);

        let delivered = gateway.broadcast(chat("hi", "bob"));
        assert_eq!(delivered, 1);
        assert_eq!(gateway.session_count(), 1);
        assert_eq!(rx_live.recv().await.unwrap(), chat("hi", "bob"));
    }
}
