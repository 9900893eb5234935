//! Fan-Out Integration Tests
//!
//! Exercises the gateway broadcast path and the relay wire format without
//! requiring live Redis or PostgreSQL.

use tokio::sync::mpsc;

use chat_relay::domain::ChatMessage;
use chat_relay::presentation::websocket::{ClientEvent, Gateway, ServerEvent};

fn chat(message: &str, username: &str) -> ChatMessage {
    ChatMessage {
        message: message.into(),
        username: username.into(),
    }
}

/// Client A sends a message; client B on the same process receives an
/// identical broadcast payload.
#[tokio::test]
async fn same_process_clients_receive_identical_payload() {
    let gateway = Gateway::new();
    let (tx_a, mut rx_a) = mpsc::unbounded_channel();
    let (tx_b, mut rx_b) = mpsc::unbounded_channel();
    gateway.register_session("client-a".into(), tx_a);
    gateway.register_session("client-b".into(), tx_b);

    // The client frame as it arrives over the socket
    let frame = r#"{"event":"send_message","data":{"message":"hello","username":"alice"}}"#;
    let ClientEvent::SendMessage(sent) = serde_json::from_str(frame).unwrap();

    // The relay carries the serialized ChatMessage; each subscribing
    // process deserializes and broadcasts it
    let wire = serde_json::to_string(&sent).unwrap();
    let received: ChatMessage = serde_json::from_str(&wire).unwrap();
    let delivered = gateway.broadcast(ServerEvent::ReceiveMessage(received));
    assert_eq!(delivered, 2);

    let expected = ServerEvent::ReceiveMessage(chat("hello", "alice"));
    assert_eq!(rx_a.recv().await.unwrap(), expected);
    assert_eq!(rx_b.recv().await.unwrap(), expected);
}

/// Two gateway processes share the relay channel; a message published by a
/// client on process P1 reaches a client connected only to process P2 with
/// the same payload.
#[tokio::test]
async fn cross_process_fanout_preserves_payload() {
    let p1 = Gateway::new();
    let p2 = Gateway::new();

    let (tx_p1, mut rx_p1) = mpsc::unbounded_channel();
    let (tx_p2, mut rx_p2) = mpsc::unbounded_channel();
    p1.register_session("p1-client".into(), tx_p1);
    p2.register_session("p2-client".into(), tx_p2);

    // P1's client publishes; the relay fans the serialized payload out to
    // every subscribing process, P1 itself included
    let wire = serde_json::to_string(&chat("hello", "alice")).unwrap();
    for gateway in [&p1, &p2] {
        let received: ChatMessage = serde_json::from_str(&wire).unwrap();
        gateway.broadcast(ServerEvent::ReceiveMessage(received));
    }

    let expected = ServerEvent::ReceiveMessage(chat("hello", "alice"));
    assert_eq!(rx_p1.recv().await.unwrap(), expected);
    assert_eq!(rx_p2.recv().await.unwrap(), expected);
}

/// The relay wire format round-trips to the exact values the client sent.
#[tokio::test]
async fn relay_wire_format_round_trips() {
    let original = chat("some message with unicode ✓", "bob");
    let wire = serde_json::to_string(&original).unwrap();
    let decoded: ChatMessage = serde_json::from_str(&wire).unwrap();
    assert_eq!(decoded, original);
}

/// A client that disconnects stops receiving broadcasts; remaining clients
/// are unaffected.
#[tokio::test]
async fn disconnected_client_is_not_broadcast_to() {
    let gateway = Gateway::new();
    let (tx_a, mut rx_a) = mpsc::unbounded_channel();
    let (tx_b, rx_b) = mpsc::unbounded_channel();
    gateway.register_session("a".into(), tx_a);
    gateway.register_session("b".into(), tx_b);

    gateway.unregister_session("b");
    drop(rx_b);

    let delivered = gateway.broadcast(ServerEvent::ReceiveMessage(chat("hi", "carol")));
    assert_eq!(delivered, 1);
    assert_eq!(
        rx_a.recv().await.unwrap(),
        ServerEvent::ReceiveMessage(chat("hi", "carol"))
    );
}
