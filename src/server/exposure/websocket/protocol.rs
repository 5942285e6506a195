//! WebSocket message protocol definitions
//!
//! Defines the JSON messages exchanged on the multiplexed `/ws` socket. The
//! per-thread socket (`/ws/threads/{thread_id}`) carries bare
//! [`PublishedEvent`] payloads and takes no client messages.
//!
//! ## Client → Server Messages
//!
//! ```json
//! {"type": "subscribe_thread", "thread_id": "general"}
//! {"type": "unsubscribe_thread", "thread_id": "general"}
//! {"type": "ping"}
//! ```
//!
//! ## Server → Client Messages
//!
//! ```json
//! {"type": "welcome", "connection_id": "conn_..."}
//! {"type": "subscribed", "thread_id": "general"}
//! {"type": "unsubscribed", "thread_id": "general"}
//! {"type": "event", "kind": "new_comment", "thread_id": "general", "body": {...}}
//! {"type": "pong"}
//! {"type": "error", "message": "Invalid thread id 'a b'"}
//! ```

use crate::core::events::PublishedEvent;
use crate::fanout::ConnectionId;
use serde::{Deserialize, Serialize};

/// Messages sent from client to server
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Start receiving a thread's events
    SubscribeThread { thread_id: String },
    /// Stop receiving a thread's events
    UnsubscribeThread { thread_id: String },
    /// Keepalive ping
    Ping,
}

/// Messages sent from server to client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Welcome message on connection
    Welcome { connection_id: ConnectionId },
    /// Subscription confirmation
    Subscribed { thread_id: String },
    /// Unsubscription confirmation
    Unsubscribed { thread_id: String },
    /// A thread event
    Event {
        #[serde(flatten)]
        event: PublishedEvent,
    },
    /// Keepalive response
    Pong,
    /// Error message
    Error {
        /// Human-readable error description
        message: String,
    },
}

impl ServerMessage {
    pub fn error(message: impl Into<String>) -> Self {
        ServerMessage::Error {
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_client_message_parsing() {
        let msg: ClientMessage =
            serde_json::from_str(r#"{"type": "subscribe_thread", "thread_id": "t1"}"#).unwrap();
        assert_eq!(
            msg,
            ClientMessage::SubscribeThread {
                thread_id: "t1".to_string()
            }
        );

        let msg: ClientMessage = serde_json::from_str(r#"{"type": "ping"}"#).unwrap();
        assert_eq!(msg, ClientMessage::Ping);
    }

    #[test]
    fn test_unknown_client_message_is_rejected() {
        assert!(serde_json::from_str::<ClientMessage>(r#"{"type": "subscribe"}"#).is_err());
        assert!(
            serde_json::from_str::<ClientMessage>(r#"{"type": "subscribe_thread"}"#).is_err()
        );
    }

    #[test]
    fn test_event_is_flattened() {
        let msg = ServerMessage::Event {
            event: PublishedEvent::new_comment("t1", json!({"content": "hi"})),
        };
        let value = serde_json::to_value(&msg).unwrap();

        assert_eq!(value["type"], "event");
        assert_eq!(value["kind"], "new_comment");
        assert_eq!(value["thread_id"], "t1");
        assert_eq!(value["body"]["content"], "hi");

        let back: ServerMessage = serde_json::from_value(value).unwrap();
        assert_eq!(back, msg);
    }

    #[test]
    fn test_welcome_carries_connection_id() {
        let msg = ServerMessage::Welcome {
            connection_id: ConnectionId::from("conn_1"),
        };
        assert_eq!(
            serde_json::to_value(&msg).unwrap(),
            json!({"type": "welcome", "connection_id": "conn_1"})
        );
    }

    #[test]
    fn test_error_helper() {
        assert_eq!(
            serde_json::to_value(ServerMessage::error("nope")).unwrap(),
            json!({"type": "error", "message": "nope"})
        );
    }
}
