//! Multiplexed WebSocket: upgrade handler and message loop
//!
//! This module handles `GET /ws`. Each connection gets:
//!
//! 1. A welcome message with its connection ID
//! 2. A read loop mapping `subscribe_thread` / `unsubscribe_thread` to
//!    engine join / leave
//! 3. A write loop forwarding replies and thread events to the WebSocket
//!
//! Closing the socket deregisters the connection from every thread. When the
//! engine drops the connection first (its outbound queue failed), the write
//! loop sends a close frame with code 1013 and the read loop stops.

use super::protocol::{ClientMessage, ServerMessage};
use crate::core::error::FanoutError;
use crate::core::events::{is_valid_thread_id, thread_topic};
use crate::fanout::{ConnectionId, FanoutEngine};
use axum::extract::ws::{CloseFrame, Message, WebSocket, close_code};
use axum::extract::{State, WebSocketUpgrade};
use axum::response::IntoResponse;
use futures::stream::StreamExt;
use futures::{Sink, SinkExt};
use tokio::sync::mpsc;

/// WebSocket upgrade handler for GET /ws
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(engine): State<FanoutEngine>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, engine))
}

/// Serialize and send one message
///
/// Serialization failures are logged and skipped; only transport errors
/// are returned.
pub(super) async fn send_json<S, T>(sink: &mut S, message: &T) -> Result<(), axum::Error>
where
    S: Sink<Message, Error = axum::Error> + Unpin,
    T: serde::Serialize,
{
    match serde_json::to_string(message) {
        Ok(json) => sink.send(Message::Text(json.into())).await,
        Err(e) => {
            tracing::error!(error = %e, "Failed to serialize WebSocket message");
            Ok(())
        }
    }
}

/// Tell the client the engine dropped its connection
pub(super) async fn send_dropped_close<S>(sink: &mut S)
where
    S: Sink<Message, Error = axum::Error> + Unpin,
{
    let close = CloseFrame {
        code: close_code::AGAIN,
        reason: "connection dropped".into(),
    };
    let _ = sink.send(Message::Close(Some(close))).await;
}

/// Handle a single multiplexed connection
async fn handle_socket(socket: WebSocket, engine: FanoutEngine) {
    let (conn_id, mut deliveries) = engine.register();
    let (mut ws_write, mut ws_read) = socket.split();

    let welcome = ServerMessage::Welcome {
        connection_id: conn_id.clone(),
    };
    if send_json(&mut ws_write, &welcome).await.is_err() {
        engine.deregister(&conn_id).await;
        return;
    }

    // Replies to client messages; events arrive on `deliveries`
    let (reply_tx, mut reply_rx) = mpsc::unbounded_channel::<ServerMessage>();
    let conn_id_write = conn_id.clone();

    let mut write_handle = tokio::spawn(async move {
        loop {
            let message = tokio::select! {
                Some(reply) = reply_rx.recv() => reply,
                delivery = deliveries.recv() => match delivery {
                    Some(delivery) => ServerMessage::Event {
                        event: delivery.as_ref().clone(),
                    },
                    None => {
                        tracing::debug!(
                            connection_id = %conn_id_write,
                            "Connection dropped by engine, closing"
                        );
                        send_dropped_close(&mut ws_write).await;
                        break;
                    }
                },
            };
            if send_json(&mut ws_write, &message).await.is_err() {
                tracing::debug!(
                    connection_id = %conn_id_write,
                    "WebSocket write failed, closing"
                );
                break;
            }
        }
    });

    loop {
        let result = tokio::select! {
            next = ws_read.next() => match next {
                Some(result) => result,
                None => break,
            },
            _ = &mut write_handle => break,
        };
        match result {
            Ok(Message::Text(text)) => {
                let reply = handle_client_message(&engine, &conn_id, &text).await;
                if reply_tx.send(reply).is_err() {
                    break;
                }
            }
            Ok(Message::Close(_)) => {
                tracing::debug!(connection_id = %conn_id, "Client sent close frame");
                break;
            }
            Ok(_) => {
                // Pings are answered by axum; binary frames are ignored
            }
            Err(e) => {
                tracing::debug!(
                    connection_id = %conn_id,
                    error = %e,
                    "WebSocket read error"
                );
                break;
            }
        }
    }

    write_handle.abort();
    engine.deregister(&conn_id).await;
}

/// Process a single client message and produce the reply
async fn handle_client_message(
    engine: &FanoutEngine,
    conn_id: &ConnectionId,
    text: &str,
) -> ServerMessage {
    let message: ClientMessage = match serde_json::from_str(text) {
        Ok(message) => message,
        Err(e) => return ServerMessage::error(format!("Invalid message: {}", e)),
    };

    match message {
        ClientMessage::SubscribeThread { thread_id } => {
            if !is_valid_thread_id(&thread_id) {
                return ServerMessage::error(format!("Invalid thread id '{}'", thread_id));
            }
            match engine.join(conn_id, &thread_topic(&thread_id)).await {
                Ok(()) => ServerMessage::Subscribed { thread_id },
                Err(e) => {
                    match &e {
                        FanoutError::UnknownConnection(_) => {
                            tracing::debug!(connection_id = %conn_id, "Join after deregistration")
                        }
                        _ => tracing::warn!(
                            connection_id = %conn_id,
                            thread_id = %thread_id,
                            error = %e,
                            "Subscribe failed"
                        ),
                    }
                    ServerMessage::error(e.to_string())
                }
            }
        }
        ClientMessage::UnsubscribeThread { thread_id } => {
            engine.leave(conn_id, &thread_topic(&thread_id)).await;
            ServerMessage::Unsubscribed { thread_id }
        }
        ClientMessage::Ping => ServerMessage::Pong,
    }
}
