//! Per-thread WebSocket: `GET /ws/threads/{thread_id}`
//!
//! The connection joins its thread as soon as it opens and is deregistered
//! when it closes. Every frame pushed to the client is a bare
//! `{kind, thread_id, body}` event; client frames other than close are ignored.
//! If the engine drops the connection, the socket is closed with code 1013.

use super::handler::{send_dropped_close, send_json};
use crate::core::error::{ApiError, CommentError};
use crate::core::events::{is_valid_thread_id, thread_topic};
use crate::fanout::FanoutEngine;
use axum::extract::ws::{CloseFrame, Message, WebSocket, close_code};
use axum::extract::{Path, State, WebSocketUpgrade};
use axum::response::{IntoResponse, Response};
use futures::SinkExt;
use futures::stream::StreamExt;

/// WebSocket upgrade handler for GET /ws/threads/{thread_id}
///
/// Invalid thread ids are refused before the upgrade.
pub async fn thread_ws_handler(
    Path(thread_id): Path<String>,
    State(engine): State<FanoutEngine>,
    ws: WebSocketUpgrade,
) -> Response {
    if !is_valid_thread_id(&thread_id) {
        return ApiError::from(CommentError::InvalidThreadId(thread_id)).into_response();
    }
    ws.on_upgrade(move |socket| handle_thread_socket(socket, engine, thread_id))
        .into_response()
}

async fn handle_thread_socket(socket: WebSocket, engine: FanoutEngine, thread_id: String) {
    let (conn_id, mut deliveries) = engine.register();
    let topic = thread_topic(&thread_id);
    let (mut ws_write, mut ws_read) = socket.split();

    if let Err(e) = engine.join(&conn_id, &topic).await {
        tracing::warn!(
            connection_id = %conn_id,
            thread_id = %thread_id,
            error = %e,
            "Thread socket could not join"
        );
        let close = CloseFrame {
            code: close_code::AGAIN,
            reason: "subscription unavailable".into(),
        };
        let _ = ws_write.send(Message::Close(Some(close))).await;
        engine.deregister(&conn_id).await;
        return;
    }
    tracing::debug!(connection_id = %conn_id, thread_id = %thread_id, "Thread socket opened");

    let conn_id_write = conn_id.clone();
    let mut write_handle = tokio::spawn(async move {
        loop {
            let Some(delivery) = deliveries.recv().await else {
                tracing::debug!(
                    connection_id = %conn_id_write,
                    "Connection dropped by engine, closing"
                );
                send_dropped_close(&mut ws_write).await;
                break;
            };
            if send_json(&mut ws_write, delivery.as_ref()).await.is_err() {
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
            Ok(Message::Close(_)) => break,
            Ok(_) => {}
            Err(e) => {
                tracing::debug!(connection_id = %conn_id, error = %e, "WebSocket read error");
                break;
            }
        }
    }

    write_handle.abort();
    engine.deregister(&conn_id).await;
    tracing::debug!(connection_id = %conn_id, thread_id = %thread_id, "Thread socket closed");
}
