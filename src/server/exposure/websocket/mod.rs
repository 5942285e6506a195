//! WebSocket API exposure
//!
//! Two socket shapes share the same [`FanoutEngine`]:
//!
//! ```text
//! Client ──ws──▶ /ws                     ──▶ handler       ──join/leave──▶ FanoutEngine
//! Client ──ws──▶ /ws/threads/{thread_id} ──▶ thread_socket ──join───────▶ FanoutEngine
//!                                                                               │
//!                                          Broker ──feed──▶ delivery task ──────┘──▶ Client
//! ```
//!
//! # Protocol (`/ws`)
//!
//! Client → Server (JSON):
//! - `{"type": "subscribe_thread", "thread_id": "..."}`
//! - `{"type": "unsubscribe_thread", "thread_id": "..."}`
//! - `{"type": "ping"}`
//!
//! Server → Client (JSON):
//! - `{"type": "welcome", "connection_id": "..."}`
//! - `{"type": "event", "kind": "...", "thread_id": "...", "body": {...}}`
//! - `{"type": "subscribed", "thread_id": "..."}`
//! - `{"type": "unsubscribed", "thread_id": "..."}`
//! - `{"type": "pong"}`
//! - `{"type": "error", "message": "..."}`
//!
//! `/ws/threads/{thread_id}` pushes bare `{kind, thread_id, body}` objects.

mod handler;
pub mod protocol;
mod thread_socket;

use crate::fanout::FanoutEngine;
use crate::server::host::ServerHost;
use anyhow::Result;
use axum::{Router, routing::get};
use std::sync::Arc;

/// WebSocket API exposure implementation
///
/// Consumes a `ServerHost` and produces an Axum router with the `/ws` and
/// `/ws/threads/{thread_id}` endpoints.
///
/// # Example
///
/// ```rust,ignore
/// let host = Arc::new(ServerBuilder::new().build_host()?);
///
/// let rest_router = RestExposure::build_router(host.clone(), vec![])?;
/// let ws_router = WebSocketExposure::build_router(host)?;
///
/// let app = rest_router.merge(ws_router);
/// ```
pub struct WebSocketExposure;

impl WebSocketExposure {
    /// Build the WebSocket router from a host
    pub fn build_router(host: Arc<ServerHost>) -> Result<Router> {
        let engine: FanoutEngine = host.engine.clone();

        let router = Router::new()
            .route("/ws", get(handler::ws_handler))
            .route("/ws/threads/{thread_id}", get(thread_socket::thread_ws_handler))
            .with_state(engine);

        Ok(router)
    }
}
