//! Server module for building the threadline HTTP server
//!
//! This module provides a `ServerBuilder` that wires:
//! - Comment routes under `/threads/{thread_id}/comments`
//! - The multiplexed `/ws` socket and the per-thread `/ws/threads/{thread_id}` socket
//! - Health routes reporting live fanout counts

pub mod builder;
pub mod exposure;
pub mod host;
pub mod router;

pub use builder::{ServerBuilder, build_app};
pub use exposure::{RestExposure, WebSocketExposure};
pub use host::ServerHost;
