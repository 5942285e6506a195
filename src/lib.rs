//! # Threadline
//!
//! Real-time comment threads. Comments are written over REST, persisted in a
//! key-value store and announced on a publish/subscribe broker. Every server
//! process fans those announcements out to the WebSocket connections that
//! joined the thread.
//!
//! ## Features
//!
//! - **Connection Registry**: tracks which live connection joined which topic
//! - **Fanout Engine**: one broker subscription per topic, shared by every local member
//! - **Pluggable collaborators**: `KeyValueStore`, `Broker` and `IdentityProvider` traits
//! - **Two socket shapes**: a multiplexed `/ws` protocol and a per-thread `/ws/threads/{id}` socket
//! - **Configuration-Based**: YAML config with environment overrides
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use threadline::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let config = AppConfig::load(Some("threadline.yaml"))?;
//!     let addr = config.bind_addr();
//!
//!     ServerBuilder::new()
//!         .with_config(config)
//!         .with_store(InMemoryStore::new())
//!         .with_broker(InMemoryBroker::new())
//!         .serve(&addr)
//!         .await
//! }
//! ```

pub mod comments;
pub mod config;
pub mod core;
pub mod fanout;
pub mod server;
pub mod storage;

/// Re-exports of commonly used types and traits
pub mod prelude {
    // === Core Traits ===
    pub use crate::core::{
        auth::{Identity, IdentityProvider, StaticTokenIdentity},
        broker::{Broker, Feed},
        error::{ApiError, BrokerError, CommentError, FanoutError, StoreError},
        events::{EventKind, PublishedEvent, thread_topic},
        store::KeyValueStore,
    };

    // === Fanout ===
    pub use crate::fanout::{ConnectionId, DeliveryReport, FanoutEngine};

    // === Comments ===
    pub use crate::comments::{Comment, CommentService};

    // === Storage ===
    pub use crate::storage::{InMemoryBroker, InMemoryStore};

    // === Config ===
    pub use crate::config::AppConfig;

    // === Server ===
    pub use crate::server::{ServerBuilder, ServerHost};

    // === External dependencies ===
    pub use anyhow::Result;
    pub use async_trait::async_trait;
    pub use chrono::{DateTime, Utc};
    pub use serde::{Deserialize, Serialize};
    pub use uuid::Uuid;

    // === Axum ===
    pub use axum::Router;
}
