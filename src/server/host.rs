//! Server host for transport-agnostic API exposure
//!
//! A `ServerHost` owns everything the exposures need: configuration, the
//! collaborators (store, broker, identity) and the two cores built on them,
//! the [`CommentService`] and the [`FanoutEngine`]. REST and WebSocket
//! exposures only read from it.

use crate::comments::{CommentService, CommentsState};
use crate::config::AppConfig;
use crate::core::auth::IdentityProvider;
use crate::core::broker::Broker;
use crate::core::store::KeyValueStore;
use crate::fanout::FanoutEngine;
use std::sync::Arc;

/// Host context containing all server state
///
/// # Example
///
/// ```rust,ignore
/// let host = Arc::new(ServerHost::from_builder_components(config, store, broker, identity));
/// let rest_app = RestExposure::build_router(host.clone(), vec![])?;
/// let ws_app = WebSocketExposure::build_router(host)?;
/// ```
pub struct ServerHost {
    /// Effective configuration
    pub config: Arc<AppConfig>,

    /// Persistent store for comments
    pub store: Arc<dyn KeyValueStore>,

    /// Publish/subscribe broker shared by writers and the engine
    pub broker: Arc<dyn Broker>,

    /// Resolves bearer tokens to callers
    pub identity: Arc<dyn IdentityProvider>,

    /// Comment persistence + event publishing
    pub comments: CommentService,

    /// Live connection fanout
    pub engine: FanoutEngine,
}

impl ServerHost {
    /// Build the host from builder components
    pub fn from_builder_components(
        config: AppConfig,
        store: Arc<dyn KeyValueStore>,
        broker: Arc<dyn Broker>,
        identity: Arc<dyn IdentityProvider>,
    ) -> Self {
        let comments = CommentService::new(store.clone(), broker.clone());
        let engine =
            FanoutEngine::with_outbound_buffer(broker.clone(), config.fanout.outbound_buffer);

        Self {
            config: Arc::new(config),
            store,
            broker,
            identity,
            comments,
            engine,
        }
    }

    /// State for the comment HTTP handlers
    pub fn comments_state(&self) -> CommentsState {
        CommentsState {
            service: self.comments.clone(),
            identity: self.identity.clone(),
        }
    }
}
