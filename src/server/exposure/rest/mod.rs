//! REST API exposure
//!
//! The REST exposure consumes a `ServerHost` and produces an Axum `Router`
//! with health checks, comment routes and any custom routes.

use super::super::host::ServerHost;
use crate::server::router::build_comment_routes;
use anyhow::Result;
use axum::{Json, Router, extract::State, routing::get};
use serde_json::{Value, json};
use std::sync::Arc;

/// REST API exposure implementation
pub struct RestExposure;

impl RestExposure {
    /// Build the REST router from a host
    ///
    /// # Arguments
    ///
    /// * `host` - The server host containing all state
    /// * `custom_routes` - Additional custom routes to merge
    ///
    /// # Returns
    ///
    /// A router with:
    /// - Health check routes
    /// - Comment routes
    /// - Custom routes
    pub fn build_router(host: Arc<ServerHost>, custom_routes: Vec<Router>) -> Result<Router> {
        let mut app = Self::health_routes(host.clone());

        for custom_router in custom_routes {
            app = app.merge(custom_router);
        }

        app = app.merge(build_comment_routes(host.comments_state()));

        Ok(app)
    }

    /// Build health check routes
    fn health_routes(host: Arc<ServerHost>) -> Router {
        Router::new()
            .route("/health", get(Self::health_check))
            .route("/healthz", get(Self::health_check))
            .with_state(host)
    }

    /// Health check endpoint handler
    async fn health_check(State(host): State<Arc<ServerHost>>) -> Json<Value> {
        Json(json!({
            "status": "ok",
            "service": "threadline",
            "connections": host.engine.connection_count(),
            "subscriptions": host.engine.subscription_count(),
        }))
    }
}
