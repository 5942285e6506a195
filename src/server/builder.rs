//! ServerBuilder for fluent API to build HTTP servers

use super::exposure::{RestExposure, WebSocketExposure};
use super::host::ServerHost;
use crate::config::{AppConfig, CorsConfig};
use crate::core::auth::IdentityProvider;
use crate::core::broker::Broker;
use crate::core::store::KeyValueStore;
use crate::storage::{InMemoryBroker, InMemoryStore};
use anyhow::Result;
use axum::Router;
use axum::http::HeaderValue;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Builder for creating the threadline HTTP server
///
/// Collaborators default to the in-process implementations: an
/// [`InMemoryStore`], an [`InMemoryBroker`] sized from the config, and a
/// static token table from the config's `auth` section.
///
/// # Example
///
/// ```ignore
/// let app = ServerBuilder::new()
///     .with_config(AppConfig::from_yaml_file("threadline.yaml")?)
///     .with_store(InMemoryStore::new())
///     .build()?;
/// ```
pub struct ServerBuilder {
    config: AppConfig,
    store: Option<Arc<dyn KeyValueStore>>,
    broker: Option<Arc<dyn Broker>>,
    identity: Option<Arc<dyn IdentityProvider>>,
    custom_routes: Vec<Router>,
}

impl ServerBuilder {
    /// Create a new ServerBuilder with default configuration
    pub fn new() -> Self {
        Self {
            config: AppConfig::default(),
            store: None,
            broker: None,
            identity: None,
            custom_routes: Vec::new(),
        }
    }

    /// Use this configuration
    pub fn with_config(mut self, config: AppConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the comment store
    pub fn with_store(mut self, store: impl KeyValueStore + 'static) -> Self {
        self.store = Some(Arc::new(store));
        self
    }

    /// Set the broker
    ///
    /// Writers in other processes reach this server's connections only if
    /// they publish through the same broker.
    pub fn with_broker(mut self, broker: impl Broker + 'static) -> Self {
        self.broker = Some(Arc::new(broker));
        self
    }

    /// Set the identity provider, replacing the configured token table
    pub fn with_identity_provider(mut self, identity: impl IdentityProvider + 'static) -> Self {
        self.identity = Some(Arc::new(identity));
        self
    }

    /// Add custom routes to the server
    pub fn with_custom_routes(mut self, routes: Router) -> Self {
        self.custom_routes.push(routes);
        self
    }

    /// Build the transport-agnostic host
    pub fn build_host(mut self) -> Result<ServerHost> {
        let store = self
            .store
            .take()
            .unwrap_or_else(|| Arc::new(InMemoryStore::new()));
        let broker = self.broker.take().unwrap_or_else(|| {
            Arc::new(InMemoryBroker::with_capacity(
                self.config.fanout.broker_capacity,
            ))
        });
        let identity = match self.identity.take() {
            Some(identity) => identity,
            None => {
                let provider = self.config.identity_provider();
                if provider.is_empty() {
                    tracing::warn!("No auth tokens configured; write endpoints will reject every caller");
                }
                Arc::new(provider)
            }
        };

        Ok(ServerHost::from_builder_components(
            self.config,
            store,
            broker,
            identity,
        ))
    }

    /// Build the final router: REST + both WebSocket shapes
    pub fn build(mut self) -> Result<Router> {
        let custom_routes = std::mem::take(&mut self.custom_routes);
        let host = Arc::new(self.build_host()?);
        build_app(host, custom_routes)
    }

    /// Serve the application with graceful shutdown
    ///
    /// This will:
    /// - Bind to the provided address
    /// - Start serving requests
    /// - Handle SIGTERM and SIGINT (Ctrl+C) for graceful shutdown
    pub async fn serve(self, addr: &str) -> Result<()> {
        let app = self.build()?;
        let listener = TcpListener::bind(addr).await?;

        tracing::info!("Server listening on {}", addr);

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await?;

        tracing::info!("Server shutdown complete");
        Ok(())
    }
}

impl Default for ServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Expose a host over REST and WebSocket on one router
pub fn build_app(host: Arc<ServerHost>, custom_routes: Vec<Router>) -> Result<Router> {
    let cors = cors_layer(&host.config.cors);
    let rest_router = RestExposure::build_router(host.clone(), custom_routes)?;
    let ws_router = WebSocketExposure::build_router(host)?;

    Ok(rest_router.merge(ws_router).layer(
        ServiceBuilder::new()
            .layer(TraceLayer::new_for_http())
            .layer(cors),
    ))
}

fn cors_layer(config: &CorsConfig) -> CorsLayer {
    let layer = CorsLayer::new().allow_methods(Any).allow_headers(Any);
    if config.allows_any() {
        return layer.allow_origin(Any);
    }

    let origins: Vec<HeaderValue> = config
        .allowed_origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(origin = %origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();
    layer.allow_origin(origins)
}


/// Wait for shutdown signal (SIGTERM or Ctrl+C)
async fn shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C signal, initiating graceful shutdown...");
        },
        _ = terminate => {
            tracing::info!("Received SIGTERM signal, initiating graceful shutdown...");
        },
    }
}
