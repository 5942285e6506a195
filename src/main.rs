//! threadline server binary
//!
//! Usage: `threadline [CONFIG_PATH]`. Without a path the built-in defaults
//! are used; `THREADLINE_HOST` and `THREADLINE_PORT` override the bind address.

use anyhow::Result;
use threadline::config::AppConfig;
use threadline::server::ServerBuilder;
use tracing_subscriber::{EnvFilter, fmt};

#[tokio::main]
async fn main() -> Result<()> {
    fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config_path = std::env::args().nth(1);
    let config = AppConfig::load(config_path.as_deref())?;
    let addr = config.bind_addr();

    tracing::info!(
        config = config_path.as_deref().unwrap_or("<defaults>"),
        tokens = config.auth.tokens.len(),
        "Starting threadline"
    );

    ServerBuilder::new().with_config(config).serve(&addr).await
}
