//! Configuration loading and management
//!
//! Every section is optional in YAML; missing fields fall back to defaults.
//!
//! ```yaml
//! server:
//!   host: 0.0.0.0
//!   port: 8000
//! fanout:
//!   outbound_buffer: 256
//!   broker_capacity: 1024
//! cors:
//!   allowed_origins: ["*"]
//! auth:
//!   tokens:
//!     - token: dev-token
//!       user_id: u-1
//!       username: alice
//! ```

use crate::core::auth::{Identity, StaticTokenIdentity};
use crate::fanout::DEFAULT_OUTBOUND_BUFFER;
use crate::storage::DEFAULT_BROKER_CAPACITY;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Environment variable overriding `server.host`
pub const HOST_ENV: &str = "THREADLINE_HOST";
/// Environment variable overriding `server.port`
pub const PORT_ENV: &str = "THREADLINE_PORT";

/// Listener settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8000,
        }
    }
}

/// Fanout engine and in-process broker sizing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FanoutConfig {
    /// Payloads a connection may have queued before it is dropped
    pub outbound_buffer: usize,
    /// Payloads a broker feed may fall behind before skipping ahead
    pub broker_capacity: usize,
}

impl Default for FanoutConfig {
    fn default() -> Self {
        Self {
            outbound_buffer: DEFAULT_OUTBOUND_BUFFER,
            broker_capacity: DEFAULT_BROKER_CAPACITY,
        }
    }
}

/// Cross-origin settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CorsConfig {
    /// Allowed origins; `"*"` allows any
    pub allowed_origins: Vec<String>,
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            allowed_origins: vec!["*".to_string()],
        }
    }
}

impl CorsConfig {
    /// Whether any origin is allowed
    pub fn allows_any(&self) -> bool {
        self.allowed_origins.iter().any(|origin| origin == "*")
    }
}

/// One accepted bearer token
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenConfig {
    pub token: String,
    pub user_id: String,
    pub username: String,
}

/// Static identity table
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    pub tokens: Vec<TokenConfig>,
}

/// Complete configuration for a threadline server
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub fanout: FanoutConfig,
    pub cors: CorsConfig,
    pub auth: AuthConfig,
}

impl AppConfig {
    /// Load configuration from a YAML file
    pub fn from_yaml_file(path: &str) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file '{}'", path))?;
        Self::from_yaml_str(&content).with_context(|| format!("Invalid config file '{}'", path))
    }

    /// Load configuration from a YAML string
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        // An empty document deserializes to null
        if yaml.trim().is_empty() {
            return Ok(Self::default());
        }
        let config: Self = serde_yaml::from_str(yaml)?;
        Ok(config)
    }

    /// Load from `path` if given (defaults otherwise), then apply environment overrides
    pub fn load(path: Option<&str>) -> Result<Self> {
        let config = match path {
            Some(path) => Self::from_yaml_file(path)?,
            None => Self::default(),
        };
        config.with_overrides(|key| std::env::var(key).ok())
    }

    /// Apply `THREADLINE_HOST` / `THREADLINE_PORT` as returned by `lookup`
    pub fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        if let Some(host) = lookup(HOST_ENV) {
            self.server.host = host;
        }
        if let Some(port) = lookup(PORT_ENV) {
            self.server.port = port
                .parse()
                .with_context(|| format!("{} must be a port number, got '{}'", PORT_ENV, port))?;
        }
        Ok(self)
    }

    /// Address to bind, as `host:port`
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }

    /// Identity provider accepting the configured tokens
    pub fn identity_provider(&self) -> StaticTokenIdentity {
        self.auth
            .tokens
            .iter()
            .fold(StaticTokenIdentity::new(), |provider, entry| {
                provider.with_token(
                    entry.token.clone(),
                    Identity {
                        user_id: entry.user_id.clone(),
                        username: entry.username.clone(),
                    },
                )
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::auth::IdentityProvider;
    use std::collections::HashMap;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.bind_addr(), "127.0.0.1:8000");
        assert_eq!(config.fanout.outbound_buffer, DEFAULT_OUTBOUND_BUFFER);
        assert!(config.cors.allows_any());
        assert!(config.auth.tokens.is_empty());
    }

    #[test]
    fn test_partial_yaml_keeps_defaults() {
        let config = AppConfig::from_yaml_str("server:\n  port: 9000\n").unwrap();
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.fanout, FanoutConfig::default());
    }

    #[test]
    fn test_empty_yaml_is_default() {
        assert_eq!(AppConfig::from_yaml_str("").unwrap(), AppConfig::default());
    }

    #[test]
    fn test_invalid_yaml_is_an_error() {
        assert!(AppConfig::from_yaml_str("server: [not, a, map]").is_err());
    }

    #[test]
    fn test_yaml_serialization() {
        let config = AppConfig::default();
        let yaml = serde_yaml::to_string(&config).unwrap();
        assert_eq!(AppConfig::from_yaml_str(&yaml).unwrap(), config);
    }

    #[test]
    fn test_from_yaml_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "fanout:\n  outbound_buffer: 8\ncors:\n  allowed_origins: [\"http://localhost:3000\"]"
        )
        .unwrap();

        let config = AppConfig::from_yaml_file(file.path().to_str().unwrap()).unwrap();
        assert_eq!(config.fanout.outbound_buffer, 8);
        assert!(!config.cors.allows_any());
    }

    #[test]
    fn test_missing_file_is_an_error() {
        let err = AppConfig::from_yaml_file("/definitely/not/here.yaml").unwrap_err();
        assert!(err.to_string().contains("/definitely/not/here.yaml"));
    }

    #[test]
    fn test_overrides() {
        let env: HashMap<&str, &str> = [(HOST_ENV, "0.0.0.0"), (PORT_ENV, "7070")].into();
        let config = AppConfig::default()
            .with_overrides(|key| env.get(key).map(|v| v.to_string()))
            .unwrap();
        assert_eq!(config.bind_addr(), "0.0.0.0:7070");
    }

    #[test]
    fn test_bad_port_override() {
        let result = AppConfig::default().with_overrides(|key| {
            (key == PORT_ENV).then(|| "eighty".to_string())
        });
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_identity_provider_from_tokens() {
        let yaml = r#"
auth:
  tokens:
    - token: dev-token
      user_id: u-1
      username: alice
"#;
        let config = AppConfig::from_yaml_str(yaml).unwrap();
        let provider = config.identity_provider();

        assert_eq!(provider.len(), 1);
        let identity = provider.identify("dev-token").await.unwrap();
        assert_eq!(identity.username, "alice");
        assert!(provider.identify("other").await.is_err());
    }
}
