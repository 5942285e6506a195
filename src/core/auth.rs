//! Caller identity for write/delete endpoints
//!
//! Token issuing and password hashing live outside this crate. Handlers only
//! need a capability that turns presented credentials into an [`Identity`]:
//! that is the [`IdentityProvider`] trait.
//!
//! [`StaticTokenIdentity`] is a ready-made provider backed by a fixed token
//! table (from configuration), suitable for development and tests.

use crate::core::error::AuthError;
use async_trait::async_trait;
use axum::http::HeaderMap;
use axum::http::header::AUTHORIZATION;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Who is making the request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub user_id: String,
    pub username: String,
}

/// Turns caller credentials into an identity
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Resolve a bearer token
    async fn identify(&self, token: &str) -> Result<Identity, AuthError>;
}

/// Extract the bearer token from an `Authorization` header
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let token = token.trim();
    (!token.is_empty()).then_some(token)
}

/// Resolve the caller of an HTTP request
pub async fn authenticate(
    provider: &dyn IdentityProvider,
    headers: &HeaderMap,
) -> Result<Identity, AuthError> {
    let token = bearer_token(headers).ok_or(AuthError::MissingCredentials)?;
    provider.identify(token).await
}

/// Provider backed by a fixed token → identity table
#[derive(Debug, Clone, Default)]
pub struct StaticTokenIdentity {
    tokens: HashMap<String, Identity>,
}

impl StaticTokenIdentity {
    /// Create an empty provider (rejects everyone)
    pub fn new() -> Self {
        Self::default()
    }

    /// Accept `token` as `identity`
    pub fn with_token(mut self, token: impl Into<String>, identity: Identity) -> Self {
        self.tokens.insert(token.into(), identity);
        self
    }

    /// Number of accepted tokens
    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    /// Whether no token is accepted
    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}

#[async_trait]
impl IdentityProvider for StaticTokenIdentity {
    async fn identify(&self, token: &str) -> Result<Identity, AuthError> {
        self.tokens
            .get(token)
            .cloned()
            .ok_or(AuthError::InvalidCredentials)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn alice() -> Identity {
        Identity {
            user_id: "u-1".to_string(),
            username: "alice".to_string(),
        }
    }

    fn headers_with(value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_str(value).unwrap());
        headers
    }

    #[test]
    fn test_bearer_token_extraction() {
        assert_eq!(bearer_token(&headers_with("Bearer abc")), Some("abc"));
        assert_eq!(bearer_token(&headers_with("bearer  abc ")), Some("abc"));
        assert_eq!(bearer_token(&headers_with("Basic abc")), None);
        assert_eq!(bearer_token(&headers_with("Bearer ")), None);
        assert_eq!(bearer_token(&HeaderMap::new()), None);
    }

    #[tokio::test]
    async fn test_static_tokens_identify() {
        let provider = StaticTokenIdentity::new().with_token("secret", alice());
        assert_eq!(provider.identify("secret").await, Ok(alice()));
        assert_eq!(
            provider.identify("other").await,
            Err(AuthError::InvalidCredentials)
        );
    }

    #[tokio::test]
    async fn test_authenticate_without_header() {
        let provider = StaticTokenIdentity::new().with_token("secret", alice());
        let result = authenticate(&provider, &HeaderMap::new()).await;
        assert_eq!(result, Err(AuthError::MissingCredentials));
    }

    #[tokio::test]
    async fn test_authenticate_with_header() {
        let provider = StaticTokenIdentity::new().with_token("secret", alice());
        let identity = authenticate(&provider, &headers_with("Bearer secret"))
            .await
            .unwrap();
        assert_eq!(identity.username, "alice");
    }
}
