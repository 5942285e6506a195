//! Typed error handling for threadline
//!
//! Each layer has its own error type so callers can react to the exact
//! failure instead of a generic `anyhow::Error`.
//!
//! # Error Categories
//!
//! - [`StoreError`]: the persistent store failed
//! - [`BrokerError`]: the publish/subscribe broker failed
//! - [`SendError`]: one connection's outbound queue rejected a payload
//! - [`FanoutError`]: registry / engine operations
//! - [`CommentError`]: Comment Service operations
//! - [`AuthError`]: caller identity could not be established
//! - [`ApiError`]: what HTTP handlers return; maps every category above to a
//!   status code and a JSON body
//!
//! # Propagation
//!
//! Errors local to one connection's delivery (`SendError`) stay inside the
//! fanout engine. Collaborator failures during a user request surface to that
//! request.

use crate::core::events::EventError;
use crate::fanout::ConnectionId;
use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use thiserror::Error;

// =============================================================================
// Collaborator Errors
// =============================================================================

/// Errors raised by a [`KeyValueStore`](crate::core::store::KeyValueStore)
#[derive(Debug, Clone, Error)]
pub enum StoreError {
    /// The backend could not be reached or refused the operation
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// A record exists but cannot be decoded
    #[error("corrupt record '{key}': {message}")]
    Corrupt { key: String, message: String },
}

/// Errors raised by a [`Broker`](crate::core::broker::Broker)
#[derive(Debug, Clone, Error)]
pub enum BrokerError {
    /// Publish or subscribe could not be carried out
    #[error("broker unavailable: {0}")]
    Unavailable(String),
}

// =============================================================================
// Fanout Errors
// =============================================================================

/// Why a payload could not be queued for a connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SendError {
    /// The transport side of the connection is gone
    #[error("connection closed")]
    Closed,

    /// The connection is not draining its queue fast enough
    #[error("outbound queue full")]
    Full,
}

/// Errors from the connection registry and fanout engine
#[derive(Debug, Clone, Error)]
pub enum FanoutError {
    /// The connection was never registered, or is deregistered / deregistering
    #[error("unknown connection '{0}'")]
    UnknownConnection(ConnectionId),

    /// Creating the topic's broker subscription, or publishing, failed
    #[error(transparent)]
    BrokerUnavailable(#[from] BrokerError),

    /// The event was rejected at the publish boundary
    #[error(transparent)]
    InvalidEvent(#[from] EventError),
}

// =============================================================================
// Comment Errors
// =============================================================================

/// Errors from the Comment Service
#[derive(Debug, Error)]
pub enum CommentError {
    /// Persistence failed; nothing was published
    #[error(transparent)]
    StoreUnavailable(#[from] StoreError),

    /// Persistence succeeded but the event could not be published
    #[error(transparent)]
    BrokerUnavailable(#[from] BrokerError),

    /// Thread identifier is not usable as a topic / key
    #[error("invalid thread id '{0}'")]
    InvalidThreadId(String),

    /// Comment identifier is not a UUID
    #[error("invalid comment id '{0}'")]
    InvalidCommentId(String),

    /// A comment could not be encoded for storage or publishing
    #[error("failed to encode comment: {0}")]
    Encode(#[from] serde_json::Error),

    /// Comment input failed validation
    #[error("validation failed: {0}")]
    Validation(#[from] validator::ValidationErrors),
}

// =============================================================================
// Auth Errors
// =============================================================================

/// Errors from an [`IdentityProvider`](crate::core::auth::IdentityProvider)
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    /// No usable `Authorization: Bearer` header
    #[error("missing credentials")]
    MissingCredentials,

    /// Credentials were presented but not accepted
    #[error("invalid credentials")]
    InvalidCredentials,
}

// =============================================================================
// API Errors
// =============================================================================

/// Error response structure for HTTP responses
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    /// Error code for programmatic handling
    pub code: String,
    /// Human-readable error message
    pub message: String,
    /// Optional additional details
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

/// The error type returned by every HTTP handler
#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Comment(#[from] CommentError),

    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error(transparent)]
    Fanout(#[from] FanoutError),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ApiError {
    /// Get the HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::Comment(e) => match e {
                CommentError::StoreUnavailable(StoreError::Corrupt { .. }) => {
                    StatusCode::INTERNAL_SERVER_ERROR
                }
                CommentError::StoreUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
                CommentError::BrokerUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
                CommentError::InvalidThreadId(_) => StatusCode::BAD_REQUEST,
                CommentError::InvalidCommentId(_) => StatusCode::BAD_REQUEST,
                CommentError::Encode(_) => StatusCode::INTERNAL_SERVER_ERROR,
                CommentError::Validation(_) => StatusCode::BAD_REQUEST,
            },
            ApiError::Auth(_) => StatusCode::UNAUTHORIZED,
            ApiError::Fanout(e) => match e {
                FanoutError::UnknownConnection(_) => StatusCode::NOT_FOUND,
                FanoutError::BrokerUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
                FanoutError::InvalidEvent(_) => StatusCode::BAD_REQUEST,
            },
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Get the error code for this error
    pub fn error_code(&self) -> &'static str {
        match self {
            ApiError::Comment(e) => match e {
                CommentError::StoreUnavailable(StoreError::Corrupt { .. }) => "STORE_CORRUPT",
                CommentError::StoreUnavailable(_) => "STORE_UNAVAILABLE",
                CommentError::BrokerUnavailable(_) => "BROKER_UNAVAILABLE",
                CommentError::InvalidThreadId(_) => "INVALID_THREAD_ID",
                CommentError::InvalidCommentId(_) => "INVALID_COMMENT_ID",
                CommentError::Encode(_) => "ENCODE_ERROR",
                CommentError::Validation(_) => "VALIDATION_ERROR",
            },
            ApiError::Auth(AuthError::MissingCredentials) => "MISSING_CREDENTIALS",
            ApiError::Auth(AuthError::InvalidCredentials) => "INVALID_CREDENTIALS",
            ApiError::Fanout(e) => match e {
                FanoutError::UnknownConnection(_) => "UNKNOWN_CONNECTION",
                FanoutError::BrokerUnavailable(_) => "BROKER_UNAVAILABLE",
                FanoutError::InvalidEvent(_) => "INVALID_EVENT",
            },
            ApiError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Convert to an error response
    pub fn to_response(&self) -> ErrorResponse {
        ErrorResponse {
            code: self.error_code().to_string(),
            message: self.to_string(),
            details: self.details(),
        }
    }

    fn details(&self) -> Option<serde_json::Value> {
        match self {
            ApiError::Comment(CommentError::Validation(errors)) => {
                serde_json::to_value(errors.field_errors())
                    .ok()
                    .map(|fields| serde_json::json!({ "fields": fields }))
            }
            ApiError::Comment(CommentError::InvalidThreadId(thread_id)) => {
                Some(serde_json::json!({ "thread_id": thread_id }))
            }
            _ => None,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::warn!(code = self.error_code(), error = %self, "Request failed");
        }
        let body = Json(self.to_response());
        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use validator::Validate;

    #[derive(Validate)]
    struct Sample {
        #[validate(length(min = 1))]
        content: String,
    }

    #[test]
    fn test_store_unavailable_returns_503() {
        let err = ApiError::from(CommentError::from(StoreError::Unavailable(
            "connection refused".to_string(),
        )));
        assert_eq!(err.status_code(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(err.error_code(), "STORE_UNAVAILABLE");
    }

    #[test]
    fn test_corrupt_record_returns_500() {
        let err = ApiError::from(CommentError::from(StoreError::Corrupt {
            key: "comment:1".to_string(),
            message: "expected value".to_string(),
        }));
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.error_code(), "STORE_CORRUPT");
    }

    #[test]
    fn test_auth_errors_return_401() {
        let missing = ApiError::from(AuthError::MissingCredentials);
        let invalid = ApiError::from(AuthError::InvalidCredentials);
        assert_eq!(missing.status_code(), StatusCode::UNAUTHORIZED);
        assert_eq!(invalid.status_code(), StatusCode::UNAUTHORIZED);
        assert_eq!(invalid.error_code(), "INVALID_CREDENTIALS");
    }

    #[test]
    fn test_invalid_thread_id_details() {
        let err = ApiError::from(CommentError::InvalidThreadId("a b".to_string()));
        let response = err.to_response();
        assert_eq!(response.code, "INVALID_THREAD_ID");
        assert_eq!(response.details.unwrap()["thread_id"], "a b");
    }

    #[test]
    fn test_validation_details_list_fields() {
        let errors = Sample {
            content: String::new(),
        }
        .validate()
        .unwrap_err();
        let err = ApiError::from(CommentError::Validation(errors));

        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
        let details = err.to_response().details.unwrap();
        assert!(details["fields"]["content"].is_array());
    }

    #[test]
    fn test_into_response_status() {
        let err = ApiError::from(FanoutError::BrokerUnavailable(BrokerError::Unavailable(
            "down".to_string(),
        )));
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[test]
    fn test_unknown_connection_message() {
        let err = FanoutError::UnknownConnection(ConnectionId::from("conn_x"));
        assert_eq!(err.to_string(), "unknown connection 'conn_x'");
    }
}
