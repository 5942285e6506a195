//! HTTP handlers for comment operations
//!
//! Every endpoint resolves the caller through the configured
//! [`IdentityProvider`] first; the author of a new comment is always the
//! caller's username, never a value from the request body.

use axum::{
    Json,
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
};
use serde::Deserialize;
use serde_json::{Value, json};
use std::sync::Arc;
use uuid::Uuid;

use super::model::Comment;
use super::service::CommentService;
use crate::core::auth::{IdentityProvider, authenticate};
use crate::core::error::{ApiError, CommentError};

/// State shared by the comment handlers
#[derive(Clone)]
pub struct CommentsState {
    pub service: CommentService,
    pub identity: Arc<dyn IdentityProvider>,
}

/// Request body for creating a comment
#[derive(Debug, Deserialize)]
pub struct CreateCommentRequest {
    pub content: String,
}

/// Create a comment
///
/// POST /threads/{thread_id}/comments
pub async fn create_comment(
    State(state): State<CommentsState>,
    Path(thread_id): Path<String>,
    headers: HeaderMap,
    Json(payload): Json<CreateCommentRequest>,
) -> Result<(StatusCode, Json<Comment>), ApiError> {
    let caller = authenticate(state.identity.as_ref(), &headers).await?;

    let comment = state
        .service
        .create(&thread_id, &caller.username, &payload.content)
        .await?;

    Ok((StatusCode::CREATED, Json(comment)))
}

/// Delete a comment
///
/// DELETE /threads/{thread_id}/comments/{comment_id}
///
/// Succeeds for comments that do not exist.
pub async fn delete_comment(
    State(state): State<CommentsState>,
    Path((thread_id, comment_id)): Path<(String, String)>,
    headers: HeaderMap,
) -> Result<Json<Value>, ApiError> {
    let caller = authenticate(state.identity.as_ref(), &headers).await?;
    let comment_id = Uuid::parse_str(&comment_id)
        .map_err(|_| CommentError::InvalidCommentId(comment_id.clone()))?;

    state.service.delete(&thread_id, &comment_id).await?;
    tracing::debug!(user_id = %caller.user_id, comment_id = %comment_id, "Delete requested");

    Ok(Json(json!({ "status": "ok" })))
}

/// List the comments of a thread, oldest first
///
/// GET /threads/{thread_id}/comments
pub async fn list_comments(
    State(state): State<CommentsState>,
    Path(thread_id): Path<String>,
    headers: HeaderMap,
) -> Result<Json<Vec<Comment>>, ApiError> {
    authenticate(state.identity.as_ref(), &headers).await?;
    let comments = state.service.list(&thread_id).await?;
    Ok(Json(comments))
}
