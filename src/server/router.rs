//! Router builder utilities for comment routes

use crate::comments::CommentsState;
use crate::comments::handlers::{create_comment, delete_comment, list_comments};
use axum::{Router, routing::delete, routing::get};

/// Build comment routes
///
/// - GET /threads/{thread_id}/comments - List comments, oldest first
/// - POST /threads/{thread_id}/comments - Create a comment
/// - DELETE /threads/{thread_id}/comments/{comment_id} - Delete a comment
pub fn build_comment_routes(state: CommentsState) -> Router {
    Router::new()
        .route(
            "/threads/{thread_id}/comments",
            get(list_comments).post(create_comment),
        )
        .route(
            "/threads/{thread_id}/comments/{comment_id}",
            delete(delete_comment),
        )
        .with_state(state)
}
