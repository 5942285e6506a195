//! Comments: model, service and HTTP handlers

pub mod handlers;
pub mod model;
pub mod service;

pub use handlers::CommentsState;
pub use model::{Comment, MAX_CONTENT_LENGTH, NewComment};
pub use service::CommentService;
