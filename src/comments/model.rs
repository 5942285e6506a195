//! Comment records and their storage keys

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::{Validate, ValidationError};

/// Longest accepted comment body, in characters
pub const MAX_CONTENT_LENGTH: usize = 4000;

/// A persisted comment
///
/// Immutable once stored; the only later change is deletion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Comment {
    pub comment_id: Uuid,
    pub thread_id: String,
    pub author: String,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

impl Comment {
    /// Stamp a validated draft with a fresh id and the current time
    pub fn new(thread_id: impl Into<String>, draft: NewComment) -> Self {
        Self {
            comment_id: Uuid::new_v4(),
            thread_id: thread_id.into(),
            author: draft.author,
            content: draft.content,
            timestamp: Utc::now(),
        }
    }

    /// Store key of this comment's record
    pub fn record_key(&self) -> String {
        comment_key(&self.comment_id)
    }
}

/// Input for a new comment, before it gets an id and timestamp
#[derive(Debug, Clone, Validate)]
pub struct NewComment {
    #[validate(length(min = 1, max = 128))]
    pub author: String,

    #[validate(length(min = 1), custom(function = "content_rules"))]
    pub content: String,
}

fn content_rules(value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        return Err(ValidationError::new("blank"));
    }
    if value.chars().count() > MAX_CONTENT_LENGTH {
        let mut error = ValidationError::new("too_long");
        error.add_param("max".into(), &MAX_CONTENT_LENGTH);
        return Err(error);
    }
    Ok(())
}

/// Store key of a comment record
pub fn comment_key(comment_id: &Uuid) -> String {
    format!("comment:{}", comment_id)
}

/// Store key of a thread's ordered list of comment keys
pub fn thread_key(thread_id: &str) -> String {
    format!("thread:{}", thread_id)
}
