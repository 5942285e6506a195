//! Published events carried by the broker
//!
//! Every mutation of a thread produces one [`PublishedEvent`]. The Comment
//! Service publishes it on the thread's topic, the broker relays it, and the
//! fanout engine hands it to every connection watching that thread.
//!
//! # Wire shape
//!
//! ```json
//! {"kind": "new_comment", "thread_id": "general", "body": {"comment_id": "...", "content": "hi"}}
//! {"kind": "delete_comment", "thread_id": "general", "body": {"comment_id": "..."}}
//! ```

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::OnceLock;
use thiserror::Error;

/// Prefix shared by every thread topic on the broker
pub const THREAD_TOPIC_PREFIX: &str = "thread:";

/// Broker topic for a thread
pub fn thread_topic(thread_id: &str) -> String {
    format!("{}{}", THREAD_TOPIC_PREFIX, thread_id)
}

/// Check that a thread identifier is usable as a topic suffix and a store key
pub fn is_valid_thread_id(thread_id: &str) -> bool {
    static THREAD_ID_REGEX: OnceLock<Regex> = OnceLock::new();
    let regex = THREAD_ID_REGEX.get_or_init(|| Regex::new(r"^[A-Za-z0-9_.\-]{1,128}$").unwrap());
    regex.is_match(thread_id)
}

/// Discriminant of a published event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// A comment was added to the thread
    NewComment,
    /// A comment was removed from the thread
    DeleteComment,
}

impl EventKind {
    /// Name used on the wire
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::NewComment => "new_comment",
            EventKind::DeleteComment => "delete_comment",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Rejection of an event at the publish boundary
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EventError {
    #[error("invalid thread id '{0}'")]
    InvalidThreadId(String),

    #[error("event for thread '{thread_id}' published on topic '{topic}'")]
    TopicMismatch { thread_id: String, topic: String },
}

/// A transient notification about one thread
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PublishedEvent {
    /// What happened
    pub kind: EventKind,
    /// The thread it happened on
    pub thread_id: String,
    /// Kind-specific payload (the full comment, or just its id on delete)
    pub body: serde_json::Value,
}

impl PublishedEvent {
    /// Build a `new_comment` event
    pub fn new_comment(thread_id: impl Into<String>, body: serde_json::Value) -> Self {
        Self {
            kind: EventKind::NewComment,
            thread_id: thread_id.into(),
            body,
        }
    }

    /// Build a `delete_comment` event
    pub fn delete_comment(thread_id: impl Into<String>, body: serde_json::Value) -> Self {
        Self {
            kind: EventKind::DeleteComment,
            thread_id: thread_id.into(),
            body,
        }
    }

    /// The broker topic this event belongs on
    pub fn topic(&self) -> String {
        thread_topic(&self.thread_id)
    }

    /// Validate the event against the topic it is about to be published on
    pub fn validate_for(&self, topic: &str) -> Result<(), EventError> {
        if !is_valid_thread_id(&self.thread_id) {
            return Err(EventError::InvalidThreadId(self.thread_id.clone()));
        }
        if self.topic() != topic {
            return Err(EventError::TopicMismatch {
                thread_id: self.thread_id.clone(),
                topic: topic.to_string(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_thread_topic_prefix() {
        assert_eq!(thread_topic("t1"), "thread:t1");
    }

    #[test]
    fn test_thread_id_validation() {
        assert!(is_valid_thread_id("t1"));
        assert!(is_valid_thread_id("release-notes_2024.v2"));
        assert!(!is_valid_thread_id(""));
        assert!(!is_valid_thread_id("has space"));
        assert!(!is_valid_thread_id("a/b"));
        assert!(!is_valid_thread_id(&"x".repeat(129)));
    }

    #[test]
    fn test_event_serialization_shape() {
        let event = PublishedEvent::new_comment("t1", json!({"id": "c1", "content": "hi"}));
        let value = serde_json::to_value(&event).unwrap();

        assert_eq!(value["kind"], "new_comment");
        assert_eq!(value["thread_id"], "t1");
        assert_eq!(value["body"]["content"], "hi");
    }

    #[test]
    fn test_delete_kind_on_the_wire() {
        let event = PublishedEvent::delete_comment("t1", json!({"comment_id": "c1"}));
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["kind"], "delete_comment");
        assert_eq!(EventKind::DeleteComment.to_string(), "delete_comment");
    }

    #[test]
    fn test_unknown_kind_is_rejected() {
        let raw = r#"{"kind": "edit_comment", "thread_id": "t1", "body": {}}"#;
        assert!(serde_json::from_str::<PublishedEvent>(raw).is_err());
    }

    #[test]
    fn test_validate_for_matching_topic() {
        let event = PublishedEvent::new_comment("t1", json!({}));
        assert!(event.validate_for("thread:t1").is_ok());
    }

    #[test]
    fn test_validate_for_other_topic() {
        let event = PublishedEvent::new_comment("t1", json!({}));
        assert_eq!(
            event.validate_for("thread:t2"),
            Err(EventError::TopicMismatch {
                thread_id: "t1".to_string(),
                topic: "thread:t2".to_string(),
            })
        );
    }

    #[test]
    fn test_validate_for_bad_thread_id() {
        let event = PublishedEvent::new_comment("no spaces", json!({}));
        assert!(matches!(
            event.validate_for("thread:no spaces"),
            Err(EventError::InvalidThreadId(_))
        ));
    }
}
