//! Comment Service
//!
//! Validates and persists comments, then announces each change on the
//! thread's broker topic. Persistence always comes first: an event is never
//! published for a comment that was not stored.
//!
//! # Store layout
//!
//! ```text
//! comment:{comment_id}  ──▶ JSON-encoded Comment
//! thread:{thread_id}    ──▶ [comment:{id}, ...]   (oldest first)
//! ```

use super::model::{Comment, NewComment, comment_key, thread_key};
use crate::core::broker::Broker;
use crate::core::error::{CommentError, StoreError};
use crate::core::events::{PublishedEvent, is_valid_thread_id, thread_topic};
use crate::core::store::KeyValueStore;
use std::sync::Arc;
use uuid::Uuid;
use validator::Validate;

/// Creates, deletes and lists comments
#[derive(Clone)]
pub struct CommentService {
    store: Arc<dyn KeyValueStore>,
    broker: Arc<dyn Broker>,
}

fn check_thread_id(thread_id: &str) -> Result<(), CommentError> {
    if is_valid_thread_id(thread_id) {
        Ok(())
    } else {
        Err(CommentError::InvalidThreadId(thread_id.to_string()))
    }
}

impl CommentService {
    pub fn new(store: Arc<dyn KeyValueStore>, broker: Arc<dyn Broker>) -> Self {
        Self { store, broker }
    }

    /// Persist a new comment and publish `new_comment`
    ///
    /// If the store fails nothing is published. If publishing fails the
    /// comment stays persisted and `BrokerUnavailable` is returned.
    pub async fn create(
        &self,
        thread_id: &str,
        author: &str,
        content: &str,
    ) -> Result<Comment, CommentError> {
        check_thread_id(thread_id)?;
        let draft = NewComment {
            author: author.to_string(),
            content: content.to_string(),
        };
        draft.validate()?;

        let comment = Comment::new(thread_id, draft);
        let key = comment.record_key();
        let record = serde_json::to_string(&comment)?;

        self.store.set(&key, record).await?;
        if let Err(e) = self.store.list_append(&thread_key(thread_id), key.clone()).await {
            // Best effort: an unlisted record is invisible anyway
            if let Err(cleanup) = self.store.delete(&key).await {
                tracing::warn!(key = %key, error = %cleanup, "Failed to remove orphaned comment");
            }
            return Err(e.into());
        }

        let event = PublishedEvent::new_comment(thread_id, serde_json::to_value(&comment)?);
        self.publish(thread_id, event, &comment.comment_id).await?;

        tracing::info!(
            thread_id = %thread_id,
            comment_id = %comment.comment_id,
            author = %comment.author,
            "Comment created"
        );
        Ok(comment)
    }

    /// Remove a comment and publish `delete_comment`
    ///
    /// Deleting a comment that does not exist is not an error; the event is
    /// published regardless so watchers can reconcile. A comment that belongs
    /// to another thread is treated as missing here and left untouched.
    pub async fn delete(&self, thread_id: &str, comment_id: &Uuid) -> Result<(), CommentError> {
        check_thread_id(thread_id)?;
        let key = comment_key(comment_id);

        let existed = match self.owning_thread(&key).await? {
            Some(owner) if owner == thread_id => self.store.delete(&key).await?,
            Some(owner) => {
                tracing::debug!(
                    thread_id = %thread_id,
                    owner = %owner,
                    comment_id = %comment_id,
                    "Comment belongs to another thread, not deleting"
                );
                false
            }
            None => false,
        };
        self.store.list_remove(&thread_key(thread_id), &key).await?;

        let event = PublishedEvent::delete_comment(
            thread_id,
            serde_json::json!({ "comment_id": comment_id }),
        );
        self.publish(thread_id, event, comment_id).await?;

        tracing::info!(
            thread_id = %thread_id,
            comment_id = %comment_id,
            existed,
            "Comment deleted"
        );
        Ok(())
    }

    /// Comments of a thread, oldest first
    ///
    /// Ids whose record is gone are skipped.
    pub async fn list(&self, thread_id: &str) -> Result<Vec<Comment>, CommentError> {
        check_thread_id(thread_id)?;
        let keys = self.store.list_range(&thread_key(thread_id)).await?;

        let mut comments = Vec::with_capacity(keys.len());
        for key in keys {
            let Some(raw) = self.store.get(&key).await? else {
                tracing::debug!(thread_id = %thread_id, key = %key, "Skipping missing comment");
                continue;
            };
            let comment = serde_json::from_str(&raw).map_err(|e| StoreError::Corrupt {
                key: key.clone(),
                message: e.to_string(),
            })?;
            comments.push(comment);
        }
        Ok(comments)
    }

    /// Thread of the stored record at `key`, if any
    async fn owning_thread(&self, key: &str) -> Result<Option<String>, CommentError> {
        let Some(raw) = self.store.get(key).await? else {
            return Ok(None);
        };
        let comment: Comment = serde_json::from_str(&raw).map_err(|e| StoreError::Corrupt {
            key: key.to_string(),
            message: e.to_string(),
        })?;
        Ok(Some(comment.thread_id))
    }

    async fn publish(
        &self,
        thread_id: &str,
        event: PublishedEvent,
        comment_id: &Uuid,
    ) -> Result<(), CommentError> {
        let topic = thread_topic(thread_id);
        match self.broker.publish(&topic, event).await {
            Ok(receivers) => {
                tracing::debug!(topic = %topic, receivers, "Event published");
                Ok(())
            }
            Err(e) => {
                tracing::warn!(
                    topic = %topic,
                    comment_id = %comment_id,
                    error = %e,
                    "Comment persisted but event not published"
                );
                Err(e.into())
            }
        }
    }
}
