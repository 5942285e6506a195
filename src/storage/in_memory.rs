//! In-memory implementation of KeyValueStore for testing and development

use crate::core::error::StoreError;
use crate::core::store::KeyValueStore;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

/// In-memory keyed store with ordered lists
///
/// Useful for testing and development. Uses RwLock for thread-safe access.
/// Records and lists live in separate namespaces, as in Redis where a key
/// holds one type at a time.
#[derive(Clone, Default)]
pub struct InMemoryStore {
    records: Arc<RwLock<HashMap<String, String>>>,
    lists: Arc<RwLock<HashMap<String, Vec<String>>>>,
}

impl InMemoryStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }
}

fn poisoned<E: std::fmt::Display>(e: E) -> StoreError {
    StoreError::Unavailable(format!("Failed to acquire lock: {}", e))
}

#[async_trait]
impl KeyValueStore for InMemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let records = self.records.read().map_err(poisoned)?;
        Ok(records.get(key).cloned())
    }

    async fn set(&self, key: &str, value: String) -> Result<(), StoreError> {
        let mut records = self.records.write().map_err(poisoned)?;
        records.insert(key.to_string(), value);
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool, StoreError> {
        let mut records = self.records.write().map_err(poisoned)?;
        Ok(records.remove(key).is_some())
    }

    async fn list_append(&self, key: &str, value: String) -> Result<usize, StoreError> {
        let mut lists = self.lists.write().map_err(poisoned)?;
        let list = lists.entry(key.to_string()).or_default();
        list.push(value);
        Ok(list.len())
    }

    async fn list_remove(&self, key: &str, value: &str) -> Result<usize, StoreError> {
        let mut lists = self.lists.write().map_err(poisoned)?;
        let Some(list) = lists.get_mut(key) else {
            return Ok(0);
        };

        let before = list.len();
        list.retain(|item| item != value);
        let removed = before - list.len();
        if list.is_empty() {
            lists.remove(key);
        }
        Ok(removed)
    }

    async fn list_range(&self, key: &str) -> Result<Vec<String>, StoreError> {
        let lists = self.lists.read().map_err(poisoned)?;
        Ok(lists.get(key).cloned().unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_set_get_delete() {
        let store = InMemoryStore::new();

        store.set("comment:1", "hello".to_string()).await.unwrap();
        assert_eq!(store.get("comment:1").await.unwrap(), Some("hello".to_string()));

        assert!(store.delete("comment:1").await.unwrap());
        assert!(!store.delete("comment:1").await.unwrap());
        assert_eq!(store.get("comment:1").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_set_overwrites() {
        let store = InMemoryStore::new();
        store.set("k", "a".to_string()).await.unwrap();
        store.set("k", "b".to_string()).await.unwrap();
        assert_eq!(store.get("k").await.unwrap().as_deref(), Some("b"));
    }

    #[tokio::test]
    async fn test_lists_keep_append_order() {
        let store = InMemoryStore::new();
        assert_eq!(store.list_append("thread:t1", "a".to_string()).await.unwrap(), 1);
        assert_eq!(store.list_append("thread:t1", "b".to_string()).await.unwrap(), 2);
        store.list_append("thread:t1", "c".to_string()).await.unwrap();

        assert_eq!(store.list_range("thread:t1").await.unwrap(), vec!["a", "b", "c"]);
        assert!(store.list_range("thread:other").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_list_remove_every_occurrence() {
        let store = InMemoryStore::new();
        for value in ["a", "b", "a"] {
            store.list_append("l", value.to_string()).await.unwrap();
        }

        assert_eq!(store.list_remove("l", "a").await.unwrap(), 2);
        assert_eq!(store.list_range("l").await.unwrap(), vec!["b"]);
        assert_eq!(store.list_remove("l", "missing").await.unwrap(), 0);
        assert_eq!(store.list_remove("unknown", "a").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_records_and_lists_are_separate() {
        let store = InMemoryStore::new();
        store.set("shared", "record".to_string()).await.unwrap();
        store.list_append("shared", "item".to_string()).await.unwrap();

        assert_eq!(store.get("shared").await.unwrap().as_deref(), Some("record"));
        assert_eq!(store.list_range("shared").await.unwrap(), vec!["item"]);
    }

    #[tokio::test]
    async fn test_clones_share_state() {
        let store = InMemoryStore::new();
        let clone = store.clone();
        store.set("k", "v".to_string()).await.unwrap();
        assert!(clone.get("k").await.unwrap().is_some());
    }
}
