//! Persistent store interface
//!
//! Comments live in a keyed store with ordered lists, the same shape a Redis
//! deployment offers: one record per comment and one id list per thread.

use crate::core::error::StoreError;
use async_trait::async_trait;

/// Keyed records plus ordered lists
///
/// Implementations handle their own internal concurrency.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Read a record
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Write (or overwrite) a record
    async fn set(&self, key: &str, value: String) -> Result<(), StoreError>;

    /// Remove a record, returning whether it existed
    async fn delete(&self, key: &str) -> Result<bool, StoreError>;

    /// Append to the end of a list, returning the new length
    async fn list_append(&self, key: &str, value: String) -> Result<usize, StoreError>;

    /// Remove every occurrence of `value` from a list, returning how many were removed
    async fn list_remove(&self, key: &str, value: &str) -> Result<usize, StoreError>;

    /// Read a whole list in order (empty for unknown keys)
    async fn list_range(&self, key: &str) -> Result<Vec<String>, StoreError>;
}
