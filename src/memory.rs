//! In-memory key-value backend.
//!
//! This implementation is NOT durable - data is lost on process exit. An
//! optional byte quota makes writes fail the way a full browser storage
//! area does.

use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::error::{OptionsError, Result};
use crate::store::{validate_key, Entry, KeyValueStore};

/// In-memory implementation of KeyValueStore.
///
/// Uses a BTreeMap for ordered key iteration and RwLock for concurrency.
pub struct MemoryStore {
    data: Arc<RwLock<BTreeMap<String, Entry>>>,
    quota_bytes: Option<usize>,
}

impl MemoryStore {
    /// Create a new empty in-memory store without a quota.
    pub fn new() -> Self {
        Self {
            data: Arc::new(RwLock::new(BTreeMap::new())),
            quota_bytes: None,
        }
    }

    /// Create a store that rejects writes once keys plus values exceed
    /// `quota_bytes`.
    pub fn with_quota(quota_bytes: usize) -> Self {
        Self {
            data: Arc::new(RwLock::new(BTreeMap::new())),
            quota_bytes: Some(quota_bytes),
        }
    }

    /// Get the number of entries in the store.
    pub fn len(&self) -> usize {
        self.data.read().len()
    }

    /// Check if the store is empty.
    pub fn is_empty(&self) -> bool {
        self.data.read().is_empty()
    }

    /// Raw serialized value for a key, bypassing validation.
    pub fn raw(&self, key: &str) -> Option<String> {
        self.data.read().get(key).map(|e| e.value.clone())
    }

    /// Write a raw value without quota checks. Used to seed a store with
    /// content written by another process.
    pub fn insert_raw(&self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        let entry = Entry {
            key: key.clone(),
            value: value.into(),
        };
        self.data.write().insert(key, entry);
    }

    fn used_bytes(data: &BTreeMap<String, Entry>) -> usize {
        data.values().map(|e| e.key.len() + e.value.len()).sum()
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<Entry>> {
        validate_key(key)?;
        Ok(self.data.read().get(key).cloned())
    }

    async fn set(&self, key: &str, value: String) -> Result<()> {
        validate_key(key)?;

        let mut data = self.data.write();

        if let Some(quota) = self.quota_bytes {
            let replaced = data.get(key).map(|e| e.key.len() + e.value.len()).unwrap_or(0);
            let needed = Self::used_bytes(&data) - replaced + key.len() + value.len();
            if needed > quota {
                return Err(OptionsError::StorageFull(format!(
                    "writing {} needs {} bytes, quota is {}",
                    key, needed, quota
                )));
            }
        }

        let entry = Entry {
            key: key.to_string(),
            value,
        };
        data.insert(key.to_string(), entry);
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<()> {
        validate_key(key)?;
        self.data.write().remove(key);
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        self.data.write().clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_set_and_get() {
        let store = MemoryStore::new();

        store.set("ui.theme", "\"dark\"".to_string()).await.unwrap();

        let entry = store.get("ui.theme").await.unwrap().unwrap();
        assert_eq!(entry.key, "ui.theme");
        assert_eq!(entry.value, "\"dark\"");
    }

    #[tokio::test]
    async fn test_get_nonexistent() {
        let store = MemoryStore::new();
        let result = store.get("nonexistent").await.unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn test_remove() {
        let store = MemoryStore::new();

        store.set("key", "1".to_string()).await.unwrap();
        assert!(store.get("key").await.unwrap().is_some());

        store.remove("key").await.unwrap();
        assert!(store.get("key").await.unwrap().is_none());

        // Removing again should not error
        store.remove("key").await.unwrap();
    }

    #[tokio::test]
    async fn test_clear() {
        let store = MemoryStore::new();

        store.set("ui.a", "1".to_string()).await.unwrap();
        store.set("net.timeout", "3".to_string()).await.unwrap();
        assert_eq!(store.len(), 2);

        store.clear().await.unwrap();
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_quota_rejects_write() {
        let store = MemoryStore::with_quota(16);

        store.set("a", "12345".to_string()).await.unwrap();
        let result = store.set("b", "0123456789abcdef".to_string()).await;
        assert!(matches!(result, Err(OptionsError::StorageFull(_))));

        // Failed write leaves existing entries untouched
        assert_eq!(store.raw("a").as_deref(), Some("12345"));
        assert!(store.raw("b").is_none());
    }

    #[tokio::test]
    async fn test_quota_counts_replaced_entry() {
        let store = MemoryStore::with_quota(10);

        store.set("k", "123456789".to_string()).await.unwrap();
        // Replacing the only entry with a value of the same size still fits
        store.set("k", "987654321".to_string()).await.unwrap();
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_invalid_key() {
        let store = MemoryStore::new();

        let result = store.set("", "1".to_string()).await;
        assert!(matches!(result, Err(OptionsError::InvalidKey(_))));
    }
}
