//! KeyValueStore trait - the persisted backend behind the options store.
//!
//! Backends hold a flat namespace of string keys mapped to JSON text, the
//! same shape a browser's local storage offers. The options store writes one
//! entry per option name and never prefixes keys.

use async_trait::async_trait;
use serde::de::DeserializeOwned;

use crate::error::{OptionsError, Result};

/// Maximum key length in bytes.
pub const MAX_KEY_LENGTH: usize = 1024;

/// A stored entry.
#[derive(Debug, Clone, PartialEq)]
pub struct Entry {
    /// The key.
    pub key: String,
    /// The serialized value.
    pub value: String,
}

impl Entry {
    /// Deserialize the value as JSON.
    pub fn value_json<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_str(&self.value).map_err(Into::into)
    }
}

/// Validate that a key is well-formed.
pub fn validate_key(key: &str) -> Result<()> {
    if key.is_empty() {
        return Err(OptionsError::InvalidKey("key cannot be empty".to_string()));
    }
    if key.len() > MAX_KEY_LENGTH {
        return Err(OptionsError::InvalidKey(format!(
            "key exceeds maximum length of {} bytes",
            MAX_KEY_LENGTH
        )));
    }
    Ok(())
}

/// The persisted key-value backend.
///
/// Code should depend on this trait, not specific implementations. The
/// options store holds it as `Arc<dyn KeyValueStore>`.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Get an entry by key.
    ///
    /// Returns `None` if the key does not exist.
    async fn get(&self, key: &str) -> Result<Option<Entry>>;

    /// Set a key to a serialized value, creating or replacing it.
    async fn set(&self, key: &str, value: String) -> Result<()>;

    /// Delete a key.
    ///
    /// Returns `Ok(())` if the key was deleted or didn't exist.
    async fn remove(&self, key: &str) -> Result<()>;

    /// Delete every key in the namespace.
    async fn clear(&self) -> Result<()>;
}
