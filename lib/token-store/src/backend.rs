//! Storage backend seam.
//!
//! A [`SecureBackend`] is a string key-value store. The platform provides the
//! real secure store (keychain, keystore, encrypted preferences); this crate
//! ships an in-memory backend and a file backend.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::error::StorageError;

/// Trait for key-value storage of session material.
///
/// Implementations must make `remove` of an absent key succeed.
#[async_trait]
pub trait SecureBackend: Send + Sync {
    /// Reads a key.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    async fn read(&self, key: &str) -> Result<Option<String>, StorageError>;

    /// Writes a key, replacing any previous value.
    async fn write(&self, key: &str, value: &str) -> Result<(), StorageError>;

    /// Removes a key.
    async fn remove(&self, key: &str) -> Result<(), StorageError>;
}

/// A process-local backend.
#[derive(Debug, Clone, Default)]
pub struct MemoryBackend {
    entries: Arc<RwLock<HashMap<String, String>>>,
}

impl MemoryBackend {
    /// Creates an empty backend.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a copy of every stored entry.
    pub async fn snapshot(&self) -> HashMap<String, String> {
        self.entries.read().await.clone()
    }

    /// Returns true if nothing is stored.
    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

#[async_trait]
impl SecureBackend for MemoryBackend {
    async fn read(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self.entries.read().await.get(key).cloned())
    }

    async fn write(&self, key: &str, value: &str) -> Result<(), StorageError> {
        self.entries
            .write()
            .await
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), StorageError> {
        self.entries.write().await.remove(key);
        Ok(())
    }
}
