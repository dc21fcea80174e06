//! Adapter traits for the client's external collaborators.
//!
//! The core never touches disk or network directly: durable storage, the
//! remote sync procedures, and connectivity detection all sit behind these
//! traits, so platforms plug in their own implementations and tests can
//! script every interaction.

use crate::error::{StorageError, TransportError};
use crate::protocol::{SyncRecordsRequest, SyncRecordsResponse, SyncRequest, SyncResponse};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;

/// Durable local storage for serialized datasets.
///
/// The core calls these with key `"dataset_" + dataset_id` and treats the
/// value as an opaque full snapshot of the dataset.
#[async_trait]
pub trait LocalStorage: Send + Sync {
    async fn save(&self, key: &str, value: &str) -> Result<(), StorageError>;
    async fn load(&self, key: &str) -> Result<Option<String>, StorageError>;
}

/// Network transport invoking the remote sync procedures.
///
/// The transport is responsible for bounding call latency; the core
/// enforces no timeout of its own.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn sync(
        &self,
        dataset_id: &str,
        request: SyncRequest,
    ) -> Result<SyncResponse, TransportError>;

    async fn sync_records(
        &self,
        dataset_id: &str,
        request: SyncRecordsRequest,
    ) -> Result<SyncRecordsResponse, TransportError>;
}

/// Reports whether the remote store is currently reachable.
#[async_trait]
pub trait Connectivity: Send + Sync {
    async fn is_online(&self) -> bool;
}

/// In-memory [`LocalStorage`], useful for tests and ephemeral clients.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, String>> {
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl LocalStorage for MemoryStorage {
    async fn save(&self, key: &str, value: &str) -> Result<(), StorageError> {
        self.lock().insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn load(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self.lock().get(key).cloned())
    }
}

/// [`Connectivity`] oracle that always reports online.
#[derive(Debug, Default, Clone, Copy)]
pub struct AlwaysOnline;

#[async_trait]
impl Connectivity for AlwaysOnline {
    async fn is_online(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn memory_storage_roundtrip() {
        let storage = MemoryStorage::new();
        assert_eq!(storage.load("dataset_notes").await.unwrap(), None);

        storage.save("dataset_notes", "{\"data\":{}}").await.unwrap();
        assert_eq!(
            storage.load("dataset_notes").await.unwrap().as_deref(),
            Some("{\"data\":{}}")
        );
    }

    #[tokio::test]
    async fn memory_storage_overwrites() {
        let storage = MemoryStorage::new();
        storage.save("k", "one").await.unwrap();
        storage.save("k", "two").await.unwrap();
        assert_eq!(storage.load("k").await.unwrap().as_deref(), Some("two"));
    }

    #[tokio::test]
    async fn always_online() {
        assert!(AlwaysOnline.is_online().await);
    }
}
