//! Dataset state - the unit of synchronization.

use crate::config::SyncConfig;
use crate::error::StorageError;
use crate::operation::PendingOperation;
use crate::record::Record;
use crate::{OpHash, Uid};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// A named, independently synchronized collection of records.
///
/// Everything here is persisted after every mutating event and survives
/// process restarts, except `initialised`: hydration always resets it, and
/// only `manage` re-arms the dataset's scheduler.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Dataset {
    /// Locally cached records, uid keyed
    pub data: HashMap<Uid, Record>,
    /// Staged operations awaiting confirmation, keyed by operation hash.
    /// Never keyed by uid: several operations against one uid coexist so
    /// the server sees the full history.
    pub pending: HashMap<OpHash, PendingOperation>,
    /// Last server-confirmed dataset hash, absent until the first
    /// successful sync
    pub hash: Option<String>,
    /// Effective configuration (global defaults + per-dataset overrides)
    pub config: SyncConfig,
    /// Opaque filter forwarded to the remote procedures on every call
    pub query_params: Value,
    /// True once `manage` has completed setup and armed the scheduler
    #[serde(skip)]
    pub initialised: bool,
}

impl Default for Dataset {
    fn default() -> Self {
        Self::new()
    }
}

impl Dataset {
    pub fn new() -> Self {
        Self {
            data: HashMap::new(),
            pending: HashMap::new(),
            hash: None,
            config: SyncConfig::default(),
            query_params: Value::Object(Default::default()),
            initialised: false,
        }
    }

    /// Storage key under which this dataset is persisted.
    pub fn storage_key(dataset_id: &str) -> String {
        format!("dataset_{dataset_id}")
    }

    /// The uid to content-hash digest map submitted to `syncRecords`.
    pub fn client_records(&self) -> HashMap<Uid, String> {
        self.data
            .iter()
            .map(|(uid, record)| (uid.clone(), record.hash.clone()))
            .collect()
    }

    /// Serialize for persistence.
    pub fn to_json(&self) -> Result<String, StorageError> {
        serde_json::to_string(self).map_err(|e| StorageError::new(e.to_string()))
    }

    /// Deserialize a persisted dataset. `initialised` comes back false.
    pub fn from_json(json: &str) -> Result<Self, StorageError> {
        serde_json::from_str(json).map_err(|e| StorageError::new(e.to_string()))
    }
}
