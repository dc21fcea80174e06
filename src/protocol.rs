//! Wire types for the two remote sync procedures.
//!
//! The dataset-level `sync` call submits all pending operations plus the
//! last-known dataset hash; the server answers with either a full
//! snapshot, a hash-only acknowledgment, or nothing new, optionally
//! accompanied by a per-operation outcome report. `syncRecords` is the
//! second, record-granular round-trip used when the aggregate hashes
//! diverge without a snapshot.

use crate::operation::PendingOperation;
use crate::record::Record;
use crate::{OpHash, Uid};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{HashMap, HashSet};

/// Request body for the dataset-level `sync` procedure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncRequest {
    pub dataset_id: String,
    /// Opaque filter forwarded on every call for this dataset
    pub query_params: Value,
    /// Last server-confirmed dataset hash, absent before the first sync
    pub dataset_hash: Option<String>,
    /// All staged operations, submitted for confirmation
    pub pending: Vec<PendingOperation>,
}

/// Response to the dataset-level `sync` procedure.
///
/// `records` present means the server is forcing a full resync; `hash`
/// alone is a dataset-level acknowledgment the client compares against
/// its own; `updates` reports the fate of submitted operations.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SyncResponse {
    /// Full dataset snapshot, uid keyed
    pub records: Option<HashMap<Uid, Record>>,
    /// Server-side dataset hash after applying submitted operations
    pub hash: Option<String>,
    pub updates: Option<UpdateReport>,
}

/// Per-operation outcomes, keyed by the submitted operation hash.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UpdateReport {
    pub applied: HashMap<OpHash, UpdateOutcome>,
    pub failed: HashMap<OpHash, UpdateOutcome>,
    pub collisions: HashMap<OpHash, UpdateOutcome>,
}

/// Server-side detail for one submitted operation.
///
/// `uid` carries the server-assigned identity for confirmed creates; any
/// further fields ride along untouched and are handed to the observer as
/// the notification message.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UpdateOutcome {
    pub uid: Option<Uid>,
    #[serde(flatten)]
    pub detail: serde_json::Map<String, Value>,
}

/// Request body for the record-granular `syncRecords` procedure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncRecordsRequest {
    pub dataset_id: String,
    pub query_params: Value,
    /// The client's per-record content digests, uid keyed
    pub client_recs: HashMap<Uid, String>,
}

/// Response to `syncRecords`: the records to upsert or drop to converge.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncRecordsResponse {
    pub create: HashMap<Uid, Record>,
    pub update: HashMap<Uid, Record>,
    pub delete: HashSet<Uid>,
    /// Aggregate dataset hash to adopt, if the server recomputed it
    pub hash: Option<String>,
}
