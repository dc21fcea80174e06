//! Record type for locally cached data.

use crate::hash::content_hash;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A single addressable item within a dataset.
///
/// The content hash is the digest of `data` and is what the per-record
/// reconciliation round compares against the server's copy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    /// Opaque payload, arbitrary structured value
    pub data: Value,
    /// Content hash of `data`
    pub hash: String,
}

impl Record {
    /// Create a record, computing its content hash locally.
    pub fn new(data: Value) -> Self {
        let hash = content_hash(&data);
        Self { data, hash }
    }

    /// Create a record from a server-supplied payload and hash.
    ///
    /// The server's hash is adopted verbatim; it is the reconciliation
    /// token, not something the client recomputes.
    pub fn from_remote(data: Value, hash: impl Into<String>) -> Self {
        Self {
            data,
            hash: hash.into(),
        }
    }

    /// Replace the payload and recompute the content hash.
    pub fn replace(&mut self, data: Value) {
        self.hash = content_hash(&data);
        self.data = data;
    }
}
