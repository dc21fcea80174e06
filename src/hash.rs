//! Content hashing for change detection and confirmation tokens.
//!
//! Hashes are computed over a canonical JSON form (object keys sorted
//! recursively) so two structurally equal payloads always produce the
//! same digest, regardless of key insertion order.

use serde_json::Value;
use sha1::{Digest, Sha1};
use std::collections::BTreeMap;

/// Compute the hex-encoded SHA-1 digest of a payload's canonical JSON form.
pub fn content_hash(value: &Value) -> String {
    let mut hasher = Sha1::new();
    hasher.update(canonical(value).to_string().as_bytes());
    hex::encode(hasher.finalize())
}

fn canonical(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let sorted: BTreeMap<String, Value> = map
                .iter()
                .map(|(k, v)| (k.clone(), canonical(v)))
                .collect();
            Value::Object(sorted.into_iter().collect())
        }
        Value::Array(items) => Value::Array(items.iter().map(canonical).collect()),
        other => other.clone(),
    }
}
