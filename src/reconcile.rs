//! Reconciliation - interpreting server sync responses.
//!
//! Pure state transitions over a [`Dataset`]: no IO, no notification
//! gating, no scheduling. Each function returns the notices the caller
//! should emit (in order) alongside the converged state, which keeps the
//! protocol logic testable without adapters or a runtime.

use crate::dataset::Dataset;
use crate::notify::NotificationCode;
use crate::protocol::{SyncRecordsResponse, SyncResponse, UpdateOutcome};
use crate::record::Record;
use crate::{OpHash, Uid};
use serde_json::{json, Value};
use std::collections::HashMap;

/// What the scheduler must do after a dataset-level sync response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOutcome {
    /// Hashes matched; local state is already current
    UpToDate,
    /// The server forced a full resync and the snapshot was applied
    SnapshotApplied,
    /// Aggregate hashes diverged without a snapshot; a `syncRecords`
    /// round-trip is required
    RecordSyncRequired,
}

/// A notification the caller should emit, before config gating.
#[derive(Debug, Clone, PartialEq)]
pub struct Notice {
    pub uid: Option<Uid>,
    pub code: NotificationCode,
    pub message: Value,
}

impl Notice {
    fn new(uid: Option<Uid>, code: NotificationCode, message: Value) -> Self {
        Self { uid, code, message }
    }
}

/// Apply a dataset-level sync response.
///
/// Update outcomes are processed in fixed order applied, failed,
/// collisions; each acknowledged operation leaves the pending queue
/// whatever its fate, since retrying a rejected operation is a remote or
/// application level decision. A full snapshot then replaces local state
/// wholesale; otherwise the aggregate hash decides whether a per-record
/// round is needed.
pub fn apply_sync_response(dataset: &mut Dataset, response: SyncResponse) -> (SyncOutcome, Vec<Notice>) {
    let mut notices = Vec::new();

    if let Some(updates) = response.updates {
        acknowledge(
            dataset,
            updates.applied,
            NotificationCode::RemoteUpdateApplied,
            &mut notices,
        );
        acknowledge(
            dataset,
            updates.failed,
            NotificationCode::RemoteUpdateFailed,
            &mut notices,
        );
        acknowledge(
            dataset,
            updates.collisions,
            NotificationCode::CollisionDetected,
            &mut notices,
        );
    }

    if let Some(records) = response.records {
        dataset.data = records;
        dataset.hash = response.hash;
        notices.push(Notice::new(None, NotificationCode::DeltaReceived, Value::Null));
        (SyncOutcome::SnapshotApplied, notices)
    } else if response.hash.is_some() && response.hash != dataset.hash {
        (SyncOutcome::RecordSyncRequired, notices)
    } else {
        (SyncOutcome::UpToDate, notices)
    }
}

fn acknowledge(
    dataset: &mut Dataset,
    outcomes: HashMap<OpHash, UpdateOutcome>,
    code: NotificationCode,
    notices: &mut Vec<Notice>,
) {
    for (op_hash, outcome) in outcomes {
        dataset.pending.remove(&op_hash);
        let uid = outcome.uid.clone();
        let message = serde_json::to_value(&outcome).unwrap_or(Value::Null);
        notices.push(Notice::new(uid, code, message));
    }
}

/// Apply a record-granular `syncRecords` response.
///
/// Creates and updates upsert, deletes remove, and every affected uid
/// produces a record-level delta notice tagged with the operation kind.
/// The server's aggregate hash is adopted when present. This leg carries
/// no applied/failed/collision partition: it is already-resolved history.
pub fn apply_record_sync(dataset: &mut Dataset, response: SyncRecordsResponse) -> Vec<Notice> {
    let mut notices = Vec::new();

    for (uid, record) in response.create {
        upsert(dataset, uid, record, "create", &mut notices);
    }
    for (uid, record) in response.update {
        upsert(dataset, uid, record, "update", &mut notices);
    }
    for uid in response.delete {
        dataset.data.remove(&uid);
        notices.push(Notice::new(
            Some(uid),
            NotificationCode::DeltaReceived,
            json!("delete"),
        ));
    }

    if let Some(hash) = response.hash {
        dataset.hash = Some(hash);
    }

    notices
}

fn upsert(dataset: &mut Dataset, uid: Uid, record: Record, kind: &str, notices: &mut Vec<Notice>) {
    dataset.data.insert(uid.clone(), record);
    notices.push(Notice::new(
        Some(uid),
        NotificationCode::DeltaReceived,
        json!(kind),
    ));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operation::PendingOperation;
    use crate::protocol::UpdateReport;
    use std::collections::HashSet;

    fn dataset_with_pending(ops: &[&PendingOperation]) -> Dataset {
        let mut dataset = Dataset::new();
        for op in ops {
            dataset.pending.insert(op.hash.clone(), (*op).clone());
        }
        dataset
    }

    fn outcome(uid: &str) -> UpdateOutcome {
        UpdateOutcome {
            uid: Some(uid.into()),
            detail: Default::default(),
        }
    }

    #[test]
    fn matching_hash_is_up_to_date() {
        let mut dataset = Dataset::new();
        dataset.hash = Some("H1".into());
        dataset
            .data
            .insert("n1".into(), Record::from_remote(json!({"t": "a"}), "h1"));

        let response = SyncResponse {
            hash: Some("H1".into()),
            ..Default::default()
        };
        let (result, notices) = apply_sync_response(&mut dataset, response);

        assert_eq!(result, SyncOutcome::UpToDate);
        assert!(notices.is_empty());
        // Local data untouched.
        assert_eq!(dataset.data["n1"].data, json!({"t": "a"}));
        assert_eq!(dataset.hash.as_deref(), Some("H1"));
    }

    #[test]
    fn missing_hash_is_up_to_date() {
        let mut dataset = Dataset::new();
        let (result, _) = apply_sync_response(&mut dataset, SyncResponse::default());
        assert_eq!(result, SyncOutcome::UpToDate);
    }

    #[test]
    fn diverged_hash_requires_record_sync() {
        let mut dataset = Dataset::new();
        dataset.hash = Some("H1".into());

        let response = SyncResponse {
            hash: Some("H2".into()),
            ..Default::default()
        };
        let (result, _) = apply_sync_response(&mut dataset, response);

        assert_eq!(result, SyncOutcome::RecordSyncRequired);
        // The aggregate hash is only adopted once records converge.
        assert_eq!(dataset.hash.as_deref(), Some("H1"));
    }

    #[test]
    fn snapshot_replaces_data_wholesale() {
        let mut dataset = Dataset::new();
        dataset.hash = Some("H1".into());
        dataset
            .data
            .insert("stale".into(), Record::from_remote(json!({}), "hx"));

        let response = SyncResponse {
            records: Some(HashMap::from([(
                "n1".into(),
                Record::from_remote(json!({"t": "a"}), "h1"),
            )])),
            hash: Some("H2".into()),
            ..Default::default()
        };
        let (result, notices) = apply_sync_response(&mut dataset, response);

        assert_eq!(result, SyncOutcome::SnapshotApplied);
        assert_eq!(dataset.data.len(), 1);
        assert!(dataset.data.contains_key("n1"));
        assert_eq!(dataset.hash.as_deref(), Some("H2"));

        // One dataset-level delta notice, uid unset.
        assert_eq!(notices.len(), 1);
        assert_eq!(notices[0].code, NotificationCode::DeltaReceived);
        assert!(notices[0].uid.is_none());
    }

    #[test]
    fn snapshot_wins_even_when_hash_matches() {
        let mut dataset = Dataset::new();
        dataset.hash = Some("H1".into());

        let response = SyncResponse {
            records: Some(HashMap::new()),
            hash: Some("H1".into()),
            ..Default::default()
        };
        let (result, _) = apply_sync_response(&mut dataset, response);
        assert_eq!(result, SyncOutcome::SnapshotApplied);
        assert!(dataset.data.is_empty());
    }

    #[test]
    fn applied_outcome_clears_pending_and_notifies() {
        let op = PendingOperation::create(json!({"title": "a"}), 1000);
        let mut dataset = dataset_with_pending(&[&op]);

        let response = SyncResponse {
            updates: Some(UpdateReport {
                applied: HashMap::from([(op.hash.clone(), outcome("n1"))]),
                ..Default::default()
            }),
            hash: Some("H2".into()),
            ..Default::default()
        };
        let (result, notices) = apply_sync_response(&mut dataset, response);

        assert!(dataset.pending.is_empty());
        assert_eq!(notices.len(), 1);
        assert_eq!(notices[0].code, NotificationCode::RemoteUpdateApplied);
        assert_eq!(notices[0].uid.as_deref(), Some("n1"));
        // No snapshot and no local hash yet: H2 triggers the record round.
        assert_eq!(result, SyncOutcome::RecordSyncRequired);
    }

    #[test]
    fn collision_clears_pending_but_keeps_local_data() {
        let op = PendingOperation::update("n1", json!({"v": 1}), json!({"v": 2}), 1000);
        let mut dataset = dataset_with_pending(&[&op]);
        dataset.hash = Some("H1".into());
        // The optimistic apply already replaced the payload.
        dataset
            .data
            .insert("n1".into(), Record::new(json!({"v": 2})));

        let response = SyncResponse {
            updates: Some(UpdateReport {
                collisions: HashMap::from([(op.hash.clone(), outcome("n1"))]),
                ..Default::default()
            }),
            hash: Some("H1".into()),
            ..Default::default()
        };
        let (result, notices) = apply_sync_response(&mut dataset, response);

        assert_eq!(result, SyncOutcome::UpToDate);
        assert!(dataset.pending.is_empty());
        assert_eq!(notices.len(), 1);
        assert_eq!(notices[0].code, NotificationCode::CollisionDetected);
        // No server payload overwrite at this stage.
        assert_eq!(dataset.data["n1"].data, json!({"v": 2}));
    }

    #[test]
    fn outcomes_processed_applied_then_failed_then_collisions() {
        let a = PendingOperation::create(json!({"t": "a"}), 1);
        let b = PendingOperation::create(json!({"t": "b"}), 2);
        let c = PendingOperation::create(json!({"t": "c"}), 3);
        let mut dataset = dataset_with_pending(&[&a, &b, &c]);

        let response = SyncResponse {
            updates: Some(UpdateReport {
                applied: HashMap::from([(a.hash.clone(), outcome("na"))]),
                failed: HashMap::from([(b.hash.clone(), outcome("nb"))]),
                collisions: HashMap::from([(c.hash.clone(), outcome("nc"))]),
            }),
            ..Default::default()
        };
        let (_, notices) = apply_sync_response(&mut dataset, response);

        assert!(dataset.pending.is_empty());
        let codes: Vec<_> = notices.iter().map(|n| n.code).collect();
        assert_eq!(
            codes,
            vec![
                NotificationCode::RemoteUpdateApplied,
                NotificationCode::RemoteUpdateFailed,
                NotificationCode::CollisionDetected,
            ]
        );
    }

    #[test]
    fn unknown_op_hash_in_report_is_harmless() {
        let op = PendingOperation::create(json!({"t": "a"}), 1);
        let mut dataset = dataset_with_pending(&[&op]);

        let response = SyncResponse {
            updates: Some(UpdateReport {
                applied: HashMap::from([("never-submitted".into(), outcome("nx"))]),
                ..Default::default()
            }),
            ..Default::default()
        };
        let (_, notices) = apply_sync_response(&mut dataset, response);

        // The staged op is still pending; the stray ack only notified.
        assert_eq!(dataset.pending.len(), 1);
        assert_eq!(notices.len(), 1);
    }

    #[test]
    fn record_sync_applies_creates_updates_deletes() {
        let mut dataset = Dataset::new();
        dataset
            .data
            .insert("keep".into(), Record::from_remote(json!({"v": 0}), "h0"));
        dataset
            .data
            .insert("gone".into(), Record::from_remote(json!({"v": 1}), "h1"));
        dataset
            .data
            .insert("chg".into(), Record::from_remote(json!({"v": 2}), "h2"));

        let response = SyncRecordsResponse {
            create: HashMap::from([("new".into(), Record::from_remote(json!({"v": 9}), "h9"))]),
            update: HashMap::from([("chg".into(), Record::from_remote(json!({"v": 3}), "h3"))]),
            delete: HashSet::from(["gone".into()]),
            hash: Some("H2".into()),
        };
        let notices = apply_record_sync(&mut dataset, response);

        assert_eq!(dataset.data.len(), 3);
        assert_eq!(dataset.data["new"].hash, "h9");
        assert_eq!(dataset.data["chg"].data, json!({"v": 3}));
        assert!(!dataset.data.contains_key("gone"));
        assert_eq!(dataset.hash.as_deref(), Some("H2"));

        assert_eq!(notices.len(), 3);
        assert!(notices
            .iter()
            .all(|n| n.code == NotificationCode::DeltaReceived && n.uid.is_some()));
        let kinds: HashSet<_> = notices.iter().map(|n| n.message.clone()).collect();
        assert_eq!(
            kinds,
            HashSet::from([json!("create"), json!("update"), json!("delete")])
        );
    }

    #[test]
    fn record_sync_without_hash_keeps_local_hash() {
        let mut dataset = Dataset::new();
        dataset.hash = Some("H1".into());

        let notices = apply_record_sync(&mut dataset, SyncRecordsResponse::default());
        assert!(notices.is_empty());
        assert_eq!(dataset.hash.as_deref(), Some("H1"));
    }
}
