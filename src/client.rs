//! The sync client - public API, staging, and the per-dataset scheduler.
//!
//! Each dataset gets its own mutex-guarded state and its own timer-driven
//! sync loop. The lock is never held across an adapter await, so staging
//! may interleave with an in-flight remote call; the response only clears
//! the operation hashes it acknowledges. A per-dataset in-progress flag
//! keeps cycles from overlapping: re-triggers (timer or `manage`) while a
//! cycle is outstanding are no-ops, and the outstanding cycle's completion
//! re-arms the timer.

use crate::adapter::{Connectivity, LocalStorage, Transport};
use crate::config::{SyncConfig, SyncOptions};
use crate::dataset::Dataset;
use crate::error::{Error, Result, StorageError};
use crate::notify::{Notification, NotificationCode, Notifier};
use crate::operation::{Action, PendingOperation};
use crate::protocol::{SyncRecordsRequest, SyncRequest};
use crate::record::Record;
use crate::reconcile::{self, Notice, SyncOutcome};
use crate::{DatasetId, Timestamp, Uid};
use dashmap::DashMap;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex, MutexGuard};
use std::time::Duration;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::sync::Mutex;
use tokio::task::AbortHandle;

/// Completion status of a sync cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncStatus {
    /// The cycle reached the server and converged
    Online,
    /// The connectivity oracle reported offline; no remote call attempted
    Offline,
    /// A remote call failed; carries the transport's failure reason
    Failed(String),
}

impl std::fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SyncStatus::Online => f.write_str("online"),
            SyncStatus::Offline => f.write_str("offline"),
            SyncStatus::Failed(reason) => f.write_str(reason),
        }
    }
}

/// A staged mutation request, built by the public CRUD wrappers.
enum Mutation {
    Create { data: Value },
    Update { uid: Uid, data: Value },
    Delete { uid: Uid },
}

impl Mutation {
    fn action(&self) -> Action {
        match self {
            Mutation::Create { .. } => Action::Create,
            Mutation::Update { .. } => Action::Update,
            Mutation::Delete { .. } => Action::Delete,
        }
    }

    fn uid(&self) -> Option<&Uid> {
        match self {
            Mutation::Create { .. } => None,
            Mutation::Update { uid, .. } | Mutation::Delete { uid } => Some(uid),
        }
    }
}

/// Per-dataset runtime state: the serializable dataset plus the pieces
/// that never persist (timer handle, in-progress flag).
struct DatasetHandle {
    dataset: Mutex<Dataset>,
    /// Timer for the next scheduled cycle; cancelled when `manage`
    /// re-arms. Never cancels a cycle already in flight.
    scheduled: StdMutex<Option<AbortHandle>>,
    /// Set for the duration of a sync cycle
    sync_in_progress: AtomicBool,
}

impl DatasetHandle {
    fn new(dataset: Dataset) -> Self {
        Self {
            dataset: Mutex::new(dataset),
            scheduled: StdMutex::new(None),
            sync_in_progress: AtomicBool::new(false),
        }
    }

    fn set_scheduled(&self, handle: AbortHandle) {
        if let Some(stale) = self.lock_scheduled().replace(handle) {
            stale.abort();
        }
    }

    fn cancel_scheduled(&self) {
        if let Some(pending) = self.lock_scheduled().take() {
            pending.abort();
        }
    }

    fn lock_scheduled(&self) -> MutexGuard<'_, Option<AbortHandle>> {
        self.scheduled
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

struct Inner {
    datasets: DashMap<DatasetId, Arc<DatasetHandle>>,
    /// Process-wide defaults, set by `init`; merged with per-dataset
    /// overrides at `manage`
    config: StdMutex<SyncConfig>,
    notifier: Notifier,
    storage: Arc<dyn LocalStorage>,
    transport: Arc<dyn Transport>,
    connectivity: Arc<dyn Connectivity>,
}

/// Offline-first synchronization client.
///
/// Cheap to clone; clones share all dataset state. Datasets are addressed
/// by identifier only and live for the process lifetime once registered.
#[derive(Clone)]
pub struct SyncClient {
    inner: Arc<Inner>,
}

impl SyncClient {
    pub fn new(
        storage: Arc<dyn LocalStorage>,
        transport: Arc<dyn Transport>,
        connectivity: Arc<dyn Connectivity>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                datasets: DashMap::new(),
                config: StdMutex::new(SyncConfig::default()),
                notifier: Notifier::new(),
                storage,
                transport,
                connectivity,
            }),
        }
    }

    /// Set the process-wide configuration: supplied options merged over
    /// the defaults.
    pub fn init(&self, options: &SyncOptions) {
        *self.lock_config() = SyncConfig::default().merged(options);
    }

    /// Register the observer. A later subscription replaces an earlier
    /// one; there is no multi-subscriber fan-out.
    pub fn subscribe(&self) -> UnboundedReceiver<Notification> {
        self.inner.notifier.subscribe()
    }

    /// Register a dataset for synchronization, or re-arm one already
    /// registered.
    ///
    /// The dataset is taken from memory, hydrated from storage, or created
    /// fresh, in that order. Its effective config becomes the process-wide
    /// config merged with `options`. First-time setup persists the dataset
    /// and starts the sync loop; re-managing cancels the pending timer and
    /// triggers an immediate cycle (a no-op if one is already in flight).
    pub async fn manage(&self, dataset_id: &str, options: &SyncOptions, query_params: Value) {
        let handle = match self.handle_or_load(dataset_id).await {
            Ok(handle) => handle,
            Err(_) => self.insert_handle(dataset_id, Dataset::new()),
        };

        let first_arm = {
            let mut dataset = handle.dataset.lock().await;
            dataset.config = self.lock_config().merged(options);
            dataset.query_params = query_params;
            let first = !dataset.initialised;
            dataset.initialised = true;
            first
        };
        tracing::debug!(dataset_id, first_arm, "managing dataset");

        if first_arm {
            self.save_dataset(dataset_id, &handle).await;
        } else {
            handle.cancel_scheduled();
        }
        self.spawn_sync(dataset_id);
    }

    /// All locally known records of a dataset, optimistic state included.
    ///
    /// Unconfirmed creates have no server-assigned uid yet; they appear
    /// under their operation hash as a provisional identity until the
    /// next sync confirms them.
    pub async fn list(&self, dataset_id: &str) -> Result<HashMap<Uid, Record>> {
        let handle = self.handle(dataset_id)?;
        let dataset = handle.dataset.lock().await;

        let mut records = dataset.data.clone();
        for (op_hash, op) in &dataset.pending {
            if op.action == Action::Create {
                if let Some(post) = &op.post {
                    records
                        .entry(op_hash.clone())
                        .or_insert_with(|| Record::new(post.clone()));
                }
            }
        }
        Ok(records)
    }

    /// One locally known record, by uid or by a pending create's
    /// provisional identity.
    pub async fn read(&self, dataset_id: &str, uid: &str) -> Result<Record> {
        let handle = self.handle(dataset_id)?;
        let dataset = handle.dataset.lock().await;

        if let Some(record) = dataset.data.get(uid) {
            return Ok(record.clone());
        }
        dataset
            .pending
            .get(uid)
            .filter(|op| op.action == Action::Create)
            .and_then(|op| op.post.as_ref())
            .map(|post| Record::new(post.clone()))
            .ok_or_else(|| Error::UnknownUid(uid.to_string()))
    }

    /// Stage a create. The record surfaces through the pending queue only,
    /// until the server confirms and assigns a uid.
    pub async fn create(&self, dataset_id: &str, data: Value) -> Result<PendingOperation> {
        self.stage(dataset_id, Mutation::Create { data }).await
    }

    /// Stage an update, applying it optimistically to local data.
    pub async fn update(&self, dataset_id: &str, uid: &str, data: Value) -> Result<PendingOperation> {
        self.stage(
            dataset_id,
            Mutation::Update {
                uid: uid.to_string(),
                data,
            },
        )
        .await
    }

    /// Stage a delete, removing the record from local data optimistically.
    pub async fn delete(&self, dataset_id: &str, uid: &str) -> Result<PendingOperation> {
        self.stage(
            dataset_id,
            Mutation::Delete {
                uid: uid.to_string(),
            },
        )
        .await
    }

    // ------------------------------------------------------------------
    // Staging
    // ------------------------------------------------------------------

    async fn stage(&self, dataset_id: &str, mutation: Mutation) -> Result<PendingOperation> {
        // Offline staging still proceeds optimistically; the oracle's
        // answer is informational only.
        let online = self.inner.connectivity.is_online().await;
        let handle = self.handle_or_load(dataset_id).await?;

        let (op, config) = {
            let mut dataset = handle.dataset.lock().await;
            if !online {
                self.emit(
                    &dataset.config,
                    dataset_id,
                    mutation.uid().cloned(),
                    NotificationCode::OfflineUpdate,
                    json!(mutation.action().as_str()),
                );
            }

            let now = now_millis();
            let op = match mutation {
                Mutation::Create { data } => PendingOperation::create(data, now),
                Mutation::Update { uid, data } => {
                    let record = dataset
                        .data
                        .get_mut(&uid)
                        .ok_or_else(|| Error::UnknownUid(uid.clone()))?;
                    let op = PendingOperation::update(uid, record.data.clone(), data.clone(), now);
                    record.replace(data);
                    op
                }
                Mutation::Delete { uid } => {
                    let record = dataset
                        .data
                        .remove(&uid)
                        .ok_or_else(|| Error::UnknownUid(uid.clone()))?;
                    PendingOperation::delete(uid, record.data, now)
                }
            };

            dataset.pending.insert(op.hash.clone(), op.clone());
            (op, dataset.config.clone())
        };

        self.save_dataset(dataset_id, &handle).await;
        self.emit(
            &config,
            dataset_id,
            op.uid.clone(),
            NotificationCode::LocalUpdateApplied,
            json!(op.action.as_str()),
        );
        tracing::debug!(dataset_id, action = %op.action, op_hash = %op.hash, "staged local mutation");
        Ok(op)
    }

    // ------------------------------------------------------------------
    // Scheduler
    // ------------------------------------------------------------------

    fn spawn_sync(&self, dataset_id: &str) {
        let client = self.clone();
        let dataset_id = dataset_id.to_string();
        tokio::spawn(async move {
            client.run_sync_cycle(&dataset_id).await;
        });
    }

    // Boxed because the cycle loop is recursive through sync_complete's
    // timer spawn, which otherwise leaves the future's `Send`-ness
    // unresolvable.
    fn run_sync_cycle<'a>(
        &'a self,
        dataset_id: &'a str,
    ) -> std::pin::Pin<Box<dyn std::future::Future<Output = ()> + Send + 'a>> {
        Box::pin(async move {
            let Ok(handle) = self.handle(dataset_id) else {
                return;
            };
            if handle.sync_in_progress.swap(true, Ordering::SeqCst) {
                tracing::debug!(dataset_id, "sync already in progress, skipping trigger");
                return;
            }
            self.sync_loop(dataset_id, &handle).await;
        })
    }

    async fn sync_loop(&self, dataset_id: &str, handle: &Arc<DatasetHandle>) {
        let config = handle.dataset.lock().await.config.clone();
        self.emit(
            &config,
            dataset_id,
            None,
            NotificationCode::SyncStarted,
            Value::Null,
        );

        if !self.inner.connectivity.is_online().await {
            self.sync_complete(dataset_id, handle, SyncStatus::Offline)
                .await;
            return;
        }

        let request = {
            let dataset = handle.dataset.lock().await;
            SyncRequest {
                dataset_id: dataset_id.to_string(),
                query_params: dataset.query_params.clone(),
                dataset_hash: dataset.hash.clone(),
                pending: dataset.pending.values().cloned().collect(),
            }
        };
        tracing::debug!(
            dataset_id,
            dataset_hash = ?request.dataset_hash,
            pending = request.pending.len(),
            "starting sync loop"
        );

        match self.inner.transport.sync(dataset_id, request).await {
            Ok(response) => {
                let (outcome, notices, config) = {
                    let mut dataset = handle.dataset.lock().await;
                    let (outcome, notices) = reconcile::apply_sync_response(&mut dataset, response);
                    (outcome, notices, dataset.config.clone())
                };
                self.emit_notices(&config, dataset_id, notices);

                match outcome {
                    SyncOutcome::SnapshotApplied | SyncOutcome::UpToDate => {
                        self.sync_complete(dataset_id, handle, SyncStatus::Online)
                            .await;
                    }
                    SyncOutcome::RecordSyncRequired => {
                        tracing::debug!(dataset_id, "local dataset stale, syncing records");
                        self.sync_records(dataset_id, handle).await;
                    }
                }
            }
            Err(err) => {
                tracing::warn!(dataset_id, error = %err, "sync loop failed");
                self.emit(
                    &config,
                    dataset_id,
                    None,
                    NotificationCode::SyncFailed,
                    json!(err.message),
                );
                self.sync_complete(dataset_id, handle, SyncStatus::Failed(err.message))
                    .await;
            }
        }
    }

    async fn sync_records(&self, dataset_id: &str, handle: &Arc<DatasetHandle>) {
        let request = {
            let dataset = handle.dataset.lock().await;
            SyncRecordsRequest {
                dataset_id: dataset_id.to_string(),
                query_params: dataset.query_params.clone(),
                client_recs: dataset.client_records(),
            }
        };
        tracing::debug!(dataset_id, records = request.client_recs.len(), "record sync");

        match self.inner.transport.sync_records(dataset_id, request).await {
            Ok(response) => {
                let (notices, config) = {
                    let mut dataset = handle.dataset.lock().await;
                    let notices = reconcile::apply_record_sync(&mut dataset, response);
                    (notices, dataset.config.clone())
                };
                self.emit_notices(&config, dataset_id, notices);
                self.sync_complete(dataset_id, handle, SyncStatus::Online)
                    .await;
            }
            Err(err) => {
                tracing::warn!(dataset_id, error = %err, "record sync failed");
                self.sync_complete(dataset_id, handle, SyncStatus::Failed(err.message))
                    .await;
            }
        }
    }

    /// Tail of every cycle, success or failure: persist, clear the
    /// in-progress flag, arm the next timer, notify. Persistence always
    /// happens before the next cycle's timer is armed.
    async fn sync_complete(
        &self,
        dataset_id: &str,
        handle: &Arc<DatasetHandle>,
        status: SyncStatus,
    ) {
        self.save_dataset(dataset_id, handle).await;

        let (config, frequency) = {
            let dataset = handle.dataset.lock().await;
            (dataset.config.clone(), dataset.config.sync_frequency)
        };

        handle.sync_in_progress.store(false, Ordering::SeqCst);

        let client = self.clone();
        let id = dataset_id.to_string();
        let timer = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(frequency)).await;
            client.run_sync_cycle(&id).await;
        });
        handle.set_scheduled(timer.abort_handle());

        tracing::debug!(dataset_id, status = %status, "sync cycle complete");
        self.emit(
            &config,
            dataset_id,
            None,
            NotificationCode::SyncComplete,
            json!(status.to_string()),
        );
    }

    // ------------------------------------------------------------------
    // Persistence
    // ------------------------------------------------------------------

    async fn save_dataset(&self, dataset_id: &str, handle: &Arc<DatasetHandle>) {
        let (serialized, config) = {
            let dataset = handle.dataset.lock().await;
            (dataset.to_json(), dataset.config.clone())
        };

        let saved = match serialized {
            Ok(json) => {
                self.inner
                    .storage
                    .save(&Dataset::storage_key(dataset_id), &json)
                    .await
            }
            Err(err) => Err(err),
        };

        // A failed save never rolls back the in-memory state.
        if let Err(err) = saved {
            self.storage_failure(dataset_id, Some(&config), &err);
        }
    }

    async fn load_dataset(&self, dataset_id: &str) -> Option<Dataset> {
        let key = Dataset::storage_key(dataset_id);
        match self.inner.storage.load(&key).await {
            Ok(Some(serialized)) => match Dataset::from_json(&serialized) {
                Ok(dataset) => {
                    tracing::debug!(dataset_id, "dataset hydrated from storage");
                    Some(dataset)
                }
                Err(err) => {
                    self.storage_failure(dataset_id, None, &err);
                    None
                }
            },
            Ok(None) => None,
            Err(err) => {
                self.storage_failure(dataset_id, None, &err);
                None
            }
        }
    }

    fn storage_failure(&self, dataset_id: &str, config: Option<&SyncConfig>, err: &StorageError) {
        tracing::warn!(dataset_id, error = %err, "client storage failed");
        let gating = match config {
            Some(config) => config.clone(),
            None => self.lock_config().clone(),
        };
        self.emit(
            &gating,
            dataset_id,
            None,
            NotificationCode::ClientStorageFailed,
            json!(err.to_string()),
        );
    }

    // ------------------------------------------------------------------
    // Registry
    // ------------------------------------------------------------------

    fn handle(&self, dataset_id: &str) -> Result<Arc<DatasetHandle>> {
        self.inner
            .datasets
            .get(dataset_id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| Error::UnknownDataset(dataset_id.to_string()))
    }

    async fn handle_or_load(&self, dataset_id: &str) -> Result<Arc<DatasetHandle>> {
        if let Ok(handle) = self.handle(dataset_id) {
            return Ok(handle);
        }
        match self.load_dataset(dataset_id).await {
            Some(dataset) => Ok(self.insert_handle(dataset_id, dataset)),
            None => Err(Error::UnknownDataset(dataset_id.to_string())),
        }
    }

    fn insert_handle(&self, dataset_id: &str, dataset: Dataset) -> Arc<DatasetHandle> {
        self.inner
            .datasets
            .entry(dataset_id.to_string())
            .or_insert_with(|| Arc::new(DatasetHandle::new(dataset)))
            .value()
            .clone()
    }

    fn lock_config(&self) -> MutexGuard<'_, SyncConfig> {
        self.inner
            .config
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    // ------------------------------------------------------------------
    // Notifications
    // ------------------------------------------------------------------

    fn emit(
        &self,
        config: &SyncConfig,
        dataset_id: &str,
        uid: Option<Uid>,
        code: NotificationCode,
        message: Value,
    ) {
        if config.notify_enabled(code) {
            self.inner.notifier.emit(Notification {
                dataset_id: dataset_id.to_string(),
                uid,
                code,
                message,
            });
        }
    }

    fn emit_notices(&self, config: &SyncConfig, dataset_id: &str, notices: Vec<Notice>) {
        for notice in notices {
            self.emit(config, dataset_id, notice.uid, notice.code, notice.message);
        }
    }
}

fn now_millis() -> Timestamp {
    chrono::Utc::now().timestamp_millis()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::{AlwaysOnline, MemoryStorage};
    use crate::error::TransportError;
    use crate::protocol::{SyncRecordsResponse, SyncResponse};
    use async_trait::async_trait;

    /// Transport for tests that never reach the reconciliation path.
    struct UnreachableTransport;

    #[async_trait]
    impl Transport for UnreachableTransport {
        async fn sync(
            &self,
            _dataset_id: &str,
            _request: SyncRequest,
        ) -> std::result::Result<SyncResponse, TransportError> {
            Err(TransportError::new("unreachable"))
        }

        async fn sync_records(
            &self,
            _dataset_id: &str,
            _request: SyncRecordsRequest,
        ) -> std::result::Result<SyncRecordsResponse, TransportError> {
            Err(TransportError::new("unreachable"))
        }
    }

    fn test_client() -> SyncClient {
        SyncClient::new(
            Arc::new(MemoryStorage::new()),
            Arc::new(UnreachableTransport),
            Arc::new(AlwaysOnline),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn unmanaged_dataset_is_unknown() {
        let client = test_client();

        let err = client.list("ghost").await.unwrap_err();
        assert_eq!(err, Error::UnknownDataset("ghost".into()));

        let err = client
            .create("ghost", json!({"title": "a"}))
            .await
            .unwrap_err();
        assert_eq!(err, Error::UnknownDataset("ghost".into()));
    }

    #[tokio::test(start_paused = true)]
    async fn update_unknown_uid_fails_without_side_effects() {
        let client = test_client();
        client
            .manage("notes", &SyncOptions::default(), json!({}))
            .await;

        let err = client
            .update("notes", "missing", json!({"v": 1}))
            .await
            .unwrap_err();
        assert_eq!(err, Error::UnknownUid("missing".into()));

        let err = client.delete("notes", "missing").await.unwrap_err();
        assert_eq!(err, Error::UnknownUid("missing".into()));

        let handle = client.handle("notes").unwrap();
        assert!(handle.dataset.lock().await.pending.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn create_is_pending_only_until_confirmed() {
        let client = test_client();
        client
            .manage("notes", &SyncOptions::default(), json!({}))
            .await;

        let op = client.create("notes", json!({"title": "a"})).await.unwrap();
        assert_eq!(op.action, Action::Create);
        assert!(op.uid.is_none());

        // Visible to readers under the provisional identity.
        let listed = client.list("notes").await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[&op.hash].data, json!({"title": "a"}));
        let read = client.read("notes", &op.hash).await.unwrap();
        assert_eq!(read.data, json!({"title": "a"}));

        // But staged only through the pending map until confirmed.
        let handle = client.handle("notes").unwrap();
        let dataset = handle.dataset.lock().await;
        assert!(dataset.data.is_empty());
        assert_eq!(dataset.pending.len(), 1);
        assert!(dataset.pending.contains_key(&op.hash));
    }

    #[tokio::test(start_paused = true)]
    async fn init_sets_global_defaults_for_manage() {
        let client = test_client();
        client.init(&SyncOptions {
            sync_frequency: Some(60),
            notify_sync_complete: Some(true),
            ..Default::default()
        });
        client
            .manage(
                "notes",
                &SyncOptions {
                    notify_sync_complete: Some(false),
                    ..Default::default()
                },
                json!({}),
            )
            .await;

        let handle = client.handle("notes").unwrap();
        let dataset = handle.dataset.lock().await;
        // Global init value survives; the per-dataset override wins.
        assert_eq!(dataset.config.sync_frequency, 60);
        assert!(!dataset.config.notify_sync_complete);
        assert!(dataset.initialised);
    }

    #[test]
    fn sync_status_display() {
        assert_eq!(SyncStatus::Online.to_string(), "online");
        assert_eq!(SyncStatus::Offline.to_string(), "offline");
        assert_eq!(SyncStatus::Failed("timeout".into()).to_string(), "timeout");
    }
}
