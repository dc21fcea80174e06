//! Notification bus - typed lifecycle and result events.
//!
//! A single observer may be subscribed at a time; a later subscription
//! replaces the earlier one. Events are delivered over an unbounded
//! channel, so a slow or failing observer never blocks staging or the
//! sync loop. Per-kind gating against the dataset config happens at the
//! emit site, before an event reaches the channel.

use crate::{DatasetId, Uid};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Mutex;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

/// Kind of a notification event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationCode {
    /// Loading or saving to client storage failed
    ClientStorageFailed,
    /// A sync cycle with the server has started
    SyncStarted,
    /// A sync cycle with the server has completed
    SyncComplete,
    /// A record update was attempted while offline
    OfflineUpdate,
    /// A submitted operation failed due to a data collision
    CollisionDetected,
    /// A submitted operation failed for a non-collision reason
    RemoteUpdateFailed,
    /// A mutation was applied to the local store
    LocalUpdateApplied,
    /// A submitted operation was applied to the remote store
    RemoteUpdateApplied,
    /// A delta was received from the remote store (dataset-level when uid
    /// is unset, record-level otherwise)
    DeltaReceived,
    /// The sync loop failed to complete
    SyncFailed,
}

impl NotificationCode {
    /// Every code, in declaration order.
    pub const ALL: [NotificationCode; 10] = [
        NotificationCode::ClientStorageFailed,
        NotificationCode::SyncStarted,
        NotificationCode::SyncComplete,
        NotificationCode::OfflineUpdate,
        NotificationCode::CollisionDetected,
        NotificationCode::RemoteUpdateFailed,
        NotificationCode::LocalUpdateApplied,
        NotificationCode::RemoteUpdateApplied,
        NotificationCode::DeltaReceived,
        NotificationCode::SyncFailed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationCode::ClientStorageFailed => "client_storage_failed",
            NotificationCode::SyncStarted => "sync_started",
            NotificationCode::SyncComplete => "sync_complete",
            NotificationCode::OfflineUpdate => "offline_update",
            NotificationCode::CollisionDetected => "collision_detected",
            NotificationCode::RemoteUpdateFailed => "remote_update_failed",
            NotificationCode::LocalUpdateApplied => "local_update_applied",
            NotificationCode::RemoteUpdateApplied => "remote_update_applied",
            NotificationCode::DeltaReceived => "delta_received",
            NotificationCode::SyncFailed => "sync_failed",
        }
    }
}

impl std::fmt::Display for NotificationCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An event delivered to the observer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub dataset_id: DatasetId,
    /// Affected record, `None` for dataset-level events
    pub uid: Option<Uid>,
    pub code: NotificationCode,
    /// Opaque context, varies by code
    pub message: Value,
}

/// Single-observer event bus.
#[derive(Debug, Default)]
pub struct Notifier {
    observer: Mutex<Option<UnboundedSender<Notification>>>,
}

impl Notifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the observer, replacing any earlier subscription.
    pub fn subscribe(&self) -> UnboundedReceiver<Notification> {
        let (tx, rx) = mpsc::unbounded_channel();
        *self.lock() = Some(tx);
        rx
    }

    /// Deliver an event to the observer, if one is subscribed.
    ///
    /// A dropped receiver is treated as an unsubscribe.
    pub fn emit(&self, notification: Notification) {
        let mut slot = self.lock();
        if let Some(tx) = slot.as_ref() {
            if tx.send(notification).is_err() {
                *slot = None;
            }
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Option<UnboundedSender<Notification>>> {
        // Sender slot holds no invariants worth poisoning over.
        self.observer
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
