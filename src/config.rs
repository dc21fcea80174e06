//! Sync configuration and per-dataset overrides.

use crate::notify::NotificationCode;
use serde::{Deserialize, Serialize};

/// Default interval between sync cycles, in seconds.
pub const DEFAULT_SYNC_FREQUENCY: u64 = 10;

/// Effective configuration for a managed dataset.
///
/// Built by merging [`SyncOptions`] overlays over the defaults: once at
/// `init` for the process-wide config, then per dataset at `manage`.
/// Every notification kind has its own enablement flag; all default off.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncConfig {
    /// How often to synchronise with the remote store, in seconds
    pub sync_frequency: u64,
    pub notify_client_storage_failed: bool,
    pub notify_sync_started: bool,
    pub notify_sync_complete: bool,
    pub notify_offline_update: bool,
    pub notify_collision_detected: bool,
    pub notify_remote_update_failed: bool,
    pub notify_local_update_applied: bool,
    pub notify_remote_update_applied: bool,
    pub notify_delta_received: bool,
    pub notify_sync_failed: bool,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            sync_frequency: DEFAULT_SYNC_FREQUENCY,
            notify_client_storage_failed: false,
            notify_sync_started: false,
            notify_sync_complete: false,
            notify_offline_update: false,
            notify_collision_detected: false,
            notify_remote_update_failed: false,
            notify_local_update_applied: false,
            notify_remote_update_applied: false,
            notify_delta_received: false,
            notify_sync_failed: false,
        }
    }
}

impl SyncConfig {
    /// Apply an overlay in place; unset options leave fields unchanged.
    pub fn apply(&mut self, options: &SyncOptions) {
        macro_rules! take {
            ($field:ident) => {
                if let Some(value) = options.$field {
                    self.$field = value;
                }
            };
        }
        take!(sync_frequency);
        take!(notify_client_storage_failed);
        take!(notify_sync_started);
        take!(notify_sync_complete);
        take!(notify_offline_update);
        take!(notify_collision_detected);
        take!(notify_remote_update_failed);
        take!(notify_local_update_applied);
        take!(notify_remote_update_applied);
        take!(notify_delta_received);
        take!(notify_sync_failed);
    }

    /// Return a copy with the overlay applied.
    pub fn merged(&self, options: &SyncOptions) -> Self {
        let mut config = self.clone();
        config.apply(options);
        config
    }

    /// Whether notifications of the given kind should reach the observer.
    pub fn notify_enabled(&self, code: NotificationCode) -> bool {
        match code {
            NotificationCode::ClientStorageFailed => self.notify_client_storage_failed,
            NotificationCode::SyncStarted => self.notify_sync_started,
            NotificationCode::SyncComplete => self.notify_sync_complete,
            NotificationCode::OfflineUpdate => self.notify_offline_update,
            NotificationCode::CollisionDetected => self.notify_collision_detected,
            NotificationCode::RemoteUpdateFailed => self.notify_remote_update_failed,
            NotificationCode::LocalUpdateApplied => self.notify_local_update_applied,
            NotificationCode::RemoteUpdateApplied => self.notify_remote_update_applied,
            NotificationCode::DeltaReceived => self.notify_delta_received,
            NotificationCode::SyncFailed => self.notify_sync_failed,
        }
    }
}

/// Partial configuration overlay; only set fields take effect.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SyncOptions {
    pub sync_frequency: Option<u64>,
    pub notify_client_storage_failed: Option<bool>,
    pub notify_sync_started: Option<bool>,
    pub notify_sync_complete: Option<bool>,
    pub notify_offline_update: Option<bool>,
    pub notify_collision_detected: Option<bool>,
    pub notify_remote_update_failed: Option<bool>,
    pub notify_local_update_applied: Option<bool>,
    pub notify_remote_update_applied: Option<bool>,
    pub notify_delta_received: Option<bool>,
    pub notify_sync_failed: Option<bool>,
}
