//! # Tether Sync
//!
//! An offline-first synchronization client for applications that keep
//! locally cached copies of named datasets consistent with a remote
//! authoritative store, under intermittent connectivity.
//!
//! ## Design Principles
//!
//! - **Optimistic first**: mutations apply locally and persist before any
//!   server confirmation; readers always see the latest local state
//! - **Hash-gated**: a cheap dataset-level hash comparison decides whether
//!   a sync cycle needs a full snapshot, a per-record diff, or nothing
//! - **Self-perpetuating**: every sync cycle, successful or not, persists
//!   the dataset and arms the next cycle; no failure stops the loop
//! - **Conflict reporting, not resolution**: collisions are detected and
//!   surfaced as notifications; merging is the server's and the
//!   application's decision
//!
//! ## Core Concepts
//!
//! ### Datasets and records
//!
//! A [`Dataset`] is a named, independently synchronized map of uid to
//! [`Record`]. Each record carries a content hash of its payload; the
//! dataset carries the last server-confirmed aggregate hash.
//!
//! ### Pending operations
//!
//! Mutations are staged as [`PendingOperation`]s keyed by an operation
//! hash that doubles as the server's confirmation token. Several
//! operations against the same uid may be pending at once; the queue
//! never collapses them.
//!
//! ### The sync loop
//!
//! A per-dataset scheduler submits all pending operations plus the
//! dataset hash to the remote `sync` procedure, routes the response
//! through the reconciliation logic (full snapshot replace, per-record
//! `syncRecords` round, or nothing), and re-arms itself after
//! `sync_frequency` seconds.
//!
//! ### Adapters
//!
//! Storage, transport, and connectivity are trait objects
//! ([`LocalStorage`], [`Transport`], [`Connectivity`]); the core performs
//! no IO of its own.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use serde_json::json;
//! use tether_sync::{AlwaysOnline, MemoryStorage, SyncClient, SyncOptions};
//! # use tether_sync::Transport;
//! # fn transport() -> Arc<dyn Transport> { unimplemented!() }
//!
//! # async fn run() -> tether_sync::Result<()> {
//! let client = SyncClient::new(
//!     Arc::new(MemoryStorage::new()),
//!     transport(),
//!     Arc::new(AlwaysOnline),
//! );
//!
//! client.init(&SyncOptions {
//!     sync_frequency: Some(5),
//!     notify_delta_received: Some(true),
//!     ..Default::default()
//! });
//! let mut events = client.subscribe();
//!
//! client.manage("notes", &SyncOptions::default(), json!({})).await;
//! client.create("notes", json!({"title": "first note"})).await?;
//!
//! while let Some(event) = events.recv().await {
//!     println!("{}: {}", event.dataset_id, event.code);
//! }
//! # Ok(())
//! # }
//! ```

pub mod adapter;
pub mod client;
pub mod config;
pub mod dataset;
pub mod error;
pub mod hash;
pub mod notify;
pub mod operation;
pub mod protocol;
pub mod reconcile;
pub mod record;

// Re-export main types at crate root
pub use adapter::{AlwaysOnline, Connectivity, LocalStorage, MemoryStorage, Transport};
pub use client::{SyncClient, SyncStatus};
pub use config::{SyncConfig, SyncOptions, DEFAULT_SYNC_FREQUENCY};
pub use dataset::Dataset;
pub use error::{Error, Result, StorageError, TransportError};
pub use hash::content_hash;
pub use notify::{Notification, NotificationCode, Notifier};
pub use operation::{Action, PendingOperation};
pub use protocol::{
    SyncRecordsRequest, SyncRecordsResponse, SyncRequest, SyncResponse, UpdateOutcome,
    UpdateReport,
};
pub use reconcile::{apply_record_sync, apply_sync_response, Notice, SyncOutcome};
pub use record::Record;

/// Type aliases for clarity
pub type DatasetId = String;
pub type Uid = String;
pub type OpHash = String;
pub type Timestamp = i64;
