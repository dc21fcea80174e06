//! Error types for the sync client.

use crate::{DatasetId, Uid};
use thiserror::Error;

/// All errors returned from the public API.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum Error {
    #[error("unknown dataset: {0}")]
    UnknownDataset(DatasetId),

    #[error("unknown uid: {0}")]
    UnknownUid(Uid),

    #[error("client storage failed: {0}")]
    StorageFailed(#[from] StorageError),

    #[error("remote call failed: {0}")]
    TransportFailed(#[from] TransportError),
}

/// Result type for client operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Failure reported by a [`LocalStorage`](crate::adapter::LocalStorage) adapter.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("{0}")]
pub struct StorageError(pub String);

impl StorageError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// Failure reported by a [`Transport`](crate::adapter::Transport) adapter.
///
/// Carries a short message used as the sync completion status, plus an
/// optional structured detail from the remote side.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct TransportError {
    pub message: String,
    pub detail: Option<String>,
}

impl TransportError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            detail: None,
        }
    }

    pub fn with_detail(message: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            detail: Some(detail.into()),
        }
    }
}
