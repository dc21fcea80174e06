//! Pending operations - staged local mutations awaiting remote confirmation.
//!
//! An operation's hash doubles as its queue key and as the confirmation
//! token the server echoes back. The hash covers `{uid, action, pre, post}`
//! but not the timestamp, so the queue is keyed by what changed, not when.

use crate::hash::content_hash;
use crate::{OpHash, Timestamp, Uid};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// Kind of staged mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    Create,
    Update,
    Delete,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Create => "create",
            Action::Update => "update",
            Action::Delete => "delete",
        }
    }
}

impl std::fmt::Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A staged, not-yet-server-confirmed mutation against a dataset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingOperation {
    /// Target record uid, `None` for create (uid not assigned yet)
    pub uid: Option<Uid>,
    pub action: Action,
    /// Payload snapshot before the change, `None` for create
    pub pre: Option<Value>,
    /// Payload after the change, `None` for delete
    pub post: Option<Value>,
    /// Content hash of the operation, used as queue key and confirmation token
    pub hash: OpHash,
    /// When the operation was staged (milliseconds since epoch)
    pub timestamp: Timestamp,
}

impl PendingOperation {
    /// Stage a create: no uid, no prior state.
    pub fn create(post: Value, timestamp: Timestamp) -> Self {
        Self::seal(None, Action::Create, None, Some(post), timestamp)
    }

    /// Stage an update: replaces `pre` with `post` for an existing uid.
    pub fn update(uid: impl Into<Uid>, pre: Value, post: Value, timestamp: Timestamp) -> Self {
        Self::seal(
            Some(uid.into()),
            Action::Update,
            Some(pre),
            Some(post),
            timestamp,
        )
    }

    /// Stage a delete: captures the removed payload as `pre`.
    pub fn delete(uid: impl Into<Uid>, pre: Value, timestamp: Timestamp) -> Self {
        Self::seal(Some(uid.into()), Action::Delete, Some(pre), None, timestamp)
    }

    fn seal(
        uid: Option<Uid>,
        action: Action,
        pre: Option<Value>,
        post: Option<Value>,
        timestamp: Timestamp,
    ) -> Self {
        let hash = content_hash(&json!({
            "uid": uid,
            "action": action,
            "pre": pre,
            "post": post,
        }));
        Self {
            uid,
            action,
            pre,
            post,
            hash,
            timestamp,
        }
    }
}
