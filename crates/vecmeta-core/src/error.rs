//! Error types for the snapshot engine.

use thiserror::Error;
use vecmeta_store::{Id, ResourceKind, StoreError};

/// Errors surfaced by the engine. All carry a message, none a stack trace.
#[derive(Error, Debug)]
pub enum MetaError {
    /// Holder or snapshot not in memory for the requested id/name.
    #[error("{0} not found")]
    NotFound(String),

    /// Snapshot superseded; scoped access denied by the holder's policy.
    #[error("snapshot {commit_id} of collection {collection_id} is not active")]
    NotActive { collection_id: Id, commit_id: Id },

    /// Base snapshot's id differs from the holder's active at commit time.
    #[error("stale base snapshot {base}, active is {active}")]
    Stale { base: Id, active: Id },

    /// Attribute name not applicable to the resource kind.
    #[error("unknown attribute \"{attr}\" for {kind}")]
    UnknownAttribute { kind: ResourceKind, attr: String },

    /// Attribute value cannot be decoded.
    #[error("malformed value \"{value}\" for attribute \"{attr}\"")]
    MalformedAttribute { attr: String, value: String },

    /// A collection with this name is already active.
    #[error("collection \"{0}\" already exists")]
    DuplicateName(String),

    /// Submission after executor shutdown.
    #[error("executor is stopped")]
    ExecutorStopped,

    /// Sentinel: a draining holder has ejected its last snapshot. Not a
    /// failure.
    #[error("snapshot holder drained")]
    EmptyHolder,

    /// Opaque persistence error, propagated verbatim.
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl MetaError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, MetaError::NotFound(_))
    }

    pub fn is_not_active(&self) -> bool {
        matches!(self, MetaError::NotActive { .. })
    }

    pub fn is_empty_holder(&self) -> bool {
        matches!(self, MetaError::EmptyHolder)
    }

    pub(crate) fn malformed(attr: &str, value: &str) -> Self {
        MetaError::MalformedAttribute {
            attr: attr.to_string(),
            value: value.to_string(),
        }
    }
}

/// Result type for engine operations.
pub type MetaResult<T> = std::result::Result<T, MetaError>;
