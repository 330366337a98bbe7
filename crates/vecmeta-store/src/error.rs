//! Error types for the persistence layer.

use thiserror::Error;

use crate::schema::ResourceKind;
use crate::types::Id;

/// Errors surfaced by [`Store`](crate::Store) back-ends. Opaque to the
/// engine: they are propagated verbatim to callers.
#[derive(Error, Debug)]
pub enum StoreError {
    /// Row addressed by (kind, id) does not exist.
    #[error("{kind} row {id} not found")]
    RowNotFound { kind: ResourceKind, id: Id },

    /// `meta_uri` scheme not handled by any back-end.
    #[error("unknown meta uri scheme in \"{0}\"")]
    UnknownScheme(String),

    /// Filesystem failure in a file-backed store.
    #[error("store io error: {0}")]
    Io(#[from] std::io::Error),

    /// Row (de)serialization failure.
    #[error("row serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Anything else the back-end cannot classify.
    #[error("storage backend error: {0}")]
    Backend(String),
}

/// Result type for storage operations.
pub type StoreResult<T> = std::result::Result<T, StoreError>;
