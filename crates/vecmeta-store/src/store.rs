//! Store trait definition.
//!
//! The `Store` is the opaque persistence boundary of the snapshot engine:
//! CRUD per resource kind, monotonic id allocation, active-set queries, and
//! ordered batch application. Back-ends: [`MemStore`](crate::MemStore)
//! (in-memory, also the test fake) and [`LocalStore`](crate::LocalStore)
//! (file-backed).
//!
//! Guarantees common to every back-end:
//! - `create` allocates ids monotonically increasing per kind, stable across
//!   restarts for durable back-ends.
//! - `update` overwrites only the attributes present in the map, atomically
//!   per row.
//! - `apply_operation` applies rows strictly in order; whole-batch
//!   transactionality is NOT guaranteed, callers tolerate partial
//!   persistence.

use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::{StoreError, StoreResult};
use crate::local::LocalStore;
use crate::mem::MemStore;
use crate::schema::{attr, ResourceKind, State};
use crate::types::{AttrMap, Id, Ts};

/// How a row participates in an operation batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowOp {
    Add,
    Update,
    Delete,
}

/// A single lowered row mutation: the persistence form of a typed
/// `ResourceContext`.
#[derive(Debug, Clone)]
pub struct RowContext {
    pub kind: ResourceKind,
    pub op: RowOp,
    /// Target row for Update/Delete; ignored for Add (the store allocates).
    pub id: Id,
    /// Attribute values to write. Empty for Delete.
    pub attrs: AttrMap,
}

impl RowContext {
    pub fn add(kind: ResourceKind, attrs: AttrMap) -> Self {
        RowContext {
            kind,
            op: RowOp::Add,
            id: 0,
            attrs,
        }
    }

    pub fn update(kind: ResourceKind, id: Id, attrs: AttrMap) -> Self {
        RowContext {
            kind,
            op: RowOp::Update,
            id,
            attrs,
        }
    }

    pub fn delete(kind: ResourceKind, id: Id) -> Self {
        RowContext {
            kind,
            op: RowOp::Delete,
            id,
            attrs: AttrMap::new(),
        }
    }
}

/// Opaque persistence back-end for snapshot metadata.
#[async_trait]
pub trait Store: Send + Sync + std::fmt::Debug {
    /// Insert a row, allocating and returning its id. Any `id` entry in
    /// `attrs` is ignored.
    async fn create(&self, kind: ResourceKind, attrs: AttrMap) -> StoreResult<Id>;

    /// Overwrite only the listed attributes of an existing row.
    async fn update(&self, kind: ResourceKind, id: Id, attrs: AttrMap) -> StoreResult<()>;

    /// Physically delete a row. Used only by GC.
    async fn remove(&self, kind: ResourceKind, id: Id) -> StoreResult<()>;

    /// Read one row as its full attribute map (including `id`).
    async fn get(&self, kind: ResourceKind, id: Id) -> StoreResult<AttrMap>;

    /// Newest ACTIVE collection with the given name, if any.
    async fn find_collection_by_name(&self, name: &str) -> StoreResult<Option<(Id, AttrMap)>>;

    /// Ids of all collections; only ACTIVE ones unless `include_inactive`.
    async fn get_collection_ids(&self, include_inactive: bool) -> StoreResult<Vec<Id>>;

    /// Ids of all collection commits of one collection, oldest first; only
    /// ACTIVE ones unless `include_inactive`.
    async fn get_snapshot_ids(
        &self,
        collection_id: Id,
        include_inactive: bool,
    ) -> StoreResult<Vec<Id>>;

    /// Every ACTIVE collection commit with `updated_on > low_bound`, as
    /// `(collection_id, commit_id)` pairs (ordering unspecified), plus the
    /// max `updated_on` seen across all ACTIVE commits.
    async fn get_all_active_snapshot_ids(&self, low_bound: Ts)
        -> StoreResult<(Vec<(Id, Id)>, Ts)>;

    /// Every non-ACTIVE row, grouped by kind. GC input.
    async fn get_inactive_resources(&self) -> StoreResult<Vec<(ResourceKind, Vec<Id>)>>;

    /// Apply a batch of row mutations in order. Atomic per row only.
    async fn apply_operation(&self, batch: Vec<RowContext>) -> StoreResult<()>;
}

/// Build a store from a `meta_uri`. `mem://` yields an in-memory store;
/// `file://` a [`LocalStore`] rooted at `path`.
pub async fn build_store(meta_uri: &str, path: &Path) -> StoreResult<Arc<dyn Store>> {
    if meta_uri.starts_with("mem://") {
        Ok(Arc::new(MemStore::new()))
    } else if meta_uri.starts_with("file://") {
        Ok(Arc::new(LocalStore::open(path).await?))
    } else {
        Err(StoreError::UnknownScheme(meta_uri.to_string()))
    }
}

/// Parse the `state` column of a row. Rows written through the engine always
/// carry one; a missing or mangled value reads as non-ACTIVE.
pub(crate) fn row_state(attrs: &AttrMap) -> State {
    attrs
        .get(attr::STATE)
        .and_then(|v| State::from_str(v).ok())
        .unwrap_or(State::Deactive)
}

pub(crate) fn row_i64(attrs: &AttrMap, key: &str) -> i64 {
    attrs.get(key).and_then(|v| v.parse().ok()).unwrap_or(0)
}

/// Pure row-table scans shared by the in-memory and file-backed back-ends.
pub(crate) mod scan {
    use std::collections::BTreeMap;

    use super::{row_i64, row_state};
    use crate::schema::{attr, State};
    use crate::types::{AttrMap, Id, Ts};

    pub fn collection_ids(rows: &BTreeMap<Id, AttrMap>, include_inactive: bool) -> Vec<Id> {
        rows.iter()
            .filter(|(_, row)| include_inactive || row_state(row) == State::Active)
            .map(|(id, _)| *id)
            .collect()
    }

    pub fn snapshot_ids(
        rows: &BTreeMap<Id, AttrMap>,
        collection_id: Id,
        include_inactive: bool,
    ) -> Vec<Id> {
        rows.iter()
            .filter(|(_, row)| {
                row_i64(row, attr::COLLECTION_ID) == collection_id
                    && (include_inactive || row_state(row) == State::Active)
            })
            .map(|(id, _)| *id)
            .collect()
    }

    /// `(collection_id, commit_id)` pairs newer than `low_bound`, plus the
    /// max `updated_on` across every ACTIVE commit.
    pub fn active_snapshot_ids(
        rows: &BTreeMap<Id, AttrMap>,
        low_bound: Ts,
    ) -> (Vec<(Id, Id)>, Ts) {
        let mut pairs = Vec::new();
        let mut latest = low_bound;
        for (id, row) in rows {
            if row_state(row) != State::Active {
                continue;
            }
            let updated = row_i64(row, attr::UPDATED_ON);
            latest = latest.max(updated);
            if updated > low_bound {
                pairs.push((row_i64(row, attr::COLLECTION_ID), *id));
            }
        }
        (pairs, latest)
    }

    /// Newest ACTIVE row whose `name` matches.
    pub fn find_active_by_name(rows: &BTreeMap<Id, AttrMap>, name: &str) -> Option<(Id, AttrMap)> {
        rows.iter()
            .rev()
            .find(|(_, row)| {
                row_state(row) == State::Active
                    && row.get(attr::NAME).map(String::as_str) == Some(name)
            })
            .map(|(id, row)| (*id, row.clone()))
    }

    pub fn inactive_ids(rows: &BTreeMap<Id, AttrMap>) -> Vec<Id> {
        rows.iter()
            .filter(|(_, row)| row_state(row) != State::Active)
            .map(|(id, _)| *id)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn build_store_dispatches_on_scheme() {
        let dir = tempfile::tempdir().unwrap();
        assert!(build_store("mem://", dir.path()).await.is_ok());
        assert!(build_store("file://meta", dir.path()).await.is_ok());
        let err = build_store("mysql://meta", dir.path()).await.unwrap_err();
        assert!(matches!(err, StoreError::UnknownScheme(_)));
    }

    #[test]
    fn row_context_constructors() {
        let add = RowContext::add(ResourceKind::Segment, AttrMap::new());
        assert_eq!(add.op, RowOp::Add);
        let del = RowContext::delete(ResourceKind::Segment, 7);
        assert_eq!(del.op, RowOp::Delete);
        assert_eq!(del.id, 7);
        assert!(del.attrs.is_empty());
    }
}
