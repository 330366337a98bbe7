//! In-memory store back-end.
//!
//! Serves two roles: the `mem://` scheme of [`build_store`] (single-node
//! deployments that do not persist metadata across restarts) and the test
//! fake for everything above the Store trait.

use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::{StoreError, StoreResult};
use crate::schema::{attr, ResourceKind};
use crate::store::{scan, RowContext, RowOp, Store};
use crate::types::{AttrMap, Id, Ts};

#[derive(Debug, Default)]
struct Table {
    rows: BTreeMap<Id, AttrMap>,
    next_id: Id,
}

impl Table {
    fn insert(&mut self, mut attrs: AttrMap) -> Id {
        self.next_id += 1;
        let id = self.next_id;
        attrs.insert(attr::ID.to_string(), id.to_string());
        self.rows.insert(id, attrs);
        id
    }
}

/// In-memory store backed by a `BTreeMap` per kind.
#[derive(Debug, Default)]
pub struct MemStore {
    tables: Mutex<HashMap<ResourceKind, Table>>,
}

impl MemStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_tables<T>(&self, f: impl FnOnce(&mut HashMap<ResourceKind, Table>) -> T) -> T {
        let mut tables = self.tables.lock().unwrap();
        f(&mut tables)
    }
}

fn update_row(table: &mut Table, kind: ResourceKind, id: Id, attrs: AttrMap) -> StoreResult<()> {
    let row = table
        .rows
        .get_mut(&id)
        .ok_or(StoreError::RowNotFound { kind, id })?;
    for (k, v) in attrs {
        if k == attr::ID {
            continue;
        }
        row.insert(k, v);
    }
    Ok(())
}

#[async_trait]
impl Store for MemStore {
    async fn create(&self, kind: ResourceKind, attrs: AttrMap) -> StoreResult<Id> {
        self.with_tables(|tables| Ok(tables.entry(kind).or_default().insert(attrs)))
    }

    async fn update(&self, kind: ResourceKind, id: Id, attrs: AttrMap) -> StoreResult<()> {
        self.with_tables(|tables| {
            let table = tables.entry(kind).or_default();
            update_row(table, kind, id, attrs)
        })
    }

    async fn remove(&self, kind: ResourceKind, id: Id) -> StoreResult<()> {
        self.with_tables(|tables| {
            let table = tables.entry(kind).or_default();
            table
                .rows
                .remove(&id)
                .map(|_| ())
                .ok_or(StoreError::RowNotFound { kind, id })
        })
    }

    async fn get(&self, kind: ResourceKind, id: Id) -> StoreResult<AttrMap> {
        self.with_tables(|tables| {
            tables
                .get(&kind)
                .and_then(|t| t.rows.get(&id))
                .cloned()
                .ok_or(StoreError::RowNotFound { kind, id })
        })
    }

    async fn find_collection_by_name(&self, name: &str) -> StoreResult<Option<(Id, AttrMap)>> {
        self.with_tables(|tables| {
            Ok(tables
                .get(&ResourceKind::Collection)
                .and_then(|t| scan::find_active_by_name(&t.rows, name)))
        })
    }

    async fn get_collection_ids(&self, include_inactive: bool) -> StoreResult<Vec<Id>> {
        self.with_tables(|tables| {
            Ok(tables
                .get(&ResourceKind::Collection)
                .map(|t| scan::collection_ids(&t.rows, include_inactive))
                .unwrap_or_default())
        })
    }

    async fn get_snapshot_ids(
        &self,
        collection_id: Id,
        include_inactive: bool,
    ) -> StoreResult<Vec<Id>> {
        self.with_tables(|tables| {
            Ok(tables
                .get(&ResourceKind::CollectionCommit)
                .map(|t| scan::snapshot_ids(&t.rows, collection_id, include_inactive))
                .unwrap_or_default())
        })
    }

    async fn get_all_active_snapshot_ids(
        &self,
        low_bound: Ts,
    ) -> StoreResult<(Vec<(Id, Id)>, Ts)> {
        self.with_tables(|tables| {
            Ok(tables
                .get(&ResourceKind::CollectionCommit)
                .map(|t| scan::active_snapshot_ids(&t.rows, low_bound))
                .unwrap_or((vec![], low_bound)))
        })
    }

    async fn get_inactive_resources(&self) -> StoreResult<Vec<(ResourceKind, Vec<Id>)>> {
        self.with_tables(|tables| {
            let mut grouped = Vec::new();
            for kind in ResourceKind::ALL {
                let Some(table) = tables.get(&kind) else {
                    continue;
                };
                let ids = scan::inactive_ids(&table.rows);
                if !ids.is_empty() {
                    grouped.push((kind, ids));
                }
            }
            Ok(grouped)
        })
    }

    async fn apply_operation(&self, batch: Vec<RowContext>) -> StoreResult<()> {
        self.with_tables(|tables| {
            for ctx in batch {
                let table = tables.entry(ctx.kind).or_default();
                match ctx.op {
                    RowOp::Add => {
                        table.insert(ctx.attrs);
                    }
                    RowOp::Update => update_row(table, ctx.kind, ctx.id, ctx.attrs)?,
                    RowOp::Delete => {
                        table.rows.remove(&ctx.id).ok_or(StoreError::RowNotFound {
                            kind: ctx.kind,
                            id: ctx.id,
                        })?;
                    }
                }
            }
            Ok(())
        })
    }
}
