//! File-backed store.
//!
//! Layout: `<root>/<table>/<id>.json` holds one row as a JSON object;
//! `<root>/<table>/SEQ` holds the kind's id sequence. Rows are written
//! atomically (temp file + rename) and mirrored in memory, so reads and
//! scans never touch the filesystem after warm-load.

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use async_trait::async_trait;
use tempfile::NamedTempFile;
use tracing::debug;

use crate::error::{StoreError, StoreResult};
use crate::schema::{attr, ResourceKind};
use crate::store::{scan, RowContext, RowOp, Store};
use crate::types::{AttrMap, Id, Ts};

const SEQ_FILE: &str = "SEQ";

#[derive(Debug, Default)]
struct Table {
    rows: BTreeMap<Id, AttrMap>,
    next_id: Id,
}

/// Durable store rooted at a meta directory.
#[derive(Debug)]
pub struct LocalStore {
    root: PathBuf,
    tables: Mutex<HashMap<ResourceKind, Table>>,
}

impl LocalStore {
    /// Open (or initialize) a store under `root`, warm-loading every table.
    pub async fn open(root: impl AsRef<Path>) -> StoreResult<Self> {
        let root = root.as_ref().to_path_buf();
        let mut tables = HashMap::new();
        for kind in ResourceKind::ALL {
            let dir = root.join(kind.table_name());
            fs::create_dir_all(&dir)?;
            tables.insert(kind, load_table(&dir)?);
        }
        let total: usize = tables.values().map(|t: &Table| t.rows.len()).sum();
        debug!(root = %root.display(), rows = total, "local store opened");
        Ok(LocalStore {
            root,
            tables: Mutex::new(tables),
        })
    }

    fn table_dir(&self, kind: ResourceKind) -> PathBuf {
        self.root.join(kind.table_name())
    }

    fn row_path(&self, kind: ResourceKind, id: Id) -> PathBuf {
        self.table_dir(kind).join(format!("{id}.json"))
    }

    fn write_row(&self, kind: ResourceKind, id: Id, attrs: &AttrMap) -> StoreResult<()> {
        let ordered: BTreeMap<&String, &String> = attrs.iter().collect();
        let bytes = serde_json::to_vec_pretty(&ordered)?;
        let dir = self.table_dir(kind);
        let mut tmp = NamedTempFile::new_in(&dir)?;
        tmp.write_all(&bytes)?;
        tmp.persist(self.row_path(kind, id)).map_err(|e| e.error)?;
        Ok(())
    }

    fn write_seq(&self, kind: ResourceKind, next_id: Id) -> StoreResult<()> {
        fs::write(self.table_dir(kind).join(SEQ_FILE), next_id.to_string())?;
        Ok(())
    }

    fn with_tables<T>(
        &self,
        f: impl FnOnce(&mut HashMap<ResourceKind, Table>) -> StoreResult<T>,
    ) -> StoreResult<T> {
        let mut tables = self.tables.lock().unwrap();
        f(&mut tables)
    }

    fn create_locked(
        &self,
        tables: &mut HashMap<ResourceKind, Table>,
        kind: ResourceKind,
        mut attrs: AttrMap,
    ) -> StoreResult<Id> {
        let table = tables.entry(kind).or_default();
        let id = table.next_id + 1;
        attrs.insert(attr::ID.to_string(), id.to_string());
        self.write_row(kind, id, &attrs)?;
        self.write_seq(kind, id)?;
        table.next_id = id;
        table.rows.insert(id, attrs);
        Ok(id)
    }

    fn update_locked(
        &self,
        tables: &mut HashMap<ResourceKind, Table>,
        kind: ResourceKind,
        id: Id,
        attrs: AttrMap,
    ) -> StoreResult<()> {
        let table = tables.entry(kind).or_default();
        let Some(row) = table.rows.get(&id) else {
            return Err(StoreError::RowNotFound { kind, id });
        };
        let mut merged = row.clone();
        for (k, v) in attrs {
            if k == attr::ID {
                continue;
            }
            merged.insert(k, v);
        }
        self.write_row(kind, id, &merged)?;
        table.rows.insert(id, merged);
        Ok(())
    }

    fn remove_locked(
        &self,
        tables: &mut HashMap<ResourceKind, Table>,
        kind: ResourceKind,
        id: Id,
    ) -> StoreResult<()> {
        let table = tables.entry(kind).or_default();
        if table.rows.remove(&id).is_none() {
            return Err(StoreError::RowNotFound { kind, id });
        }
        fs::remove_file(self.row_path(kind, id))?;
        Ok(())
    }
}

fn load_table(dir: &Path) -> StoreResult<Table> {
    let mut table = Table::default();
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.extension().map(|e| e != "json").unwrap_or(true) {
            continue;
        }
        let Some(id) = path
            .file_stem()
            .and_then(|s| s.to_str())
            .and_then(|s| s.parse::<Id>().ok())
        else {
            continue;
        };
        let attrs: AttrMap = serde_json::from_slice(&fs::read(&path)?)?;
        table.next_id = table.next_id.max(id);
        table.rows.insert(id, attrs);
    }
    if let Ok(seq) = fs::read_to_string(dir.join(SEQ_FILE)) {
        if let Ok(next) = seq.trim().parse::<Id>() {
            table.next_id = table.next_id.max(next);
        }
    }
    Ok(table)
}

#[async_trait]
impl Store for LocalStore {
    async fn create(&self, kind: ResourceKind, attrs: AttrMap) -> StoreResult<Id> {
        self.with_tables(|tables| self.create_locked(tables, kind, attrs))
    }

    async fn update(&self, kind: ResourceKind, id: Id, attrs: AttrMap) -> StoreResult<()> {
        self.with_tables(|tables| self.update_locked(tables, kind, id, attrs))
    }

    async fn remove(&self, kind: ResourceKind, id: Id) -> StoreResult<()> {
        self.with_tables(|tables| self.remove_locked(tables, kind, id))
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
                match ctx.op {
                    RowOp::Add => {
                        self.create_locked(tables, ctx.kind, ctx.attrs)?;
                    }
                    RowOp::Update => self.update_locked(tables, ctx.kind, ctx.id, ctx.attrs)?,
                    RowOp::Delete => self.remove_locked(tables, ctx.kind, ctx.id)?,
                }
            }
            Ok(())
        })
    }
}
