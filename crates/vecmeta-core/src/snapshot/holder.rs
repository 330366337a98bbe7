//! Per-collection snapshot cache and lifecycle manager.
//!
//! Holds an ordered `commit_id → snapshot` map plus the active pointer.
//! Pinning is a refcount on the snapshot itself; ejection is policy-driven
//! and always vetoed while the refcount is above zero. The registry supplies
//! a GC callback invoked when a snapshot is finally dropped from the cache.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, Weak};

use tracing::debug;
use vecmeta_store::{Id, Store, StoreError};

use super::policy::{eject_context, SnapshotPolicy};
use super::{GcHandler, ReleaseFn, ScopedSnapshot, Snapshot};
use crate::error::{MetaError, MetaResult};

#[derive(Default)]
struct HolderInner {
    active_id: Id,
    /// Highest commit id ever held. Requests at or below it that miss the
    /// cache are superseded, not unknown.
    max_seen: Id,
    snapshots: BTreeMap<Id, Arc<Snapshot>>,
}

/// Per-collection versioned snapshot cache.
pub struct SnapshotHolder {
    collection_id: Id,
    policy: Box<dyn SnapshotPolicy>,
    gc_handler: Option<GcHandler>,
    /// Set when the collection is dropped: every snapshot becomes ejectable.
    detached: AtomicBool,
    inner: Mutex<HolderInner>,
}

impl SnapshotHolder {
    pub fn new(collection_id: Id, policy: Box<dyn SnapshotPolicy>, gc_handler: Option<GcHandler>) -> Self {
        SnapshotHolder {
            collection_id,
            policy,
            gc_handler,
            detached: AtomicBool::new(false),
            inner: Mutex::new(HolderInner::default()),
        }
    }

    pub fn collection_id(&self) -> Id {
        self.collection_id
    }

    /// Id of the active snapshot, 0 when none.
    pub fn active_id(&self) -> Id {
        self.inner.lock().unwrap().active_id
    }

    pub fn num_of_snapshot(&self) -> usize {
        self.inner.lock().unwrap().snapshots.len()
    }

    /// Collection name per the active snapshot.
    pub fn name(&self) -> Option<String> {
        let inner = self.inner.lock().unwrap();
        inner
            .snapshots
            .get(&inner.active_id)
            .map(|s| s.name().to_string())
    }

    /// Load a snapshot by commit id and insert it. A snapshot with a newer
    /// `updated_on` than the current active becomes active; older ones land
    /// in history. Prunes policy-rejected, unpinned history afterwards.
    pub async fn add(self: &Arc<Self>, store: &dyn Store, commit_id: Id) -> MetaResult<()> {
        {
            let inner = self.inner.lock().unwrap();
            if inner.snapshots.contains_key(&commit_id) {
                return Ok(());
            }
        }

        let snapshot = Snapshot::load(store, commit_id).await?;
        if !snapshot.is_active() {
            return Err(MetaError::NotActive {
                collection_id: self.collection_id,
                commit_id,
            });
        }

        let ejected = {
            let mut inner = self.inner.lock().unwrap();
            let newer = match inner.snapshots.get(&inner.active_id) {
                Some(active) => snapshot.updated_on() >= active.updated_on(),
                None => true,
            };
            inner.max_seen = inner.max_seen.max(commit_id);
            inner.snapshots.insert(commit_id, Arc::new(snapshot));
            if newer {
                inner.active_id = commit_id;
            }
            self.prune_locked(&mut inner)
        };
        self.run_gc(ejected);
        Ok(())
    }

    /// Resolve a snapshot, falling back to the store for commit ids newer
    /// than anything cached. `id == 0` means the active snapshot.
    pub async fn load(
        self: &Arc<Self>,
        store: &dyn Store,
        id: Id,
        scoped: bool,
    ) -> MetaResult<ScopedSnapshot> {
        match self.get(id, scoped) {
            Err(MetaError::NotFound(_)) if id != 0 => {}
            other => return other,
        }

        match self.add(store, id).await {
            Ok(()) => {}
            Err(MetaError::Store(StoreError::RowNotFound { .. })) => {
                return Err(MetaError::NotFound(format!(
                    "snapshot {id} of collection {}",
                    self.collection_id
                )));
            }
            Err(e) => return Err(e),
        }
        self.get(id, scoped)
    }

    /// Cache-only lookup.
    pub fn get(self: &Arc<Self>, id: Id, scoped: bool) -> MetaResult<ScopedSnapshot> {
        let inner = self.inner.lock().unwrap();
        let id = if id == 0 { inner.active_id } else { id };
        match inner.snapshots.get(&id) {
            Some(snapshot) => Ok(self.handle(Arc::clone(snapshot), scoped)),
            None if id != 0 && id <= inner.max_seen => Err(MetaError::NotActive {
                collection_id: self.collection_id,
                commit_id: id,
            }),
            None => Err(MetaError::NotFound(format!(
                "snapshot {id} of collection {}",
                self.collection_id
            ))),
        }
    }

    /// Eject every unpinned snapshot. Used to drain holders whose collection
    /// has been dropped; returns the *EmptyHolder* sentinel once nothing is
    /// left.
    pub fn apply_eject(&self) -> MetaResult<()> {
        let ejected = {
            let mut inner = self.inner.lock().unwrap();
            let removable: Vec<Id> = inner
                .snapshots
                .iter()
                .filter(|(_, s)| s.ref_count() == 0)
                .map(|(id, _)| *id)
                .collect();
            removable
                .iter()
                .filter_map(|id| inner.snapshots.remove(id))
                .collect::<Vec<_>>()
        };
        let emptied = self.inner.lock().unwrap().snapshots.is_empty();
        self.run_gc(ejected);
        if emptied {
            Err(MetaError::EmptyHolder)
        } else {
            Ok(())
        }
    }

    /// Mark the holder as draining: the active snapshot is no longer
    /// protected from ejection.
    pub fn detach(&self) {
        self.detached.store(true, Ordering::Release);
    }

    fn handle(self: &Arc<Self>, snapshot: Arc<Snapshot>, scoped: bool) -> ScopedSnapshot {
        if !scoped {
            return ScopedSnapshot::unpinned(snapshot);
        }
        let weak: Weak<SnapshotHolder> = Arc::downgrade(self);
        let release: ReleaseFn = Arc::new(move |commit_id| {
            if let Some(holder) = weak.upgrade() {
                holder.on_handle_released(commit_id);
            }
        });
        ScopedSnapshot::pinned(snapshot, release)
    }

    /// Called by a scoped handle whose drop brought the refcount to zero.
    fn on_handle_released(&self, commit_id: Id) {
        let ejected = {
            let mut inner = self.inner.lock().unwrap();
            let Some(snapshot) = inner.snapshots.get(&commit_id) else {
                return;
            };
            if snapshot.ref_count() > 0 {
                return;
            }
            let detached = self.detached.load(Ordering::Acquire);
            if !detached {
                if commit_id == inner.active_id {
                    return;
                }
                let newer_than = inner.snapshots.range(commit_id + 1..).count();
                let ctx = eject_context(newer_than, snapshot.updated_on());
                if self.policy.should_keep(&ctx) {
                    return;
                }
            }
            inner.snapshots.remove(&commit_id).into_iter().collect()
        };
        self.run_gc(ejected);
    }

    /// Drop unpinned, policy-rejected history. Caller holds the lock.
    fn prune_locked(&self, inner: &mut HolderInner) -> Vec<Arc<Snapshot>> {
        let active_id = inner.active_id;
        let candidates: Vec<Id> = inner
            .snapshots
            .iter()
            .rev()
            .enumerate()
            .filter(|(newer_than, (id, snapshot))| {
                **id != active_id
                    && snapshot.ref_count() == 0
                    && !self
                        .policy
                        .should_keep(&eject_context(*newer_than, snapshot.updated_on()))
            })
            .map(|(_, (id, _))| *id)
            .collect();
        candidates
            .iter()
            .filter_map(|id| inner.snapshots.remove(id))
            .collect()
    }

    fn run_gc(&self, ejected: Vec<Arc<Snapshot>>) {
        for snapshot in ejected {
            debug!(
                collection_id = self.collection_id,
                commit_id = snapshot.id(),
                "snapshot ejected"
            );
            if let Some(handler) = &self.gc_handler {
                handler(&snapshot);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SnapshotConfig;
    use crate::operations::testing::commit_collection_version;
    use crate::snapshot::policy::build_policy;
    use vecmeta_store::MemStore;

    fn holder(keep_num: usize) -> Arc<SnapshotHolder> {
        let config = SnapshotConfig {
            keep_num,
            ..Default::default()
        };
        Arc::new(SnapshotHolder::new(1, build_policy(&config), None))
    }

    #[tokio::test]
    async fn add_publishes_newest_as_active() {
        let store = MemStore::new();
        let first = commit_collection_version(&store, "c1").await;
        let second = commit_collection_version(&store, "c1").await;

        let holder = holder(1);
        holder.add(&store, first).await.unwrap();
        assert_eq!(holder.active_id(), first);

        holder.add(&store, second).await.unwrap();
        assert_eq!(holder.active_id(), second);
        assert_eq!(holder.num_of_snapshot(), 1, "default policy keeps active only");
    }

    #[tokio::test]
    async fn keep_n_policy_retains_history() {
        let store = MemStore::new();
        let mut ids = Vec::new();
        for _ in 0..4 {
            ids.push(commit_collection_version(&store, "c1").await);
        }

        let holder = holder(3);
        for id in &ids {
            holder.add(&store, *id).await.unwrap();
        }
        assert_eq!(holder.num_of_snapshot(), 3);
        assert!(holder.get(ids[0], true).is_err(), "oldest was ejected");
        assert!(holder.get(ids[1], true).is_ok());
    }

    #[tokio::test]
    async fn pinned_snapshot_survives_supersession() {
        let store = MemStore::new();
        let first = commit_collection_version(&store, "c1").await;
        let second = commit_collection_version(&store, "c1").await;

        let holder = holder(1);
        holder.add(&store, first).await.unwrap();
        let pinned = holder.get(first, true).unwrap();

        holder.add(&store, second).await.unwrap();
        assert_eq!(holder.num_of_snapshot(), 2, "refcount vetoes ejection");
        assert_eq!(pinned.id(), first, "handle still observes its snapshot");

        drop(pinned);
        assert_eq!(holder.num_of_snapshot(), 1, "release triggers the ejection");
        let err = holder.get(first, true).unwrap_err();
        assert!(err.is_not_active(), "superseded id reads as not-active");
    }

    #[tokio::test]
    async fn unknown_newer_id_is_not_found() {
        let store = MemStore::new();
        let first = commit_collection_version(&store, "c1").await;
        let holder = holder(1);
        holder.add(&store, first).await.unwrap();

        let err = holder.get(first + 100, true).unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn apply_eject_drains_and_reports_empty() {
        let store = MemStore::new();
        let first = commit_collection_version(&store, "c1").await;
        let holder = holder(1);
        holder.add(&store, first).await.unwrap();
        holder.detach();

        let pinned = holder.get(first, true).unwrap();
        assert!(holder.apply_eject().is_ok(), "pinned snapshot is vetoed");

        drop(pinned);
        let err = holder.apply_eject().unwrap_err();
        assert!(err.is_empty_holder());
        assert_eq!(holder.num_of_snapshot(), 0);
    }
}
