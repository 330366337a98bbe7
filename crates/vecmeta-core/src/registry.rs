//! Process-wide snapshot registry: the name→id→holder index, service
//! lifecycle, and the cluster-mode reader/writer timer loops.
//!
//! Lock discipline: `inner` (active maps) is a reader/writer lock held only
//! for map access, never across a Store call; the inactive-holders map has
//! its own mutex and the two are only held in sequence (active released
//! first) in the drop-collection handoff.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::{Duration, Instant};

use tracing::{debug, error, info, warn};

use vecmeta_store::{build_store, Id, Lsn, Store, Ts};

use crate::config::{ClusterRole, EngineConfig};
use crate::error::{MetaError, MetaResult};
use crate::executor::{
    EventExecutor, InactiveResourcesGcEvent, OperationExecutor, OperationTicket,
};
use crate::operations::{
    DropCollectionOperation, DropPartitionOperation, Operation, OperationContext,
};
use crate::snapshot::holder::SnapshotHolder;
use crate::snapshot::policy::build_policy;
use crate::snapshot::{GcHandler, ScopedSnapshot, Snapshot};
use crate::stats::TimeAccumulator;
use crate::timer::TimerManager;

const DB_DIR: &str = "meta";
const STATS_WINDOW: u64 = 100;

pub(crate) const DEFAULT_READER_TIMER_INTERVAL_US: u64 = 120 * 1000;
pub(crate) const DEFAULT_WRITER_TIMER_INTERVAL_US: u64 = 2000 * 1000;

#[derive(Default)]
struct RegistryInner {
    holders: BTreeMap<Id, Arc<SnapshotHolder>>,
    name_id_map: BTreeMap<String, BTreeSet<Id>>,
    alive_cids: BTreeSet<Id>,
}

/// The singleton surface of the snapshot engine.
pub struct SnapshotRegistry {
    config: EngineConfig,
    store: Arc<dyn Store>,
    op_executor: Arc<OperationExecutor>,
    event_executor: Arc<EventExecutor>,
    inner: RwLock<RegistryInner>,
    inactive: Mutex<BTreeMap<Id, Arc<SnapshotHolder>>>,
    latest_updated: AtomicI64,
    /// Commit ids that loaded NotActive in the last reader cycle. Keeps the
    /// error log at once per ccid.
    invalid_ssid: Mutex<BTreeSet<Id>>,
    reader_stats: Mutex<TimeAccumulator>,
}

impl SnapshotRegistry {
    /// Create the meta path and Store per config, start both executors, run
    /// the startup GC, and warm-load a holder per collection. A meta path
    /// that cannot be created is fatal: SIGUSR1 asks the host to shut down.
    pub async fn start_service(config: EngineConfig) -> MetaResult<Arc<Self>> {
        let meta_path = Path::new(&config.storage.path).join(DB_DIR);
        if let Err(e) = std::fs::create_dir_all(&meta_path) {
            error!(path = %meta_path.display(), error = %e, "cannot create meta path");
            let _ = signal_hook::low_level::raise(signal_hook::consts::SIGUSR1);
            return Err(MetaError::Store(e.into()));
        }
        let store = build_store(&config.general.meta_uri, &meta_path).await?;
        Self::with_store(config, store).await
    }

    /// Like [`start_service`](Self::start_service) but over a caller-built
    /// Store.
    pub async fn with_store(config: EngineConfig, store: Arc<dyn Store>) -> MetaResult<Arc<Self>> {
        let op_executor = OperationExecutor::new(Arc::clone(&store));
        let event_executor = EventExecutor::start(Arc::clone(&store));
        let registry = Arc::new(SnapshotRegistry {
            config,
            store,
            op_executor,
            event_executor,
            inner: RwLock::new(RegistryInner::default()),
            inactive: Mutex::new(BTreeMap::new()),
            latest_updated: AtomicI64::new(0),
            invalid_ssid: Mutex::new(BTreeSet::new()),
            reader_stats: Mutex::new(TimeAccumulator::new(STATS_WINDOW)),
        });
        registry.op_executor.bind(&registry);
        registry.init().await?;
        Ok(registry)
    }

    async fn init(self: &Arc<Self>) -> MetaResult<()> {
        self.event_executor
            .submit_and_wait(Box::new(InactiveResourcesGcEvent))
            .await?;
        for collection_id in self.store.get_collection_ids(false).await? {
            self.load_holder(collection_id).await?;
        }
        Ok(())
    }

    /// Drop all in-memory state and stop both executors.
    pub async fn stop_service(&self) {
        self.reset();
        self.event_executor.stop().await;
        self.op_executor.stop().await;
    }

    /// Clear every map. In-flight scoped handles keep their snapshots alive.
    pub fn reset(&self) {
        {
            let mut inner = self.inner.write().unwrap();
            inner.holders.clear();
            inner.name_id_map.clear();
            inner.alive_cids.clear();
        }
        self.inactive.lock().unwrap().clear();
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    pub fn latest_updated(&self) -> Ts {
        self.latest_updated.load(Ordering::Acquire)
    }

    fn gc_handler() -> GcHandler {
        Arc::new(|snapshot: &Snapshot| {
            debug!(
                collection_id = snapshot.collection_id(),
                commit_id = snapshot.id(),
                "snapshot handed to GC"
            );
        })
    }

    // -----------------------------------------------------------------------
    // Holder access
    // -----------------------------------------------------------------------

    pub fn get_holder(&self, collection_id: Id) -> MetaResult<Arc<SnapshotHolder>> {
        let inner = self.inner.read().unwrap();
        inner
            .holders
            .get(&collection_id)
            .cloned()
            .ok_or_else(|| MetaError::NotFound(format!("collection {collection_id}")))
    }

    /// Resolve a name to its newest collection id, then to the holder. One
    /// lock acquisition keeps `name_id_map` and `holders` consistent.
    pub fn get_holder_by_name(&self, name: &str) -> MetaResult<Arc<SnapshotHolder>> {
        let inner = self.inner.read().unwrap();
        let holder = inner
            .name_id_map
            .get(name)
            .and_then(|ids| ids.iter().next_back())
            .and_then(|id| inner.holders.get(id))
            .cloned();
        holder.ok_or_else(|| MetaError::NotFound(format!("collection \"{name}\"")))
    }

    /// Ensure a holder exists for the collection, warm-loading it from the
    /// Store if needed.
    pub async fn load_holder(self: &Arc<Self>, collection_id: Id) -> MetaResult<Arc<SnapshotHolder>> {
        if let Ok(holder) = self.get_holder(collection_id) {
            return Ok(holder);
        }

        let commit_ids = self.store.get_snapshot_ids(collection_id, false).await?;
        if commit_ids.is_empty() {
            return Err(MetaError::NotFound(format!(
                "collection commit of collection {collection_id}"
            )));
        }
        let holder = Arc::new(SnapshotHolder::new(
            collection_id,
            build_policy(&self.config.snapshot),
            Some(Self::gc_handler()),
        ));
        for commit_id in commit_ids {
            holder.add(self.store.as_ref(), commit_id).await?;
        }
        let name = holder.name().ok_or_else(|| {
            MetaError::NotFound(format!("active snapshot of collection {collection_id}"))
        })?;

        let mut inner = self.inner.write().unwrap();
        if let Some(raced) = inner.holders.get(&collection_id) {
            return Ok(Arc::clone(raced));
        }
        inner.holders.insert(collection_id, Arc::clone(&holder));
        inner.name_id_map.entry(name).or_default().insert(collection_id);
        inner.alive_cids.insert(collection_id);
        Ok(holder)
    }

    // -----------------------------------------------------------------------
    // Snapshot access
    // -----------------------------------------------------------------------

    /// Snapshot from the in-memory cache. `id == 0` means the active one.
    pub fn get_snapshot(&self, collection_id: Id, id: Id, scoped: bool) -> MetaResult<ScopedSnapshot> {
        self.get_holder(collection_id)?.get(id, scoped)
    }

    pub fn get_snapshot_by_name(&self, name: &str, id: Id, scoped: bool) -> MetaResult<ScopedSnapshot> {
        self.get_holder_by_name(name)?.get(id, scoped)
    }

    /// Snapshot with a Store fallback for holders or commits not yet cached.
    pub async fn load_snapshot(
        self: &Arc<Self>,
        collection_id: Id,
        id: Id,
        scoped: bool,
    ) -> MetaResult<ScopedSnapshot> {
        let holder = self.load_holder(collection_id).await?;
        holder.load(self.store.as_ref(), id, scoped).await
    }

    pub(crate) fn active_commit_id(&self, collection_id: Id) -> MetaResult<Id> {
        Ok(self.get_holder(collection_id)?.active_id())
    }

    /// Register a freshly committed snapshot with its holder and hand back a
    /// pinned handle. Called by the operation executor.
    pub(crate) async fn publish(
        self: &Arc<Self>,
        collection_id: Id,
        commit_id: Id,
    ) -> MetaResult<ScopedSnapshot> {
        let holder = self.load_holder(collection_id).await?;
        holder.add(self.store.as_ref(), commit_id).await?;
        holder.get(commit_id, true)
    }

    pub fn num_of_snapshot(&self, name: &str) -> MetaResult<usize> {
        Ok(self.get_holder_by_name(name)?.num_of_snapshot())
    }

    pub fn get_collection_ids(&self) -> Vec<Id> {
        self.inner.read().unwrap().holders.keys().copied().collect()
    }

    pub fn get_collection_names(&self) -> Vec<String> {
        self.inner.read().unwrap().name_id_map.keys().cloned().collect()
    }

    // -----------------------------------------------------------------------
    // Mutations
    // -----------------------------------------------------------------------

    /// Submit an operation on its collection's serialized lane.
    pub async fn submit(&self, op: Box<dyn Operation>) -> MetaResult<OperationTicket> {
        self.op_executor.submit(op).await
    }

    pub async fn drop_collection(self: &Arc<Self>, name: &str, lsn: Lsn) -> MetaResult<()> {
        let base = self.get_snapshot_by_name(name, 0, true)?;
        self.do_drop_collection(base, lsn).await
    }

    pub async fn drop_collection_by_id(self: &Arc<Self>, collection_id: Id, lsn: Lsn) -> MetaResult<()> {
        let base = self.get_snapshot(collection_id, 0, true)?;
        self.do_drop_collection(base, lsn).await
    }

    /// Runs the drop operation, then unconditionally quiesces the holder:
    /// out of the active maps, into the inactive map for the writer timer to
    /// drain. Cleanup happens even when the operation failed.
    async fn do_drop_collection(self: &Arc<Self>, base: ScopedSnapshot, lsn: Lsn) -> MetaResult<()> {
        let collection_id = base.collection_id();
        let name = base.name().to_string();
        let mut context = OperationContext::with_lsn(lsn);
        context.collection = Some(base.collection().clone());
        let ticket = self
            .submit(Box::new(DropCollectionOperation::new(context, base)))
            .await?;
        let status = ticket.status().await;

        let mut moved = Vec::new();
        {
            let mut inner = self.inner.write().unwrap();
            inner.alive_cids.remove(&collection_id);
            if let Some(ids) = inner.name_id_map.get_mut(&name) {
                ids.remove(&collection_id);
                if ids.is_empty() {
                    inner.name_id_map.remove(&name);
                }
            }
            if let Some(holder) = inner.holders.remove(&collection_id) {
                moved.push(holder);
            }
        }
        {
            let mut inactive = self.inactive.lock().unwrap();
            for holder in moved {
                holder.detach();
                inactive.insert(holder.collection_id(), holder);
            }
        }
        info!(collection = %name, collection_id, "collection dropped");
        status
    }

    pub async fn drop_partition(
        self: &Arc<Self>,
        collection_id: Id,
        partition_id: Id,
        lsn: Lsn,
    ) -> MetaResult<()> {
        let base = self.get_snapshot(collection_id, 0, true)?;
        let partition = base
            .partition(partition_id)
            .ok_or_else(|| MetaError::NotFound(format!("partition {partition_id}")))?
            .clone();
        let mut context = OperationContext::with_lsn(lsn);
        context.partition = Some(partition);
        let ticket = self
            .submit(Box::new(DropPartitionOperation::new(context, base)))
            .await?;
        ticket.status().await
    }

    // -----------------------------------------------------------------------
    // Timer loops
    // -----------------------------------------------------------------------

    /// Register the reader or writer timer per the cluster config, honoring
    /// the environment overrides with their clamping floors.
    pub fn register_timers(self: &Arc<Self>, mgr: &mut TimerManager) {
        if self.config.cluster.enable && self.config.cluster.role == ClusterRole::Ro {
            let interval_us = timer_interval_us(
                "READER_TIMER_INTERVAL_US",
                DEFAULT_READER_TIMER_INTERVAL_US,
                0.6,
            );
            info!(interval_us, "reader timer registered");
            let registry = Arc::clone(self);
            mgr.add_timer(Duration::from_micros(interval_us), move || {
                let registry = Arc::clone(&registry);
                async move { registry.on_reader_timer().await }
            });
        } else {
            let interval_us = timer_interval_us(
                "WRITER_TIMER_INTERVAL_US",
                DEFAULT_WRITER_TIMER_INTERVAL_US,
                0.4,
            );
            info!(interval_us, "writer timer registered");
            let registry = Arc::clone(self);
            mgr.add_timer(Duration::from_micros(interval_us), move || {
                let registry = Arc::clone(&registry);
                async move { registry.on_writer_timer().await }
            });
        }
    }

    /// One read-replica refresh cycle: pick up commits newer than
    /// `latest_updated`, track NotActive ids, evict collections gone from
    /// the Store. Errors never stop the loop.
    pub async fn on_reader_timer(self: &Arc<Self>) {
        let started = Instant::now();
        let low_bound = self.latest_updated.load(Ordering::Acquire);
        let (pairs, latest) = match self.store.get_all_active_snapshot_ids(low_bound).await {
            Ok(out) => out,
            Err(e) => {
                error!(error = %e, "reader timer: active snapshot query failed");
                let elapsed = started.elapsed();
                if elapsed > Duration::from_micros(DEFAULT_READER_TIMER_INTERVAL_US) {
                    warn!(elapsed_us = elapsed.as_micros() as u64, "reader cycle too slow");
                }
                return;
            }
        };
        self.latest_updated.fetch_max(latest, Ordering::AcqRel);

        let mut this_invalid = BTreeSet::new();
        let mut newly_invalid = false;
        for (collection_id, commit_id) in pairs {
            match self.load_snapshot(collection_id, commit_id, true).await {
                Ok(_snapshot) => {}
                Err(e) if e.is_not_active() => {
                    let seen = self.invalid_ssid.lock().unwrap().contains(&commit_id);
                    this_invalid.insert(commit_id);
                    if !seen {
                        error!(collection_id, commit_id, "snapshot not active");
                        newly_invalid = true;
                    }
                }
                // Transient load failure: skip the entry, keep the cycle.
                Err(e) => {
                    warn!(collection_id, commit_id, error = %e, "reader timer: load failed");
                }
            }
        }
        if newly_invalid {
            error!(total = this_invalid.len(), "invalid snapshots found");
        }
        {
            let mut invalid = self.invalid_ssid.lock().unwrap();
            if !invalid.is_empty() && this_invalid.is_empty() {
                info!("all invalid snapshots cleared");
            }
            *invalid = this_invalid;
        }

        let store_ids: BTreeSet<Id> = match self.store.get_collection_ids(false).await {
            Ok(ids) => ids.into_iter().collect(),
            Err(e) => {
                error!(error = %e, "reader timer: collection id query failed");
                return;
            }
        };
        let stale: Vec<Id> = {
            let inner = self.inner.read().unwrap();
            inner.alive_cids.difference(&store_ids).copied().collect()
        };
        for collection_id in stale {
            self.evict_collection(collection_id);
        }

        let elapsed_us = started.elapsed().as_micros() as i64;
        if let Some(summary) = self.reader_stats.lock().unwrap().record(elapsed_us) {
            info!(
                samples = summary.samples,
                mean_us = summary.mean_us,
                min_us = summary.min_us,
                max_us = summary.max_us,
                "reader timer statistics"
            );
        }
    }

    fn evict_collection(&self, collection_id: Id) {
        let mut inner = self.inner.write().unwrap();
        inner.alive_cids.remove(&collection_id);
        let name = inner.holders.get(&collection_id).and_then(|h| h.name());
        if let Some(name) = name {
            if let Some(ids) = inner.name_id_map.get_mut(&name) {
                ids.remove(&collection_id);
                if ids.is_empty() {
                    inner.name_id_map.remove(&name);
                }
            }
        }
        if inner.holders.remove(&collection_id).is_some() {
            info!(collection_id, "stale collection evicted");
        }
    }

    /// One writer cycle. Single-node mode clears the inactive map outright
    /// (pinned snapshots survive through their own handles); cluster mode
    /// ejects incrementally and forgets drained holders.
    pub async fn on_writer_timer(self: &Arc<Self>) {
        if !self.config.cluster.enable {
            self.inactive.lock().unwrap().clear();
            return;
        }
        let mut inactive = self.inactive.lock().unwrap();
        let drained: Vec<Id> = inactive
            .iter()
            .filter(|(_, holder)| {
                matches!(holder.apply_eject(), Err(ref e) if e.is_empty_holder())
            })
            .map(|(id, _)| *id)
            .collect();
        for collection_id in drained {
            inactive.remove(&collection_id);
            info!(collection_id, "inactive holder drained");
        }
    }

    /// Holders parked after a drop, still draining.
    pub fn num_inactive_holders(&self) -> usize {
        self.inactive.lock().unwrap().len()
    }
}

/// Env-overridable timer interval; values below `floor_ratio` of the default
/// are clamped up with a warning.
fn timer_interval_us(env_key: &str, default_us: u64, floor_ratio: f64) -> u64 {
    let mut interval_us = default_us;
    if let Ok(raw) = std::env::var(env_key) {
        info!(key = env_key, value = %raw, "timer interval override");
        match raw.trim().parse() {
            Ok(parsed) => interval_us = parsed,
            Err(_) => {
                warn!(key = env_key, value = %raw, "unparsable interval, using default");
            }
        }
    }
    let floor_us = (default_us as f64 * floor_ratio) as u64;
    if interval_us < floor_us {
        warn!(key = env_key, interval_us, floor_us, "interval too small, clamping up");
        interval_us = floor_us;
    }
    interval_us
}
