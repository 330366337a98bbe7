//! Operation executor: one serialized task queue per collection id.
//!
//! Operations on the same collection run FIFO in submission order; distinct
//! collections execute in parallel on the runtime. Lanes are created lazily
//! on first submission, so idle collections cost nothing. `submit` after
//! `stop` fails with *ExecutorStopped*; `stop` drains queued work before
//! joining the workers.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, Weak};

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::debug;

use vecmeta_store::{Id, Store};

use crate::error::{MetaError, MetaResult};
use crate::operations::Operation;
use crate::registry::SnapshotRegistry;
use crate::snapshot::ScopedSnapshot;

const LANE_DEPTH: usize = 64;

type OpOutcome = MetaResult<Option<ScopedSnapshot>>;

struct Envelope {
    op: Box<dyn Operation>,
    done: oneshot::Sender<OpOutcome>,
}

/// Awaitable handle to a submitted operation.
#[derive(Debug)]
pub struct OperationTicket {
    rx: oneshot::Receiver<OpOutcome>,
}

impl OperationTicket {
    fn new(rx: oneshot::Receiver<OpOutcome>) -> Self {
        OperationTicket { rx }
    }

    /// Block until the operation terminates; yields the published snapshot,
    /// or `None` for operations that do not publish one.
    pub async fn wait(self) -> OpOutcome {
        self.rx
            .await
            .unwrap_or(Err(MetaError::ExecutorStopped))
    }

    /// Terminal status only.
    pub async fn status(self) -> MetaResult<()> {
        self.wait().await.map(|_| ())
    }

    /// Scoped handle to the snapshot the operation published.
    pub async fn snapshot(self) -> MetaResult<ScopedSnapshot> {
        self.wait()
            .await?
            .ok_or_else(|| MetaError::NotFound("published snapshot".to_string()))
    }
}

/// Process-wide operation executor.
pub struct OperationExecutor {
    store: Arc<dyn Store>,
    registry: Mutex<Weak<SnapshotRegistry>>,
    lanes: Mutex<HashMap<Id, mpsc::Sender<Envelope>>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    stopped: AtomicBool,
}

impl OperationExecutor {
    pub fn new(store: Arc<dyn Store>) -> Arc<Self> {
        Arc::new(OperationExecutor {
            store,
            registry: Mutex::new(Weak::new()),
            lanes: Mutex::new(HashMap::new()),
            workers: Mutex::new(Vec::new()),
            stopped: AtomicBool::new(false),
        })
    }

    /// Wire the registry the workers publish through. Called once at service
    /// start, before any submission.
    pub(crate) fn bind(&self, registry: &Arc<SnapshotRegistry>) {
        *self.registry.lock().unwrap() = Arc::downgrade(registry);
    }

    /// Enqueue an operation on its collection's lane.
    pub async fn submit(&self, op: Box<dyn Operation>) -> MetaResult<OperationTicket> {
        if self.stopped.load(Ordering::Acquire) {
            return Err(MetaError::ExecutorStopped);
        }
        let lane = self.lane(op.collection_id());
        let (done, rx) = oneshot::channel();
        if lane.send(Envelope { op, done }).await.is_err() {
            return Err(MetaError::ExecutorStopped);
        }
        Ok(OperationTicket::new(rx))
    }

    fn lane(&self, collection_id: Id) -> mpsc::Sender<Envelope> {
        let mut lanes = self.lanes.lock().unwrap();
        lanes
            .entry(collection_id)
            .or_insert_with(|| {
                let (tx, rx) = mpsc::channel(LANE_DEPTH);
                let store = Arc::clone(&self.store);
                let registry = self.registry.lock().unwrap().clone();
                let worker = tokio::spawn(lane_worker(collection_id, rx, store, registry));
                self.workers.lock().unwrap().push(worker);
                tx
            })
            .clone()
    }

    /// Close intake, drain queued operations, join the workers.
    pub async fn stop(&self) {
        self.stopped.store(true, Ordering::Release);
        self.lanes.lock().unwrap().clear();
        let workers: Vec<_> = std::mem::take(&mut *self.workers.lock().unwrap());
        futures::future::join_all(workers).await;
    }
}

async fn lane_worker(
    collection_id: Id,
    mut rx: mpsc::Receiver<Envelope>,
    store: Arc<dyn Store>,
    registry: Weak<SnapshotRegistry>,
) {
    while let Some(Envelope { mut op, done }) = rx.recv().await {
        let outcome = match registry.upgrade() {
            None => Err(MetaError::ExecutorStopped),
            Some(registry) => run_operation(op.as_mut(), store.as_ref(), &registry).await,
        };
        // Release the operation (and its pinned base snapshot) before the
        // caller observes completion.
        drop(op);
        if done.send(outcome).is_err() {
            debug!(collection_id, "operation outcome dropped by caller");
        }
    }
}

async fn run_operation(
    op: &mut dyn Operation,
    store: &dyn Store,
    registry: &Arc<SnapshotRegistry>,
) -> OpOutcome {
    debug!(op = op.name(), collection_id = op.collection_id(), "executing");
    match op.execute(store, registry).await? {
        Some(commit_id) => registry
            .publish(op.collection_id(), commit_id)
            .await
            .map(Some),
        None => Ok(None),
    }
}
