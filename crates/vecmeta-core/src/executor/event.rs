//! Event executor: a single global queue for background maintenance work.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use vecmeta_store::{Store, StoreError};

use crate::error::{MetaError, MetaResult};

const QUEUE_DEPTH: usize = 64;

/// A background maintenance event.
#[async_trait]
pub trait SnapshotEvent: Send + Sync + 'static {
    fn name(&self) -> &'static str;

    async fn process(&self, store: &dyn Store) -> MetaResult<()>;
}

struct Envelope {
    event: Box<dyn SnapshotEvent>,
    done: Option<oneshot::Sender<MetaResult<()>>>,
}

/// Process-wide event executor with one worker.
pub struct EventExecutor {
    tx: Mutex<Option<mpsc::Sender<Envelope>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
    stopped: AtomicBool,
}

impl EventExecutor {
    pub fn start(store: Arc<dyn Store>) -> Arc<Self> {
        let (tx, rx) = mpsc::channel(QUEUE_DEPTH);
        let worker = tokio::spawn(event_worker(rx, store));
        Arc::new(EventExecutor {
            tx: Mutex::new(Some(tx)),
            worker: Mutex::new(Some(worker)),
            stopped: AtomicBool::new(false),
        })
    }

    fn sender(&self) -> MetaResult<mpsc::Sender<Envelope>> {
        if self.stopped.load(Ordering::Acquire) {
            return Err(MetaError::ExecutorStopped);
        }
        self.tx
            .lock()
            .unwrap()
            .clone()
            .ok_or(MetaError::ExecutorStopped)
    }

    /// Fire and forget.
    pub async fn submit(&self, event: Box<dyn SnapshotEvent>) -> MetaResult<()> {
        let tx = self.sender()?;
        tx.send(Envelope { event, done: None })
            .await
            .map_err(|_| MetaError::ExecutorStopped)
    }

    /// Enqueue and await the event's own result.
    pub async fn submit_and_wait(&self, event: Box<dyn SnapshotEvent>) -> MetaResult<()> {
        let tx = self.sender()?;
        let (done, rx) = oneshot::channel();
        tx.send(Envelope {
            event,
            done: Some(done),
        })
        .await
        .map_err(|_| MetaError::ExecutorStopped)?;
        rx.await.unwrap_or(Err(MetaError::ExecutorStopped))
    }

    /// Close intake, drain the queue, join the worker.
    pub async fn stop(&self) {
        self.stopped.store(true, Ordering::Release);
        self.tx.lock().unwrap().take();
        let worker = self.worker.lock().unwrap().take();
        if let Some(worker) = worker {
            let _ = worker.await;
        }
    }
}

async fn event_worker(mut rx: mpsc::Receiver<Envelope>, store: Arc<dyn Store>) {
    while let Some(Envelope { event, done }) = rx.recv().await {
        let result = event.process(store.as_ref()).await;
        if let Err(e) = &result {
            error!(event = event.name(), error = %e, "background event failed");
        }
        if let Some(done) = done {
            let _ = done.send(result);
        }
    }
}

/// Physically removes every non-ACTIVE resource row. Run (and awaited)
/// during registry init; safe to re-run any time, orphans from failed
/// operations are its normal diet.
pub struct InactiveResourcesGcEvent;

#[async_trait]
impl SnapshotEvent for InactiveResourcesGcEvent {
    fn name(&self) -> &'static str {
        "inactive_resources_gc"
    }

    async fn process(&self, store: &dyn Store) -> MetaResult<()> {
        let grouped = store.get_inactive_resources().await?;
        let mut removed = 0usize;
        for (kind, ids) in grouped {
            for id in ids {
                match store.remove(kind, id).await {
                    Ok(()) => removed += 1,
                    // Raced with another remover; already gone is fine.
                    Err(StoreError::RowNotFound { .. }) => {}
                    Err(e) => {
                        warn!(kind = %kind, id, error = %e, "failed to remove inactive resource");
                    }
                }
            }
        }
        if removed > 0 {
            info!(removed, "inactive resources reclaimed");
        }
        Ok(())
    }
}
