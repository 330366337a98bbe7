//! Background executors: the per-collection operation lanes and the global
//! event worker.

pub mod event;
pub mod operation;

pub use event::{EventExecutor, InactiveResourcesGcEvent, SnapshotEvent};
pub use operation::{OperationExecutor, OperationTicket};
