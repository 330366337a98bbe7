//! Vecmeta snapshot metadata engine.
//!
//! Maintains, per collection, an ordered history of immutable metadata
//! snapshots (schema, partitions, segments, files) and exposes the active
//! snapshot to readers through ref-counted scoped handles, while writers
//! commit new snapshots through serialized compare-and-commit operations.
//!
//! Entry point: [`SnapshotRegistry::start_service`]. Persistence is the
//! [`Store`](vecmeta_store::Store) trait from `vecmeta-store`.

pub mod config;
pub mod error;
pub mod executor;
pub mod operations;
pub mod registry;
pub mod resource;
pub mod snapshot;
pub mod stats;
pub mod telemetry;
pub mod timer;

pub use config::{
    ClusterRole, ConfigError, EngineConfig, LogConfig, LogFormat, PolicyKind, SnapshotConfig,
};
pub use error::{MetaError, MetaResult};
pub use executor::{
    EventExecutor, InactiveResourcesGcEvent, OperationExecutor, OperationTicket, SnapshotEvent,
};
pub use operations::{
    AddFieldElementOperation, BuildOperation, CompactOperation, CreatePartitionOperation,
    DropAllIndexOperation, DropCollectionOperation, DropPartitionOperation, MergeOperation,
    NewSegmentOperation, NewSegmentFileOperation, Operation, OperationContext,
};
pub use registry::SnapshotRegistry;
pub use resource::{
    Collection, CollectionCommit, Field, FieldElement, FieldElementType, FieldType, Lifecycle,
    Mappings, MetaResource, Partition, PartitionCommit, SchemaCommit, Segment, SegmentCommit,
    SegmentFile,
};
pub use snapshot::holder::SnapshotHolder;
pub use snapshot::policy::{build_policy, DurationPolicy, NumPolicy, SnapshotPolicy};
pub use snapshot::{ScopedSnapshot, Snapshot};
pub use telemetry::init_tracing;
pub use timer::TimerManager;

pub use vecmeta_store::{
    build_store, AttrMap, Id, LocalStore, Lsn, MemStore, ResourceKind, State, Store, StoreError, Ts,
};

/// Engine version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
