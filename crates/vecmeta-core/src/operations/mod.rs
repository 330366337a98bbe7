//! Transactional mutation operations.
//!
//! An operation executes against a pinned base snapshot: it creates its new
//! resources PENDING through the Store (referenced-first, commit root last),
//! re-checks that the base is still the holder's active snapshot, then
//! commits an ordered activation/retirement batch. The executor publishes
//! the resulting CollectionCommit to the collection's holder.
//!
//! There is no rollback: resources persisted by a failed operation stay
//! PENDING (or DEACTIVE) and are reclaimed by the inactive-resources GC.

pub mod add_field_element;
pub mod build;
pub mod compact;
pub mod create_partition;
pub mod drop_all_index;
pub mod drop_collection;
pub mod drop_partition;
pub mod merge;
pub mod new_segment;
pub mod new_segment_file;

pub use add_field_element::AddFieldElementOperation;
pub use build::BuildOperation;
pub use compact::CompactOperation;
pub use create_partition::CreatePartitionOperation;
pub use drop_all_index::DropAllIndexOperation;
pub use drop_collection::DropCollectionOperation;
pub use drop_partition::DropPartitionOperation;
pub use merge::MergeOperation;
pub use new_segment::NewSegmentOperation;
pub use new_segment_file::NewSegmentFileOperation;

use async_trait::async_trait;

use vecmeta_store::schema::attr;
use vecmeta_store::{now_us, AttrMap, Id, Lsn, ResourceKind, RowContext, State, Store};

use crate::error::{MetaError, MetaResult};
use crate::registry::SnapshotRegistry;
use crate::resource::codec::insert_attr_map;
use crate::resource::context::ResourceContext;
use crate::resource::{Collection, Lifecycle, MetaResource, Partition, Segment};

/// Inputs shared by the concrete operations: the WAL position and the base
/// resources the operation targets.
#[derive(Debug, Clone, Default)]
pub struct OperationContext {
    pub lsn: Lsn,
    pub collection: Option<Collection>,
    pub partition: Option<Partition>,
    pub segment: Option<Segment>,
    /// Segments superseded by a compact/merge.
    pub stale_segments: Vec<Id>,
}

impl OperationContext {
    pub fn with_lsn(lsn: Lsn) -> Self {
        OperationContext {
            lsn,
            ..Default::default()
        }
    }
}

/// A serialized, compare-and-commit mutation against one collection.
#[async_trait]
pub trait Operation: Send + 'static {
    fn name(&self) -> &'static str;

    /// Lane key for per-collection serialization. For operations that create
    /// the collection this is 0 until `execute` assigns the real id.
    fn collection_id(&self) -> Id;

    /// Persist the operation's effects. Returns the id of the new
    /// CollectionCommit to publish, or `None` for operations that retire the
    /// collection instead of producing a snapshot.
    async fn execute(
        &mut self,
        store: &dyn Store,
        registry: &SnapshotRegistry,
    ) -> MetaResult<Option<Id>>;
}

/// Fails with *StaleSnapshot* when the holder has moved past the base. A
/// collection without a warm holder is never stale (operations serialize per
/// collection; this is the safety net, not the concurrency mechanism).
pub(crate) fn ensure_not_stale(
    registry: &SnapshotRegistry,
    collection_id: Id,
    base_id: Id,
) -> MetaResult<()> {
    match registry.active_commit_id(collection_id) {
        Ok(active) if active != base_id => Err(MetaError::Stale {
            base: base_id,
            active,
        }),
        _ => Ok(()),
    }
}

fn state_row(kind: ResourceKind, id: Id, state: State, now: i64) -> RowContext {
    let mut attrs = AttrMap::new();
    attrs.insert(attr::STATE.to_string(), state.as_str().to_string());
    attrs.insert(attr::UPDATED_ON.to_string(), now.to_string());
    RowContext::update(kind, id, attrs)
}

/// Staged persistence for one operation: resources created PENDING up front,
/// then a single ordered batch that activates them, applies queued updates,
/// and retires the superseded rows.
pub(crate) struct CommitPipeline<'a> {
    store: &'a dyn Store,
    created: Vec<(ResourceKind, Id)>,
    staged: Vec<RowContext>,
    retired: Vec<(ResourceKind, Id)>,
}

impl<'a> CommitPipeline<'a> {
    pub(crate) fn new(store: &'a dyn Store) -> Self {
        CommitPipeline {
            store,
            created: Vec::new(),
            staged: Vec::new(),
            retired: Vec::new(),
        }
    }

    /// Persist a new resource PENDING, assigning its id.
    pub(crate) async fn create<R: MetaResource>(&mut self, resource: &mut R) -> MetaResult<Id> {
        let id = self.store.create(R::KIND, insert_attr_map(resource)?).await?;
        resource.set_id(id);
        self.created.push((R::KIND, id));
        Ok(id)
    }

    /// Apply an UPDATE immediately (pre-commit; the row is still PENDING or
    /// the change is invisible until the commit root flips).
    pub(crate) async fn update<R: MetaResource>(
        &mut self,
        resource: &R,
        attrs: impl IntoIterator<Item = &'static str>,
    ) -> MetaResult<()> {
        let row = ResourceContext::update(resource.clone(), attrs).to_row()?;
        self.store.update(row.kind, row.id, row.attrs).await?;
        Ok(())
    }

    /// Queue an UPDATE for the commit batch. Stamps `updated_on`.
    pub(crate) fn stage<R: MetaResource>(
        &mut self,
        resource: &R,
        attrs: impl IntoIterator<Item = &'static str>,
    ) -> MetaResult<()> {
        let mut resource = resource.clone();
        resource.touch();
        let mut ctx = ResourceContext::update(resource, attrs);
        ctx.touch_attr(attr::UPDATED_ON);
        self.staged.push(ctx.to_row()?);
        Ok(())
    }

    /// Mark a superseded resource for retirement at commit.
    pub(crate) fn retire<R: MetaResource>(&mut self, resource: &R) {
        self.retired.push((R::KIND, resource.id()));
    }

    /// Activate everything created, apply staged updates, retire the
    /// superseded rows. Atomic per row only.
    pub(crate) async fn commit(self) -> MetaResult<()> {
        let now = now_us();
        let mut batch = Vec::with_capacity(self.created.len() + self.staged.len() + self.retired.len());
        for (kind, id) in self.created {
            batch.push(state_row(kind, id, State::Active, now));
        }
        batch.extend(self.staged);
        for (kind, id) in self.retired {
            batch.push(state_row(kind, id, State::Deactive, now));
        }
        self.store.apply_operation(batch).await?;
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! Store seeding helpers shared by unit tests.

    use super::*;
    use crate::resource::{CollectionCommit, Mappings, SchemaCommit};

    /// Persist a fresh ACTIVE collection commit (creating the collection and
    /// a schema commit as needed), superseding any previous commit rows.
    /// Returns the new commit id.
    pub(crate) async fn commit_collection_version(store: &dyn Store, name: &str) -> Id {
        let collection_id = match store.find_collection_by_name(name).await.unwrap() {
            Some((id, _)) => id,
            None => {
                let mut collection = Collection::new(name, serde_json::Value::Null);
                collection.activate();
                store
                    .create(Collection::KIND, insert_attr_map(&collection).unwrap())
                    .await
                    .unwrap()
            }
        };

        for old in store.get_snapshot_ids(collection_id, false).await.unwrap() {
            let row = state_row(ResourceKind::CollectionCommit, old, State::Deactive, now_us());
            store.update(row.kind, row.id, row.attrs).await.unwrap();
        }

        let mut schema_commit = SchemaCommit::new(collection_id, Mappings::default());
        schema_commit.activate();
        let schema_id = store
            .create(SchemaCommit::KIND, insert_attr_map(&schema_commit).unwrap())
            .await
            .unwrap();

        let mut commit = CollectionCommit::new(collection_id, schema_id, Mappings::default(), 0);
        commit.activate();
        commit.touch();
        store
            .create(CollectionCommit::KIND, insert_attr_map(&commit).unwrap())
            .await
            .unwrap()
    }
}
