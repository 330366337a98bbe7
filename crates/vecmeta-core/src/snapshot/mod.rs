//! Immutable snapshot of a collection's metadata, rooted at a
//! CollectionCommit, plus the ref-counting scoped handle that pins it.
//!
//! A snapshot owns its whole closure by value (commit roots, partitions,
//! segments, files, schema, fields, elements), loaded once from the Store
//! and shared behind an `Arc`. There are no back-pointers, so eviction is a
//! plain map removal; any outstanding handle keeps the snapshot alive on its
//! own.

pub mod holder;
pub mod policy;

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use vecmeta_store::{Id, Lsn, State, Store, Ts};

use crate::error::MetaResult;
use crate::resource::codec::resource_from_attr_map;
use crate::resource::{
    Collection, CollectionCommit, Field, FieldElement, Lifecycle, MetaResource, Partition,
    PartitionCommit, SchemaCommit, Segment, SegmentCommit, SegmentFile,
};

/// Read one resource row and decode it.
pub(crate) async fn load_resource<R: MetaResource>(store: &dyn Store, id: Id) -> MetaResult<R> {
    let row = store.get(R::KIND, id).await?;
    resource_from_attr_map(&row)
}

/// Callback invoked by a holder when it finally drops a snapshot.
pub type GcHandler = Arc<dyn Fn(&Snapshot) + Send + Sync>;

pub(crate) type ReleaseFn = Arc<dyn Fn(Id) + Send + Sync>;

/// Versioned view of a collection's metadata.
#[derive(Debug)]
pub struct Snapshot {
    commit: CollectionCommit,
    collection: Collection,
    schema_commit: SchemaCommit,
    fields: BTreeMap<Id, Field>,
    field_elements: BTreeMap<Id, FieldElement>,
    partitions: BTreeMap<Id, Partition>,
    partition_commits: BTreeMap<Id, PartitionCommit>,
    segments: BTreeMap<Id, Segment>,
    segment_commits: BTreeMap<Id, SegmentCommit>,
    segment_files: BTreeMap<Id, SegmentFile>,
    refs: AtomicI64,
}

impl Snapshot {
    /// Load the commit root and its transitive closure from the store.
    pub async fn load(store: &dyn Store, commit_id: Id) -> MetaResult<Snapshot> {
        let commit: CollectionCommit = load_resource(store, commit_id).await?;
        let collection: Collection = load_resource(store, commit.collection_id).await?;
        let schema_commit: SchemaCommit = load_resource(store, commit.schema_id).await?;

        let mut fields = BTreeMap::new();
        let mut field_elements = BTreeMap::new();
        for field_id in schema_commit.mappings.ids() {
            let field: Field = load_resource(store, *field_id).await?;
            for element_id in field.mappings.ids() {
                let element: FieldElement = load_resource(store, *element_id).await?;
                field_elements.insert(*element_id, element);
            }
            fields.insert(*field_id, field);
        }

        let mut partitions = BTreeMap::new();
        let mut partition_commits = BTreeMap::new();
        let mut segments = BTreeMap::new();
        let mut segment_commits = BTreeMap::new();
        let mut segment_files = BTreeMap::new();
        for pc_id in commit.mappings.ids() {
            let pc: PartitionCommit = load_resource(store, *pc_id).await?;
            let partition: Partition = load_resource(store, pc.partition_id).await?;
            partitions.insert(pc.partition_id, partition);
            for sc_id in pc.mappings.ids() {
                let sc: SegmentCommit = load_resource(store, *sc_id).await?;
                let segment: Segment = load_resource(store, sc.segment_id).await?;
                segments.insert(sc.segment_id, segment);
                for sf_id in sc.mappings.ids() {
                    let file: SegmentFile = load_resource(store, *sf_id).await?;
                    segment_files.insert(*sf_id, file);
                }
                segment_commits.insert(*sc_id, sc);
            }
            partition_commits.insert(*pc_id, pc);
        }

        Ok(Snapshot {
            commit,
            collection,
            schema_commit,
            fields,
            field_elements,
            partitions,
            partition_commits,
            segments,
            segment_commits,
            segment_files,
            refs: AtomicI64::new(0),
        })
    }

    /// The snapshot's id: its CollectionCommit id.
    pub fn id(&self) -> Id {
        self.commit.id
    }

    pub fn collection_id(&self) -> Id {
        self.collection.id
    }

    pub fn name(&self) -> &str {
        &self.collection.name
    }

    pub fn lsn(&self) -> Lsn {
        self.commit.lsn
    }

    pub fn updated_on(&self) -> Ts {
        self.commit.updated_on
    }

    /// Whether both the commit root and its collection are ACTIVE.
    pub fn is_active(&self) -> bool {
        self.commit.state() == State::Active && self.collection.state() == State::Active
    }

    pub fn commit(&self) -> &CollectionCommit {
        &self.commit
    }

    pub fn collection(&self) -> &Collection {
        &self.collection
    }

    pub fn schema_commit(&self) -> &SchemaCommit {
        &self.schema_commit
    }

    pub fn row_count(&self) -> u64 {
        self.commit.row_count
    }

    pub fn size(&self) -> u64 {
        self.commit.size
    }

    pub fn fields(&self) -> impl Iterator<Item = &Field> {
        self.fields.values()
    }

    pub fn field(&self, field_id: Id) -> Option<&Field> {
        self.fields.get(&field_id)
    }

    pub fn field_by_name(&self, name: &str) -> Option<&Field> {
        self.fields.values().find(|f| f.name == name)
    }

    pub fn field_element(&self, element_id: Id) -> Option<&FieldElement> {
        self.field_elements.get(&element_id)
    }

    pub fn field_elements(&self) -> impl Iterator<Item = &FieldElement> {
        self.field_elements.values()
    }

    pub fn field_elements_of(&self, field_id: Id) -> Vec<&FieldElement> {
        self.fields
            .get(&field_id)
            .map(|f| {
                f.mappings
                    .ids()
                    .iter()
                    .filter_map(|id| self.field_elements.get(id))
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn partitions(&self) -> impl Iterator<Item = &Partition> {
        self.partitions.values()
    }

    pub fn partition(&self, partition_id: Id) -> Option<&Partition> {
        self.partitions.get(&partition_id)
    }

    pub fn partition_by_name(&self, name: &str) -> Option<&Partition> {
        self.partitions.values().find(|p| p.name == name)
    }

    pub fn partition_ids(&self) -> Vec<Id> {
        self.partitions.keys().copied().collect()
    }

    pub fn partition_commits(&self) -> impl Iterator<Item = &PartitionCommit> {
        self.partition_commits.values()
    }

    pub fn partition_commit(&self, pc_id: Id) -> Option<&PartitionCommit> {
        self.partition_commits.get(&pc_id)
    }

    /// The partition commit mapped for `partition_id` in this version.
    pub fn partition_commit_of(&self, partition_id: Id) -> Option<&PartitionCommit> {
        self.partition_commits
            .values()
            .find(|pc| pc.partition_id == partition_id)
    }

    pub fn segments(&self) -> impl Iterator<Item = &Segment> {
        self.segments.values()
    }

    pub fn segment(&self, segment_id: Id) -> Option<&Segment> {
        self.segments.get(&segment_id)
    }

    pub fn segment_ids(&self) -> Vec<Id> {
        self.segments.keys().copied().collect()
    }

    pub fn segments_of(&self, partition_id: Id) -> Vec<&Segment> {
        self.segments
            .values()
            .filter(|s| s.partition_id == partition_id)
            .collect()
    }

    pub fn segment_commits(&self) -> impl Iterator<Item = &SegmentCommit> {
        self.segment_commits.values()
    }

    pub fn segment_commit(&self, sc_id: Id) -> Option<&SegmentCommit> {
        self.segment_commits.get(&sc_id)
    }

    pub fn segment_commit_of(&self, segment_id: Id) -> Option<&SegmentCommit> {
        self.segment_commits
            .values()
            .find(|sc| sc.segment_id == segment_id)
    }

    pub fn segment_files(&self) -> impl Iterator<Item = &SegmentFile> {
        self.segment_files.values()
    }

    pub fn segment_file(&self, file_id: Id) -> Option<&SegmentFile> {
        self.segment_files.get(&file_id)
    }

    pub fn segment_files_of(&self, segment_id: Id) -> Vec<&SegmentFile> {
        self.segment_commit_of(segment_id)
            .map(|sc| {
                sc.mappings
                    .ids()
                    .iter()
                    .filter_map(|id| self.segment_files.get(id))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Ordinal for the next segment of a partition.
    pub fn next_segment_num(&self, partition_id: Id) -> i64 {
        self.segments_of(partition_id)
            .iter()
            .map(|s| s.num)
            .max()
            .map(|n| n + 1)
            .unwrap_or(0)
    }

    pub fn ref_count(&self) -> i64 {
        self.refs.load(Ordering::Acquire)
    }

    pub(crate) fn inc_ref(&self) {
        self.refs.fetch_add(1, Ordering::AcqRel);
    }

    pub(crate) fn dec_ref(&self) -> i64 {
        self.refs.fetch_sub(1, Ordering::AcqRel) - 1
    }
}

/// Ref-counting handle to a snapshot.
///
/// A pinned handle increments the snapshot's refcount on creation (and on
/// clone) and decrements on drop; a holder never ejects a snapshot whose
/// refcount is above zero. Unpinned handles are plain shared references used
/// by internal passes that must not block ejection.
pub struct ScopedSnapshot {
    inner: Arc<Snapshot>,
    release: Option<ReleaseFn>,
}

impl ScopedSnapshot {
    pub(crate) fn pinned(inner: Arc<Snapshot>, release: ReleaseFn) -> Self {
        inner.inc_ref();
        ScopedSnapshot {
            inner,
            release: Some(release),
        }
    }

    pub(crate) fn unpinned(inner: Arc<Snapshot>) -> Self {
        ScopedSnapshot {
            inner,
            release: None,
        }
    }

    pub fn is_pinned(&self) -> bool {
        self.release.is_some()
    }

    pub(crate) fn inner(&self) -> &Arc<Snapshot> {
        &self.inner
    }
}

impl Clone for ScopedSnapshot {
    fn clone(&self) -> Self {
        if self.release.is_some() {
            self.inner.inc_ref();
        }
        ScopedSnapshot {
            inner: Arc::clone(&self.inner),
            release: self.release.clone(),
        }
    }
}

impl Drop for ScopedSnapshot {
    fn drop(&mut self) {
        if let Some(release) = self.release.take() {
            if self.inner.dec_ref() == 0 {
                release(self.inner.id());
            }
        }
    }
}

impl std::ops::Deref for ScopedSnapshot {
    type Target = Snapshot;

    fn deref(&self) -> &Snapshot {
        &self.inner
    }
}

impl std::fmt::Debug for ScopedSnapshot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScopedSnapshot")
            .field("id", &self.inner.id())
            .field("collection", &self.inner.name())
            .field("pinned", &self.is_pinned())
            .finish()
    }
}

impl From<ScopedSnapshot> for Arc<Snapshot> {
    fn from(handle: ScopedSnapshot) -> Self {
        Arc::clone(&handle.inner)
    }
}
