//! Open a new segment in a partition: a fresh Segment, an empty
//! SegmentCommit, and rewritten partition/collection commit roots.

use async_trait::async_trait;

use vecmeta_store::{Id, Store};

use super::{ensure_not_stale, CommitPipeline, Operation, OperationContext};
use crate::error::{MetaError, MetaResult};
use crate::registry::SnapshotRegistry;
use crate::resource::{CollectionCommit, Mappings, PartitionCommit, Segment, SegmentCommit};
use crate::snapshot::ScopedSnapshot;

pub struct NewSegmentOperation {
    context: OperationContext,
    base: ScopedSnapshot,
}

impl NewSegmentOperation {
    /// `context.partition` names the target partition (by id).
    pub fn new(context: OperationContext, base: ScopedSnapshot) -> Self {
        NewSegmentOperation { context, base }
    }
}

#[async_trait]
impl Operation for NewSegmentOperation {
    fn name(&self) -> &'static str {
        "new_segment"
    }

    fn collection_id(&self) -> Id {
        self.base.collection_id()
    }

    async fn execute(
        &mut self,
        store: &dyn Store,
        registry: &SnapshotRegistry,
    ) -> MetaResult<Option<Id>> {
        let collection_id = self.base.collection_id();
        let lsn = self.context.lsn;
        let partition_id = self
            .context
            .partition
            .as_ref()
            .map(|p| p.id)
            .ok_or_else(|| MetaError::NotFound("target partition in context".to_string()))?;
        let prev_pc = self
            .base
            .partition_commit_of(partition_id)
            .ok_or_else(|| MetaError::NotFound(format!("partition {partition_id}")))?
            .clone();

        let mut pipeline = CommitPipeline::new(store);
        let mut segment = Segment::new(
            collection_id,
            partition_id,
            self.base.next_segment_num(partition_id),
            lsn,
        );
        let segment_id = pipeline.create(&mut segment).await?;

        let mut sc = SegmentCommit::new(
            self.base.commit().schema_id,
            partition_id,
            segment_id,
            Mappings::default(),
            lsn,
        );
        let sc_id = pipeline.create(&mut sc).await?;

        let mut pc_mappings = Mappings::from_ids(prev_pc.mappings.ids().iter().copied());
        pc_mappings.stage(sc_id);
        let mut pc = PartitionCommit::new(collection_id, partition_id, pc_mappings, lsn);
        pc.row_count = prev_pc.row_count;
        pc.size = prev_pc.size;
        let pc_id = pipeline.create(&mut pc).await?;

        let mut cc_mappings = Mappings::from_ids(
            self.base
                .commit()
                .mappings
                .ids()
                .iter()
                .copied()
                .filter(|id| *id != prev_pc.id),
        );
        cc_mappings.stage(pc_id);
        let mut commit =
            CollectionCommit::new(collection_id, self.base.commit().schema_id, cc_mappings, lsn);
        commit.row_count = self.base.row_count();
        commit.size = self.base.size();
        let commit_id = pipeline.create(&mut commit).await?;

        ensure_not_stale(registry, collection_id, self.base.id())?;
        pipeline.retire(&prev_pc);
        pipeline.retire(self.base.commit());
        pipeline.commit().await?;
        Ok(Some(commit_id))
    }
}
