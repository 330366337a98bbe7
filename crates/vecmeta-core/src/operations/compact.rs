//! Replace one segment with a compacted successor carrying new files.

use async_trait::async_trait;

use vecmeta_store::{Id, Store};

use super::{ensure_not_stale, CommitPipeline, Operation, OperationContext};
use crate::error::{MetaError, MetaResult};
use crate::registry::SnapshotRegistry;
use crate::resource::{
    CollectionCommit, Mappings, PartitionCommit, Segment, SegmentCommit, SegmentFile,
};
use crate::snapshot::ScopedSnapshot;

pub struct CompactOperation {
    context: OperationContext,
    base: ScopedSnapshot,
    /// Files of the compacted segment (sizes and row counts already final).
    files: Vec<SegmentFile>,
}

impl CompactOperation {
    /// `context.segment` names the segment being compacted away.
    pub fn new(context: OperationContext, base: ScopedSnapshot, files: Vec<SegmentFile>) -> Self {
        CompactOperation {
            context,
            base,
            files,
        }
    }
}

#[async_trait]
impl Operation for CompactOperation {
    fn name(&self) -> &'static str {
        "compact"
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
        let stale_id = self
            .context
            .segment
            .as_ref()
            .map(|s| s.id)
            .ok_or_else(|| MetaError::NotFound("stale segment in context".to_string()))?;
        let stale_segment = self
            .base
            .segment(stale_id)
            .ok_or_else(|| MetaError::NotFound(format!("segment {stale_id}")))?
            .clone();
        let stale_sc = self
            .base
            .segment_commit_of(stale_id)
            .ok_or_else(|| MetaError::NotFound(format!("segment commit of segment {stale_id}")))?
            .clone();
        let partition_id = stale_segment.partition_id;
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

        let mut sc_mappings = Mappings::default();
        let mut rows: u64 = 0;
        let mut bytes: u64 = 0;
        for prototype in &self.files {
            let mut file = prototype.clone();
            file.collection_id = collection_id;
            file.partition_id = partition_id;
            file.segment_id = segment_id;
            file.lsn = lsn;
            rows += file.row_count;
            bytes += file.size;
            sc_mappings.stage(pipeline.create(&mut file).await?);
        }

        let mut sc = SegmentCommit::new(
            self.base.commit().schema_id,
            partition_id,
            segment_id,
            sc_mappings,
            lsn,
        );
        sc.row_count = rows;
        sc.size = bytes;
        let sc_id = pipeline.create(&mut sc).await?;

        let mut pc_mappings = Mappings::from_ids(
            prev_pc
                .mappings
                .ids()
                .iter()
                .copied()
                .filter(|id| *id != stale_sc.id),
        );
        pc_mappings.stage(sc_id);
        let mut pc = PartitionCommit::new(collection_id, partition_id, pc_mappings, lsn);
        pc.row_count = prev_pc.row_count.saturating_sub(stale_sc.row_count) + rows;
        pc.size = prev_pc.size.saturating_sub(stale_sc.size) + bytes;
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
        commit.row_count = self.base.row_count().saturating_sub(stale_sc.row_count) + rows;
        commit.size = self.base.size().saturating_sub(stale_sc.size) + bytes;
        let commit_id = pipeline.create(&mut commit).await?;

        ensure_not_stale(registry, collection_id, self.base.id())?;
        for file_id in stale_sc.mappings.ids() {
            if let Some(file) = self.base.segment_file(*file_id) {
                pipeline.retire(file);
            }
        }
        pipeline.retire(&stale_sc);
        pipeline.retire(&stale_segment);
        pipeline.retire(&prev_pc);
        pipeline.retire(self.base.commit());
        pipeline.commit().await?;
        Ok(Some(commit_id))
    }
}
