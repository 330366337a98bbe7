//! Fold several segments of one partition into a single merged segment.

use async_trait::async_trait;

use vecmeta_store::{Id, Store};

use super::{ensure_not_stale, CommitPipeline, Operation, OperationContext};
use crate::error::{MetaError, MetaResult};
use crate::registry::SnapshotRegistry;
use crate::resource::{
    CollectionCommit, Mappings, PartitionCommit, Segment, SegmentCommit, SegmentFile,
};
use crate::snapshot::ScopedSnapshot;

pub struct MergeOperation {
    context: OperationContext,
    base: ScopedSnapshot,
    /// Files of the merged segment.
    files: Vec<SegmentFile>,
}

impl MergeOperation {
    /// `context.stale_segments` lists the segments being folded; all must
    /// live in the same partition.
    pub fn new(context: OperationContext, base: ScopedSnapshot, files: Vec<SegmentFile>) -> Self {
        MergeOperation {
            context,
            base,
            files,
        }
    }
}

#[async_trait]
impl Operation for MergeOperation {
    fn name(&self) -> &'static str {
        "merge"
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
        if self.context.stale_segments.is_empty() {
            return Err(MetaError::NotFound("stale segments in context".to_string()));
        }

        let mut stale_segments = Vec::new();
        let mut stale_scs = Vec::new();
        for segment_id in &self.context.stale_segments {
            let segment = self
                .base
                .segment(*segment_id)
                .ok_or_else(|| MetaError::NotFound(format!("segment {segment_id}")))?
                .clone();
            let sc = self
                .base
                .segment_commit_of(*segment_id)
                .ok_or_else(|| {
                    MetaError::NotFound(format!("segment commit of segment {segment_id}"))
                })?
                .clone();
            stale_segments.push(segment);
            stale_scs.push(sc);
        }
        let partition_id = stale_segments[0].partition_id;
        if let Some(outlier) = stale_segments.iter().find(|s| s.partition_id != partition_id) {
            return Err(MetaError::NotFound(format!(
                "segment {} in partition {partition_id}",
                outlier.id
            )));
        }
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

        let stale_rows: u64 = stale_scs.iter().map(|sc| sc.row_count).sum();
        let stale_bytes: u64 = stale_scs.iter().map(|sc| sc.size).sum();
        let stale_sc_ids: Vec<Id> = stale_scs.iter().map(|sc| sc.id).collect();

        let mut pc_mappings = Mappings::from_ids(
            prev_pc
                .mappings
                .ids()
                .iter()
                .copied()
                .filter(|id| !stale_sc_ids.contains(id)),
        );
        pc_mappings.stage(sc_id);
        let mut pc = PartitionCommit::new(collection_id, partition_id, pc_mappings, lsn);
        pc.row_count = prev_pc.row_count.saturating_sub(stale_rows) + rows;
        pc.size = prev_pc.size.saturating_sub(stale_bytes) + bytes;
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
        commit.row_count = self.base.row_count().saturating_sub(stale_rows) + rows;
        commit.size = self.base.size().saturating_sub(stale_bytes) + bytes;
        let commit_id = pipeline.create(&mut commit).await?;

        ensure_not_stale(registry, collection_id, self.base.id())?;
        for sc in &stale_scs {
            for file_id in sc.mappings.ids() {
                if let Some(file) = self.base.segment_file(*file_id) {
                    pipeline.retire(file);
                }
            }
            pipeline.retire(sc);
        }
        for segment in &stale_segments {
            pipeline.retire(segment);
        }
        pipeline.retire(&prev_pc);
        pipeline.retire(self.base.commit());
        pipeline.commit().await?;
        Ok(Some(commit_id))
    }
}
