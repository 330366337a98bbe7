//! Attach a physical artifact to a segment and roll the commit roots along
//! the changed path, folding the file's size and row count into each tier.

use async_trait::async_trait;

use vecmeta_store::{Id, Store};

use super::{ensure_not_stale, CommitPipeline, Operation, OperationContext};
use crate::error::{MetaError, MetaResult};
use crate::registry::SnapshotRegistry;
use crate::resource::{CollectionCommit, Mappings, PartitionCommit, SegmentCommit, SegmentFile};
use crate::snapshot::ScopedSnapshot;

pub struct NewSegmentFileOperation {
    context: OperationContext,
    base: ScopedSnapshot,
    file: SegmentFile,
}

impl NewSegmentFileOperation {
    /// `context.segment` names the target segment; `file` carries
    /// `field_element_id`, `ftype`, `size`, and `row_count`.
    pub fn new(context: OperationContext, base: ScopedSnapshot, file: SegmentFile) -> Self {
        NewSegmentFileOperation {
            context,
            base,
            file,
        }
    }
}

#[async_trait]
impl Operation for NewSegmentFileOperation {
    fn name(&self) -> &'static str {
        "new_segment_file"
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
        let segment_id = self
            .context
            .segment
            .as_ref()
            .map(|s| s.id)
            .ok_or_else(|| MetaError::NotFound("target segment in context".to_string()))?;
        let segment = self
            .base
            .segment(segment_id)
            .ok_or_else(|| MetaError::NotFound(format!("segment {segment_id}")))?
            .clone();
        let prev_sc = self
            .base
            .segment_commit_of(segment_id)
            .ok_or_else(|| MetaError::NotFound(format!("segment commit of segment {segment_id}")))?
            .clone();
        let prev_pc = self
            .base
            .partition_commit_of(segment.partition_id)
            .ok_or_else(|| MetaError::NotFound(format!("partition {}", segment.partition_id)))?
            .clone();

        let mut pipeline = CommitPipeline::new(store);
        let mut file = self.file.clone();
        file.collection_id = collection_id;
        file.partition_id = segment.partition_id;
        file.segment_id = segment_id;
        file.lsn = lsn;
        let file_id = pipeline.create(&mut file).await?;

        let mut sc_mappings = Mappings::from_ids(prev_sc.mappings.ids().iter().copied());
        sc_mappings.stage(file_id);
        let mut sc = SegmentCommit::new(
            prev_sc.schema_id,
            segment.partition_id,
            segment_id,
            sc_mappings,
            lsn,
        );
        sc.row_count = prev_sc.row_count + file.row_count;
        sc.size = prev_sc.size + file.size;
        let sc_id = pipeline.create(&mut sc).await?;

        let mut pc_mappings = Mappings::from_ids(
            prev_pc
                .mappings
                .ids()
                .iter()
                .copied()
                .filter(|id| *id != prev_sc.id),
        );
        pc_mappings.stage(sc_id);
        let mut pc = PartitionCommit::new(collection_id, segment.partition_id, pc_mappings, lsn);
        pc.row_count = prev_pc.row_count + file.row_count;
        pc.size = prev_pc.size + file.size;
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
        commit.row_count = self.base.row_count() + file.row_count;
        commit.size = self.base.size() + file.size;
        let commit_id = pipeline.create(&mut commit).await?;

        ensure_not_stale(registry, collection_id, self.base.id())?;
        pipeline.retire(&prev_sc);
        pipeline.retire(&prev_pc);
        pipeline.retire(self.base.commit());
        pipeline.commit().await?;
        Ok(Some(commit_id))
    }
}
