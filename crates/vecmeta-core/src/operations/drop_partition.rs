//! Remove a partition and its subtree from the collection.

use async_trait::async_trait;

use vecmeta_store::{Id, Store};

use super::{ensure_not_stale, CommitPipeline, Operation, OperationContext};
use crate::error::{MetaError, MetaResult};
use crate::registry::SnapshotRegistry;
use crate::resource::{CollectionCommit, Mappings};
use crate::snapshot::ScopedSnapshot;

pub struct DropPartitionOperation {
    context: OperationContext,
    base: ScopedSnapshot,
}

impl DropPartitionOperation {
    /// `context.partition` names the partition to drop (by id).
    pub fn new(context: OperationContext, base: ScopedSnapshot) -> Self {
        DropPartitionOperation { context, base }
    }
}

#[async_trait]
impl Operation for DropPartitionOperation {
    fn name(&self) -> &'static str {
        "drop_partition"
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
        let partition_id = self
            .context
            .partition
            .as_ref()
            .map(|p| p.id)
            .ok_or_else(|| MetaError::NotFound("target partition in context".to_string()))?;
        let partition = self
            .base
            .partition(partition_id)
            .ok_or_else(|| MetaError::NotFound(format!("partition {partition_id}")))?
            .clone();
        let prev_pc = self
            .base
            .partition_commit_of(partition_id)
            .ok_or_else(|| MetaError::NotFound(format!("partition commit of {partition_id}")))?
            .clone();

        let mut pipeline = CommitPipeline::new(store);
        let mappings = Mappings::from_ids(
            self.base
                .commit()
                .mappings
                .ids()
                .iter()
                .copied()
                .filter(|id| *id != prev_pc.id),
        );
        let mut commit = CollectionCommit::new(
            collection_id,
            self.base.commit().schema_id,
            mappings,
            self.context.lsn,
        );
        commit.row_count = self.base.row_count().saturating_sub(prev_pc.row_count);
        commit.size = self.base.size().saturating_sub(prev_pc.size);
        let commit_id = pipeline.create(&mut commit).await?;

        ensure_not_stale(registry, collection_id, self.base.id())?;

        pipeline.retire(&partition);
        pipeline.retire(&prev_pc);
        for sc in self
            .base
            .segment_commits()
            .filter(|sc| sc.partition_id == partition_id)
        {
            pipeline.retire(sc);
            if let Some(segment) = self.base.segment(sc.segment_id) {
                pipeline.retire(segment);
            }
            for file_id in sc.mappings.ids() {
                if let Some(file) = self.base.segment_file(*file_id) {
                    pipeline.retire(file);
                }
            }
        }
        pipeline.retire(self.base.commit());
        pipeline.commit().await?;
        Ok(Some(commit_id))
    }
}
