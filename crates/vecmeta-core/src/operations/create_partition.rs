//! Add a partition (with an empty partition commit) to a collection.

use async_trait::async_trait;

use vecmeta_store::{Id, Store};

use super::{ensure_not_stale, CommitPipeline, Operation, OperationContext};
use crate::error::{MetaError, MetaResult};
use crate::registry::SnapshotRegistry;
use crate::resource::{CollectionCommit, Mappings, PartitionCommit};
use crate::snapshot::ScopedSnapshot;

pub struct CreatePartitionOperation {
    context: OperationContext,
    base: ScopedSnapshot,
}

impl CreatePartitionOperation {
    /// `context.partition` carries the partition prototype (name).
    pub fn new(context: OperationContext, base: ScopedSnapshot) -> Self {
        CreatePartitionOperation { context, base }
    }
}

#[async_trait]
impl Operation for CreatePartitionOperation {
    fn name(&self) -> &'static str {
        "create_partition"
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
        let mut partition = self
            .context
            .partition
            .clone()
            .ok_or_else(|| MetaError::NotFound("partition prototype in context".to_string()))?;
        if self.base.partition_by_name(&partition.name).is_some() {
            return Err(MetaError::DuplicateName(partition.name.clone()));
        }
        partition.collection_id = collection_id;
        partition.lsn = self.context.lsn;

        let mut pipeline = CommitPipeline::new(store);
        let partition_id = pipeline.create(&mut partition).await?;

        let mut pc = PartitionCommit::new(
            collection_id,
            partition_id,
            Mappings::default(),
            self.context.lsn,
        );
        let pc_id = pipeline.create(&mut pc).await?;

        let mut mappings = Mappings::from_ids(self.base.commit().mappings.ids().iter().copied());
        mappings.stage(pc_id);
        let mut commit = CollectionCommit::new(
            collection_id,
            self.base.commit().schema_id,
            mappings,
            self.context.lsn,
        );
        commit.row_count = self.base.row_count();
        commit.size = self.base.size();
        let commit_id = pipeline.create(&mut commit).await?;

        ensure_not_stale(registry, collection_id, self.base.id())?;
        pipeline.retire(self.base.commit());
        pipeline.commit().await?;
        Ok(Some(commit_id))
    }
}
