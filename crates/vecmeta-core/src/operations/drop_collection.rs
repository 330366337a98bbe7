//! Retire a whole collection: the collection row and every resource in the
//! active snapshot's closure. Publishes no new snapshot; the registry moves
//! the holder to the inactive map afterwards and GC reclaims the rows.

use async_trait::async_trait;

use tracing::debug;
use vecmeta_store::{Id, Store};

use super::{CommitPipeline, Operation, OperationContext};
use crate::error::MetaResult;
use crate::registry::SnapshotRegistry;
use crate::snapshot::ScopedSnapshot;

pub struct DropCollectionOperation {
    context: OperationContext,
    base: ScopedSnapshot,
}

impl DropCollectionOperation {
    pub fn new(context: OperationContext, base: ScopedSnapshot) -> Self {
        DropCollectionOperation { context, base }
    }
}

#[async_trait]
impl Operation for DropCollectionOperation {
    fn name(&self) -> &'static str {
        "drop_collection"
    }

    fn collection_id(&self) -> Id {
        self.base.collection_id()
    }

    async fn execute(
        &mut self,
        store: &dyn Store,
        _registry: &SnapshotRegistry,
    ) -> MetaResult<Option<Id>> {
        debug!(
            collection = self.base.name(),
            lsn = self.context.lsn,
            "dropping collection"
        );
        let mut pipeline = CommitPipeline::new(store);

        pipeline.retire(self.base.collection());
        pipeline.retire(self.base.commit());
        pipeline.retire(self.base.schema_commit());
        for field in self.base.fields() {
            pipeline.retire(field);
        }
        for element in self.base.field_elements() {
            pipeline.retire(element);
        }
        for partition in self.base.partitions() {
            pipeline.retire(partition);
        }
        for pc in self.base.partition_commits() {
            pipeline.retire(pc);
        }
        for segment in self.base.segments() {
            pipeline.retire(segment);
        }
        for sc in self.base.segment_commits() {
            pipeline.retire(sc);
        }
        for file in self.base.segment_files() {
            pipeline.retire(file);
        }

        pipeline.commit().await?;
        Ok(None)
    }
}
