//! Attach a new element (index, statistics) to an existing field.
//!
//! The element lands in the field's staged mappings delta; the commit batch
//! flushes the field row and flips a fresh CollectionCommit so readers pick
//! the element up with the next snapshot.

use async_trait::async_trait;

use vecmeta_store::schema::attr;
use vecmeta_store::{Id, Store};

use super::{ensure_not_stale, CommitPipeline, Operation, OperationContext};
use crate::error::{MetaError, MetaResult};
use crate::registry::SnapshotRegistry;
use crate::resource::{CollectionCommit, FieldElement, Mappings};
use crate::snapshot::ScopedSnapshot;

pub struct AddFieldElementOperation {
    context: OperationContext,
    base: ScopedSnapshot,
    element: FieldElement,
}

impl AddFieldElementOperation {
    /// `element.field_id` names the target field.
    pub fn new(context: OperationContext, base: ScopedSnapshot, element: FieldElement) -> Self {
        AddFieldElementOperation {
            context,
            base,
            element,
        }
    }
}

#[async_trait]
impl Operation for AddFieldElementOperation {
    fn name(&self) -> &'static str {
        "add_field_element"
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
        let field = self
            .base
            .field(self.element.field_id)
            .ok_or_else(|| MetaError::NotFound(format!("field {}", self.element.field_id)))?
            .clone();

        let mut pipeline = CommitPipeline::new(store);
        let mut element = self.element.clone();
        element.collection_id = collection_id;
        let element_id = pipeline.create(&mut element).await?;

        let mut flushed = field.clone();
        flushed.mappings.stage(element_id);
        pipeline.stage(&flushed, [attr::MAPPINGS])?;

        let mappings = Mappings::from_ids(self.base.commit().mappings.ids().iter().copied());
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
