//! Create a collection root: the collection, its schema (fields and field
//! elements), and the first CollectionCommit. Partitions come later via
//! [`CreatePartitionOperation`](super::CreatePartitionOperation).

use async_trait::async_trait;

use vecmeta_store::schema::attr;
use vecmeta_store::{Id, Store};

use super::{CommitPipeline, Operation, OperationContext};
use crate::error::{MetaError, MetaResult};
use crate::registry::SnapshotRegistry;
use crate::resource::{
    Collection, CollectionCommit, Field, FieldElement, Mappings, SchemaCommit,
};

pub struct BuildOperation {
    context: OperationContext,
    collection: Collection,
    /// Schema: each field with its elements.
    fields: Vec<(Field, Vec<FieldElement>)>,
    collection_id: Id,
}

impl BuildOperation {
    pub fn new(
        context: OperationContext,
        collection: Collection,
        fields: Vec<(Field, Vec<FieldElement>)>,
    ) -> Self {
        BuildOperation {
            context,
            collection,
            fields,
            collection_id: 0,
        }
    }
}

#[async_trait]
impl Operation for BuildOperation {
    fn name(&self) -> &'static str {
        "build"
    }

    fn collection_id(&self) -> Id {
        self.collection_id
    }

    async fn execute(
        &mut self,
        store: &dyn Store,
        _registry: &SnapshotRegistry,
    ) -> MetaResult<Option<Id>> {
        if store
            .find_collection_by_name(&self.collection.name)
            .await?
            .is_some()
        {
            return Err(MetaError::DuplicateName(self.collection.name.clone()));
        }

        let mut pipeline = CommitPipeline::new(store);
        let collection_id = pipeline.create(&mut self.collection).await?;
        self.collection_id = collection_id;

        let mut field_ids = Mappings::default();
        for (field, elements) in &mut self.fields {
            let field_id = pipeline.create(field).await?;
            field_ids.stage(field_id);
            for element in elements.iter_mut() {
                element.collection_id = collection_id;
                element.field_id = field_id;
                let element_id = pipeline.create(element).await?;
                field.mappings.stage(element_id);
            }
            if !elements.is_empty() {
                pipeline.update(field, [attr::MAPPINGS]).await?;
            }
        }

        let mut schema_commit = SchemaCommit::new(collection_id, field_ids);
        let schema_id = pipeline.create(&mut schema_commit).await?;

        let mut commit =
            CollectionCommit::new(collection_id, schema_id, Mappings::default(), self.context.lsn);
        let commit_id = pipeline.create(&mut commit).await?;

        pipeline.commit().await?;
        Ok(Some(commit_id))
    }
}
