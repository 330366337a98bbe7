//! Shared fixtures: an engine over an in-memory store plus operation
//! shorthands used across the integration suites.
#![allow(dead_code)]

use std::sync::Arc;

use serde_json::json;

use vecmeta_core::{
    BuildOperation, Collection, CreatePartitionOperation, EngineConfig, Field, FieldElement,
    FieldElementType, FieldType, Id, Lsn, MemStore, NewSegmentFileOperation, NewSegmentOperation,
    OperationContext, Partition, ScopedSnapshot, SegmentFile, SnapshotRegistry, Store,
};

pub async fn registry() -> Arc<SnapshotRegistry> {
    registry_with(EngineConfig::default(), Arc::new(MemStore::new())).await
}

pub async fn registry_with(config: EngineConfig, store: Arc<dyn Store>) -> Arc<SnapshotRegistry> {
    SnapshotRegistry::with_store(config, store)
        .await
        .expect("registry starts")
}

/// One float-vector field with a raw element.
pub fn vector_schema() -> Vec<(Field, Vec<FieldElement>)> {
    vec![(
        Field::new("embedding", 0, FieldType::FloatVector, json!({"dim": 4})),
        vec![FieldElement::new(0, 0, "raw", FieldElementType::Raw)],
    )]
}

pub async fn create_collection(registry: &Arc<SnapshotRegistry>, name: &str) -> ScopedSnapshot {
    let op = BuildOperation::new(
        OperationContext::with_lsn(1),
        Collection::new(name, json!({"metric": "l2"})),
        vector_schema(),
    );
    registry
        .submit(Box::new(op))
        .await
        .expect("submit build")
        .snapshot()
        .await
        .expect("build publishes")
}

pub async fn create_partition(
    registry: &Arc<SnapshotRegistry>,
    collection: &str,
    partition: &str,
    lsn: Lsn,
) -> ScopedSnapshot {
    let base = registry.get_snapshot_by_name(collection, 0, true).unwrap();
    let mut context = OperationContext::with_lsn(lsn);
    context.partition = Some(Partition::new(partition, base.collection_id(), lsn));
    let op = CreatePartitionOperation::new(context, base);
    registry
        .submit(Box::new(op))
        .await
        .expect("submit create_partition")
        .snapshot()
        .await
        .expect("create_partition publishes")
}

pub async fn new_segment(
    registry: &Arc<SnapshotRegistry>,
    collection: &str,
    partition: &str,
    lsn: Lsn,
) -> ScopedSnapshot {
    let base = registry.get_snapshot_by_name(collection, 0, true).unwrap();
    let target = base.partition_by_name(partition).expect("partition exists").clone();
    let mut context = OperationContext::with_lsn(lsn);
    context.partition = Some(target);
    let op = NewSegmentOperation::new(context, base);
    registry
        .submit(Box::new(op))
        .await
        .expect("submit new_segment")
        .snapshot()
        .await
        .expect("new_segment publishes")
}

pub async fn new_segment_file(
    registry: &Arc<SnapshotRegistry>,
    collection: &str,
    segment_id: Id,
    element_id: Id,
    size: u64,
    row_count: u64,
    lsn: Lsn,
) -> ScopedSnapshot {
    let base = registry.get_snapshot_by_name(collection, 0, true).unwrap();
    let segment = base.segment(segment_id).expect("segment exists").clone();
    let mut file = SegmentFile::new(0, 0, element_id, FieldType::FloatVector);
    file.size = size;
    file.row_count = row_count;
    let mut context = OperationContext::with_lsn(lsn);
    context.segment = Some(segment);
    let op = NewSegmentFileOperation::new(context, base, file);
    registry
        .submit(Box::new(op))
        .await
        .expect("submit new_segment_file")
        .snapshot()
        .await
        .expect("new_segment_file publishes")
}

/// Id of the raw element of the schema's only field.
pub fn raw_element_id(snapshot: &ScopedSnapshot) -> Id {
    let field = snapshot.field_by_name("embedding").expect("field exists");
    snapshot.field_elements_of(field.id)[0].id
}
