//! End-to-end flows through the registry: building collections, committing
//! segment metadata, conflict handling, and collection teardown.

mod common;

use common::*;

use vecmeta_core::{
    AddFieldElementOperation, CompactOperation, DropAllIndexOperation, FieldElement,
    FieldElementType, FieldType, InactiveResourcesGcEvent, MergeOperation, MetaError,
    OperationContext, SegmentFile, SnapshotEvent,
};

#[tokio::test]
async fn create_then_query() {
    let registry = registry().await;
    let published = create_collection(&registry, "c1").await;
    assert!(published.id() > 0);

    let snapshot = registry.get_snapshot_by_name("c1", 0, true).unwrap();
    assert_eq!(snapshot.name(), "c1");
    assert!(snapshot.collection_id() > 0);
    assert_eq!(registry.num_of_snapshot("c1").unwrap(), 1);
}

#[tokio::test]
async fn successive_commits_map_one_partition_commit_per_partition() {
    let registry = registry().await;
    create_collection(&registry, "c2").await;
    create_partition(&registry, "c2", "p1", 2).await;
    create_partition(&registry, "c2", "p2", 3).await;
    new_segment(&registry, "c2", "p1", 4).await;
    new_segment(&registry, "c2", "p2", 5).await;

    let active = registry.get_snapshot_by_name("c2", 0, true).unwrap();
    assert_eq!(
        active.commit().mappings.ids().len(),
        2,
        "one partition commit per partition"
    );

    for pc in active.partition_commits() {
        assert_eq!(pc.mappings.ids().len(), 1, "each maps exactly one segment commit");
    }
    let segment_ids: std::collections::BTreeSet<_> =
        active.segment_commits().map(|sc| sc.segment_id).collect();
    assert_eq!(segment_ids.len(), 2, "two distinct segments");

    // Default policy: only the active snapshot is retained.
    assert_eq!(registry.num_of_snapshot("c2").unwrap(), 1);
}

#[tokio::test]
async fn stale_base_is_rejected_and_pinned_base_stays_readable() {
    let registry = registry().await;
    create_collection(&registry, "c3").await;
    let pinned = registry.get_snapshot_by_name("c3", 0, true).unwrap();

    // A commits S1 on top of S0.
    create_partition(&registry, "c3", "p1", 2).await;

    // B still bases on S0.
    let mut context = OperationContext::with_lsn(3);
    context.partition = Some(vecmeta_core::Partition::new("p2", pinned.collection_id(), 3));
    let op = vecmeta_core::CreatePartitionOperation::new(context, pinned.clone());
    let err = registry
        .submit(Box::new(op))
        .await
        .unwrap()
        .status()
        .await
        .unwrap_err();
    assert!(matches!(err, MetaError::Stale { .. }));

    // The pinned handle still observes its original snapshot.
    assert_eq!(pinned.name(), "c3");
    assert!(pinned.partition_by_name("p1").is_none());

    let active = registry.get_snapshot_by_name("c3", 0, true).unwrap();
    assert!(active.partition_by_name("p1").is_some());
    assert!(active.partition_by_name("p2").is_none());
}

#[tokio::test]
async fn drop_collection_removes_it_from_the_registry() {
    let registry = registry().await;
    create_collection(&registry, "c4").await;
    let held = registry.get_snapshot_by_name("c4", 0, true).unwrap();

    registry.drop_collection("c4", 9).await.unwrap();

    assert!(!registry.get_collection_names().contains(&"c4".to_string()));
    let err = registry.get_snapshot_by_name("c4", 0, true).unwrap_err();
    assert!(err.is_not_found());

    // A handle obtained before the drop remains valid until released.
    assert_eq!(held.name(), "c4");
    assert_eq!(registry.num_inactive_holders(), 1);
}

#[tokio::test]
async fn segment_files_roll_totals_up_the_commit_tiers() {
    let registry = registry().await;
    let built = create_collection(&registry, "c5").await;
    let element_id = raw_element_id(&built);
    create_partition(&registry, "c5", "p1", 2).await;
    let with_segment = new_segment(&registry, "c5", "p1", 3).await;
    let segment_id = with_segment.segment_ids()[0];

    let snapshot = new_segment_file(&registry, "c5", segment_id, element_id, 1234, 56, 4).await;

    assert_eq!(snapshot.row_count(), 56);
    assert_eq!(snapshot.size(), 1234);
    let files = snapshot.segment_files_of(segment_id);
    assert_eq!(files.len(), 1);
    assert_eq!(files[0].field_element_id, element_id);

    let pc = snapshot.partition_commit_of(snapshot.segment(segment_id).unwrap().partition_id);
    assert_eq!(pc.unwrap().row_count, 56);
    let sc = snapshot.segment_commit_of(segment_id).unwrap();
    assert_eq!(sc.size, 1234);
}

#[tokio::test]
async fn added_field_element_appears_in_the_next_snapshot() {
    let registry = registry().await;
    let built = create_collection(&registry, "c6").await;
    let field_id = built.field_by_name("embedding").unwrap().id;

    let base = registry.get_snapshot_by_name("c6", 0, true).unwrap();
    let mut element = FieldElement::new(0, field_id, "ivf_index", FieldElementType::Index);
    element.ftype = FieldType::FloatVector;
    element.type_name = "IVF_FLAT".to_string();
    let op = AddFieldElementOperation::new(OperationContext::with_lsn(2), base, element);
    let snapshot = registry
        .submit(Box::new(op))
        .await
        .unwrap()
        .snapshot()
        .await
        .unwrap();

    let elements = snapshot.field_elements_of(field_id);
    assert_eq!(elements.len(), 2);
    assert!(elements
        .iter()
        .any(|e| e.fetype == FieldElementType::Index && e.name == "ivf_index"));

    // The base snapshot pinned before the commit does not see it.
    assert_eq!(built.field_elements_of(field_id).len(), 1);
}

#[tokio::test]
async fn drop_all_index_retires_elements_and_their_files() {
    let registry = registry().await;
    let built = create_collection(&registry, "c7").await;
    let field_id = built.field_by_name("embedding").unwrap().id;
    let raw_id = raw_element_id(&built);
    create_partition(&registry, "c7", "p1", 2).await;
    let with_segment = new_segment(&registry, "c7", "p1", 3).await;
    let segment_id = with_segment.segment_ids()[0];

    // Index element plus one raw and one index file.
    let base = registry.get_snapshot_by_name("c7", 0, true).unwrap();
    let element = FieldElement::new(0, field_id, "hnsw", FieldElementType::Index);
    let op = AddFieldElementOperation::new(OperationContext::with_lsn(4), base, element);
    let snapshot = registry.submit(Box::new(op)).await.unwrap().snapshot().await.unwrap();
    let index_id = snapshot
        .field_elements_of(field_id)
        .iter()
        .find(|e| e.fetype == FieldElementType::Index)
        .unwrap()
        .id;

    new_segment_file(&registry, "c7", segment_id, raw_id, 1000, 100, 5).await;
    new_segment_file(&registry, "c7", segment_id, index_id, 400, 100, 6).await;

    let base = registry.get_snapshot_by_name("c7", 0, true).unwrap();
    let op = DropAllIndexOperation::new(OperationContext::with_lsn(7), base);
    let snapshot = registry.submit(Box::new(op)).await.unwrap().snapshot().await.unwrap();

    assert!(snapshot
        .field_elements_of(field_id)
        .iter()
        .all(|e| e.fetype != FieldElementType::Index));
    let files = snapshot.segment_files_of(segment_id);
    assert_eq!(files.len(), 1, "index file dropped with its element");
    assert_eq!(files[0].field_element_id, raw_id);
    assert_eq!(snapshot.size(), 1000);
}

#[tokio::test]
async fn drop_all_index_rolls_fresh_commit_roots_and_leaves_old_rows_intact() {
    let registry = registry().await;
    let built = create_collection(&registry, "c12").await;
    let field_id = built.field_by_name("embedding").unwrap().id;
    let raw_id = raw_element_id(&built);
    create_partition(&registry, "c12", "p1", 2).await;
    let with_segment = new_segment(&registry, "c12", "p1", 3).await;
    let segment_id = with_segment.segment_ids()[0];
    let partition_id = with_segment.segment(segment_id).unwrap().partition_id;

    let base = registry.get_snapshot_by_name("c12", 0, true).unwrap();
    let element = FieldElement::new(0, field_id, "hnsw", FieldElementType::Index);
    let op = AddFieldElementOperation::new(OperationContext::with_lsn(4), base, element);
    let snapshot = registry.submit(Box::new(op)).await.unwrap().snapshot().await.unwrap();
    let index_id = snapshot
        .field_elements_of(field_id)
        .iter()
        .find(|e| e.fetype == FieldElementType::Index)
        .unwrap()
        .id;
    new_segment_file(&registry, "c12", segment_id, raw_id, 1000, 100, 5).await;
    new_segment_file(&registry, "c12", segment_id, index_id, 400, 100, 6).await;

    // Pin the pre-drop snapshot and remember its commit roots.
    let pinned = registry.get_snapshot_by_name("c12", 0, true).unwrap();
    let old_sc = pinned.segment_commit_of(segment_id).unwrap().clone();
    let old_pc = pinned.partition_commit_of(partition_id).unwrap().clone();

    let op = DropAllIndexOperation::new(OperationContext::with_lsn(7), pinned.clone());
    let snapshot = registry.submit(Box::new(op)).await.unwrap().snapshot().await.unwrap();

    // The new snapshot runs on fresh commit-root rows.
    let new_sc = snapshot.segment_commit_of(segment_id).unwrap();
    let new_pc = snapshot.partition_commit_of(partition_id).unwrap();
    assert_ne!(new_sc.id, old_sc.id, "segment commit was rewritten, not edited");
    assert_ne!(new_pc.id, old_pc.id, "partition commit was rewritten, not edited");
    assert!(snapshot.commit().mappings.ids().contains(&new_pc.id));
    assert!(!snapshot.commit().mappings.ids().contains(&old_pc.id));
    assert_eq!(new_sc.row_count, 100);
    assert_eq!(new_sc.size, 1000);

    // The pinned handle still observes the pre-drop tiers.
    let held_sc = pinned.segment_commit_of(segment_id).unwrap();
    assert_eq!(held_sc.id, old_sc.id);
    assert_eq!(held_sc.row_count, 200);
    assert_eq!(held_sc.size, 1400);
    assert_eq!(held_sc.mappings.ids().len(), 2);
    let held_pc = pinned.partition_commit_of(partition_id).unwrap();
    assert_eq!(held_pc.id, old_pc.id);
    assert_eq!(held_pc.size, 1400);

    // And the superseded rows themselves were only retired, never edited.
    let store = registry.store();
    let old_sc_row = store
        .get(vecmeta_core::ResourceKind::SegmentCommit, old_sc.id)
        .await
        .unwrap();
    assert_eq!(old_sc_row.get("state").unwrap(), "DEACTIVE");
    assert_eq!(old_sc_row.get("row_count").unwrap(), "200");
    assert_eq!(old_sc_row.get("size").unwrap(), "1400");
    let encoded_files: Vec<String> = old_sc.mappings.ids().iter().map(|id| id.to_string()).collect();
    assert_eq!(old_sc_row.get("mappings").unwrap(), &encoded_files.join(","));
    let old_pc_row = store
        .get(vecmeta_core::ResourceKind::PartitionCommit, old_pc.id)
        .await
        .unwrap();
    assert_eq!(old_pc_row.get("state").unwrap(), "DEACTIVE");
    assert_eq!(old_pc_row.get("row_count").unwrap(), "200");
    assert_eq!(old_pc_row.get("size").unwrap(), "1400");
}

#[tokio::test]
async fn compact_replaces_a_segment_and_its_files() {
    let registry = registry().await;
    let built = create_collection(&registry, "c8").await;
    let element_id = raw_element_id(&built);
    create_partition(&registry, "c8", "p1", 2).await;
    let with_segment = new_segment(&registry, "c8", "p1", 3).await;
    let old_segment = with_segment.segment_ids()[0];
    new_segment_file(&registry, "c8", old_segment, element_id, 600, 60, 4).await;
    new_segment_file(&registry, "c8", old_segment, element_id, 400, 40, 5).await;

    let base = registry.get_snapshot_by_name("c8", 0, true).unwrap();
    let mut context = OperationContext::with_lsn(6);
    context.segment = Some(base.segment(old_segment).unwrap().clone());
    let mut merged = SegmentFile::new(0, 0, element_id, FieldType::FloatVector);
    merged.size = 900;
    merged.row_count = 100;
    let op = CompactOperation::new(context, base, vec![merged]);
    let snapshot = registry.submit(Box::new(op)).await.unwrap().snapshot().await.unwrap();

    assert!(snapshot.segment(old_segment).is_none(), "old segment replaced");
    let segments = snapshot.segment_ids();
    assert_eq!(segments.len(), 1);
    assert_eq!(snapshot.segment_files_of(segments[0]).len(), 1);
    assert_eq!(snapshot.row_count(), 100);
    assert_eq!(snapshot.size(), 900);
    assert!(
        snapshot.segment(segments[0]).unwrap().num > snapshot_num_of(&with_segment, old_segment),
        "compacted segment gets a fresh ordinal"
    );
}

fn snapshot_num_of(snapshot: &vecmeta_core::ScopedSnapshot, segment_id: vecmeta_core::Id) -> i64 {
    snapshot.segment(segment_id).unwrap().num
}

#[tokio::test]
async fn merge_folds_sibling_segments_into_one() {
    let registry = registry().await;
    let built = create_collection(&registry, "c9").await;
    let element_id = raw_element_id(&built);
    create_partition(&registry, "c9", "p1", 2).await;
    let first = new_segment(&registry, "c9", "p1", 3).await.segment_ids()[0];
    new_segment_file(&registry, "c9", first, element_id, 500, 50, 4).await;
    let after_second = new_segment(&registry, "c9", "p1", 5).await;
    let second = *after_second
        .segment_ids()
        .iter()
        .find(|id| **id != first)
        .unwrap();
    new_segment_file(&registry, "c9", second, element_id, 300, 30, 6).await;

    let base = registry.get_snapshot_by_name("c9", 0, true).unwrap();
    let mut context = OperationContext::with_lsn(7);
    context.stale_segments = vec![first, second];
    let mut folded = SegmentFile::new(0, 0, element_id, FieldType::FloatVector);
    folded.size = 800;
    folded.row_count = 80;
    let op = MergeOperation::new(context, base, vec![folded]);
    let snapshot = registry.submit(Box::new(op)).await.unwrap().snapshot().await.unwrap();

    assert_eq!(snapshot.segment_ids().len(), 1);
    assert!(snapshot.segment(first).is_none());
    assert!(snapshot.segment(second).is_none());
    assert_eq!(snapshot.row_count(), 80);
    assert_eq!(snapshot.size(), 800);
}

#[tokio::test]
async fn drop_partition_removes_its_subtree() {
    let registry = registry().await;
    create_collection(&registry, "c10").await;
    create_partition(&registry, "c10", "keep", 2).await;
    let snapshot = create_partition(&registry, "c10", "gone", 3).await;
    let gone_id = snapshot.partition_by_name("gone").unwrap().id;
    new_segment(&registry, "c10", "gone", 4).await;

    registry
        .drop_partition(snapshot.collection_id(), gone_id, 5)
        .await
        .unwrap();

    let active = registry.get_snapshot_by_name("c10", 0, true).unwrap();
    assert!(active.partition_by_name("gone").is_none());
    assert!(active.partition_by_name("keep").is_some());
    assert!(active.segments_of(gone_id).is_empty());
    assert_eq!(active.commit().mappings.ids().len(), 1);
}

#[tokio::test]
async fn failed_operations_leave_orphans_for_the_gc() -> anyhow::Result<()> {
    let registry = registry().await;
    create_collection(&registry, "c11").await;
    let stale_base = registry.get_snapshot_by_name("c11", 0, true)?;

    create_partition(&registry, "c11", "p1", 2).await;

    // This op persists PENDING rows, then fails the stale check.
    let mut context = OperationContext::with_lsn(3);
    context.partition = Some(vecmeta_core::Partition::new(
        "p2",
        stale_base.collection_id(),
        3,
    ));
    let op = vecmeta_core::CreatePartitionOperation::new(context, stale_base);
    let err = registry.submit(Box::new(op)).await?.status().await.unwrap_err();
    assert!(matches!(err, MetaError::Stale { .. }));

    let store = registry.store();
    assert!(
        !store.get_inactive_resources().await?.is_empty(),
        "orphaned PENDING rows await GC"
    );

    InactiveResourcesGcEvent.process(store.as_ref()).await?;
    assert!(store.get_inactive_resources().await?.is_empty());

    // The live tree is untouched.
    let active = registry.get_snapshot_by_name("c11", 0, true)?;
    assert!(active.partition_by_name("p1").is_some());
    assert!(active.partition_by_name("p2").is_none());
    Ok(())
}
