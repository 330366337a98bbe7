//! Reader/writer timer behavior: read-replica refresh against a shared
//! store, stale eviction, and inactive-holder draining.

mod common;

use std::sync::Arc;

use vecmeta_core::{
    ClusterRole, EngineConfig, MemStore, ResourceKind, SnapshotRegistry, State, Store,
};

fn reader_config() -> EngineConfig {
    let mut config = EngineConfig::default();
    config.cluster.enable = true;
    config.cluster.role = ClusterRole::Ro;
    config
}

async fn reader_over(store: &Arc<dyn Store>) -> Arc<SnapshotRegistry> {
    common::registry_with(reader_config(), Arc::clone(store)).await
}

#[tokio::test]
async fn reader_timer_picks_up_collections_from_the_store() -> anyhow::Result<()> {
    let store: Arc<dyn Store> = Arc::new(MemStore::new());
    let reader = reader_over(&store).await;
    assert!(reader.get_collection_ids().is_empty());

    // A writer node shares the same store.
    let writer = common::registry_with(EngineConfig::default(), Arc::clone(&store)).await;
    let c1 = common::create_collection(&writer, "c1").await.collection_id();
    let c2 = common::create_collection(&writer, "c2").await.collection_id();

    reader.on_reader_timer().await;

    let mut ids = reader.get_collection_ids();
    ids.sort_unstable();
    assert_eq!(ids, vec![c1, c2]);
    let mut names = reader.get_collection_names();
    names.sort();
    assert_eq!(names, vec!["c1".to_string(), "c2".to_string()]);

    let (_, expected_latest) = store.get_all_active_snapshot_ids(0).await?;
    assert_eq!(reader.latest_updated(), expected_latest);
    Ok(())
}

#[tokio::test]
async fn reader_timer_follows_new_commits_and_never_regresses() -> anyhow::Result<()> {
    let store: Arc<dyn Store> = Arc::new(MemStore::new());
    let reader = reader_over(&store).await;
    let writer = common::registry_with(EngineConfig::default(), Arc::clone(&store)).await;

    common::create_collection(&writer, "c1").await;
    reader.on_reader_timer().await;
    let first_watermark = reader.latest_updated();

    common::create_partition(&writer, "c1", "p1", 2).await;
    reader.on_reader_timer().await;
    let second_watermark = reader.latest_updated();
    assert!(second_watermark >= first_watermark);

    let active = reader.get_snapshot_by_name("c1", 0, true)?;
    assert!(active.partition_by_name("p1").is_some(), "replica sees the commit");

    // An idle cycle leaves the watermark alone.
    reader.on_reader_timer().await;
    assert_eq!(reader.latest_updated(), second_watermark);
    Ok(())
}

#[tokio::test]
async fn reader_timer_evicts_collections_gone_from_the_store() -> anyhow::Result<()> {
    let store: Arc<dyn Store> = Arc::new(MemStore::new());
    let reader = reader_over(&store).await;
    let writer = common::registry_with(EngineConfig::default(), Arc::clone(&store)).await;

    common::create_collection(&writer, "c1").await;
    let keep = common::create_collection(&writer, "c2").await.collection_id();
    reader.on_reader_timer().await;
    assert_eq!(reader.get_collection_ids().len(), 2);

    writer.drop_collection("c1", 9).await?;
    reader.on_reader_timer().await;

    assert_eq!(reader.get_collection_ids(), vec![keep]);
    assert_eq!(reader.get_collection_names(), vec!["c2".to_string()]);
    Ok(())
}

#[tokio::test]
async fn reader_timer_tolerates_commits_of_deactivated_collections() -> anyhow::Result<()> {
    let store: Arc<dyn Store> = Arc::new(MemStore::new());
    let reader = reader_over(&store).await;
    let writer = common::registry_with(EngineConfig::default(), Arc::clone(&store)).await;

    let cid = common::create_collection(&writer, "c1").await.collection_id();

    // Deactivate the collection row while its commit stays ACTIVE, as a
    // half-applied drop would.
    let mut attrs = vecmeta_core::AttrMap::new();
    attrs.insert("state".to_string(), State::Deactive.as_str().to_string());
    store.update(ResourceKind::Collection, cid, attrs).await?;

    // The cycle must neither panic nor adopt the dead collection.
    reader.on_reader_timer().await;
    assert!(reader.get_collection_ids().is_empty());

    // And it keeps running on later cycles.
    reader.on_reader_timer().await;
    Ok(())
}

#[tokio::test]
async fn writer_timer_single_mode_clears_inactive_holders() {
    let registry = common::registry().await;
    common::create_collection(&registry, "c1").await;
    let held = registry.get_snapshot_by_name("c1", 0, true).unwrap();

    registry.drop_collection("c1", 5).await.unwrap();
    assert_eq!(registry.num_inactive_holders(), 1);

    registry.on_writer_timer().await;
    assert_eq!(registry.num_inactive_holders(), 0);

    // Pinned snapshots survive the clear through their own handles.
    assert_eq!(held.name(), "c1");
}

#[tokio::test]
async fn writer_timer_cluster_mode_waits_for_pins_before_draining() {
    let mut config = EngineConfig::default();
    config.cluster.enable = true;
    let store: Arc<dyn Store> = Arc::new(MemStore::new());
    let registry = common::registry_with(config, store).await;

    common::create_collection(&registry, "c1").await;
    let held = registry.get_snapshot_by_name("c1", 0, true).unwrap();
    registry.drop_collection("c1", 5).await.unwrap();

    registry.on_writer_timer().await;
    assert_eq!(
        registry.num_inactive_holders(),
        1,
        "pinned snapshot vetoes the drain"
    );

    drop(held);
    registry.on_writer_timer().await;
    assert_eq!(registry.num_inactive_holders(), 0);
}

#[tokio::test]
async fn stop_service_rejects_later_submissions() {
    let registry = common::registry().await;
    common::create_collection(&registry, "c1").await;
    registry.stop_service().await;

    let base = registry.get_snapshot_by_name("c1", 0, true);
    assert!(base.is_err(), "reset cleared the holders");

    let op = vecmeta_core::BuildOperation::new(
        vecmeta_core::OperationContext::with_lsn(1),
        vecmeta_core::Collection::new("late", serde_json::Value::Null),
        vec![],
    );
    let err = registry.submit(Box::new(op)).await.unwrap_err();
    assert!(matches!(err, vecmeta_core::MetaError::ExecutorStopped));
}
