//! Behavioral contract tests for the Store trait.
//!
//! The same suite runs against both back-ends: any conforming Store
//! implementation must pass these.

use std::sync::Arc;

use vecmeta_store::schema::attr;
use vecmeta_store::{
    AttrMap, Id, LocalStore, MemStore, ResourceKind, RowContext, State, Store, StoreError,
};

fn row(state: State, extra: &[(&str, &str)]) -> AttrMap {
    let mut attrs = AttrMap::new();
    attrs.insert(attr::STATE.to_string(), state.as_str().to_string());
    for (k, v) in extra {
        attrs.insert(k.to_string(), v.to_string());
    }
    attrs
}

async fn backends() -> Vec<(&'static str, Arc<dyn Store>, tempfile::TempDir)> {
    let mem_dir = tempfile::tempdir().unwrap();
    let local_dir = tempfile::tempdir().unwrap();
    let local = LocalStore::open(local_dir.path()).await.unwrap();
    vec![
        ("mem", Arc::new(MemStore::new()) as Arc<dyn Store>, mem_dir),
        ("local", Arc::new(local) as Arc<dyn Store>, local_dir),
    ]
}

#[tokio::test]
async fn ids_are_monotonic_per_kind() {
    for (name, store, _dir) in backends().await {
        let mut last = 0;
        for _ in 0..5 {
            let id = store
                .create(ResourceKind::Segment, row(State::Pending, &[]))
                .await
                .unwrap();
            assert!(id > last, "{name}: ids must increase");
            last = id;
        }
        let other = store
            .create(ResourceKind::Field, row(State::Pending, &[]))
            .await
            .unwrap();
        assert_eq!(other, 1, "{name}: sequences are per kind");
    }
}

#[tokio::test]
async fn update_overwrites_only_listed_attrs() {
    for (name, store, _dir) in backends().await {
        let id = store
            .create(
                ResourceKind::Collection,
                row(State::Pending, &[("name", "c1"), ("params", "{}")]),
            )
            .await
            .unwrap();

        store
            .update(ResourceKind::Collection, id, row(State::Active, &[]))
            .await
            .unwrap();

        let got = store.get(ResourceKind::Collection, id).await.unwrap();
        assert_eq!(got.get(attr::STATE).unwrap(), "ACTIVE", "{name}");
        assert_eq!(got.get(attr::NAME).unwrap(), "c1", "{name}: untouched attr kept");
    }
}

#[tokio::test]
async fn update_unknown_row_is_row_not_found() {
    for (name, store, _dir) in backends().await {
        let err = store
            .update(ResourceKind::Collection, 404, AttrMap::new())
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::RowNotFound { .. }), "{name}");
    }
}

#[tokio::test]
async fn collection_id_queries_filter_by_state() {
    for (name, store, _dir) in backends().await {
        let active = store
            .create(ResourceKind::Collection, row(State::Active, &[("name", "a")]))
            .await
            .unwrap();
        let pending = store
            .create(ResourceKind::Collection, row(State::Pending, &[("name", "b")]))
            .await
            .unwrap();

        let only_active = store.get_collection_ids(false).await.unwrap();
        assert_eq!(only_active, vec![active], "{name}");

        let mut all = store.get_collection_ids(true).await.unwrap();
        all.sort_unstable();
        assert_eq!(all, vec![active, pending], "{name}");
    }
}

#[tokio::test]
async fn snapshot_ids_scoped_to_collection() {
    for (name, store, _dir) in backends().await {
        let c1 = store
            .create(
                ResourceKind::CollectionCommit,
                row(State::Active, &[("collection_id", "1"), ("updated_on", "10")]),
            )
            .await
            .unwrap();
        store
            .create(
                ResourceKind::CollectionCommit,
                row(State::Active, &[("collection_id", "2"), ("updated_on", "20")]),
            )
            .await
            .unwrap();
        let superseded = store
            .create(
                ResourceKind::CollectionCommit,
                row(State::Deactive, &[("collection_id", "1"), ("updated_on", "5")]),
            )
            .await
            .unwrap();

        assert_eq!(
            store.get_snapshot_ids(1, false).await.unwrap(),
            vec![c1],
            "{name}"
        );
        let mut with_inactive = store.get_snapshot_ids(1, true).await.unwrap();
        with_inactive.sort_unstable();
        assert_eq!(with_inactive, vec![c1, superseded], "{name}");
    }
}

#[tokio::test]
async fn active_snapshot_pairs_and_latest_updated() {
    for (name, store, _dir) in backends().await {
        store
            .create(
                ResourceKind::CollectionCommit,
                row(State::Active, &[("collection_id", "7"), ("updated_on", "100")]),
            )
            .await
            .unwrap();
        let newer = store
            .create(
                ResourceKind::CollectionCommit,
                row(State::Active, &[("collection_id", "8"), ("updated_on", "250")]),
            )
            .await
            .unwrap();

        let (pairs, latest) = store.get_all_active_snapshot_ids(100).await.unwrap();
        assert_eq!(pairs, vec![(8, newer)], "{name}: low bound is exclusive");
        assert_eq!(latest, 250, "{name}");
    }
}

#[tokio::test]
async fn inactive_resources_grouped_by_kind() {
    for (name, store, _dir) in backends().await {
        store
            .create(ResourceKind::Segment, row(State::Deactive, &[]))
            .await
            .unwrap();
        store
            .create(ResourceKind::Segment, row(State::Active, &[]))
            .await
            .unwrap();
        store
            .create(ResourceKind::SegmentFile, row(State::Pending, &[]))
            .await
            .unwrap();

        let grouped = store.get_inactive_resources().await.unwrap();
        let segments: Vec<Id> = grouped
            .iter()
            .find(|(k, _)| *k == ResourceKind::Segment)
            .map(|(_, ids)| ids.clone())
            .unwrap();
        assert_eq!(segments, vec![1], "{name}: active rows are not GC input");
        assert!(
            grouped.iter().any(|(k, _)| *k == ResourceKind::SegmentFile),
            "{name}: pending rows are GC input"
        );
    }
}

#[tokio::test]
async fn apply_operation_runs_rows_in_order() {
    for (name, store, _dir) in backends().await {
        let id = store
            .create(ResourceKind::PartitionCommit, row(State::Pending, &[]))
            .await
            .unwrap();

        store
            .apply_operation(vec![
                RowContext::update(ResourceKind::PartitionCommit, id, row(State::Active, &[])),
                RowContext::add(ResourceKind::Partition, row(State::Active, &[("name", "p")])),
            ])
            .await
            .unwrap();

        let got = store.get(ResourceKind::PartitionCommit, id).await.unwrap();
        assert_eq!(got.get(attr::STATE).unwrap(), "ACTIVE", "{name}");
        assert_eq!(
            store.get_collection_ids(false).await.unwrap().len(),
            0,
            "{name}: partition rows never leak into collection queries"
        );
        assert!(
            store.get(ResourceKind::Partition, 1).await.is_ok(),
            "{name}: batched add landed"
        );
    }
}

#[tokio::test]
async fn remove_is_physical_delete() {
    for (name, store, _dir) in backends().await {
        let id = store
            .create(ResourceKind::FieldElement, row(State::Deactive, &[]))
            .await
            .unwrap();
        store.remove(ResourceKind::FieldElement, id).await.unwrap();
        assert!(
            store.get(ResourceKind::FieldElement, id).await.is_err(),
            "{name}"
        );
        assert!(
            store.remove(ResourceKind::FieldElement, id).await.is_err(),
            "{name}: double delete errors"
        );
    }
}
