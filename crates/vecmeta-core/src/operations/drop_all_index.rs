//! Retire every index element of the collection, along with the segment
//! files built from them. Every commit-root tier along an affected path is
//! rewritten as a fresh row with corrected mappings and totals; the old
//! rows are retired, never edited.

use std::collections::BTreeSet;

use async_trait::async_trait;

use vecmeta_store::schema::attr;
use vecmeta_store::{Id, Store};

use super::{ensure_not_stale, CommitPipeline, Operation, OperationContext};
use crate::error::MetaResult;
use crate::registry::SnapshotRegistry;
use crate::resource::{
    CollectionCommit, FieldElementType, Mappings, PartitionCommit, SegmentCommit,
};
use crate::snapshot::ScopedSnapshot;

pub struct DropAllIndexOperation {
    context: OperationContext,
    base: ScopedSnapshot,
}

impl DropAllIndexOperation {
    pub fn new(context: OperationContext, base: ScopedSnapshot) -> Self {
        DropAllIndexOperation { context, base }
    }
}

#[async_trait]
impl Operation for DropAllIndexOperation {
    fn name(&self) -> &'static str {
        "drop_all_index"
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
        let dropped: BTreeSet<Id> = self
            .base
            .field_elements()
            .filter(|e| e.fetype == FieldElementType::Index)
            .map(|e| e.id)
            .collect();
        if dropped.is_empty() {
            // Nothing indexed; the base snapshot stays as-is.
            return Ok(Some(self.base.id()));
        }

        let mut pipeline = CommitPipeline::new(store);

        // Fields shed the dropped ids through their flushable mappings; the
        // field rows themselves are stable (elements reference them by id).
        for field in self.base.fields() {
            if !field.mappings.ids().iter().any(|id| dropped.contains(id)) {
                continue;
            }
            let mut flushed = field.clone();
            flushed.mappings = Mappings::from_ids(
                field
                    .mappings
                    .ids()
                    .iter()
                    .copied()
                    .filter(|id| !dropped.contains(id)),
            );
            pipeline.stage(&flushed, [attr::MAPPINGS])?;
        }
        for element_id in &dropped {
            if let Some(element) = self.base.field_element(*element_id) {
                pipeline.retire(element);
            }
        }

        // Rewrite every affected segment commit as a fresh row, then roll a
        // fresh partition commit per touched partition; untouched tiers keep
        // their existing rows.
        let mut removed_rows: u64 = 0;
        let mut removed_bytes: u64 = 0;
        let mut kept_pc_ids: Vec<Id> = Vec::new();
        let mut new_pc_ids: Vec<Id> = Vec::new();
        for pc in self.base.partition_commits() {
            let mut kept_sc_ids: Vec<Id> = Vec::new();
            let mut new_sc_ids: Vec<Id> = Vec::new();
            let mut pc_rows = pc.row_count;
            let mut pc_bytes = pc.size;
            for sc_id in pc.mappings.ids() {
                let Some(sc) = self.base.segment_commit(*sc_id) else {
                    continue;
                };
                let stale_files: Vec<_> = sc
                    .mappings
                    .ids()
                    .iter()
                    .filter_map(|id| self.base.segment_file(*id))
                    .filter(|f| dropped.contains(&f.field_element_id))
                    .collect();
                if stale_files.is_empty() {
                    kept_sc_ids.push(*sc_id);
                    continue;
                }
                let rows: u64 = stale_files.iter().map(|f| f.row_count).sum();
                let bytes: u64 = stale_files.iter().map(|f| f.size).sum();
                removed_rows += rows;
                removed_bytes += bytes;
                pc_rows = pc_rows.saturating_sub(rows);
                pc_bytes = pc_bytes.saturating_sub(bytes);

                let stale_ids: BTreeSet<Id> = stale_files.iter().map(|f| f.id).collect();
                let mut new_sc = SegmentCommit::new(
                    sc.schema_id,
                    sc.partition_id,
                    sc.segment_id,
                    Mappings::from_ids(
                        sc.mappings
                            .ids()
                            .iter()
                            .copied()
                            .filter(|id| !stale_ids.contains(id)),
                    ),
                    lsn,
                );
                new_sc.row_count = sc.row_count.saturating_sub(rows);
                new_sc.size = sc.size.saturating_sub(bytes);
                new_sc_ids.push(pipeline.create(&mut new_sc).await?);

                pipeline.retire(sc);
                for file in stale_files {
                    pipeline.retire(file);
                }
            }
            if new_sc_ids.is_empty() {
                kept_pc_ids.push(pc.id);
                continue;
            }

            let mut pc_mappings = Mappings::from_ids(kept_sc_ids);
            for sc_id in new_sc_ids {
                pc_mappings.stage(sc_id);
            }
            let mut new_pc = PartitionCommit::new(collection_id, pc.partition_id, pc_mappings, lsn);
            new_pc.row_count = pc_rows;
            new_pc.size = pc_bytes;
            new_pc_ids.push(pipeline.create(&mut new_pc).await?);
            pipeline.retire(pc);
        }

        let mut cc_mappings = Mappings::from_ids(kept_pc_ids);
        for pc_id in new_pc_ids {
            cc_mappings.stage(pc_id);
        }
        let mut commit = CollectionCommit::new(
            collection_id,
            self.base.commit().schema_id,
            cc_mappings,
            lsn,
        );
        commit.row_count = self.base.row_count().saturating_sub(removed_rows);
        commit.size = self.base.size().saturating_sub(removed_bytes);
        let commit_id = pipeline.create(&mut commit).await?;

        ensure_not_stale(registry, collection_id, self.base.id())?;
        pipeline.retire(self.base.commit());
        pipeline.commit().await?;
        Ok(Some(commit_id))
    }
}
