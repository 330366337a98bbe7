//! The typed resource model.
//!
//! Each of the ten persisted kinds is a record with concrete fields; shared
//! capabilities (`id`, `state`, timestamps) are exposed through [`Lifecycle`]
//! and the per-attribute accessors of [`MetaResource`] that the attribute
//! codec dispatches through. The per-kind attribute tables in
//! `vecmeta_store::schema` are the single source of truth for which
//! attributes a kind exhibits.

pub mod codec;
pub mod context;
pub mod fields;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use vecmeta_store::{now_us, Id, Lsn, ResourceKind, State, Ts};

use crate::error::MetaResult;
pub use fields::{FieldElementType, FieldType, Mappings};

/// Shared lifecycle capabilities: identity, state machine, timestamps.
pub trait Lifecycle {
    fn id(&self) -> Id;
    fn set_id(&mut self, id: Id);

    fn state(&self) -> State;
    fn activate(&mut self);
    fn deactivate(&mut self);
    fn reset_state(&mut self);

    fn created_on(&self) -> Ts;
    fn set_created_on(&mut self, ts: Ts);
    fn updated_on(&self) -> Ts;
    fn set_updated_on(&mut self, ts: Ts);

    /// Advance `updated_on` to now. Never regresses.
    fn touch(&mut self) {
        let now = now_us().max(self.updated_on());
        self.set_updated_on(now);
    }
}

/// A persisted resource: a [`Lifecycle`] record with per-attribute string
/// accessors, dispatched by the attribute codec over the kind's table.
pub trait MetaResource: Lifecycle + Clone + Default + Send + Sync + 'static {
    const KIND: ResourceKind;

    /// Encode one attribute of this resource per the codec rules.
    fn attr_value(&self, attr: &str) -> MetaResult<String>;

    /// Decode and assign one attribute. `state` drives the transition API.
    fn set_attr(&mut self, attr: &str, value: &str) -> MetaResult<()>;
}

macro_rules! impl_lifecycle {
    ($ty:ty) => {
        impl Lifecycle for $ty {
            fn id(&self) -> Id {
                self.id
            }
            fn set_id(&mut self, id: Id) {
                self.id = id;
            }
            fn state(&self) -> State {
                self.state
            }
            fn activate(&mut self) {
                self.state = State::Active;
            }
            fn deactivate(&mut self) {
                self.state = State::Deactive;
            }
            fn reset_state(&mut self) {
                self.state = State::Pending;
            }
            fn created_on(&self) -> Ts {
                self.created_on
            }
            fn set_created_on(&mut self, ts: Ts) {
                self.created_on = ts;
            }
            fn updated_on(&self) -> Ts {
                self.updated_on
            }
            fn set_updated_on(&mut self, ts: Ts) {
                self.updated_on = ts;
            }
        }
    };
}

fn fresh_ts() -> Ts {
    now_us()
}

/// Top-level container. `name` is globally unique among active collections.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Collection {
    pub id: Id,
    pub name: String,
    pub params: Value,
    pub state: State,
    pub created_on: Ts,
    pub updated_on: Ts,
}

impl Collection {
    pub fn new(name: impl Into<String>, params: Value) -> Self {
        let now = fresh_ts();
        Collection {
            id: 0,
            name: name.into(),
            params,
            state: State::Pending,
            created_on: now,
            updated_on: now,
        }
    }
}

/// Snapshot root. `mappings` are the PartitionCommit ids of this version.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CollectionCommit {
    pub id: Id,
    pub collection_id: Id,
    pub schema_id: Id,
    pub mappings: Mappings,
    pub row_count: u64,
    pub size: u64,
    pub lsn: Lsn,
    pub state: State,
    pub created_on: Ts,
    pub updated_on: Ts,
}

impl CollectionCommit {
    pub fn new(collection_id: Id, schema_id: Id, mappings: Mappings, lsn: Lsn) -> Self {
        let now = fresh_ts();
        CollectionCommit {
            id: 0,
            collection_id,
            schema_id,
            mappings,
            row_count: 0,
            size: 0,
            lsn,
            state: State::Pending,
            created_on: now,
            updated_on: now,
        }
    }
}

/// Named subdivision of a collection.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Partition {
    pub id: Id,
    pub name: String,
    pub collection_id: Id,
    pub lsn: Lsn,
    pub state: State,
    pub created_on: Ts,
    pub updated_on: Ts,
}

impl Partition {
    pub fn new(name: impl Into<String>, collection_id: Id, lsn: Lsn) -> Self {
        let now = fresh_ts();
        Partition {
            id: 0,
            name: name.into(),
            collection_id,
            lsn,
            state: State::Pending,
            created_on: now,
            updated_on: now,
        }
    }
}

/// Partition snapshot root. `mappings` are SegmentCommit ids.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PartitionCommit {
    pub id: Id,
    pub collection_id: Id,
    pub partition_id: Id,
    pub mappings: Mappings,
    pub row_count: u64,
    pub size: u64,
    pub lsn: Lsn,
    pub state: State,
    pub created_on: Ts,
    pub updated_on: Ts,
}

impl PartitionCommit {
    pub fn new(collection_id: Id, partition_id: Id, mappings: Mappings, lsn: Lsn) -> Self {
        let now = fresh_ts();
        PartitionCommit {
            id: 0,
            collection_id,
            partition_id,
            mappings,
            row_count: 0,
            size: 0,
            lsn,
            state: State::Pending,
            created_on: now,
            updated_on: now,
        }
    }
}

/// An indivisible data unit within a partition. `num` is its ordinal.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    pub id: Id,
    pub collection_id: Id,
    pub partition_id: Id,
    pub num: i64,
    pub lsn: Lsn,
    pub state: State,
    pub created_on: Ts,
    pub updated_on: Ts,
}

impl Segment {
    pub fn new(collection_id: Id, partition_id: Id, num: i64, lsn: Lsn) -> Self {
        let now = fresh_ts();
        Segment {
            id: 0,
            collection_id,
            partition_id,
            num,
            lsn,
            state: State::Pending,
            created_on: now,
            updated_on: now,
        }
    }
}

/// Segment snapshot root. `mappings` are SegmentFile ids.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SegmentCommit {
    pub id: Id,
    pub schema_id: Id,
    pub partition_id: Id,
    pub segment_id: Id,
    pub mappings: Mappings,
    pub row_count: u64,
    pub size: u64,
    pub lsn: Lsn,
    pub state: State,
    pub created_on: Ts,
    pub updated_on: Ts,
}

impl SegmentCommit {
    pub fn new(schema_id: Id, partition_id: Id, segment_id: Id, mappings: Mappings, lsn: Lsn) -> Self {
        let now = fresh_ts();
        SegmentCommit {
            id: 0,
            schema_id,
            partition_id,
            segment_id,
            mappings,
            row_count: 0,
            size: 0,
            lsn,
            state: State::Pending,
            created_on: now,
            updated_on: now,
        }
    }
}

/// A physical artifact of one field element within a segment.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SegmentFile {
    pub id: Id,
    pub collection_id: Id,
    pub partition_id: Id,
    pub segment_id: Id,
    pub field_element_id: Id,
    pub ftype: FieldType,
    pub lsn: Lsn,
    pub size: u64,
    pub row_count: u64,
    pub mappings: Mappings,
    pub state: State,
    pub created_on: Ts,
    pub updated_on: Ts,
}

impl SegmentFile {
    pub fn new(collection_id: Id, partition_id: Id, field_element_id: Id, ftype: FieldType) -> Self {
        let now = fresh_ts();
        SegmentFile {
            id: 0,
            collection_id,
            partition_id,
            segment_id: 0,
            field_element_id,
            ftype,
            lsn: 0,
            size: 0,
            row_count: 0,
            mappings: Mappings::default(),
            state: State::Pending,
            created_on: now,
            updated_on: now,
        }
    }
}

/// Schema version root. `mappings` are Field ids.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SchemaCommit {
    pub id: Id,
    pub collection_id: Id,
    pub mappings: Mappings,
    pub state: State,
    pub created_on: Ts,
    pub updated_on: Ts,
}

impl SchemaCommit {
    pub fn new(collection_id: Id, mappings: Mappings) -> Self {
        let now = fresh_ts();
        SchemaCommit {
            id: 0,
            collection_id,
            mappings,
            state: State::Pending,
            created_on: now,
            updated_on: now,
        }
    }
}

/// Typed named column. `num` is the column ordinal; `mappings` are
/// FieldElement ids.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Field {
    pub id: Id,
    pub name: String,
    pub num: i64,
    pub ftype: FieldType,
    pub params: Value,
    pub mappings: Mappings,
    pub state: State,
    pub created_on: Ts,
    pub updated_on: Ts,
}

impl Field {
    pub fn new(name: impl Into<String>, num: i64, ftype: FieldType, params: Value) -> Self {
        let now = fresh_ts();
        Field {
            id: 0,
            name: name.into(),
            num,
            ftype,
            params,
            mappings: Mappings::default(),
            state: State::Pending,
            created_on: now,
            updated_on: now,
        }
    }
}

/// A per-field artifact kind (raw data, index, statistics).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FieldElement {
    pub id: Id,
    pub collection_id: Id,
    pub field_id: Id,
    pub name: String,
    pub fetype: FieldElementType,
    pub ftype: FieldType,
    pub type_name: String,
    pub params: Value,
    pub state: State,
    pub created_on: Ts,
    pub updated_on: Ts,
}

impl FieldElement {
    pub fn new(
        collection_id: Id,
        field_id: Id,
        name: impl Into<String>,
        fetype: FieldElementType,
    ) -> Self {
        let now = fresh_ts();
        FieldElement {
            id: 0,
            collection_id,
            field_id,
            name: name.into(),
            fetype,
            ftype: FieldType::None,
            type_name: String::new(),
            params: Value::Null,
            state: State::Pending,
            created_on: now,
            updated_on: now,
        }
    }
}

impl_lifecycle!(Collection);
impl_lifecycle!(CollectionCommit);
impl_lifecycle!(Partition);
impl_lifecycle!(PartitionCommit);
impl_lifecycle!(Segment);
impl_lifecycle!(SegmentCommit);
impl_lifecycle!(SegmentFile);
impl_lifecycle!(SchemaCommit);
impl_lifecycle!(Field);
impl_lifecycle!(FieldElement);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_resources_start_pending_with_timestamps() {
        let collection = Collection::new("c1", serde_json::json!({"dim": 128}));
        assert_eq!(collection.state(), State::Pending);
        assert_eq!(collection.created_on(), collection.updated_on());
        assert!(collection.created_on() > 0);
    }

    #[test]
    fn touch_never_regresses() {
        let mut segment = Segment::new(1, 2, 0, 0);
        segment.set_updated_on(i64::MAX - 1);
        segment.touch();
        assert_eq!(segment.updated_on(), i64::MAX - 1);
    }

    #[test]
    fn state_transitions() {
        let mut partition = Partition::new("p1", 1, 0);
        partition.activate();
        assert_eq!(partition.state(), State::Active);
        partition.deactivate();
        assert_eq!(partition.state(), State::Deactive);
        partition.reset_state();
        assert_eq!(partition.state(), State::Pending);
    }
}
