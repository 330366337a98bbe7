//! Schema definitions for the metadata tables.
//!
//! One table per resource kind, one column per attribute. The per-kind
//! attribute tables defined here are the single source of truth for the
//! attribute codec and for the column layout of every back-end.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Attribute (column) names. Shared by every kind that carries the
/// corresponding capability.
pub mod attr {
    pub const ID: &str = "id";
    pub const COLLECTION_ID: &str = "collection_id";
    pub const SCHEMA_ID: &str = "schema_id";
    pub const PARTITION_ID: &str = "partition_id";
    pub const SEGMENT_ID: &str = "segment_id";
    pub const FIELD_ID: &str = "field_id";
    pub const FIELD_ELEMENT_ID: &str = "field_element_id";
    pub const NAME: &str = "name";
    pub const TYPE_NAME: &str = "type_name";
    pub const NUM: &str = "num";
    pub const FTYPE: &str = "ftype";
    pub const FETYPE: &str = "fetype";
    pub const LSN: &str = "lsn";
    pub const SIZE: &str = "size";
    pub const ROW_COUNT: &str = "row_count";
    pub const MAPPINGS: &str = "mappings";
    pub const PARAMS: &str = "params";
    pub const STATE: &str = "state";
    pub const CREATED_ON: &str = "created_on";
    pub const UPDATED_ON: &str = "updated_on";
}

/// The ten persisted resource kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ResourceKind {
    Collection,
    CollectionCommit,
    Partition,
    PartitionCommit,
    Segment,
    SegmentCommit,
    SegmentFile,
    SchemaCommit,
    Field,
    FieldElement,
}

impl ResourceKind {
    /// Every kind, in GC-safe removal order (leaves last is not required;
    /// physical removal is per-row).
    pub const ALL: [ResourceKind; 10] = [
        ResourceKind::Collection,
        ResourceKind::CollectionCommit,
        ResourceKind::Partition,
        ResourceKind::PartitionCommit,
        ResourceKind::Segment,
        ResourceKind::SegmentCommit,
        ResourceKind::SegmentFile,
        ResourceKind::SchemaCommit,
        ResourceKind::Field,
        ResourceKind::FieldElement,
    ];

    /// Canonical table (and directory) name.
    pub fn table_name(&self) -> &'static str {
        match self {
            ResourceKind::Collection => "collection",
            ResourceKind::CollectionCommit => "collection_commit",
            ResourceKind::Partition => "partition",
            ResourceKind::PartitionCommit => "partition_commit",
            ResourceKind::Segment => "segment",
            ResourceKind::SegmentCommit => "segment_commit",
            ResourceKind::SegmentFile => "segment_file",
            ResourceKind::SchemaCommit => "schema_commit",
            ResourceKind::Field => "field",
            ResourceKind::FieldElement => "field_element",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.table_name())
    }
}

impl FromStr for ResourceKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ResourceKind::ALL
            .iter()
            .copied()
            .find(|k| k.table_name() == s)
            .ok_or_else(|| format!("unknown resource kind: {s}"))
    }
}

/// Resource lifecycle state, stored as its enumerant name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum State {
    #[default]
    Pending,
    Active,
    Deactive,
}

impl State {
    pub fn as_str(&self) -> &'static str {
        match self {
            State::Pending => "PENDING",
            State::Active => "ACTIVE",
            State::Deactive => "DEACTIVE",
        }
    }
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for State {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(State::Pending),
            "ACTIVE" => Ok(State::Active),
            "DEACTIVE" => Ok(State::Deactive),
            other => Err(format!("invalid state value: {other}")),
        }
    }
}

/// Canonical attribute order for a kind. `id` is always first; the rest is
/// the order columns appear in the persistence layer.
pub fn resource_attrs_of(kind: ResourceKind) -> &'static [&'static str] {
    use attr::*;
    match kind {
        ResourceKind::Collection => &[ID, NAME, PARAMS, STATE, CREATED_ON, UPDATED_ON],
        ResourceKind::CollectionCommit => &[
            ID,
            COLLECTION_ID,
            SCHEMA_ID,
            MAPPINGS,
            ROW_COUNT,
            SIZE,
            LSN,
            STATE,
            CREATED_ON,
            UPDATED_ON,
        ],
        ResourceKind::Partition => &[ID, NAME, COLLECTION_ID, LSN, STATE, CREATED_ON, UPDATED_ON],
        ResourceKind::PartitionCommit => &[
            ID,
            COLLECTION_ID,
            PARTITION_ID,
            MAPPINGS,
            ROW_COUNT,
            SIZE,
            LSN,
            STATE,
            CREATED_ON,
            UPDATED_ON,
        ],
        ResourceKind::Segment => &[
            ID,
            COLLECTION_ID,
            PARTITION_ID,
            NUM,
            LSN,
            STATE,
            CREATED_ON,
            UPDATED_ON,
        ],
        ResourceKind::SegmentCommit => &[
            ID,
            SCHEMA_ID,
            PARTITION_ID,
            SEGMENT_ID,
            MAPPINGS,
            ROW_COUNT,
            SIZE,
            LSN,
            STATE,
            CREATED_ON,
            UPDATED_ON,
        ],
        ResourceKind::SegmentFile => &[
            ID,
            COLLECTION_ID,
            PARTITION_ID,
            SEGMENT_ID,
            FIELD_ELEMENT_ID,
            FTYPE,
            LSN,
            SIZE,
            ROW_COUNT,
            MAPPINGS,
            STATE,
            CREATED_ON,
            UPDATED_ON,
        ],
        ResourceKind::SchemaCommit => &[ID, COLLECTION_ID, MAPPINGS, STATE, CREATED_ON, UPDATED_ON],
        ResourceKind::Field => &[
            ID,
            NAME,
            NUM,
            FTYPE,
            PARAMS,
            MAPPINGS,
            STATE,
            CREATED_ON,
            UPDATED_ON,
        ],
        ResourceKind::FieldElement => &[
            ID,
            COLLECTION_ID,
            FIELD_ID,
            NAME,
            FETYPE,
            FTYPE,
            TYPE_NAME,
            PARAMS,
            STATE,
            CREATED_ON,
            UPDATED_ON,
        ],
    }
}

/// Whether `name` is a column of `kind`.
pub fn has_attr(kind: ResourceKind, name: &str) -> bool {
    resource_attrs_of(kind).contains(&name)
}
