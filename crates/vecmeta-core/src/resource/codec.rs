//! Attribute codec: bidirectional mapping between typed resources and the
//! flat string-keyed attribute maps the Store persists.
//!
//! Encoding rules: integers and unsigned integers as decimal; `state` as its
//! enumerant name; `mappings` as a comma-delimited list of decimals (empty
//! set ⇔ empty string), always the flush view; `name`/`type_name` verbatim;
//! `params` as canonical JSON (`{}` when absent); `ftype`/`fetype` as their
//! decimal codes. Round-trip is lossless for every scalar and for `mappings`
//! as an unordered set.

use std::collections::BTreeSet;

use serde_json::Value;

use vecmeta_store::schema::attr;
use vecmeta_store::{has_attr, resource_attrs_of, AttrMap, Id, Lsn, State, Ts};

use super::fields::{FieldElementType, FieldType, Mappings};
use super::{
    Collection, CollectionCommit, Field, FieldElement, Lifecycle, MetaResource, Partition,
    PartitionCommit, SchemaCommit, Segment, SegmentCommit, SegmentFile,
};
use crate::error::{MetaError, MetaResult};
use vecmeta_store::ResourceKind;

// ---------------------------------------------------------------------------
// Map-level entry points
// ---------------------------------------------------------------------------

/// Encode a resource for insertion: every attribute of its kind except `id`
/// (the store allocates that).
pub fn insert_attr_map<R: MetaResource>(resource: &R) -> MetaResult<AttrMap> {
    let mut map = AttrMap::new();
    for name in resource_attrs_of(R::KIND) {
        if *name == attr::ID {
            continue;
        }
        map.insert((*name).to_string(), resource.attr_value(name)?);
    }
    Ok(map)
}

/// Encode exactly the listed attributes (the touched set of an UPDATE).
pub fn update_attr_map<R: MetaResource>(
    resource: &R,
    attrs: &BTreeSet<String>,
) -> MetaResult<AttrMap> {
    let mut map = AttrMap::new();
    for name in attrs {
        if !has_attr(R::KIND, name) {
            return Err(MetaError::UnknownAttribute {
                kind: R::KIND,
                attr: name.clone(),
            });
        }
        map.insert(name.clone(), resource.attr_value(name)?);
    }
    Ok(map)
}

/// Decode every attribute of the kind's table that is present in `map` into
/// `resource`. Attributes absent from the map are left untouched.
pub fn attr_map_to_resource<R: MetaResource>(map: &AttrMap, resource: &mut R) -> MetaResult<()> {
    for name in resource_attrs_of(R::KIND) {
        if let Some(value) = map.get(*name) {
            resource.set_attr(name, value)?;
        }
    }
    Ok(())
}

/// Decode a fresh resource from a row.
pub fn resource_from_attr_map<R: MetaResource>(map: &AttrMap) -> MetaResult<R> {
    let mut resource = R::default();
    attr_map_to_resource(map, &mut resource)?;
    Ok(resource)
}

// ---------------------------------------------------------------------------
// Value codecs
// ---------------------------------------------------------------------------

fn parse_i64(name: &str, value: &str) -> MetaResult<i64> {
    value
        .parse()
        .map_err(|_| MetaError::malformed(name, value))
}

fn parse_u64(name: &str, value: &str) -> MetaResult<u64> {
    value
        .parse()
        .map_err(|_| MetaError::malformed(name, value))
}

fn parse_mappings(name: &str, value: &str) -> MetaResult<Mappings> {
    if value.is_empty() {
        return Ok(Mappings::default());
    }
    let mut ids = BTreeSet::new();
    for part in value.split(',') {
        ids.insert(parse_i64(name, part)? as Id);
    }
    Ok(Mappings::from_ids(ids))
}

fn parse_params(name: &str, value: &str) -> MetaResult<Value> {
    serde_json::from_str(value).map_err(|_| MetaError::malformed(name, value))
}

fn parse_ftype(name: &str, value: &str) -> MetaResult<FieldType> {
    FieldType::from_code(parse_i64(name, value)?).ok_or_else(|| MetaError::malformed(name, value))
}

fn parse_fetype(name: &str, value: &str) -> MetaResult<FieldElementType> {
    FieldElementType::from_code(parse_i64(name, value)?)
        .ok_or_else(|| MetaError::malformed(name, value))
}

fn encode_mappings(mappings: &Mappings) -> String {
    mappings
        .flush_view()
        .iter()
        .map(|id| id.to_string())
        .collect::<Vec<_>>()
        .join(",")
}

fn encode_params(params: &Value) -> String {
    if params.is_null() {
        "{}".to_string()
    } else {
        params.to_string()
    }
}

/// `state` drives the transition API rather than direct assignment: reset,
/// then activate/deactivate per the decoded enumerant.
fn apply_state_attr(resource: &mut impl Lifecycle, value: &str) -> MetaResult<()> {
    let state: State = value
        .parse()
        .map_err(|_| MetaError::malformed(attr::STATE, value))?;
    resource.reset_state();
    match state {
        State::Pending => {}
        State::Active => resource.activate(),
        State::Deactive => resource.deactivate(),
    }
    Ok(())
}

fn unknown<T>(kind: ResourceKind, name: &str) -> MetaResult<T> {
    Err(MetaError::UnknownAttribute {
        kind,
        attr: name.to_string(),
    })
}

// ---------------------------------------------------------------------------
// Per-kind dispatch
// ---------------------------------------------------------------------------

impl MetaResource for Collection {
    const KIND: ResourceKind = ResourceKind::Collection;

    fn attr_value(&self, name: &str) -> MetaResult<String> {
        match name {
            attr::ID => Ok(self.id.to_string()),
            attr::NAME => Ok(self.name.clone()),
            attr::PARAMS => Ok(encode_params(&self.params)),
            attr::STATE => Ok(self.state.as_str().to_string()),
            attr::CREATED_ON => Ok(self.created_on.to_string()),
            attr::UPDATED_ON => Ok(self.updated_on.to_string()),
            _ => unknown(Self::KIND, name),
        }
    }

    fn set_attr(&mut self, name: &str, value: &str) -> MetaResult<()> {
        match name {
            attr::ID => self.id = parse_i64(name, value)?,
            attr::NAME => self.name = value.to_string(),
            attr::PARAMS => self.params = parse_params(name, value)?,
            attr::STATE => apply_state_attr(self, value)?,
            attr::CREATED_ON => self.created_on = parse_i64(name, value)? as Ts,
            attr::UPDATED_ON => self.updated_on = parse_i64(name, value)? as Ts,
            _ => return unknown(Self::KIND, name),
        }
        Ok(())
    }
}

impl MetaResource for CollectionCommit {
    const KIND: ResourceKind = ResourceKind::CollectionCommit;

    fn attr_value(&self, name: &str) -> MetaResult<String> {
        match name {
            attr::ID => Ok(self.id.to_string()),
            attr::COLLECTION_ID => Ok(self.collection_id.to_string()),
            attr::SCHEMA_ID => Ok(self.schema_id.to_string()),
            attr::MAPPINGS => Ok(encode_mappings(&self.mappings)),
            attr::ROW_COUNT => Ok(self.row_count.to_string()),
            attr::SIZE => Ok(self.size.to_string()),
            attr::LSN => Ok(self.lsn.to_string()),
            attr::STATE => Ok(self.state.as_str().to_string()),
            attr::CREATED_ON => Ok(self.created_on.to_string()),
            attr::UPDATED_ON => Ok(self.updated_on.to_string()),
            _ => unknown(Self::KIND, name),
        }
    }

    fn set_attr(&mut self, name: &str, value: &str) -> MetaResult<()> {
        match name {
            attr::ID => self.id = parse_i64(name, value)?,
            attr::COLLECTION_ID => self.collection_id = parse_i64(name, value)?,
            attr::SCHEMA_ID => self.schema_id = parse_i64(name, value)?,
            attr::MAPPINGS => self.mappings = parse_mappings(name, value)?,
            attr::ROW_COUNT => self.row_count = parse_u64(name, value)?,
            attr::SIZE => self.size = parse_u64(name, value)?,
            attr::LSN => self.lsn = parse_u64(name, value)? as Lsn,
            attr::STATE => apply_state_attr(self, value)?,
            attr::CREATED_ON => self.created_on = parse_i64(name, value)?,
            attr::UPDATED_ON => self.updated_on = parse_i64(name, value)?,
            _ => return unknown(Self::KIND, name),
        }
        Ok(())
    }
}

impl MetaResource for Partition {
    const KIND: ResourceKind = ResourceKind::Partition;

    fn attr_value(&self, name: &str) -> MetaResult<String> {
        match name {
            attr::ID => Ok(self.id.to_string()),
            attr::NAME => Ok(self.name.clone()),
            attr::COLLECTION_ID => Ok(self.collection_id.to_string()),
            attr::LSN => Ok(self.lsn.to_string()),
            attr::STATE => Ok(self.state.as_str().to_string()),
            attr::CREATED_ON => Ok(self.created_on.to_string()),
            attr::UPDATED_ON => Ok(self.updated_on.to_string()),
            _ => unknown(Self::KIND, name),
        }
    }

    fn set_attr(&mut self, name: &str, value: &str) -> MetaResult<()> {
        match name {
            attr::ID => self.id = parse_i64(name, value)?,
            attr::NAME => self.name = value.to_string(),
            attr::COLLECTION_ID => self.collection_id = parse_i64(name, value)?,
            attr::LSN => self.lsn = parse_u64(name, value)?,
            attr::STATE => apply_state_attr(self, value)?,
            attr::CREATED_ON => self.created_on = parse_i64(name, value)?,
            attr::UPDATED_ON => self.updated_on = parse_i64(name, value)?,
            _ => return unknown(Self::KIND, name),
        }
        Ok(())
    }
}

impl MetaResource for PartitionCommit {
    const KIND: ResourceKind = ResourceKind::PartitionCommit;

    fn attr_value(&self, name: &str) -> MetaResult<String> {
        match name {
            attr::ID => Ok(self.id.to_string()),
            attr::COLLECTION_ID => Ok(self.collection_id.to_string()),
            attr::PARTITION_ID => Ok(self.partition_id.to_string()),
            attr::MAPPINGS => Ok(encode_mappings(&self.mappings)),
            attr::ROW_COUNT => Ok(self.row_count.to_string()),
            attr::SIZE => Ok(self.size.to_string()),
            attr::LSN => Ok(self.lsn.to_string()),
            attr::STATE => Ok(self.state.as_str().to_string()),
            attr::CREATED_ON => Ok(self.created_on.to_string()),
            attr::UPDATED_ON => Ok(self.updated_on.to_string()),
            _ => unknown(Self::KIND, name),
        }
    }

    fn set_attr(&mut self, name: &str, value: &str) -> MetaResult<()> {
        match name {
            attr::ID => self.id = parse_i64(name, value)?,
            attr::COLLECTION_ID => self.collection_id = parse_i64(name, value)?,
            attr::PARTITION_ID => self.partition_id = parse_i64(name, value)?,
            attr::MAPPINGS => self.mappings = parse_mappings(name, value)?,
            attr::ROW_COUNT => self.row_count = parse_u64(name, value)?,
            attr::SIZE => self.size = parse_u64(name, value)?,
            attr::LSN => self.lsn = parse_u64(name, value)?,
            attr::STATE => apply_state_attr(self, value)?,
            attr::CREATED_ON => self.created_on = parse_i64(name, value)?,
            attr::UPDATED_ON => self.updated_on = parse_i64(name, value)?,
            _ => return unknown(Self::KIND, name),
        }
        Ok(())
    }
}

impl MetaResource for Segment {
    const KIND: ResourceKind = ResourceKind::Segment;

    fn attr_value(&self, name: &str) -> MetaResult<String> {
        match name {
            attr::ID => Ok(self.id.to_string()),
            attr::COLLECTION_ID => Ok(self.collection_id.to_string()),
            attr::PARTITION_ID => Ok(self.partition_id.to_string()),
            attr::NUM => Ok(self.num.to_string()),
            attr::LSN => Ok(self.lsn.to_string()),
            attr::STATE => Ok(self.state.as_str().to_string()),
            attr::CREATED_ON => Ok(self.created_on.to_string()),
            attr::UPDATED_ON => Ok(self.updated_on.to_string()),
            _ => unknown(Self::KIND, name),
        }
    }

    fn set_attr(&mut self, name: &str, value: &str) -> MetaResult<()> {
        match name {
            attr::ID => self.id = parse_i64(name, value)?,
            attr::COLLECTION_ID => self.collection_id = parse_i64(name, value)?,
            attr::PARTITION_ID => self.partition_id = parse_i64(name, value)?,
            attr::NUM => self.num = parse_i64(name, value)?,
            attr::LSN => self.lsn = parse_u64(name, value)?,
            attr::STATE => apply_state_attr(self, value)?,
            attr::CREATED_ON => self.created_on = parse_i64(name, value)?,
            attr::UPDATED_ON => self.updated_on = parse_i64(name, value)?,
            _ => return unknown(Self::KIND, name),
        }
        Ok(())
    }
}

impl MetaResource for SegmentCommit {
    const KIND: ResourceKind = ResourceKind::SegmentCommit;

    fn attr_value(&self, name: &str) -> MetaResult<String> {
        match name {
            attr::ID => Ok(self.id.to_string()),
            attr::SCHEMA_ID => Ok(self.schema_id.to_string()),
            attr::PARTITION_ID => Ok(self.partition_id.to_string()),
            attr::SEGMENT_ID => Ok(self.segment_id.to_string()),
            attr::MAPPINGS => Ok(encode_mappings(&self.mappings)),
            attr::ROW_COUNT => Ok(self.row_count.to_string()),
            attr::SIZE => Ok(self.size.to_string()),
            attr::LSN => Ok(self.lsn.to_string()),
            attr::STATE => Ok(self.state.as_str().to_string()),
            attr::CREATED_ON => Ok(self.created_on.to_string()),
            attr::UPDATED_ON => Ok(self.updated_on.to_string()),
            _ => unknown(Self::KIND, name),
        }
    }

    fn set_attr(&mut self, name: &str, value: &str) -> MetaResult<()> {
        match name {
            attr::ID => self.id = parse_i64(name, value)?,
            attr::SCHEMA_ID => self.schema_id = parse_i64(name, value)?,
            attr::PARTITION_ID => self.partition_id = parse_i64(name, value)?,
            attr::SEGMENT_ID => self.segment_id = parse_i64(name, value)?,
            attr::MAPPINGS => self.mappings = parse_mappings(name, value)?,
            attr::ROW_COUNT => self.row_count = parse_u64(name, value)?,
            attr::SIZE => self.size = parse_u64(name, value)?,
            attr::LSN => self.lsn = parse_u64(name, value)?,
            attr::STATE => apply_state_attr(self, value)?,
            attr::CREATED_ON => self.created_on = parse_i64(name, value)?,
            attr::UPDATED_ON => self.updated_on = parse_i64(name, value)?,
            _ => return unknown(Self::KIND, name),
        }
        Ok(())
    }
}

impl MetaResource for SegmentFile {
    const KIND: ResourceKind = ResourceKind::SegmentFile;

    fn attr_value(&self, name: &str) -> MetaResult<String> {
        match name {
            attr::ID => Ok(self.id.to_string()),
            attr::COLLECTION_ID => Ok(self.collection_id.to_string()),
            attr::PARTITION_ID => Ok(self.partition_id.to_string()),
            attr::SEGMENT_ID => Ok(self.segment_id.to_string()),
            attr::FIELD_ELEMENT_ID => Ok(self.field_element_id.to_string()),
            attr::FTYPE => Ok(self.ftype.code().to_string()),
            attr::LSN => Ok(self.lsn.to_string()),
            attr::SIZE => Ok(self.size.to_string()),
            attr::ROW_COUNT => Ok(self.row_count.to_string()),
            attr::MAPPINGS => Ok(encode_mappings(&self.mappings)),
            attr::STATE => Ok(self.state.as_str().to_string()),
            attr::CREATED_ON => Ok(self.created_on.to_string()),
            attr::UPDATED_ON => Ok(self.updated_on.to_string()),
            _ => unknown(Self::KIND, name),
        }
    }

    fn set_attr(&mut self, name: &str, value: &str) -> MetaResult<()> {
        match name {
            attr::ID => self.id = parse_i64(name, value)?,
            attr::COLLECTION_ID => self.collection_id = parse_i64(name, value)?,
            attr::PARTITION_ID => self.partition_id = parse_i64(name, value)?,
            attr::SEGMENT_ID => self.segment_id = parse_i64(name, value)?,
            attr::FIELD_ELEMENT_ID => self.field_element_id = parse_i64(name, value)?,
            attr::FTYPE => self.ftype = parse_ftype(name, value)?,
            attr::LSN => self.lsn = parse_u64(name, value)?,
            attr::SIZE => self.size = parse_u64(name, value)?,
            attr::ROW_COUNT => self.row_count = parse_u64(name, value)?,
            attr::MAPPINGS => self.mappings = parse_mappings(name, value)?,
            attr::STATE => apply_state_attr(self, value)?,
            attr::CREATED_ON => self.created_on = parse_i64(name, value)?,
            attr::UPDATED_ON => self.updated_on = parse_i64(name, value)?,
            _ => return unknown(Self::KIND, name),
        }
        Ok(())
    }
}

impl MetaResource for SchemaCommit {
    const KIND: ResourceKind = ResourceKind::SchemaCommit;

    fn attr_value(&self, name: &str) -> MetaResult<String> {
        match name {
            attr::ID => Ok(self.id.to_string()),
            attr::COLLECTION_ID => Ok(self.collection_id.to_string()),
            attr::MAPPINGS => Ok(encode_mappings(&self.mappings)),
            attr::STATE => Ok(self.state.as_str().to_string()),
            attr::CREATED_ON => Ok(self.created_on.to_string()),
            attr::UPDATED_ON => Ok(self.updated_on.to_string()),
            _ => unknown(Self::KIND, name),
        }
    }

    fn set_attr(&mut self, name: &str, value: &str) -> MetaResult<()> {
        match name {
            attr::ID => self.id = parse_i64(name, value)?,
            attr::COLLECTION_ID => self.collection_id = parse_i64(name, value)?,
            attr::MAPPINGS => self.mappings = parse_mappings(name, value)?,
            attr::STATE => apply_state_attr(self, value)?,
            attr::CREATED_ON => self.created_on = parse_i64(name, value)?,
            attr::UPDATED_ON => self.updated_on = parse_i64(name, value)?,
            _ => return unknown(Self::KIND, name),
        }
        Ok(())
    }
}

impl MetaResource for Field {
    const KIND: ResourceKind = ResourceKind::Field;

    fn attr_value(&self, name: &str) -> MetaResult<String> {
        match name {
            attr::ID => Ok(self.id.to_string()),
            attr::NAME => Ok(self.name.clone()),
            attr::NUM => Ok(self.num.to_string()),
            attr::FTYPE => Ok(self.ftype.code().to_string()),
            attr::PARAMS => Ok(encode_params(&self.params)),
            attr::MAPPINGS => Ok(encode_mappings(&self.mappings)),
            attr::STATE => Ok(self.state.as_str().to_string()),
            attr::CREATED_ON => Ok(self.created_on.to_string()),
            attr::UPDATED_ON => Ok(self.updated_on.to_string()),
            _ => unknown(Self::KIND, name),
        }
    }

    fn set_attr(&mut self, name: &str, value: &str) -> MetaResult<()> {
        match name {
            attr::ID => self.id = parse_i64(name, value)?,
            attr::NAME => self.name = value.to_string(),
            attr::NUM => self.num = parse_i64(name, value)?,
            attr::FTYPE => self.ftype = parse_ftype(name, value)?,
            attr::PARAMS => self.params = parse_params(name, value)?,
            attr::MAPPINGS => self.mappings = parse_mappings(name, value)?,
            attr::STATE => apply_state_attr(self, value)?,
            attr::CREATED_ON => self.created_on = parse_i64(name, value)?,
            attr::UPDATED_ON => self.updated_on = parse_i64(name, value)?,
            _ => return unknown(Self::KIND, name),
        }
        Ok(())
    }
}

impl MetaResource for FieldElement {
    const KIND: ResourceKind = ResourceKind::FieldElement;

    fn attr_value(&self, name: &str) -> MetaResult<String> {
        match name {
            attr::ID => Ok(self.id.to_string()),
            attr::COLLECTION_ID => Ok(self.collection_id.to_string()),
            attr::FIELD_ID => Ok(self.field_id.to_string()),
            attr::NAME => Ok(self.name.clone()),
            attr::FETYPE => Ok(self.fetype.code().to_string()),
            attr::FTYPE => Ok(self.ftype.code().to_string()),
            attr::TYPE_NAME => Ok(self.type_name.clone()),
            attr::PARAMS => Ok(encode_params(&self.params)),
            attr::STATE => Ok(self.state.as_str().to_string()),
            attr::CREATED_ON => Ok(self.created_on.to_string()),
            attr::UPDATED_ON => Ok(self.updated_on.to_string()),
            _ => unknown(Self::KIND, name),
        }
    }

    fn set_attr(&mut self, name: &str, value: &str) -> MetaResult<()> {
        match name {
            attr::ID => self.id = parse_i64(name, value)?,
            attr::COLLECTION_ID => self.collection_id = parse_i64(name, value)?,
            attr::FIELD_ID => self.field_id = parse_i64(name, value)?,
            attr::NAME => self.name = value.to_string(),
            attr::FETYPE => self.fetype = parse_fetype(name, value)?,
            attr::FTYPE => self.ftype = parse_ftype(name, value)?,
            attr::TYPE_NAME => self.type_name = value.to_string(),
            attr::PARAMS => self.params = parse_params(name, value)?,
            attr::STATE => apply_state_attr(self, value)?,
            attr::CREATED_ON => self.created_on = parse_i64(name, value)?,
            attr::UPDATED_ON => self.updated_on = parse_i64(name, value)?,
            _ => return unknown(Self::KIND, name),
        }
        Ok(())
    }
}
