//! Field domains shared by the resource kinds: column data types, field
//! element kinds, and the id-set carried by commit roots.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use vecmeta_store::Id;

/// Data type of a typed column (`ftype`). Encoded as its decimal code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum FieldType {
    #[default]
    None,
    Bool,
    Int8,
    Int16,
    Int32,
    Int64,
    Float,
    Double,
    String,
    BinaryVector,
    FloatVector,
}

impl FieldType {
    pub fn code(&self) -> i64 {
        match self {
            FieldType::None => 0,
            FieldType::Bool => 1,
            FieldType::Int8 => 2,
            FieldType::Int16 => 3,
            FieldType::Int32 => 4,
            FieldType::Int64 => 5,
            FieldType::Float => 10,
            FieldType::Double => 11,
            FieldType::String => 20,
            FieldType::BinaryVector => 100,
            FieldType::FloatVector => 101,
        }
    }

    pub fn from_code(code: i64) -> Option<Self> {
        let ftype = match code {
            0 => FieldType::None,
            1 => FieldType::Bool,
            2 => FieldType::Int8,
            3 => FieldType::Int16,
            4 => FieldType::Int32,
            5 => FieldType::Int64,
            10 => FieldType::Float,
            11 => FieldType::Double,
            20 => FieldType::String,
            100 => FieldType::BinaryVector,
            101 => FieldType::FloatVector,
            _ => return None,
        };
        Some(ftype)
    }
}

/// Artifact kind of a field element (`fetype`). Encoded as its decimal code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum FieldElementType {
    #[default]
    None,
    /// Raw column data.
    Raw,
    /// Secondary index over the column.
    Index,
    /// Column statistics.
    Stats,
}

impl FieldElementType {
    pub fn code(&self) -> i64 {
        match self {
            FieldElementType::None => 0,
            FieldElementType::Raw => 1,
            FieldElementType::Index => 2,
            FieldElementType::Stats => 3,
        }
    }

    pub fn from_code(code: i64) -> Option<Self> {
        let fetype = match code {
            0 => FieldElementType::None,
            1 => FieldElementType::Raw,
            2 => FieldElementType::Index,
            3 => FieldElementType::Stats,
            _ => return None,
        };
        Some(fetype)
    }
}

/// Id set carried by commit roots, with a staged ("flushable") delta.
///
/// Staged ids are part of the flush view (the set that gets encoded at
/// persist time) but not of the committed view until [`Mappings::apply`]
/// folds them in. Decoding always yields a fully-committed set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Mappings {
    committed: BTreeSet<Id>,
    staged: BTreeSet<Id>,
}

impl Mappings {
    pub fn from_ids(ids: impl IntoIterator<Item = Id>) -> Self {
        Mappings {
            committed: ids.into_iter().collect(),
            staged: BTreeSet::new(),
        }
    }

    /// Committed ids only.
    pub fn ids(&self) -> &BTreeSet<Id> {
        &self.committed
    }

    /// Committed ∪ staged: what gets persisted.
    pub fn flush_view(&self) -> BTreeSet<Id> {
        self.committed.union(&self.staged).copied().collect()
    }

    pub fn stage(&mut self, id: Id) {
        if !self.committed.contains(&id) {
            self.staged.insert(id);
        }
    }

    /// Fold the staged delta into the committed set.
    pub fn apply(&mut self) {
        self.committed.extend(std::mem::take(&mut self.staged));
    }

    pub fn contains(&self, id: Id) -> bool {
        self.committed.contains(&id) || self.staged.contains(&id)
    }

    pub fn len(&self) -> usize {
        self.flush_view().len()
    }

    pub fn is_empty(&self) -> bool {
        self.committed.is_empty() && self.staged.is_empty()
    }
}

impl FromIterator<Id> for Mappings {
    fn from_iter<T: IntoIterator<Item = Id>>(iter: T) -> Self {
        Mappings::from_ids(iter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn staged_ids_appear_in_flush_view_only() {
        let mut mappings = Mappings::from_ids([1, 2]);
        mappings.stage(3);
        assert!(!mappings.ids().contains(&3));
        assert!(mappings.contains(3));
        assert_eq!(mappings.flush_view(), [1, 2, 3].into_iter().collect());

        mappings.apply();
        assert!(mappings.ids().contains(&3));
        assert_eq!(mappings.len(), 3);
    }

    #[test]
    fn staging_a_committed_id_is_a_noop() {
        let mut mappings = Mappings::from_ids([5]);
        mappings.stage(5);
        assert_eq!(mappings.flush_view().len(), 1);
    }

    #[test]
    fn type_codes_roundtrip() {
        for code in [0, 1, 2, 3, 4, 5, 10, 11, 20, 100, 101] {
            let ftype = FieldType::from_code(code).unwrap();
            assert_eq!(ftype.code(), code);
        }
        assert!(FieldType::from_code(42).is_none());

        for code in 0..=3 {
            let fetype = FieldElementType::from_code(code).unwrap();
            assert_eq!(fetype.code(), code);
        }
        assert!(FieldElementType::from_code(9).is_none());
    }
}
