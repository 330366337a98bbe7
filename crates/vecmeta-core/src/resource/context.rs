//! Per-resource mutation context: a typed resource, the operation tag, and
//! (for updates) the touched-attribute set. Lowers to the store-level
//! [`RowContext`] for persistence.

use std::collections::BTreeSet;

use vecmeta_store::RowContext;

use super::codec::{insert_attr_map, update_attr_map};
use super::{Lifecycle, MetaResource};
use crate::error::MetaResult;

/// How the wrapped resource participates in its operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationTag {
    Add,
    Update,
    Delete,
}

/// A typed resource staged for persistence.
#[derive(Debug, Clone)]
pub struct ResourceContext<R: MetaResource> {
    resource: R,
    tag: OperationTag,
    attrs: BTreeSet<String>,
}

impl<R: MetaResource> ResourceContext<R> {
    pub fn add(resource: R) -> Self {
        ResourceContext {
            resource,
            tag: OperationTag::Add,
            attrs: BTreeSet::new(),
        }
    }

    pub fn update(resource: R, attrs: impl IntoIterator<Item = &'static str>) -> Self {
        ResourceContext {
            resource,
            tag: OperationTag::Update,
            attrs: attrs.into_iter().map(str::to_string).collect(),
        }
    }

    pub fn delete(resource: R) -> Self {
        ResourceContext {
            resource,
            tag: OperationTag::Delete,
            attrs: BTreeSet::new(),
        }
    }

    pub fn tag(&self) -> OperationTag {
        self.tag
    }

    pub fn resource(&self) -> &R {
        &self.resource
    }

    pub fn resource_mut(&mut self) -> &mut R {
        &mut self.resource
    }

    /// Mark one more attribute as touched (UPDATE only).
    pub fn touch_attr(&mut self, name: &'static str) {
        self.attrs.insert(name.to_string());
    }

    pub fn attrs(&self) -> &BTreeSet<String> {
        &self.attrs
    }

    /// Lower to the persistence form.
    pub fn to_row(&self) -> MetaResult<RowContext> {
        let row = match self.tag {
            OperationTag::Add => RowContext::add(R::KIND, insert_attr_map(&self.resource)?),
            OperationTag::Update => RowContext::update(
                R::KIND,
                self.resource.id(),
                update_attr_map(&self.resource, &self.attrs)?,
            ),
            OperationTag::Delete => RowContext::delete(R::KIND, self.resource.id()),
        };
        Ok(row)
    }
}
