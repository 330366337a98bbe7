//! Persistence layer for vecmeta snapshot metadata (Layer 0).
//!
//! Defines the flat attribute-map persistence model (one table per resource
//! kind, one column per attribute), the async [`Store`] trait, and two
//! back-ends:
//! - [`MemStore`]: in-memory, the `mem://` scheme and the test fake
//! - [`LocalStore`]: file-backed, the `file://` scheme
//!
//! The engine crate (`vecmeta-core`) layers the typed resource model, the
//! attribute codec, and the snapshot machinery on top of this crate.

pub mod error;
pub mod local;
pub mod mem;
pub mod schema;
pub mod store;
pub mod types;

pub use error::{StoreError, StoreResult};
pub use local::LocalStore;
pub use mem::MemStore;
pub use schema::{attr, has_attr, resource_attrs_of, ResourceKind, State};
pub use store::{build_store, RowContext, RowOp, Store};
pub use types::{now_us, AttrMap, Id, Lsn, Ts};
