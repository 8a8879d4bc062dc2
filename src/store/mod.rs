//! Entity Store
//!
//! A small typed entity-relationship store: named collections of
//! identity-bearing records, secondary indexes over those records, named
//! directed relations between records of (possibly) different collections,
//! and a lossless snapshot format.
//!
//! ## Identity
//!
//! Every entity lives in the arena of its owning collection and is referred
//! to everywhere else by its [`EntityId`], which is its insertion position in
//! that collection. Identities are never reused (there is no per-entity
//! deletion) and survive [`Database::save`] / [`Database::load`].
//!
//! ## Example
//!
//! ```
//! use service_spec::store::{Comparison, Database, EntityCollection, IndexKey};
//! use serde::{Deserialize, Serialize};
//!
//! #[derive(Debug, Clone, Serialize, Deserialize)]
//! struct Thing { name: String }
//!
//! let mut db = Database::new().with_collection(
//!     "thing",
//!     EntityCollection::<Thing>::new().with_index("name", |t| Some(IndexKey::from(&t.name))),
//! );
//! db.allocate("thing", Thing { name: "A".into() }).unwrap();
//! let found = db.lookup::<Thing>("thing", "name", Comparison::Equals, "A").unwrap();
//! assert_eq!(found.len(), 1);
//! ```

pub mod collection;
pub mod database;
pub mod relation;
pub mod snapshot;

pub use collection::{Comparison, EntityCollection, Index, IndexKey};
pub use database::{Database, Followed, Record};
pub use relation::{Edge, Relation};
pub use snapshot::{Snapshot, SnapshotEdge, SnapshotEntity, SNAPSHOT_FORMAT_VERSION};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Anything that can be stored in an [`EntityCollection`]
pub trait Entity: Serialize + DeserializeOwned + Send + Sync + 'static {}

impl<T> Entity for T where T: Serialize + DeserializeOwned + Send + Sync + 'static {}

/// Logical identity of an entity within its collection
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(u32);

impl EntityId {
    pub const fn new(raw: u32) -> Self {
        Self(raw)
    }

    pub fn raw(self) -> u32 {
        self.0
    }

    pub(crate) fn index(self) -> usize {
        self.0 as usize
    }

    pub(crate) fn from_index(index: usize) -> Self {
        Self(index as u32)
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}
