//! Entity collections and their secondary indexes

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::ops::Bound;

use super::{EntityId, SnapshotEntity};
use crate::error::{Result, SpecError};

/// A key stored in an [`Index`]
///
/// Integer keys order before string keys; within a kind the natural order applies.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum IndexKey {
    Int(i64),
    Str(String),
}

impl fmt::Display for IndexKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IndexKey::Int(i) => write!(f, "{}", i),
            IndexKey::Str(s) => write!(f, "{}", s),
        }
    }
}

impl From<&str> for IndexKey {
    fn from(s: &str) -> Self {
        IndexKey::Str(s.to_string())
    }
}

impl From<String> for IndexKey {
    fn from(s: String) -> Self {
        IndexKey::Str(s)
    }
}

impl From<&String> for IndexKey {
    fn from(s: &String) -> Self {
        IndexKey::Str(s.clone())
    }
}

impl From<i64> for IndexKey {
    fn from(i: i64) -> Self {
        IndexKey::Int(i)
    }
}

/// Comparison operator for index lookups
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparison {
    Equals,
    LessThan,
    LessThanOrEqual,
    GreaterThan,
    GreaterThanOrEqual,
}

/// Secondary index: derived key -> set of entity identities
///
/// Entities for which the key function returns `None` are not indexed.
pub struct Index<T> {
    key_of: fn(&T) -> Option<IndexKey>,
    unique: bool,
    entries: BTreeMap<IndexKey, BTreeSet<EntityId>>,
}

impl<T> Index<T> {
    pub fn new(key_of: fn(&T) -> Option<IndexKey>) -> Self {
        Self {
            key_of,
            unique: false,
            entries: BTreeMap::new(),
        }
    }

    pub fn unique(key_of: fn(&T) -> Option<IndexKey>) -> Self {
        Self {
            unique: true,
            ..Self::new(key_of)
        }
    }

    pub fn is_unique(&self) -> bool {
        self.unique
    }

    /// Same key function and uniqueness, no entries
    fn emptied(&self) -> Self {
        if self.is_unique() {
            Self::unique(self.key_of)
        } else {
            Self::new(self.key_of)
        }
    }

    fn key(&self, entity: &T) -> Option<IndexKey> {
        (self.key_of)(entity)
    }

    fn conflicts(&self, key: &IndexKey) -> bool {
        self.unique && self.entries.get(key).map(|ids| !ids.is_empty()).unwrap_or(false)
    }

    fn insert(&mut self, key: IndexKey, id: EntityId) {
        self.entries.entry(key).or_default().insert(id);
    }

    fn clear(&mut self) {
        self.entries.clear();
    }

    /// Identities matching `key` under `comparison`, ordered by key then identity
    pub fn query(&self, comparison: Comparison, key: &IndexKey) -> Vec<EntityId> {
        let bounds = match comparison {
            Comparison::Equals => (Bound::Included(key), Bound::Included(key)),
            Comparison::LessThan => (Bound::Unbounded, Bound::Excluded(key)),
            Comparison::LessThanOrEqual => (Bound::Unbounded, Bound::Included(key)),
            Comparison::GreaterThan => (Bound::Excluded(key), Bound::Unbounded),
            Comparison::GreaterThanOrEqual => (Bound::Included(key), Bound::Unbounded),
        };
        self.collect(bounds)
    }

    /// Identities with `low <= key <= high`
    pub fn range(&self, low: &IndexKey, high: &IndexKey) -> Vec<EntityId> {
        if low > high {
            return Vec::new();
        }
        self.collect((Bound::Included(low), Bound::Included(high)))
    }

    fn collect(&self, bounds: (Bound<&IndexKey>, Bound<&IndexKey>)) -> Vec<EntityId> {
        self.entries
            .range::<IndexKey, _>(bounds)
            .flat_map(|(_, ids)| ids.iter().copied())
            .collect()
    }
}

/// Insertion-ordered arena of entities plus the indexes declared over them
pub struct EntityCollection<T> {
    name: String,
    entities: Vec<T>,
    indexes: BTreeMap<String, Index<T>>,
}

impl<T> Default for EntityCollection<T> {
    fn default() -> Self {
        Self {
            name: String::new(),
            entities: Vec::new(),
            indexes: BTreeMap::new(),
        }
    }
}

impl<T> EntityCollection<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare an index allowing duplicate keys
    pub fn with_index(mut self, name: impl Into<String>, key_of: fn(&T) -> Option<IndexKey>) -> Self {
        self.indexes.insert(name.into(), Index::new(key_of));
        self
    }

    /// Declare an index rejecting duplicate keys
    pub fn with_unique_index(
        mut self,
        name: impl Into<String>,
        key_of: fn(&T) -> Option<IndexKey>,
    ) -> Self {
        self.indexes.insert(name.into(), Index::unique(key_of));
        self
    }

    /// An empty collection with the same name and index declarations
    pub fn empty_like(&self) -> Self {
        Self {
            name: self.name.clone(),
            entities: Vec::new(),
            indexes: self
                .indexes
                .iter()
                .map(|(name, index)| (name.clone(), index.emptied()))
                .collect(),
        }
    }

    pub(crate) fn set_name(&mut self, name: &str) {
        self.name = name.to_string();
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// Identity the next inserted entity will receive
    pub fn next_id(&self) -> EntityId {
        EntityId::from_index(self.entities.len())
    }

    pub fn contains(&self, id: EntityId) -> bool {
        id.index() < self.entities.len()
    }

    pub fn get(&self, id: EntityId) -> Option<&T> {
        self.entities.get(id.index())
    }

    /// All entities in identity order
    pub fn iter(&self) -> impl Iterator<Item = (EntityId, &T)> {
        self.entities
            .iter()
            .enumerate()
            .map(|(i, e)| (EntityId::from_index(i), e))
    }

    pub fn index(&self, name: &str) -> Result<&Index<T>> {
        self.indexes.get(name).ok_or_else(|| SpecError::UnknownIndex {
            collection: self.name.clone(),
            index: name.to_string(),
        })
    }

    /// Insert an entity, updating every index
    ///
    /// Unique constraints are checked before anything is written, so a
    /// rejected insert leaves the collection untouched.
    pub fn insert(&mut self, entity: T) -> Result<EntityId> {
        let id = self.next_id();

        let mut keys = Vec::with_capacity(self.indexes.len());
        for (index_name, index) in &self.indexes {
            if let Some(key) = index.key(&entity) {
                if index.conflicts(&key) {
                    return Err(SpecError::DuplicateKey {
                        collection: self.name.clone(),
                        index: index_name.clone(),
                        key: key.to_string(),
                    });
                }
                keys.push((index_name.clone(), key));
            }
        }

        for (index_name, key) in keys {
            if let Some(index) = self.indexes.get_mut(&index_name) {
                index.insert(key, id);
            }
        }
        self.entities.push(entity);
        Ok(id)
    }

    pub fn lookup(&self, index: &str, comparison: Comparison, key: &IndexKey) -> Result<Vec<EntityId>> {
        Ok(self.index(index)?.query(comparison, key))
    }

    pub fn range(&self, index: &str, low: &IndexKey, high: &IndexKey) -> Result<Vec<EntityId>> {
        Ok(self.index(index)?.range(low, high))
    }

    pub fn clear(&mut self) {
        self.entities.clear();
        for index in self.indexes.values_mut() {
            index.clear();
        }
    }
}

impl<T: super::Entity> EntityCollection<T> {
    pub(crate) fn save_entities(&self) -> Result<Vec<SnapshotEntity>> {
        self.iter()
            .map(|(id, entity)| {
                Ok(SnapshotEntity {
                    id,
                    entity: serde_json::to_value(entity)?,
                })
            })
            .collect()
    }

    /// Replace the content with snapshot entities, rebuilding every index
    pub(crate) fn load_entities(&mut self, entities: &[SnapshotEntity]) -> Result<()> {
        self.clear();
        for stored in entities {
            if stored.id != self.next_id() {
                return Err(SpecError::IdentityViolation(format!(
                    "collection '{}' expected identity {} in snapshot, found {}",
                    self.name,
                    self.next_id(),
                    stored.id
                )));
            }
            let entity: T = serde_json::from_value(stored.entity.clone())?;
            self.insert(entity)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq)]
    struct Item {
        name: String,
        size: i64,
    }

    fn item(name: &str, size: i64) -> Item {
        Item {
            name: name.to_string(),
            size,
        }
    }

    fn collection() -> EntityCollection<Item> {
        EntityCollection::new()
            .with_index("name", |i: &Item| Some(IndexKey::from(&i.name)))
            .with_index("size", |i: &Item| Some(IndexKey::from(i.size)))
    }

    #[test]
    fn test_insert_assigns_sequential_ids() {
        let mut c = collection();
        assert_eq!(c.insert(item("a", 1)).unwrap(), EntityId::new(0));
        assert_eq!(c.insert(item("b", 2)).unwrap(), EntityId::new(1));
        assert_eq!(c.len(), 2);
        assert_eq!(c.get(EntityId::new(1)), Some(&item("b", 2)));
        assert!(c.get(EntityId::new(2)).is_none());
    }

    #[test]
    fn test_equals_yields_all_duplicates() {
        let mut c = collection();
        c.insert(item("a", 1)).unwrap();
        c.insert(item("a", 2)).unwrap();
        c.insert(item("b", 3)).unwrap();

        let found = c.lookup("name", Comparison::Equals, &"a".into()).unwrap();
        assert_eq!(found, vec![EntityId::new(0), EntityId::new(1)]);
        assert!(c.lookup("name", Comparison::Equals, &"z".into()).unwrap().is_empty());
    }

    #[test]
    fn test_ordered_comparisons() {
        let mut c = collection();
        for (i, size) in [5, 1, 3, 9].into_iter().enumerate() {
            c.insert(item(&format!("i{}", i), size)).unwrap();
        }

        let lt = c.lookup("size", Comparison::LessThan, &IndexKey::Int(5)).unwrap();
        assert_eq!(lt, vec![EntityId::new(1), EntityId::new(2)]);

        let gte = c.lookup("size", Comparison::GreaterThanOrEqual, &IndexKey::Int(5)).unwrap();
        assert_eq!(gte, vec![EntityId::new(0), EntityId::new(3)]);

        let between = c.range("size", &IndexKey::Int(2), &IndexKey::Int(5)).unwrap();
        assert_eq!(between, vec![EntityId::new(2), EntityId::new(0)]);
        assert!(c.range("size", &IndexKey::Int(6), &IndexKey::Int(2)).unwrap().is_empty());
    }

    #[test]
    fn test_unique_index_rejects_duplicates_without_side_effects() {
        let mut c = EntityCollection::<Item>::new()
            .with_index("size", |i| Some(IndexKey::from(i.size)))
            .with_unique_index("name", |i| Some(IndexKey::from(&i.name)));
        c.insert(item("a", 1)).unwrap();

        let err = c.insert(item("a", 2)).unwrap_err();
        assert!(matches!(err, SpecError::DuplicateKey { .. }));
        assert_eq!(c.len(), 1);
        assert!(c.lookup("size", Comparison::Equals, &IndexKey::Int(2)).unwrap().is_empty());
    }

    #[test]
    fn test_unknown_index_fails() {
        let c = collection();
        assert!(matches!(
            c.lookup("colour", Comparison::Equals, &"red".into()),
            Err(SpecError::UnknownIndex { .. })
        ));
    }

    #[test]
    fn test_unindexed_entities_are_skipped() {
        let mut c = EntityCollection::<Item>::new()
            .with_index("big", |i| (i.size > 10).then(|| IndexKey::from(i.size)));
        c.insert(item("small", 1)).unwrap();
        c.insert(item("large", 20)).unwrap();

        let found = c.lookup("big", Comparison::GreaterThan, &IndexKey::Int(0)).unwrap();
        assert_eq!(found, vec![EntityId::new(1)]);
    }
}
