//! Database: named collections plus named relations

use serde_json::Value;
use std::any::Any;
use std::collections::BTreeMap;
use std::fmt;
use std::ops::Deref;

use super::collection::{Comparison, EntityCollection, IndexKey};
use super::relation::Relation;
use super::snapshot::{Snapshot, SnapshotEdge, SnapshotEntity};
use super::{Entity, EntityId};
use crate::error::{Result, SpecError};

/// Type-erased view over an [`EntityCollection`]
trait StoredCollection: Send + Sync {
    fn len(&self) -> usize;
    fn contains(&self, id: EntityId) -> bool;
    fn save(&self) -> Result<Vec<SnapshotEntity>>;
    fn load(&mut self, entities: &[SnapshotEntity]) -> Result<()>;
    fn empty(&self) -> Box<dyn StoredCollection>;
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

impl<T: Entity> StoredCollection for EntityCollection<T> {
    fn len(&self) -> usize {
        EntityCollection::len(self)
    }

    fn contains(&self, id: EntityId) -> bool {
        EntityCollection::contains(self, id)
    }

    fn save(&self) -> Result<Vec<SnapshotEntity>> {
        self.save_entities()
    }

    fn load(&mut self, entities: &[SnapshotEntity]) -> Result<()> {
        self.load_entities(entities)
    }

    fn empty(&self) -> Box<dyn StoredCollection> {
        Box::new(self.empty_like())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// An entity returned from a lookup, together with its identity
#[derive(Debug)]
pub struct Record<'a, T> {
    pub id: EntityId,
    pub entity: &'a T,
}

impl<T> Clone for Record<'_, T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Record<'_, T> {}

impl<T> Deref for Record<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        self.entity
    }
}

/// The target of a followed relation edge
#[derive(Debug)]
pub struct Followed<'a, T> {
    pub id: EntityId,
    pub entity: &'a T,
    pub metadata: Option<&'a Value>,
}

/// Aggregate of named entity collections and named relations
///
/// Collections and relations are declared up front; afterwards only entities
/// and edges are added. Referring to an undeclared collection or relation is
/// a programming error and fails immediately.
#[derive(Default)]
pub struct Database {
    collections: BTreeMap<String, Box<dyn StoredCollection>>,
    relations: BTreeMap<String, Relation>,
}

impl fmt::Debug for Database {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut map = f.debug_map();
        for (name, collection) in &self.collections {
            map.entry(name, &collection.len());
        }
        map.finish()
    }
}

impl Database {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a collection
    pub fn with_collection<T: Entity>(mut self, name: &str, mut collection: EntityCollection<T>) -> Self {
        collection.set_name(name);
        self.collections.insert(name.to_string(), Box::new(collection));
        self
    }

    /// Declare a relation from one collection to another
    pub fn with_relation(mut self, name: &str, from: &str, to: &str) -> Self {
        self.relations.insert(name.to_string(), Relation::new(from, to));
        self
    }

    pub fn collection_names(&self) -> impl Iterator<Item = &str> {
        self.collections.keys().map(String::as_str)
    }

    pub fn relation_names(&self) -> impl Iterator<Item = &str> {
        self.relations.keys().map(String::as_str)
    }

    fn stored(&self, name: &str) -> Result<&dyn StoredCollection> {
        self.collections
            .get(name)
            .map(|c| c.as_ref())
            .ok_or_else(|| SpecError::UnknownCollection(name.to_string()))
    }

    /// Typed access to a collection
    pub fn collection<T: Entity>(&self, name: &str) -> Result<&EntityCollection<T>> {
        self.stored(name)?
            .as_any()
            .downcast_ref::<EntityCollection<T>>()
            .ok_or_else(|| SpecError::CollectionType {
                collection: name.to_string(),
                expected: std::any::type_name::<T>().to_string(),
            })
    }

    fn collection_mut<T: Entity>(&mut self, name: &str) -> Result<&mut EntityCollection<T>> {
        self.collections
            .get_mut(name)
            .ok_or_else(|| SpecError::UnknownCollection(name.to_string()))?
            .as_any_mut()
            .downcast_mut::<EntityCollection<T>>()
            .ok_or_else(|| SpecError::CollectionType {
                collection: name.to_string(),
                expected: std::any::type_name::<T>().to_string(),
            })
    }

    /// Number of entities in a collection
    pub fn len(&self, collection: &str) -> Result<usize> {
        Ok(self.stored(collection)?.len())
    }

    /// Identity the next entity allocated in `collection` will receive
    pub fn next_id(&self, collection: &str) -> Result<EntityId> {
        Ok(EntityId::from_index(self.stored(collection)?.len()))
    }

    /// Insert an entity and return its new identity
    pub fn allocate<T: Entity>(&mut self, collection: &str, entity: T) -> Result<EntityId> {
        self.collection_mut::<T>(collection)?.insert(entity)
    }

    pub fn get<T: Entity>(&self, collection: &str, id: EntityId) -> Result<&T> {
        self.collection::<T>(collection)?
            .get(id)
            .ok_or_else(|| SpecError::NotFound {
                collection: collection.to_string(),
                id: id.to_string(),
            })
    }

    /// Every entity of a collection in identity order
    pub fn all<T: Entity>(&self, collection: &str) -> Result<Vec<Record<'_, T>>> {
        Ok(self
            .collection::<T>(collection)?
            .iter()
            .map(|(id, entity)| Record { id, entity })
            .collect())
    }

    /// Index lookup; no match yields an empty result
    pub fn lookup<T: Entity>(
        &self,
        collection: &str,
        index: &str,
        comparison: Comparison,
        key: impl Into<IndexKey>,
    ) -> Result<Vec<Record<'_, T>>> {
        let coll = self.collection::<T>(collection)?;
        let ids = coll.lookup(index, comparison, &key.into())?;
        Ok(Self::records(coll, ids))
    }

    /// Inclusive range lookup over an index
    pub fn range<T: Entity>(
        &self,
        collection: &str,
        index: &str,
        low: impl Into<IndexKey>,
        high: impl Into<IndexKey>,
    ) -> Result<Vec<Record<'_, T>>> {
        let coll = self.collection::<T>(collection)?;
        let ids = coll.range(index, &low.into(), &high.into())?;
        Ok(Self::records(coll, ids))
    }

    fn records<T>(coll: &EntityCollection<T>, ids: Vec<EntityId>) -> Vec<Record<'_, T>> {
        ids.into_iter()
            .filter_map(|id| coll.get(id).map(|entity| Record { id, entity }))
            .collect()
    }

    pub fn relation(&self, name: &str) -> Result<&Relation> {
        self.relations
            .get(name)
            .ok_or_else(|| SpecError::UnknownRelation(name.to_string()))
    }

    fn check_endpoint(&self, collection: &str, id: EntityId) -> Result<()> {
        check_endpoint(&self.collections, collection, id)
    }

    /// Add an edge; adding an existing edge is a no-op and returns `false`
    pub fn add_relation(
        &mut self,
        relation: &str,
        from: EntityId,
        to: EntityId,
        metadata: Option<Value>,
    ) -> Result<bool> {
        let rel = self.relation(relation)?;
        self.check_endpoint(rel.from_collection(), from)?;
        self.check_endpoint(rel.to_collection(), to)?;

        let rel = self
            .relations
            .get_mut(relation)
            .ok_or_else(|| SpecError::UnknownRelation(relation.to_string()))?;
        Ok(rel.add(from, to, metadata))
    }

    /// Traverse the outgoing edges of `from`
    pub fn follow<T: Entity>(&self, relation: &str, from: EntityId) -> Result<Vec<Followed<'_, T>>> {
        let rel = self.relation(relation)?;
        self.check_endpoint(rel.from_collection(), from)?;
        let target = self.collection::<T>(rel.to_collection())?;

        rel.outgoing(from)
            .iter()
            .map(|edge| {
                let entity = target.get(edge.to).ok_or_else(|| {
                    SpecError::IdentityViolation(format!(
                        "relation '{}' points at missing {}{}",
                        relation,
                        rel.to_collection(),
                        edge.to
                    ))
                })?;
                Ok(Followed {
                    id: edge.to,
                    entity,
                    metadata: edge.metadata.as_ref(),
                })
            })
            .collect()
    }

    /// Serialize every collection and relation
    pub fn save(&self) -> Result<Snapshot> {
        let mut collections = BTreeMap::new();
        for (name, coll) in &self.collections {
            collections.insert(name.clone(), coll.save()?);
        }

        let relations = self
            .relations
            .iter()
            .map(|(name, rel)| {
                let edges = rel
                    .iter()
                    .map(|(from, edge)| SnapshotEdge {
                        from,
                        to: edge.to,
                        metadata: edge.metadata.clone(),
                    })
                    .collect();
                (name.clone(), edges)
            })
            .collect();

        Snapshot::new(collections, relations)
    }

    /// Replace all content with a snapshot
    ///
    /// Collections and relations are rebuilt into staging copies and only
    /// swapped in once the whole snapshot has loaded, so a failed load
    /// leaves the current content untouched. Indexes are rebuilt from the
    /// restored entities.
    pub fn load(&mut self, snapshot: &Snapshot) -> Result<()> {
        snapshot.verify()?;
        for name in snapshot.collections.keys() {
            self.stored(name)?;
        }
        for name in snapshot.relations.keys() {
            self.relation(name)?;
        }

        let mut collections = BTreeMap::new();
        for (name, coll) in &self.collections {
            let mut staged = coll.empty();
            if let Some(entities) = snapshot.collections.get(name) {
                staged.load(entities)?;
            }
            collections.insert(name.clone(), staged);
        }

        let mut relations = BTreeMap::new();
        for (name, rel) in &self.relations {
            let mut staged = rel.empty_like();
            for edge in snapshot.relations.get(name).into_iter().flatten() {
                check_endpoint(&collections, rel.from_collection(), edge.from)?;
                check_endpoint(&collections, rel.to_collection(), edge.to)?;
                staged.add(edge.from, edge.to, edge.metadata.clone());
            }
            relations.insert(name.clone(), staged);
        }

        self.collections = collections;
        self.relations = relations;
        Ok(())
    }
}

fn check_endpoint(
    collections: &BTreeMap<String, Box<dyn StoredCollection>>,
    collection: &str,
    id: EntityId,
) -> Result<()> {
    let stored = collections
        .get(collection)
        .ok_or_else(|| SpecError::UnknownCollection(collection.to_string()))?;
    if stored.contains(id) {
        Ok(())
    } else {
        Err(SpecError::NotFound {
            collection: collection.to_string(),
            id: id.to_string(),
        })
    }
}
