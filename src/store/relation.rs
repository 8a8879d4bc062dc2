//! Named directed relations between entities

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

use super::EntityId;

/// An outgoing edge of a relation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Edge {
    pub to: EntityId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
}

/// A directed many-to-many association from one collection to another
///
/// Edges are keyed by their endpoints: adding an edge that already exists is
/// a no-op, even if the metadata differs.
#[derive(Debug, Clone)]
pub struct Relation {
    from: String,
    to: String,
    edges: BTreeMap<EntityId, Vec<Edge>>,
}

impl Relation {
    pub fn new(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
            edges: BTreeMap::new(),
        }
    }

    /// Source collection name
    pub fn from_collection(&self) -> &str {
        &self.from
    }

    /// Target collection name
    pub fn to_collection(&self) -> &str {
        &self.to
    }

    /// Add an edge; returns `false` if it was already present
    pub fn add(&mut self, from: EntityId, to: EntityId, metadata: Option<Value>) -> bool {
        let outgoing = self.edges.entry(from).or_default();
        if outgoing.iter().any(|e| e.to == to) {
            return false;
        }
        outgoing.push(Edge { to, metadata });
        true
    }

    /// Outgoing edges in insertion order
    pub fn outgoing(&self, from: EntityId) -> &[Edge] {
        self.edges.get(&from).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Every edge, ordered by source identity then insertion
    pub fn iter(&self) -> impl Iterator<Item = (EntityId, &Edge)> {
        self.edges
            .iter()
            .flat_map(|(from, edges)| edges.iter().map(move |e| (*from, e)))
    }

    pub fn len(&self) -> usize {
        self.edges.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// A relation between the same collections, without edges
    pub fn empty_like(&self) -> Self {
        Self::new(self.from.clone(), self.to.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_add_is_idempotent() {
        let mut rel = Relation::new("resource", "typeDefinition");
        assert!(rel.add(EntityId::new(0), EntityId::new(3), None));
        assert!(!rel.add(EntityId::new(0), EntityId::new(3), Some(json!({"x": 1}))));
        assert_eq!(rel.len(), 1);
        assert_eq!(rel.outgoing(EntityId::new(0))[0].metadata, None);
    }

    #[test]
    fn test_outgoing_keeps_insertion_order() {
        let mut rel = Relation::new("a", "b");
        rel.add(EntityId::new(1), EntityId::new(9), None);
        rel.add(EntityId::new(1), EntityId::new(2), Some(json!("meta")));
        rel.add(EntityId::new(0), EntityId::new(5), None);

        let targets: Vec<_> = rel.outgoing(EntityId::new(1)).iter().map(|e| e.to).collect();
        assert_eq!(targets, vec![EntityId::new(9), EntityId::new(2)]);
        assert!(rel.outgoing(EntityId::new(7)).is_empty());

        let sources: Vec<_> = rel.iter().map(|(from, _)| from.raw()).collect();
        assert_eq!(sources, vec![0, 1, 1]);
    }
}
