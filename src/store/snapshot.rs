//! Snapshot format
//!
//! A snapshot is a self-describing JSON document: entities keyed by their
//! logical identity per collection, and relation edges as identity pairs.
//! Indexes are not stored; they are rebuilt from entity fields on load.

use semver::Version;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::Path;

use super::EntityId;
use crate::checksum::Checksum;
use crate::error::{Result, SpecError};

/// Snapshot format produced by this version of the store
pub const SNAPSHOT_FORMAT_VERSION: &str = "1.0.0";

/// One stored entity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotEntity {
    #[serde(rename = "$id")]
    pub id: EntityId,
    pub entity: Value,
}

/// One stored relation edge
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotEdge {
    pub from: EntityId,
    pub to: EntityId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
}

/// Serialized database content
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub format_version: Version,
    /// SHA256 over `collections` and `relations`
    pub checksum: Checksum,
    pub collections: BTreeMap<String, Vec<SnapshotEntity>>,
    pub relations: BTreeMap<String, Vec<SnapshotEdge>>,
}

impl Snapshot {
    pub(crate) fn new(
        collections: BTreeMap<String, Vec<SnapshotEntity>>,
        relations: BTreeMap<String, Vec<SnapshotEdge>>,
    ) -> Result<Self> {
        let checksum = Checksum::of(&(&collections, &relations))?;
        Ok(Self {
            format_version: Version::parse(SNAPSHOT_FORMAT_VERSION)?,
            checksum,
            collections,
            relations,
        })
    }

    /// Check format compatibility and content integrity
    ///
    /// Snapshots written by the same major format version are accepted.
    pub fn verify(&self) -> Result<()> {
        let supported = Version::parse(SNAPSHOT_FORMAT_VERSION)?;
        if self.format_version.major != supported.major {
            return Err(SpecError::IncompatibleSnapshot {
                found: self.format_version.to_string(),
                supported: supported.to_string(),
            });
        }

        let actual = Checksum::of(&(&self.collections, &self.relations))?;
        if actual != self.checksum {
            return Err(SpecError::ChecksumMismatch {
                expected: self.checksum.to_string(),
                actual: actual.to_string(),
            });
        }
        Ok(())
    }

    /// Number of entities stored for a collection
    pub fn entity_count(&self, collection: &str) -> usize {
        self.collections.get(collection).map(Vec::len).unwrap_or(0)
    }

    pub fn total_entities(&self) -> usize {
        self.collections.values().map(Vec::len).sum()
    }

    pub fn to_json(&self, pretty: bool) -> Result<String> {
        Ok(if pretty {
            serde_json::to_string_pretty(self)?
        } else {
            serde_json::to_string(self)?
        })
    }

    pub fn from_json(content: &str) -> Result<Self> {
        Ok(serde_json::from_str(content)?)
    }

    pub fn write_to(&self, path: &Path, pretty: bool) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, self.to_json(pretty)?)?;
        Ok(())
    }

    pub fn read_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json(&content).map_err(|e| e.located(&path.display().to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample() -> Snapshot {
        let mut collections = BTreeMap::new();
        collections.insert(
            "thing".to_string(),
            vec![SnapshotEntity {
                id: EntityId::new(0),
                entity: json!({"name": "A"}),
            }],
        );
        Snapshot::new(collections, BTreeMap::new()).unwrap()
    }

    #[test]
    fn test_fresh_snapshot_verifies() {
        let snapshot = sample();
        snapshot.verify().unwrap();
        assert_eq!(snapshot.entity_count("thing"), 1);
        assert_eq!(snapshot.entity_count("other"), 0);
    }

    #[test]
    fn test_tampered_snapshot_fails_checksum() {
        let mut snapshot = sample();
        snapshot.collections.get_mut("thing").unwrap()[0].entity = json!({"name": "B"});
        assert!(matches!(snapshot.verify(), Err(SpecError::ChecksumMismatch { .. })));
    }

    #[test]
    fn test_other_major_version_is_rejected() {
        let mut snapshot = sample();
        snapshot.format_version = Version::new(2, 0, 0);
        assert!(matches!(snapshot.verify(), Err(SpecError::IncompatibleSnapshot { .. })));

        snapshot.format_version = Version::new(1, 4, 0);
        snapshot.verify().unwrap();
    }

    #[test]
    fn test_json_roundtrip_uses_dollar_id() {
        let snapshot = sample();
        let text = snapshot.to_json(false).unwrap();
        assert!(text.contains("\"$id\":0"));
        assert_eq!(Snapshot::from_json(&text).unwrap(), snapshot);
    }
}
