//! Specification entities
//!
//! The entity types stored in the specification database and the
//! declaration of its collections, indexes and relations.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::store::{Database, EntityCollection, EntityId, IndexKey};

pub const SERVICE: &str = "service";
pub const RESOURCE: &str = "resource";
pub const TYPE_DEFINITION: &str = "typeDefinition";

/// service -> resource
pub const HAS_RESOURCE: &str = "hasResource";
/// resource -> typeDefinition
pub const USES_TYPE: &str = "usesType";

/// Create an empty specification database with all collections declared
pub fn spec_database() -> Database {
    Database::new()
        .with_collection(
            SERVICE,
            EntityCollection::<Service>::new()
                .with_unique_index("name", |s| Some(IndexKey::from(&s.name))),
        )
        .with_collection(
            RESOURCE,
            EntityCollection::<Resource>::new()
                .with_index("cloudFormationType", |r| Some(IndexKey::from(&r.cloud_formation_type)))
                .with_index("name", |r| Some(IndexKey::from(&r.name))),
        )
        .with_collection(
            TYPE_DEFINITION,
            EntityCollection::<TypeDefinition>::new()
                .with_index("name", |t| Some(IndexKey::from(&t.name))),
        )
        .with_relation(HAS_RESOURCE, SERVICE, RESOURCE)
        .with_relation(USES_TYPE, RESOURCE, TYPE_DEFINITION)
}

/// A cloud service namespace, e.g. `AWS::S3`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Service {
    /// Lower-case dashed name, e.g. `aws-s3`
    pub name: String,
    /// Service part only, e.g. `s3`
    pub short_name: String,
    pub cloud_formation_namespace: String,
}

/// A resource type
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Resource {
    /// Last segment of the type name, e.g. `Bucket`
    pub name: String,
    /// Full type name, e.g. `AWS::S3::Bucket`
    pub cloud_formation_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub documentation: Option<String>,
    /// Settable properties
    pub properties: BTreeMap<String, Property>,
    /// System-computed attributes; compound ones use dotted names
    pub attributes: BTreeMap<String, Attribute>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub primary_identifier: Vec<String>,
}

/// A named, deduplicated object shape
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TypeDefinition {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub documentation: Option<String>,
    pub properties: BTreeMap<String, Property>,
}

/// A property of a resource or type definition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Property {
    #[serde(rename = "type")]
    pub ty: PropertyType,
    #[serde(default)]
    pub required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub documentation: Option<String>,
    #[serde(default)]
    pub update_type: UpdateType,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub deprecated: bool,
    pub provenance: Provenance,
}

impl Property {
    pub fn new(ty: PropertyType, provenance: Provenance) -> Self {
        Self {
            ty,
            required: false,
            documentation: None,
            update_type: UpdateType::Mutable,
            deprecated: false,
            provenance,
        }
    }

    /// Structural identity: type and requiredness only
    pub fn same_shape(&self, other: &Property) -> bool {
        self.ty == other.ty && self.required == other.required
    }
}

/// A system-computed facet of a resource
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Attribute {
    #[serde(rename = "type")]
    pub ty: PropertyType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub documentation: Option<String>,
    pub provenance: Provenance,
}

/// Which source determined a property's type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Provenance {
    /// Taken as-is from the registry schema
    Registry,
    /// Only known from the legacy specification
    LegacySpec,
    /// Registry type narrowed by the legacy specification
    Refined,
}

/// How a property reacts to updates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UpdateType {
    #[default]
    Mutable,
    Immutable,
    Conditional,
}

/// Type of a property or attribute
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum PropertyType {
    String,
    Number,
    Integer,
    Boolean,
    Json,
    DateTime,
    Null,
    Array { element: Box<PropertyType> },
    Map { element: Box<PropertyType> },
    Ref { reference: EntityId },
    Union { types: Vec<PropertyType> },
}

impl PropertyType {
    pub fn array(element: PropertyType) -> Self {
        PropertyType::Array {
            element: Box::new(element),
        }
    }

    pub fn map(element: PropertyType) -> Self {
        PropertyType::Map {
            element: Box::new(element),
        }
    }

    /// Build a union, flattening nested unions and dropping duplicates
    ///
    /// A union of a single type is that type.
    pub fn union(types: impl IntoIterator<Item = PropertyType>) -> Self {
        let mut flat: Vec<PropertyType> = Vec::new();
        for ty in types {
            let members = match ty {
                PropertyType::Union { types } => types,
                other => vec![other],
            };
            for member in members {
                if !flat.contains(&member) {
                    flat.push(member);
                }
            }
        }
        match flat.len() {
            0 => PropertyType::Json,
            1 => flat.remove(0),
            _ => PropertyType::Union { types: flat },
        }
    }

    /// Type definition referenced by this type, looking through collections
    pub fn referenced_type(&self) -> Option<EntityId> {
        match self {
            PropertyType::Ref { reference } => Some(*reference),
            PropertyType::Array { element } | PropertyType::Map { element } => element.referenced_type(),
            _ => None,
        }
    }
}

impl fmt::Display for PropertyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PropertyType::String => write!(f, "string"),
            PropertyType::Number => write!(f, "number"),
            PropertyType::Integer => write!(f, "integer"),
            PropertyType::Boolean => write!(f, "boolean"),
            PropertyType::Json => write!(f, "json"),
            PropertyType::DateTime => write!(f, "date-time"),
            PropertyType::Null => write!(f, "null"),
            PropertyType::Array { element } => write!(f, "Array<{}>", element),
            PropertyType::Map { element } => write!(f, "Map<string, {}>", element),
            PropertyType::Ref { reference } => write!(f, "ref({})", reference),
            PropertyType::Union { types } => {
                let parts: Vec<String> = types.iter().map(ToString::to_string).collect();
                write!(f, "{}", parts.join(" | "))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_property_type_serialization() {
        let ty = PropertyType::array(PropertyType::Ref {
            reference: EntityId::new(2),
        });
        let value = serde_json::to_value(&ty).unwrap();
        assert_eq!(
            value,
            json!({"type": "array", "element": {"type": "ref", "reference": 2}})
        );
        assert_eq!(serde_json::from_value::<PropertyType>(value).unwrap(), ty);
        assert_eq!(serde_json::to_value(PropertyType::DateTime).unwrap(), json!({"type": "date-time"}));
    }

    #[test]
    fn test_union_flattens_and_collapses() {
        let u = PropertyType::union([
            PropertyType::String,
            PropertyType::union([PropertyType::Integer, PropertyType::String]),
        ]);
        assert_eq!(
            u,
            PropertyType::Union {
                types: vec![PropertyType::String, PropertyType::Integer]
            }
        );
        assert_eq!(PropertyType::union([PropertyType::Boolean]), PropertyType::Boolean);
        assert_eq!(u.to_string(), "string | integer");
    }

    #[test]
    fn test_referenced_type_looks_through_collections() {
        let ty = PropertyType::map(PropertyType::array(PropertyType::Ref {
            reference: EntityId::new(5),
        }));
        assert_eq!(ty.referenced_type(), Some(EntityId::new(5)));
        assert_eq!(PropertyType::String.referenced_type(), None);
    }

    #[test]
    fn test_spec_database_declares_collections() {
        let db = spec_database();
        let collections: Vec<_> = db.collection_names().collect();
        assert_eq!(collections, vec![RESOURCE, SERVICE, TYPE_DEFINITION]);
        let relations: Vec<_> = db.relation_names().collect();
        assert_eq!(relations, vec![HAS_RESOURCE, USES_TYPE]);
    }
}
