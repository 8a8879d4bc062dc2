//! Source document types
//!
//! Schema fragments are kept as raw [`serde_json::Value`] trees: the
//! reconciler walks them structurally, and patches may have reshaped them
//! before they get here.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

use crate::model::UpdateType;

/// A registry resource schema, one per resource type
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistryResource {
    /// e.g. `AWS::S3::Bucket`
    pub type_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub properties: BTreeMap<String, Value>,
    #[serde(default)]
    pub definitions: BTreeMap<String, Value>,
    #[serde(default)]
    pub required: Vec<String>,
    /// JSON pointers, e.g. `/properties/Arn`
    #[serde(default)]
    pub read_only_properties: Vec<String>,
    #[serde(default)]
    pub create_only_properties: Vec<String>,
    #[serde(default)]
    pub write_only_properties: Vec<String>,
    #[serde(default)]
    pub deprecated_properties: Vec<String>,
    #[serde(default)]
    pub primary_identifier: Vec<String>,
    #[serde(default)]
    pub one_of: Vec<Value>,
    #[serde(default)]
    pub any_of: Vec<Value>,
    #[serde(default)]
    pub all_of: Vec<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub additional_properties: Option<Value>,
}

/// The legacy specification document covering all resource types
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct LegacySpecification {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_specification_version: Option<String>,
    #[serde(default)]
    pub resource_types: BTreeMap<String, LegacyResource>,
    /// Keyed `<ResourceType>.<TypeName>`
    #[serde(default)]
    pub property_types: BTreeMap<String, LegacyPropertyType>,
}

impl LegacySpecification {
    /// The slice of the document describing one resource type
    pub fn for_resource(&self, resource_type: &str) -> Option<LegacyResourceSpec> {
        let spec = self.resource_types.get(resource_type)?.clone();
        let prefix = format!("{}.", resource_type);
        let types = self
            .property_types
            .iter()
            .filter_map(|(key, ty)| {
                key.strip_prefix(&prefix)
                    .map(|name| (name.to_string(), ty.clone()))
            })
            .collect();
        Some(LegacyResourceSpec { spec, types })
    }
}

/// Legacy description of one resource type and its nested types
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LegacyResourceSpec {
    pub spec: LegacyResource,
    /// Nested property types, keyed by their short name
    #[serde(default)]
    pub types: BTreeMap<String, LegacyPropertyType>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct LegacyResource {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub documentation: Option<String>,
    #[serde(default)]
    pub properties: BTreeMap<String, LegacyProperty>,
    #[serde(default)]
    pub attributes: BTreeMap<String, LegacyAttribute>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct LegacyPropertyType {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub documentation: Option<String>,
    #[serde(default)]
    pub properties: BTreeMap<String, LegacyProperty>,
}

/// Type vocabulary shared by legacy properties and attributes
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct LegacyTypeRef {
    /// `String`, `Long`, `Integer`, `Double`, `Boolean`, `Timestamp` or `Json`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub primitive_type: Option<String>,
    /// `List`, `Map` or the name of a nested property type
    #[serde(default, rename = "Type", skip_serializing_if = "Option::is_none")]
    pub collection_or_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub primitive_item_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub item_type: Option<String>,
}

impl LegacyTypeRef {
    pub fn is_timestamp(&self) -> bool {
        self.primitive_type.as_deref() == Some("Timestamp")
    }

    /// `List` of `Timestamp`
    pub fn is_timestamp_list(&self) -> bool {
        self.collection_or_type.as_deref() == Some("List")
            && self.primitive_item_type.as_deref() == Some("Timestamp")
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct LegacyProperty {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub documentation: Option<String>,
    #[serde(flatten)]
    pub ty: LegacyTypeRef,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub required: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub update_type: Option<LegacyUpdateType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duplicates_allowed: Option<bool>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct LegacyAttribute {
    #[serde(flatten)]
    pub ty: LegacyTypeRef,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LegacyUpdateType {
    Mutable,
    Immutable,
    Conditional,
}

impl From<LegacyUpdateType> for UpdateType {
    fn from(update: LegacyUpdateType) -> Self {
        match update {
            LegacyUpdateType::Mutable => UpdateType::Mutable,
            LegacyUpdateType::Immutable => UpdateType::Immutable,
            LegacyUpdateType::Conditional => UpdateType::Conditional,
        }
    }
}

/// Prose documentation keyed by `<Type>`, `<Type>.<Prop>` or `<Type>.<TypeDef>.<Prop>`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DocumentationSource(BTreeMap<String, String>);

impl DocumentationSource {
    pub fn new(entries: BTreeMap<String, String>) -> Self {
        Self(entries)
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn resource(&self, resource_type: &str) -> Option<&str> {
        self.get(resource_type)
    }

    pub fn property(&self, resource_type: &str, property: &str) -> Option<&str> {
        self.get(&format!("{}.{}", resource_type, property))
    }

    pub fn type_property(&self, resource_type: &str, type_name: &str, property: &str) -> Option<&str> {
        self.get(&format!("{}.{}.{}", resource_type, type_name, property))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<(String, String)> for DocumentationSource {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_registry_resource_defaults() {
        let resource: RegistryResource = serde_json::from_value(json!({
            "typeName": "AWS::SQS::Queue",
            "properties": { "QueueName": { "type": "string" } },
            "readOnlyProperties": ["/properties/Arn"]
        }))
        .unwrap();

        assert_eq!(resource.type_name, "AWS::SQS::Queue");
        assert_eq!(resource.read_only_properties, vec!["/properties/Arn"]);
        assert!(resource.definitions.is_empty());
        assert!(resource.one_of.is_empty());
    }

    #[test]
    fn test_legacy_for_resource_slices_types() {
        let legacy: LegacySpecification = serde_json::from_value(json!({
            "ResourceTypes": {
                "AWS::Some::Type": {
                    "Properties": {
                        "DateTime": { "PrimitiveType": "Timestamp", "UpdateType": "Mutable" }
                    },
                    "Attributes": {
                        "Arn": { "PrimitiveType": "String" }
                    }
                }
            },
            "PropertyTypes": {
                "AWS::Some::Type.Window": {
                    "Properties": {
                        "Start": { "PrimitiveType": "Timestamp", "UpdateType": "Conditional" }
                    }
                },
                "AWS::Other::Type.Window": { "Properties": {} }
            }
        }))
        .unwrap();

        let slice = legacy.for_resource("AWS::Some::Type").unwrap();
        assert!(slice.spec.properties["DateTime"].ty.is_timestamp());
        assert_eq!(slice.types.keys().collect::<Vec<_>>(), vec!["Window"]);
        assert_eq!(
            slice.types["Window"].properties["Start"].update_type,
            Some(LegacyUpdateType::Conditional)
        );
        assert!(legacy.for_resource("AWS::Missing::Type").is_none());
    }

    #[test]
    fn test_legacy_list_type() {
        let prop: LegacyProperty = serde_json::from_value(json!({
            "Type": "List",
            "PrimitiveItemType": "Timestamp"
        }))
        .unwrap();
        assert!(prop.ty.is_timestamp_list());
        assert!(!prop.ty.is_timestamp());
    }

    #[test]
    fn test_documentation_lookup() {
        let docs: DocumentationSource = serde_json::from_value(json!({
            "AWS::S3::Bucket": "A bucket.",
            "AWS::S3::Bucket.BucketName": "The name.",
            "AWS::S3::Bucket.Rule.Id": "Rule id."
        }))
        .unwrap();

        assert_eq!(docs.resource("AWS::S3::Bucket"), Some("A bucket."));
        assert_eq!(docs.property("AWS::S3::Bucket", "BucketName"), Some("The name."));
        assert_eq!(docs.type_property("AWS::S3::Bucket", "Rule", "Id"), Some("Rule id."));
        assert_eq!(docs.property("AWS::S3::Bucket", "Missing"), None);
    }
}
