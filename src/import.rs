//! Reconciler
//!
//! Imports one registry resource schema, optionally enriched by its slice of
//! the legacy specification and by documentation, into the specification
//! database.
//!
//! Object shapes are first collected into a local buffer of type slots. A
//! slot is reserved before its properties are converted, so recursive
//! definitions can point at themselves; a slot whose shape equals one
//! already defined during the same import becomes an alias of it. Only once
//! the whole resource has been converted are slots given identities in the
//! `typeDefinition` collection, and local references are rewritten to them.

use regex::Regex;
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::OnceLock;
use tracing::{debug, info};

use crate::error::{Result, SpecError};
use crate::loading::{DocumentationSource, LegacyProperty, LegacyResourceSpec, LegacyTypeRef, RegistryResource};
use crate::model::{
    Attribute, Property, PropertyType, Provenance, Resource, Service, TypeDefinition, UpdateType, HAS_RESOURCE,
    RESOURCE, SERVICE, TYPE_DEFINITION, USES_TYPE,
};
use crate::patching::{escape_segment, parse_pointer};
use crate::report::{ProblemKind, ProblemReport};
use crate::store::{Comparison, Database, EntityId};

/// Everything one resource import reads and writes
pub struct ImportContext<'a> {
    pub db: &'a mut Database,
    pub report: &'a mut ProblemReport,
    pub resource: &'a RegistryResource,
    pub legacy: Option<&'a LegacyResourceSpec>,
    pub docs: Option<&'a DocumentationSource>,
    /// Source file name used in findings
    pub file: Option<String>,
}

fn type_name_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^([A-Za-z0-9]+)::([A-Za-z0-9]+)::([A-Za-z0-9]+)$").expect("type name pattern is valid")
    })
}

/// The parts of a `Vendor::Service::Resource` type name
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TypeName<'a> {
    pub vendor: &'a str,
    pub service: &'a str,
    pub resource: &'a str,
}

impl<'a> TypeName<'a> {
    pub fn parse(type_name: &'a str) -> Option<Self> {
        let captures = type_name_pattern().captures(type_name)?;
        Some(Self {
            vendor: captures.get(1)?.as_str(),
            service: captures.get(2)?.as_str(),
            resource: captures.get(3)?.as_str(),
        })
    }

    /// `Vendor::Service`
    pub fn namespace(&self) -> String {
        format!("{}::{}", self.vendor, self.service)
    }

    /// The service entity this resource type belongs to
    pub fn service_entity(&self) -> Service {
        Service {
            name: format!("{}-{}", self.vendor, self.service).to_lowercase(),
            short_name: self.service.to_lowercase(),
            cloud_formation_namespace: self.namespace(),
        }
    }
}

/// Name of the property a `/properties/...` pointer designates
///
/// Nested paths use dotted names; `*` (any array element) is dropped.
pub fn property_name_of(pointer: &str) -> Option<String> {
    let segments = parse_pointer(pointer);
    let (head, path) = segments.split_first()?;
    if head != "properties" || path.is_empty() {
        return None;
    }
    let parts: Vec<&str> = path.iter().map(String::as_str).filter(|s| *s != "*").collect();
    Some(parts.join("."))
}

/// Import one registry resource
///
/// Returns the new resource's identity, or `None` when the resource was
/// skipped (the reason is recorded in the report). Errors are only returned
/// for store invariant violations.
pub fn import_registry_resource(ctx: ImportContext<'_>) -> Result<Option<EntityId>> {
    let ImportContext {
        db,
        report,
        resource,
        legacy,
        docs,
        file,
    } = ctx;
    let type_name = resource.type_name.as_str();
    let mut report = report.bind(type_name, file);

    let Some(parsed) = TypeName::parse(type_name) else {
        report.failure(
            ProblemKind::ImportAnomaly,
            format!("'{}' is not a Vendor::Service::Resource type name", type_name),
            Some("/typeName"),
        );
        return Ok(None);
    };
    let already_imported = !db
        .lookup::<Resource>(RESOURCE, "cloudFormationType", Comparison::Equals, type_name)?
        .is_empty();
    if already_imported {
        report.failure(
            ProblemKind::ImportAnomaly,
            "resource type imported more than once; keeping the first",
            None,
        );
        return Ok(None);
    }

    let mut builder = TypeBuilder::new(resource, legacy, docs);
    builder.definitions_pass();
    let (properties, attributes) = builder.resource_members();
    let attributes = builder.merge_legacy_attributes(attributes);
    for finding in builder.findings.drain(..) {
        report.warning(finding.kind, finding.message, finding.pointer.as_deref());
    }

    let types = builder.commit(db)?;

    let documentation = resource
        .description
        .clone()
        .or_else(|| docs.and_then(|d| d.resource(type_name)).map(String::from))
        .or_else(|| legacy.and_then(|l| l.spec.documentation.clone()));
    let entity = Resource {
        name: parsed.resource.to_string(),
        cloud_formation_type: type_name.to_string(),
        documentation,
        properties: properties
            .into_iter()
            .map(|(name, p)| Ok((name, types.remap_property(p)?)))
            .collect::<Result<_>>()?,
        attributes: attributes
            .into_iter()
            .map(|(name, a)| Ok((name, types.remap_attribute(a)?)))
            .collect::<Result<_>>()?,
        primary_identifier: resource
            .primary_identifier
            .iter()
            .filter_map(|p| property_name_of(p))
            .collect(),
    };
    let resource_id = db.allocate(RESOURCE, entity)?;

    let service_id = service_for(db, &parsed)?;
    db.add_relation(HAS_RESOURCE, service_id, resource_id, None)?;
    for type_id in &types.minted {
        db.add_relation(USES_TYPE, resource_id, *type_id, None)?;
    }

    info!(
        resource = type_name,
        id = %resource_id,
        types = types.minted.len(),
        "imported resource"
    );
    Ok(Some(resource_id))
}

/// Existing service for the type name's namespace, or a new one
fn service_for(db: &mut Database, type_name: &TypeName<'_>) -> Result<EntityId> {
    let service = type_name.service_entity();
    let existing = db
        .lookup::<Service>(SERVICE, "name", Comparison::Equals, &service.name)?
        .first()
        .map(|record| record.id);
    match existing {
        Some(id) => Ok(id),
        None => db.allocate(SERVICE, service),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SlotState {
    Pending,
    Defined,
    Alias(usize),
}

#[derive(Debug)]
struct Slot {
    name: String,
    documentation: Option<String>,
    properties: BTreeMap<String, Property>,
    state: SlotState,
}

#[derive(Debug)]
struct Finding {
    kind: ProblemKind,
    message: String,
    pointer: Option<String>,
}

/// Local references point at slot positions until commit
fn local_ref(slot: usize) -> PropertyType {
    PropertyType::Ref {
        reference: EntityId::new(slot as u32),
    }
}

fn description(schema: &Value) -> Option<String> {
    schema.get("description").and_then(Value::as_str).map(String::from)
}

fn has_properties(schema: &Value) -> bool {
    schema
        .get("properties")
        .and_then(Value::as_object)
        .map_or(false, |properties| !properties.is_empty())
}

/// An object with declared properties; only these become type definitions
fn is_object_shape(schema: &Value) -> bool {
    let object_typed = match schema.get("type") {
        None => true,
        Some(Value::String(ty)) => ty == "object",
        Some(_) => false,
    };
    object_typed && has_properties(schema)
}

/// Whether a combinator branch says anything about the value's type
fn describes_type(branch: &Value) -> bool {
    branch.get("$ref").is_some() || branch.get("type").is_some() || has_properties(branch)
}

/// Pointer of the registry property an attribute was derived from
fn attribute_pointer(name: &str) -> String {
    let segments: Vec<String> = name.split('.').map(escape_segment).collect();
    format!("/properties/{}", segments.join("/"))
}

fn definition_pointer(name: &str) -> String {
    format!("/definitions/{}", escape_segment(name))
}

fn string_list(value: Option<&Value>) -> impl Iterator<Item = &str> {
    value
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter_map(Value::as_str)
}

fn branches<'v>(schema: &'v Value, key: &str) -> &'v [Value] {
    schema
        .get(key)
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or(&[])
}

/// Required property names of an object schema
///
/// A property is required when it is listed in `required`, when every
/// branch of a `oneOf` (or of an `anyOf`) requires it, or when any `allOf`
/// branch requires it.
pub fn derive_required<'v>(
    required: impl IntoIterator<Item = &'v str>,
    one_of: &[Value],
    any_of: &[Value],
    all_of: &[Value],
) -> BTreeSet<String> {
    let mut names: BTreeSet<String> = required.into_iter().map(String::from).collect();
    for alternatives in [one_of, any_of] {
        let mut lists = alternatives.iter().map(required_names);
        if let Some(first) = lists.next() {
            let common = lists.fold(first, |acc, next| acc.intersection(&next).cloned().collect());
            names.extend(common);
        }
    }
    for branch in all_of {
        names.extend(required_names(branch));
    }
    names
}

fn required_names(schema: &Value) -> BTreeSet<String> {
    derive_required(
        string_list(schema.get("required")),
        branches(schema, "oneOf"),
        branches(schema, "anyOf"),
        branches(schema, "allOf"),
    )
}

fn legacy_primitive(primitive: &str) -> PropertyType {
    match primitive {
        "String" => PropertyType::String,
        "Long" | "Integer" => PropertyType::Integer,
        "Double" => PropertyType::Number,
        "Boolean" => PropertyType::Boolean,
        "Timestamp" => PropertyType::DateTime,
        _ => PropertyType::Json,
    }
}

fn primitive_compatible(primitive: &str, ty: &PropertyType) -> bool {
    if let PropertyType::Union { types } = ty {
        return types.iter().any(|member| primitive_compatible(primitive, member));
    }
    match primitive {
        "String" | "Timestamp" => matches!(ty, PropertyType::String | PropertyType::DateTime),
        "Long" | "Integer" => matches!(ty, PropertyType::Integer | PropertyType::Number),
        "Double" => matches!(ty, PropertyType::Number),
        "Boolean" => matches!(ty, PropertyType::Boolean),
        _ => true,
    }
}

/// Whether a legacy type declaration agrees with a registry type
fn legacy_compatible(ty: &PropertyType, legacy: &LegacyTypeRef) -> bool {
    if let Some(primitive) = legacy.primitive_type.as_deref() {
        return primitive_compatible(primitive, ty);
    }
    let item_compatible = |element: &PropertyType| {
        legacy
            .primitive_item_type
            .as_deref()
            .map_or(true, |primitive| primitive_compatible(primitive, element))
    };
    match (legacy.collection_or_type.as_deref(), ty) {
        (Some("List"), PropertyType::Array { element }) => item_compatible(element),
        (Some("Map"), PropertyType::Map { element }) => item_compatible(element),
        (Some("Map"), PropertyType::Json) => true,
        (Some("List" | "Map"), PropertyType::Union { types }) => types.iter().any(|t| legacy_compatible(t, legacy)),
        (Some("List" | "Map"), _) => false,
        // named nested types cannot be compared across sources
        _ => true,
    }
}

fn describe_legacy(legacy: &LegacyTypeRef) -> String {
    if let Some(primitive) = &legacy.primitive_type {
        return primitive.clone();
    }
    let item = legacy
        .primitive_item_type
        .as_deref()
        .or(legacy.item_type.as_deref())
        .unwrap_or("?");
    match legacy.collection_or_type.as_deref() {
        Some("List") => format!("List<{}>", item),
        Some("Map") => format!("Map<{}>", item),
        Some(name) => name.to_string(),
        None => "(untyped)".to_string(),
    }
}

fn same_shape(a: &BTreeMap<String, Property>, b: &BTreeMap<String, Property>) -> bool {
    a.len() == b.len()
        && a.iter()
            .zip(b.iter())
            .all(|((name_a, prop_a), (name_b, prop_b))| name_a == name_b && prop_a.same_shape(prop_b))
}

/// Converts one resource's schema into properties and type slots
struct TypeBuilder<'a> {
    resource: &'a RegistryResource,
    legacy: Option<&'a LegacyResourceSpec>,
    docs: Option<&'a DocumentationSource>,
    slots: Vec<Slot>,
    by_definition: BTreeMap<String, usize>,
    /// Non-object definitions currently being inlined
    inlining: BTreeSet<String>,
    findings: Vec<Finding>,
}

impl<'a> TypeBuilder<'a> {
    fn new(
        resource: &'a RegistryResource,
        legacy: Option<&'a LegacyResourceSpec>,
        docs: Option<&'a DocumentationSource>,
    ) -> Self {
        Self {
            resource,
            legacy,
            docs,
            slots: Vec::new(),
            by_definition: BTreeMap::new(),
            inlining: BTreeSet::new(),
            findings: Vec::new(),
        }
    }

    fn warn(&mut self, kind: ProblemKind, message: impl Into<String>, pointer: Option<&str>) {
        self.findings.push(Finding {
            kind,
            message: message.into(),
            pointer: pointer.map(String::from),
        });
    }

    fn resolve(&self, mut slot: usize) -> usize {
        while let Some(SlotState::Alias(target)) = self.slots.get(slot).map(|s| s.state) {
            slot = target;
        }
        slot
    }

    fn reserve(&mut self, name: &str) -> usize {
        self.slots.push(Slot {
            name: name.to_string(),
            documentation: None,
            properties: BTreeMap::new(),
            state: SlotState::Pending,
        });
        self.slots.len() - 1
    }

    /// Fill a reserved slot, collapsing it into an equal earlier shape
    fn define(&mut self, slot: usize, documentation: Option<String>, properties: BTreeMap<String, Property>) -> usize {
        let existing = self
            .slots
            .iter()
            .enumerate()
            .find(|(i, s)| *i != slot && s.state == SlotState::Defined && same_shape(&s.properties, &properties))
            .map(|(i, _)| i);

        let entry = &mut self.slots[slot];
        entry.documentation = documentation;
        entry.properties = properties;
        match existing {
            Some(target) => {
                debug!(
                    name = %self.slots[slot].name,
                    same_as = %self.slots[target].name,
                    "reusing type definition"
                );
                self.slots[slot].state = SlotState::Alias(target);
                target
            }
            None => {
                self.slots[slot].state = SlotState::Defined;
                slot
            }
        }
    }

    /// Every object-shaped definition becomes a type, used or not
    fn definitions_pass(&mut self) {
        let resource = self.resource;
        for (name, schema) in &resource.definitions {
            if is_object_shape(schema) {
                self.definition_slot(name, schema);
            }
        }
    }

    fn definition_slot(&mut self, name: &str, schema: &'a Value) -> usize {
        if let Some(&slot) = self.by_definition.get(name) {
            return self.resolve(slot);
        }
        let slot = self.reserve(name);
        self.by_definition.insert(name.to_string(), slot);
        let documentation = description(schema).or_else(|| {
            self.docs
                .and_then(|d| d.property(&self.resource.type_name, name))
                .map(String::from)
        });
        let properties = self.type_properties(schema, name, &definition_pointer(name));
        self.define(slot, documentation, properties)
    }

    fn inline_type(&mut self, name: &str, schema: &'a Value, pointer: &str) -> usize {
        let slot = self.reserve(name);
        let properties = self.type_properties(schema, name, pointer);
        self.define(slot, description(schema), properties)
    }

    /// Properties of an object shape named `type_name`
    fn type_properties(&mut self, schema: &'a Value, type_name: &str, pointer: &str) -> BTreeMap<String, Property> {
        let mut properties = BTreeMap::new();
        let Some(declared) = schema.get("properties").and_then(Value::as_object) else {
            return properties;
        };
        let required = required_names(schema);
        let legacy_type = self.legacy.and_then(|l| l.types.get(type_name));

        for (name, prop_schema) in declared {
            let prop_pointer = format!("{}/properties/{}", pointer, escape_segment(name));
            let ty = self.convert(prop_schema, name, &prop_pointer);
            let legacy = legacy_type.and_then(|t| t.properties.get(name));
            let (ty, provenance) = self.refine(ty, legacy, &format!("{}.{}", type_name, name), &prop_pointer);

            let mut property = Property::new(ty, provenance);
            property.required = required.contains(name);
            property.documentation = description(prop_schema)
                .or_else(|| {
                    self.docs
                        .and_then(|d| d.type_property(&self.resource.type_name, type_name, name))
                        .map(String::from)
                })
                .or_else(|| legacy.and_then(|l| l.documentation.clone()));
            property.update_type = legacy
                .and_then(|l| l.update_type)
                .map(UpdateType::from)
                .unwrap_or_default();
            properties.insert(name.clone(), property);
        }
        properties
    }

    /// Convert a property schema; `hint` names inline object shapes
    fn convert(&mut self, schema: &'a Value, hint: &str, pointer: &str) -> PropertyType {
        let Some(object) = schema.as_object() else {
            return PropertyType::Json;
        };
        if let Some(reference) = object.get("$ref").and_then(Value::as_str) {
            return self.reference_type(reference, pointer);
        }

        match object.get("type") {
            Some(Value::String(ty)) => self.convert_typed(ty, schema, hint, pointer),
            Some(Value::Array(types)) => {
                let mut members = Vec::with_capacity(types.len());
                for ty in types.iter().filter_map(Value::as_str) {
                    members.push(self.convert_typed(ty, schema, hint, pointer));
                }
                PropertyType::union(members)
            }
            Some(other) => {
                self.warn(
                    ProblemKind::ImportAnomaly,
                    format!("unsupported type declaration {}", other),
                    Some(pointer),
                );
                PropertyType::Json
            }
            None => {
                for key in ["oneOf", "anyOf"] {
                    let alternatives = branches(schema, key);
                    if alternatives.iter().any(describes_type) {
                        let mut members = Vec::new();
                        for (i, branch) in alternatives.iter().enumerate() {
                            if describes_type(branch) {
                                members.push(self.convert(branch, hint, &format!("{}/{}/{}", pointer, key, i)));
                            }
                        }
                        return PropertyType::union(members);
                    }
                }
                if let Some((i, branch)) = branches(schema, "allOf")
                    .iter()
                    .enumerate()
                    .find(|(_, b)| describes_type(b))
                {
                    return self.convert(branch, hint, &format!("{}/allOf/{}", pointer, i));
                }
                if has_properties(schema)
                    || object.contains_key("additionalProperties")
                    || object.contains_key("patternProperties")
                {
                    return self.object_type(schema, hint, pointer);
                }
                PropertyType::Json
            }
        }
    }

    fn convert_typed(&mut self, ty: &str, schema: &'a Value, hint: &str, pointer: &str) -> PropertyType {
        match ty {
            "string" => match schema.get("format").and_then(Value::as_str) {
                Some("date-time") => PropertyType::DateTime,
                _ => PropertyType::String,
            },
            "integer" => PropertyType::Integer,
            "number" => PropertyType::Number,
            "boolean" => PropertyType::Boolean,
            "null" => PropertyType::Null,
            "array" => {
                let element = self.element_type(
                    schema.get("items"),
                    &format!("{}Items", hint),
                    &format!("{}/items", pointer),
                );
                PropertyType::array(element)
            }
            "object" => self.object_type(schema, hint, pointer),
            other => {
                self.warn(ProblemKind::ImportAnomaly, format!("unknown type '{}'", other), Some(pointer));
                PropertyType::Json
            }
        }
    }

    fn element_type(&mut self, items: Option<&'a Value>, hint: &str, pointer: &str) -> PropertyType {
        match items {
            Some(Value::Array(tuple)) => {
                let mut members = Vec::with_capacity(tuple.len());
                for (i, item) in tuple.iter().enumerate() {
                    members.push(self.convert(item, hint, &format!("{}/{}", pointer, i)));
                }
                PropertyType::union(members)
            }
            Some(item) => self.convert(item, hint, pointer),
            None => PropertyType::Json,
        }
    }

    fn object_type(&mut self, schema: &'a Value, hint: &str, pointer: &str) -> PropertyType {
        if has_properties(schema) {
            return local_ref(self.inline_type(hint, schema, pointer));
        }
        let item_hint = format!("{}Items", hint);
        if let Some(patterns) = schema.get("patternProperties").and_then(Value::as_object) {
            if !patterns.is_empty() {
                let mut members = Vec::with_capacity(patterns.len());
                for (pattern, value_schema) in patterns {
                    let value_pointer = format!("{}/patternProperties/{}", pointer, escape_segment(pattern));
                    members.push(self.convert(value_schema, &item_hint, &value_pointer));
                }
                return PropertyType::map(PropertyType::union(members));
            }
        }
        match schema.get("additionalProperties") {
            Some(additional) if additional.is_object() => {
                let element = self.convert(additional, &item_hint, &format!("{}/additionalProperties", pointer));
                PropertyType::map(element)
            }
            _ => PropertyType::Json,
        }
    }

    fn reference_type(&mut self, reference: &str, pointer: &str) -> PropertyType {
        let Some(name) = reference.strip_prefix("#/definitions/") else {
            self.warn(
                ProblemKind::ImportAnomaly,
                format!("unsupported reference '{}'", reference),
                Some(pointer),
            );
            return PropertyType::Json;
        };
        let name = name.replace("~1", "/").replace("~0", "~");
        self.definition_type(&name, pointer)
    }

    fn definition_type(&mut self, name: &str, pointer: &str) -> PropertyType {
        let resource = self.resource;
        let Some(schema) = resource.definitions.get(name) else {
            self.warn(
                ProblemKind::ImportAnomaly,
                format!("reference to unknown definition '{}'", name),
                Some(pointer),
            );
            return PropertyType::Json;
        };
        if is_object_shape(schema) {
            return local_ref(self.definition_slot(name, schema));
        }
        if !self.inlining.insert(name.to_string()) {
            self.warn(
                ProblemKind::ImportAnomaly,
                format!("definition '{}' refers to itself without an object in between", name),
                Some(pointer),
            );
            return PropertyType::Json;
        }
        let ty = self.convert(schema, name, &definition_pointer(name));
        self.inlining.remove(name);
        ty
    }

    /// Follow `$ref`s to definitions
    fn dereference(&self, mut schema: &'a Value) -> Option<&'a Value> {
        let resource = self.resource;
        for _ in 0..=resource.definitions.len() {
            let Some(reference) = schema.get("$ref").and_then(Value::as_str) else {
                return Some(schema);
            };
            let name = reference.strip_prefix("#/definitions/")?;
            schema = resource.definitions.get(name)?;
        }
        None
    }

    /// Schema of a nested property path below `/properties`
    fn resolve_path(&self, path: &[String]) -> Option<&'a Value> {
        let resource = self.resource;
        let (first, rest) = path.split_first()?;
        let mut schema = resource.properties.get(first)?;
        for segment in rest {
            let mut current = self.dereference(schema)?;
            schema = if segment == "*" {
                current
                    .get("items")
                    .or_else(|| current.get("additionalProperties").filter(|v| v.is_object()))?
            } else {
                if current.get("type").and_then(Value::as_str) == Some("array") {
                    current = self.dereference(current.get("items")?)?;
                }
                current.get("properties")?.get(segment)?
            };
        }
        Some(schema)
    }

    /// Apply the legacy specification's view of a property onto its registry type
    fn refine(
        &mut self,
        ty: PropertyType,
        legacy: Option<&LegacyProperty>,
        subject: &str,
        pointer: &str,
    ) -> (PropertyType, Provenance) {
        match legacy {
            Some(legacy) => self.refine_with(ty, &legacy.ty, subject, pointer),
            None => (ty, Provenance::Registry),
        }
    }

    fn refine_with(
        &mut self,
        ty: PropertyType,
        legacy: &LegacyTypeRef,
        subject: &str,
        pointer: &str,
    ) -> (PropertyType, Provenance) {
        if legacy.is_timestamp() && ty == PropertyType::String {
            return (PropertyType::DateTime, Provenance::Refined);
        }
        if legacy.is_timestamp_list() && ty == PropertyType::array(PropertyType::String) {
            return (PropertyType::array(PropertyType::DateTime), Provenance::Refined);
        }
        if !legacy_compatible(&ty, legacy) {
            self.warn(
                ProblemKind::ReconciliationConflict,
                format!(
                    "{}: legacy specification declares {}, registry schema declares {}; keeping the registry type",
                    subject,
                    describe_legacy(legacy),
                    ty
                ),
                Some(pointer),
            );
        }
        (ty, Provenance::Registry)
    }

    /// Settable properties and read-only attributes of the resource
    fn resource_members(&mut self) -> (BTreeMap<String, Property>, BTreeMap<String, Attribute>) {
        let resource = self.resource;
        let read_only: BTreeSet<&str> = resource.read_only_properties.iter().map(String::as_str).collect();
        let create_only: BTreeSet<&str> = resource.create_only_properties.iter().map(String::as_str).collect();
        let deprecated: BTreeSet<&str> = resource.deprecated_properties.iter().map(String::as_str).collect();
        let required = derive_required(
            resource.required.iter().map(String::as_str),
            &resource.one_of,
            &resource.any_of,
            &resource.all_of,
        );

        let mut properties = BTreeMap::new();
        let mut attributes = BTreeMap::new();

        for (name, schema) in &resource.properties {
            let pointer = format!("/properties/{}", escape_segment(name));
            let ty = self.convert(schema, name, &pointer);
            let documentation = description(schema).or_else(|| {
                self.docs
                    .and_then(|d| d.property(&resource.type_name, name))
                    .map(String::from)
            });

            if read_only.contains(pointer.as_str()) && !create_only.contains(pointer.as_str()) {
                attributes.insert(
                    name.clone(),
                    Attribute {
                        ty,
                        documentation,
                        provenance: Provenance::Registry,
                    },
                );
                continue;
            }

            let legacy = self.legacy.and_then(|l| l.spec.properties.get(name));
            let (ty, provenance) = self.refine(ty, legacy, name, &pointer);
            let mut property = Property::new(ty, provenance);
            property.required = required.contains(name);
            property.documentation = documentation.or_else(|| legacy.and_then(|l| l.documentation.clone()));
            property.deprecated = deprecated.contains(pointer.as_str());
            property.update_type = if create_only.contains(pointer.as_str()) {
                UpdateType::Immutable
            } else if legacy.and_then(|l| l.update_type).map(UpdateType::from) == Some(UpdateType::Conditional) {
                UpdateType::Conditional
            } else {
                UpdateType::Mutable
            };
            properties.insert(name.clone(), property);
        }

        for pointer in &resource.read_only_properties {
            let segments = parse_pointer(pointer);
            match segments.as_slice() {
                [head, name] if head == "properties" => {
                    if !resource.properties.contains_key(name) {
                        self.warn(
                            ProblemKind::ImportAnomaly,
                            format!("read-only property '{}' is not declared", name),
                            Some(pointer.as_str()),
                        );
                    }
                }
                [head, path @ ..] if head == "properties" && path.len() > 1 => {
                    if create_only.contains(pointer.as_str()) {
                        continue;
                    }
                    let Some(attribute_name) = property_name_of(pointer) else {
                        continue;
                    };
                    match self.resolve_path(path) {
                        Some(schema) => {
                            let hint = path.last().map(String::as_str).unwrap_or_default();
                            let ty = self.convert(schema, hint, pointer.as_str());
                            attributes.insert(
                                attribute_name,
                                Attribute {
                                    ty,
                                    documentation: description(schema),
                                    provenance: Provenance::Registry,
                                },
                            );
                        }
                        None => self.warn(
                            ProblemKind::ImportAnomaly,
                            format!("read-only path '{}' does not resolve to a property", pointer),
                            Some(pointer.as_str()),
                        ),
                    }
                }
                _ => self.warn(
                    ProblemKind::ImportAnomaly,
                    format!("read-only entry '{}' is not a property pointer", pointer),
                    None,
                ),
            }
        }

        (properties, attributes)
    }

    /// Slot for a type the legacy specification names
    fn named_slot(&self, name: &str) -> Option<usize> {
        let slot = self.by_definition.get(name).copied().or_else(|| {
            self.slots
                .iter()
                .position(|s| s.name == name && s.state == SlotState::Defined)
        })?;
        Some(self.resolve(slot))
    }

    fn legacy_item_type(&self, legacy: &LegacyTypeRef) -> PropertyType {
        if let Some(primitive) = &legacy.primitive_item_type {
            return legacy_primitive(primitive);
        }
        legacy
            .item_type
            .as_deref()
            .and_then(|name| self.named_slot(name))
            .map_or(PropertyType::Json, local_ref)
    }

    fn legacy_type(&self, legacy: &LegacyTypeRef) -> PropertyType {
        if let Some(primitive) = &legacy.primitive_type {
            return legacy_primitive(primitive);
        }
        match legacy.collection_or_type.as_deref() {
            Some("List") => PropertyType::array(self.legacy_item_type(legacy)),
            Some("Map") => PropertyType::map(self.legacy_item_type(legacy)),
            Some(name) => self.named_slot(name).map_or(PropertyType::Json, local_ref),
            None => PropertyType::Json,
        }
    }

    /// Union the legacy attributes into the registry-derived ones
    fn merge_legacy_attributes(&mut self, mut attributes: BTreeMap<String, Attribute>) -> BTreeMap<String, Attribute> {
        let Some(legacy) = self.legacy else {
            return attributes;
        };
        let resource = self.resource;
        let type_name = &resource.type_name;

        for (name, legacy_attribute) in &legacy.spec.attributes {
            let legacy_ty = &legacy_attribute.ty;
            match attributes.get_mut(name) {
                None => {
                    let ty = self.legacy_type(legacy_ty);
                    let documentation = self.docs.and_then(|d| d.property(type_name, name)).map(String::from);
                    attributes.insert(
                        name.clone(),
                        Attribute {
                            ty,
                            documentation,
                            provenance: Provenance::LegacySpec,
                        },
                    );
                }
                Some(existing) => {
                    let pointer = attribute_pointer(name);
                    if legacy_ty.is_timestamp() && existing.ty == PropertyType::String {
                        existing.ty = PropertyType::DateTime;
                        existing.provenance = Provenance::Refined;
                    }
                    if legacy_compatible(&existing.ty, legacy_ty) {
                        self.warn(
                            ProblemKind::Overlap,
                            format!(
                                "attribute '{}' is declared by both the registry schema and the legacy specification",
                                name
                            ),
                            Some(&pointer),
                        );
                    } else {
                        let message = format!(
                            "attribute '{}': registry schema declares {}, legacy specification declares {}; keeping the registry type",
                            name,
                            existing.ty,
                            describe_legacy(legacy_ty)
                        );
                        self.warn(ProblemKind::ReconciliationConflict, message, Some(&pointer));
                    }
                }
            }
        }
        attributes
    }

    /// Allocate every defined slot in the database
    fn commit(self, db: &mut Database) -> Result<CommittedTypes> {
        let base = db.next_id(TYPE_DEFINITION)?.raw();
        let mut assigned: Vec<Option<EntityId>> = vec![None; self.slots.len()];
        let mut next = base;
        for (i, slot) in self.slots.iter().enumerate() {
            if slot.state == SlotState::Defined {
                assigned[i] = Some(EntityId::new(next));
                next += 1;
            }
        }
        for i in 0..self.slots.len() {
            if assigned[i].is_none() {
                assigned[i] = assigned[self.resolve(i)];
            }
        }
        let ids = assigned
            .into_iter()
            .zip(&self.slots)
            .map(|(id, slot)| {
                id.ok_or_else(|| {
                    SpecError::IdentityViolation(format!("type '{}' was referenced but never defined", slot.name))
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let mut committed = CommittedTypes {
            ids,
            minted: Vec::new(),
        };
        for (i, slot) in self.slots.into_iter().enumerate() {
            if slot.state != SlotState::Defined {
                continue;
            }
            let definition = TypeDefinition {
                name: slot.name,
                documentation: slot.documentation,
                properties: slot
                    .properties
                    .into_iter()
                    .map(|(name, p)| Ok((name, committed.remap_property(p)?)))
                    .collect::<Result<_>>()?,
            };
            let id = db.allocate(TYPE_DEFINITION, definition)?;
            if id != committed.ids[i] {
                return Err(SpecError::IdentityViolation(format!(
                    "{} allocated {} where {} was expected",
                    TYPE_DEFINITION, id, committed.ids[i]
                )));
            }
            committed.minted.push(id);
        }
        Ok(committed)
    }
}

/// Slot positions mapped to database identities
struct CommittedTypes {
    ids: Vec<EntityId>,
    /// Identities of newly allocated type definitions, in allocation order
    minted: Vec<EntityId>,
}

impl CommittedTypes {
    fn remap(&self, ty: PropertyType) -> Result<PropertyType> {
        Ok(match ty {
            PropertyType::Ref { reference } => PropertyType::Ref {
                reference: self.ids.get(reference.raw() as usize).copied().ok_or_else(|| {
                    SpecError::IdentityViolation(format!("dangling local type reference {}", reference))
                })?,
            },
            PropertyType::Array { element } => PropertyType::array(self.remap(*element)?),
            PropertyType::Map { element } => PropertyType::map(self.remap(*element)?),
            PropertyType::Union { types } => PropertyType::Union {
                types: types.into_iter().map(|t| self.remap(t)).collect::<Result<_>>()?,
            },
            other => other,
        })
    }

    fn remap_property(&self, property: Property) -> Result<Property> {
        Ok(Property {
            ty: self.remap(property.ty)?,
            ..property
        })
    }

    fn remap_attribute(&self, attribute: Attribute) -> Result<Attribute> {
        Ok(Attribute {
            ty: self.remap(attribute.ty)?,
            ..attribute
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::spec_database;
    use serde_json::json;

    fn resource(value: Value) -> RegistryResource {
        serde_json::from_value(value).unwrap()
    }

    fn import(db: &mut Database, report: &mut ProblemReport, resource: &RegistryResource) -> Option<EntityId> {
        import_registry_resource(ImportContext {
            db,
            report,
            resource,
            legacy: None,
            docs: None,
            file: None,
        })
        .unwrap()
    }

    #[test]
    fn test_type_name_parsing() {
        let parsed = TypeName::parse("AWS::S3::Bucket").unwrap();
        assert_eq!(parsed.resource, "Bucket");
        assert_eq!(parsed.namespace(), "AWS::S3");
        assert_eq!(parsed.service_entity().name, "aws-s3");
        assert_eq!(parsed.service_entity().short_name, "s3");
        assert!(TypeName::parse("AWS::S3").is_none());
        assert!(TypeName::parse("AWS::S3::Bucket::Extra").is_none());
    }

    #[test]
    fn test_property_name_of() {
        assert_eq!(property_name_of("/properties/Arn").as_deref(), Some("Arn"));
        assert_eq!(property_name_of("/properties/Endpoint/Address").as_deref(), Some("Endpoint.Address"));
        assert_eq!(property_name_of("/properties/Items/*/Id").as_deref(), Some("Items.Id"));
        assert_eq!(property_name_of("/definitions/X"), None);
        assert_eq!(property_name_of("/properties"), None);
    }

    #[test]
    fn test_derive_required_combinators() {
        let one_of = vec![json!({"required": ["A", "B"]}), json!({"required": ["B", "C"]})];
        let all_of = vec![json!({"required": ["D"]}), json!({"required": ["E"]})];
        let required = derive_required(["Z"], &one_of, &[], &all_of);
        assert_eq!(
            required.into_iter().collect::<Vec<_>>(),
            vec!["B", "D", "E", "Z"]
        );
    }

    #[test]
    fn test_recursive_definition_refers_to_itself() {
        let mut db = spec_database();
        let mut report = ProblemReport::new();
        let res = resource(json!({
            "typeName": "AWS::Some::Type",
            "properties": { "Root": { "$ref": "#/definitions/Node" } },
            "definitions": {
                "Node": {
                    "type": "object",
                    "properties": {
                        "Children": { "type": "array", "items": { "$ref": "#/definitions/Node" } }
                    }
                }
            }
        }));
        let id = import(&mut db, &mut report, &res).unwrap();

        let types = db.follow::<TypeDefinition>(USES_TYPE, id).unwrap();
        assert_eq!(types.len(), 1);
        let node_id = types[0].id;
        assert_eq!(
            types[0].entity.properties["Children"].ty,
            PropertyType::array(PropertyType::Ref { reference: node_id })
        );
        assert!(report.is_empty());
    }

    #[test]
    fn test_duplicate_resource_is_skipped() {
        let mut db = spec_database();
        let mut report = ProblemReport::new();
        let res = resource(json!({
            "typeName": "AWS::Some::Type",
            "properties": { "Name": { "type": "string" } }
        }));
        assert!(import(&mut db, &mut report, &res).is_some());
        assert!(import(&mut db, &mut report, &res).is_none());
        assert_eq!(db.len(RESOURCE).unwrap(), 1);
        assert_eq!(report.summary().failures, 1);
    }

    #[test]
    fn test_services_are_shared() {
        let mut db = spec_database();
        let mut report = ProblemReport::new();
        for type_name in ["AWS::S3::Bucket", "AWS::S3::BucketPolicy", "AWS::SQS::Queue"] {
            let res = resource(json!({
                "typeName": type_name,
                "properties": { "Name": { "type": "string" } }
            }));
            import(&mut db, &mut report, &res).unwrap();
        }

        assert_eq!(db.len(SERVICE).unwrap(), 2);
        let s3 = db
            .lookup::<Service>(SERVICE, "name", Comparison::Equals, "aws-s3")
            .unwrap();
        let resources = db.follow::<Resource>(HAS_RESOURCE, s3[0].id).unwrap();
        let names: Vec<&str> = resources.iter().map(|r| r.entity.name.as_str()).collect();
        assert_eq!(names, vec!["Bucket", "BucketPolicy"]);
    }

    #[test]
    fn test_unresolvable_nested_read_only_path_is_reported() {
        let mut db = spec_database();
        let mut report = ProblemReport::new();
        let res = resource(json!({
            "typeName": "AWS::Some::Type",
            "properties": { "Endpoint": { "type": "object", "properties": { "Address": { "type": "string" } } } },
            "readOnlyProperties": ["/properties/Endpoint/Port", "/properties/Endpoint/Address"]
        }));
        let id = import(&mut db, &mut report, &res).unwrap();

        let entity = db.get::<Resource>(RESOURCE, id).unwrap();
        assert_eq!(entity.attributes.keys().collect::<Vec<_>>(), vec!["Endpoint.Address"]);
        assert_eq!(report.of_kind(ProblemKind::ImportAnomaly).count(), 1);
    }
}
