//! Composable patchers

use serde_json::{Map, Value};
use std::fmt;

use super::lens::{escape_segment, Lens};
use super::Reason;

/// A correction applied through a [`Lens`]
#[derive(Clone)]
pub enum Patcher {
    /// Replace the value at a pointer
    ReplaceValue {
        pointer: String,
        value: Value,
        reason: Reason,
    },
    /// Set a key on the object at a pointer (adding or overwriting)
    AddProperty {
        pointer: String,
        key: String,
        value: Value,
        reason: Reason,
    },
    /// Remove a key from the object at a pointer
    RemoveProperty {
        pointer: String,
        key: String,
        reason: Reason,
    },
    /// Add entries under `/definitions`, creating it if needed
    AddDefinitions {
        definitions: Map<String, Value>,
        reason: Reason,
    },
    /// Arbitrary tree visit starting at the root
    Walk {
        name: &'static str,
        visit: fn(&Lens<'_>),
    },
    /// Attribute every change of the inner patcher to a registered name
    Named { name: String, patcher: Box<Patcher> },
    /// Apply patchers one after another
    Sequence(Vec<Patcher>),
}

impl fmt::Debug for Patcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Patcher::ReplaceValue { pointer, .. } => write!(f, "ReplaceValue({})", pointer),
            Patcher::AddProperty { pointer, key, .. } => write!(f, "AddProperty({}, {})", pointer, key),
            Patcher::RemoveProperty { pointer, key, .. } => write!(f, "RemoveProperty({}, {})", pointer, key),
            Patcher::AddDefinitions { definitions, .. } => {
                let names: Vec<&str> = definitions.keys().map(String::as_str).collect();
                write!(f, "AddDefinitions({})", names.join(", "))
            }
            Patcher::Walk { name, .. } => write!(f, "Walk({})", name),
            Patcher::Named { name, .. } => write!(f, "Named({})", name),
            Patcher::Sequence(patchers) => f.debug_list().entries(patchers).finish(),
        }
    }
}

impl Patcher {
    pub fn replace_value(pointer: impl Into<String>, value: Value, reason: Reason) -> Self {
        Patcher::ReplaceValue {
            pointer: pointer.into(),
            value,
            reason,
        }
    }

    pub fn add_property(pointer: impl Into<String>, key: impl Into<String>, value: Value, reason: Reason) -> Self {
        Patcher::AddProperty {
            pointer: pointer.into(),
            key: key.into(),
            value,
            reason,
        }
    }

    pub fn remove_property(pointer: impl Into<String>, key: impl Into<String>, reason: Reason) -> Self {
        Patcher::RemoveProperty {
            pointer: pointer.into(),
            key: key.into(),
            reason,
        }
    }

    pub fn walk(name: &'static str, visit: fn(&Lens<'_>)) -> Self {
        Patcher::Walk { name, visit }
    }

    pub fn named(name: impl Into<String>, patcher: Patcher) -> Self {
        Patcher::Named {
            name: name.into(),
            patcher: Box::new(patcher),
        }
    }

    pub fn sequence(patchers: impl IntoIterator<Item = Patcher>) -> Self {
        Patcher::Sequence(patchers.into_iter().collect())
    }

    /// Sequence `self` and `next`
    pub fn then(self, next: Patcher) -> Self {
        match self {
            Patcher::Sequence(mut patchers) => {
                patchers.push(next);
                Patcher::Sequence(patchers)
            }
            first => Patcher::Sequence(vec![first, next]),
        }
    }

    /// Record this patcher's requests on `lens`
    pub fn apply(&self, lens: &Lens<'_>) {
        match self {
            Patcher::ReplaceValue { pointer, value, reason } => match lens.navigate(pointer) {
                Some(target) => target.replace_value(value.clone(), reason),
                None => lens.report_problem(format!("no value at '{}' to replace", pointer), reason),
            },
            Patcher::AddProperty {
                pointer,
                key,
                value,
                reason,
            } => match lens.navigate(pointer) {
                Some(target) => target.add_property(key, value.clone(), reason),
                None => lens.report_problem(format!("no object at '{}' to add '{}' to", pointer, key), reason),
            },
            Patcher::RemoveProperty { pointer, key, reason } => match lens.navigate(pointer) {
                Some(target) => target.remove_property(key, reason),
                None => lens.report_problem(
                    format!("no object at '{}' to remove '{}' from", pointer, key),
                    reason,
                ),
            },
            Patcher::AddDefinitions { definitions, reason } => match lens.field("definitions") {
                Some(existing) => {
                    for (name, definition) in definitions {
                        existing.add_property(name, definition.clone(), reason);
                    }
                }
                None => lens.add_property("definitions", Value::Object(definitions.clone()), reason),
            },
            Patcher::Walk { visit, .. } => lens.walk(&mut |l| visit(l)),
            Patcher::Named { name, patcher } => lens.session().named(name, || patcher.apply(lens)),
            Patcher::Sequence(patchers) => {
                for patcher in patchers {
                    patcher.apply(lens);
                }
            }
        }
    }
}

/// Set (or overwrite) a top-level resource property schema
pub fn replace_resource_property(name: &str, schema: Value, reason: Reason) -> Patcher {
    Patcher::add_property("/properties", name, schema, reason)
}

/// Set (or overwrite) a property schema inside a named definition
pub fn replace_definition_property(definition: &str, name: &str, schema: Value, reason: Reason) -> Patcher {
    Patcher::add_property(
        format!("/definitions/{}/properties", escape_segment(definition)),
        name,
        schema,
        reason,
    )
}

/// Add definitions to the document
pub fn add_definitions(definitions: Value, reason: Reason) -> Patcher {
    let definitions = match definitions {
        Value::Object(map) => map,
        _ => Map::new(),
    };
    Patcher::AddDefinitions { definitions, reason }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::patching::apply_patcher;
    use serde_json::json;

    #[test]
    fn test_add_definitions_creates_section() {
        let root = json!({"properties": {}});
        let patcher = add_definitions(
            json!({"Value": {"type": "object"}}),
            Reason::source_issue("missing definition"),
        );
        let outcome = apply_patcher(&root, &patcher);
        assert_eq!(outcome.root["definitions"]["Value"], json!({"type": "object"}));
        assert_eq!(outcome.patches[0].pointer, "");
    }

    #[test]
    fn test_add_definitions_merges_into_existing_section() {
        let root = json!({"definitions": {"A": {"type": "object"}}});
        let outcome = apply_patcher(
            &root,
            &add_definitions(json!({"B": {"type": "string"}}), Reason::other("merge")),
        );
        assert_eq!(outcome.root["definitions"]["A"], json!({"type": "object"}));
        assert_eq!(outcome.root["definitions"]["B"], json!({"type": "string"}));
        assert_eq!(outcome.patches[0].pointer, "/definitions");
    }

    #[test]
    fn test_replace_definition_property_requires_definition() {
        let root = json!({"definitions": {}});
        let outcome = apply_patcher(
            &root,
            &replace_definition_property("Missing", "X", json!({}), Reason::other("x")),
        );
        assert!(outcome.patches.is_empty());
        assert_eq!(outcome.problems.len(), 1);
    }

    #[test]
    fn test_walk_patcher_sees_every_node() {
        fn stringify_integers(lens: &Lens<'_>) {
            if lens.value() == &json!("integer") {
                lens.replace_value(json!("string"), &Reason::other("all strings"));
            }
        }

        let root = json!({"a": {"type": "integer"}, "b": [{"type": "integer"}]});
        let outcome = apply_patcher(&root, &Patcher::walk("stringify", stringify_integers));
        assert_eq!(outcome.root, json!({"a": {"type": "string"}, "b": [{"type": "string"}]}));
        assert_eq!(outcome.patches.len(), 2);
    }

    #[test]
    fn test_named_patch_attribution() {
        let root = json!({"properties": {"A": {}}});
        let patcher = Patcher::named(
            "drop-a",
            Patcher::remove_property("/properties", "A", Reason::other("unused")),
        )
        .then(Patcher::add_property("/properties", "B", json!({}), Reason::other("new")));

        let outcome = apply_patcher(&root, &patcher);
        assert_eq!(outcome.patches[0].patch.as_deref(), Some("drop-a"));
        assert_eq!(outcome.patches[1].patch, None);
    }
}
