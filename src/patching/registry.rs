//! Patch registry keyed by resource type

use std::collections::BTreeMap;

use super::Patcher;

/// A patcher registered under a name
#[derive(Debug, Clone)]
pub struct NamedPatch {
    pub name: String,
    pub patcher: Patcher,
}

/// Patches to apply per resource type, in registration order
///
/// Built once and handed to the loader; there is no global registry.
#[derive(Debug, Clone, Default)]
pub struct PatchRegistry {
    global: Vec<NamedPatch>,
    by_resource: BTreeMap<String, Vec<NamedPatch>>,
}

impl PatchRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a patch applied to every resource, before resource-specific ones
    pub fn register_global(&mut self, name: impl Into<String>, patcher: Patcher) -> &mut Self {
        self.global.push(NamedPatch {
            name: name.into(),
            patcher,
        });
        self
    }

    /// Register a patch for one resource type
    pub fn register(
        &mut self,
        resource_type: impl Into<String>,
        name: impl Into<String>,
        patcher: Patcher,
    ) -> &mut Self {
        self.by_resource
            .entry(resource_type.into())
            .or_default()
            .push(NamedPatch {
                name: name.into(),
                patcher,
            });
        self
    }

    fn patches_for<'a>(&'a self, resource_type: &str) -> impl Iterator<Item = &'a NamedPatch> {
        self.global
            .iter()
            .chain(self.by_resource.get(resource_type).into_iter().flatten())
    }

    /// Names of the patches that apply to a resource type, in application order
    pub fn names_for(&self, resource_type: &str) -> Vec<&str> {
        self.patches_for(resource_type).map(|p| p.name.as_str()).collect()
    }

    /// Combined patcher for a resource type, or `None` if nothing applies
    pub fn patcher_for(&self, resource_type: &str) -> Option<Patcher> {
        let patchers: Vec<Patcher> = self
            .patches_for(resource_type)
            .map(|p| Patcher::named(p.name.clone(), p.patcher.clone()))
            .collect();
        if patchers.is_empty() {
            None
        } else {
            Some(Patcher::Sequence(patchers))
        }
    }

    /// Resource types with specific patches
    pub fn resource_types(&self) -> impl Iterator<Item = &str> {
        self.by_resource.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.global.len() + self.by_resource.values().map(Vec::len).sum::<usize>()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::patching::{apply_patcher, Reason};
    use serde_json::json;

    fn registry() -> PatchRegistry {
        let mut registry = PatchRegistry::new();
        registry
            .register(
                "AWS::Some::Type",
                "second",
                Patcher::add_property("", "b", json!(2), Reason::other("b")),
            )
            .register_global("first", Patcher::add_property("", "a", json!(1), Reason::other("a")))
            .register(
                "AWS::Some::Type",
                "third",
                Patcher::add_property("", "c", json!(3), Reason::other("c")),
            );
        registry
    }

    #[test]
    fn test_global_patches_come_first() {
        let registry = registry();
        assert_eq!(registry.names_for("AWS::Some::Type"), vec!["first", "second", "third"]);
        assert_eq!(registry.names_for("AWS::Other::Type"), vec!["first"]);
        assert_eq!(registry.len(), 3);
    }

    #[test]
    fn test_patcher_for_applies_in_registration_order() {
        let registry = registry();
        let patcher = registry.patcher_for("AWS::Some::Type").unwrap();
        let outcome = apply_patcher(&json!({}), &patcher);

        let names: Vec<_> = outcome.patches.iter().filter_map(|p| p.patch.clone()).collect();
        assert_eq!(names, vec!["first", "second", "third"]);
    }

    #[test]
    fn test_empty_registry_has_no_patcher() {
        assert!(PatchRegistry::new().patcher_for("AWS::S3::Bucket").is_none());
    }
}
