//! Built-in patches for known upstream defects

use serde_json::{json, Value};

use crate::patching::{
    add_definitions, replace_definition_property, replace_resource_property, Lens, PatchRegistry, Patcher, Reason,
};

/// Registry holding every built-in patch
pub fn builtin_patches() -> PatchRegistry {
    let mut registry = PatchRegistry::new();
    registry
        .register_global(
            "collapse-single-element-type-arrays",
            Patcher::walk("collapse-single-element-type-arrays", collapse_single_type_arrays),
        )
        .register(
            "AWS::Config::RemediationConfiguration",
            "remediation-parameters-map",
            remediation_configuration(),
        )
        .register(
            "AWS::IoT1Click::Project",
            "device-templates-map",
            iot1click_project(),
        );
    registry
}

/// `"type": ["string"]` is written by some schemas where `"type": "string"` is meant
fn collapse_single_type_arrays(lens: &Lens<'_>) {
    let Some(ty) = lens.field("type") else {
        return;
    };
    if let Value::Array(types) = ty.value() {
        if let [only @ Value::String(_)] = types.as_slice() {
            ty.replace_value(
                only.clone(),
                &Reason::source_issue("Single-element type array where a plain type is meant"),
            );
        }
    }
}

fn remediation_configuration() -> Patcher {
    let reason = Reason::source_issue("Unused property type in legacy spec, now missing in the registry schema");

    replace_resource_property(
        "Parameters",
        json!({
            "type": "object",
            "additionalProperties": { "$ref": "#/definitions/RemediationParameterValue" },
        }),
        reason.clone(),
    )
    .then(add_definitions(
        json!({
            "RemediationParameterValue": {
                "type": "object",
                "additionalProperties": false,
                "properties": {
                    "ResourceValue": { "$ref": "#/definitions/ResourceValue" },
                    "StaticValue": { "$ref": "#/definitions/StaticValue" },
                },
            },
            "ResourceValue": {
                "type": "object",
                "additionalProperties": false,
                "properties": {
                    "Value": { "type": "string" },
                },
            },
            "StaticValue": {
                "type": "object",
                "additionalProperties": false,
                "properties": {
                    "Value": { "type": "array", "items": { "type": "string" } },
                },
            },
        }),
        reason,
    ))
}

fn iot1click_project() -> Patcher {
    let reason = Reason::type_enrichment(
        "Type AWS::IoT1Click::Project.PlacementTemplate.DeviceTemplates as Map<String, DeviceTemplate>",
    );

    replace_definition_property(
        "PlacementTemplate",
        "DeviceTemplates",
        json!({
            "type": "object",
            "additionalProperties": { "$ref": "#/definitions/DeviceTemplate" },
        }),
        reason.clone(),
    )
    .then(add_definitions(
        json!({
            "DeviceTemplate": {
                "type": "object",
                "additionalProperties": false,
                "properties": {
                    "DeviceType": { "type": "string" },
                    "CallbackOverrides": { "type": "object" },
                },
            },
        }),
        reason,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::patching::apply_patcher;

    #[test]
    fn test_builtin_registry_contents() {
        let registry = builtin_patches();
        assert_eq!(
            registry.names_for("AWS::Config::RemediationConfiguration"),
            vec!["collapse-single-element-type-arrays", "remediation-parameters-map"]
        );
        assert_eq!(
            registry.names_for("AWS::S3::Bucket"),
            vec!["collapse-single-element-type-arrays"]
        );
    }

    #[test]
    fn test_single_element_type_arrays_collapse() {
        let root = json!({
            "properties": {
                "Name": { "type": ["string"] },
                "Either": { "type": ["string", "object"] },
            }
        });
        let patcher = builtin_patches().patcher_for("AWS::S3::Bucket").unwrap();
        let outcome = apply_patcher(&root, &patcher);

        assert_eq!(outcome.root["properties"]["Name"]["type"], json!("string"));
        assert_eq!(outcome.root["properties"]["Either"]["type"], json!(["string", "object"]));
        assert_eq!(outcome.patches.len(), 1);
        assert_eq!(outcome.patches[0].pointer, "/properties/Name/type");
    }

    #[test]
    fn test_remediation_configuration_patch() {
        let root = json!({
            "typeName": "AWS::Config::RemediationConfiguration",
            "properties": { "Parameters": { "type": "object" } },
        });
        let patcher = builtin_patches()
            .patcher_for("AWS::Config::RemediationConfiguration")
            .unwrap();
        let outcome = apply_patcher(&root, &patcher);

        assert_eq!(
            outcome.root["properties"]["Parameters"]["additionalProperties"]["$ref"],
            json!("#/definitions/RemediationParameterValue")
        );
        assert!(outcome.root["definitions"]["StaticValue"].is_object());
        assert!(outcome.problems.is_empty());
        assert!(outcome
            .patches
            .iter()
            .all(|p| p.patch.as_deref() == Some("remediation-parameters-map")));
    }

    #[test]
    fn test_iot1click_patch_reports_missing_definition() {
        let root = json!({ "typeName": "AWS::IoT1Click::Project", "properties": {} });
        let patcher = builtin_patches().patcher_for("AWS::IoT1Click::Project").unwrap();
        let outcome = apply_patcher(&root, &patcher);

        assert_eq!(outcome.problems.len(), 1);
        assert_eq!(outcome.problems[0].patch.as_deref(), Some("device-templates-map"));
        assert!(outcome.root["definitions"]["DeviceTemplate"].is_object());
    }
}
