//! Loading registry resource files through patches and validation

use serde_json::{json, Value};
use service_spec::loading::{LoadOptions, Loader, RegistryResource, REGISTRY_RESOURCE_SCHEMA};
use service_spec::patches::builtin_patches;
use service_spec::SpecError;
use std::path::{Path, PathBuf};

fn write(dir: &Path, name: &str, value: Value) -> PathBuf {
    let path = dir.join(name);
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(&path, serde_json::to_string_pretty(&value).unwrap()).unwrap();
    path
}

fn registry_loader(options: LoadOptions) -> Loader<RegistryResource> {
    Loader::from_embedded_schema(REGISTRY_RESOURCE_SCHEMA, options).unwrap()
}

fn queue() -> Value {
    json!({
        "typeName": "AWS::SQS::Queue",
        "properties": { "QueueName": { "type": "string" } }
    })
}

fn invalid() -> Value {
    json!({
        "typeName": "Not a type name",
        "properties": { "QueueName": { "type": "string" } }
    })
}

#[test]
fn test_valid_file_loads_without_warnings() {
    let dir = tempfile::tempdir().unwrap();
    let path = write(dir.path(), "queue.json", queue());

    let loaded = registry_loader(LoadOptions::default()).load_file(&path).unwrap();
    assert_eq!(loaded.value.type_name, "AWS::SQS::Queue");
    assert!(loaded.warnings.is_empty());
    assert!(loaded.patches_applied.is_empty());
}

#[test]
fn test_must_validate_fails_with_relative_file_name() {
    let dir = tempfile::tempdir().unwrap();
    let path = write(dir.path(), "registry/invalid.json", invalid());

    let options = LoadOptions::default().with_error_root(dir.path());
    let err = registry_loader(options).load_file(&path).unwrap_err();
    match err {
        SpecError::SchemaValidation { file, details } => {
            assert_eq!(file.map(PathBuf::from), Some(Path::new("registry").join("invalid.json")));
            assert!(details.contains("/typeName"));
        }
        other => panic!("unexpected error: {}", other),
    }
}

#[test]
fn test_advisory_validation_keeps_best_effort_value() {
    let dir = tempfile::tempdir().unwrap();
    let path = write(dir.path(), "invalid.json", invalid());

    let options = LoadOptions::default().must_validate(false).with_error_root(dir.path());
    let loaded = registry_loader(options).load_file(&path).unwrap();
    assert_eq!(loaded.value.type_name, "Not a type name");
    assert!(!loaded.warnings.is_empty());
    assert!(loaded
        .warnings
        .iter()
        .all(|w| w.file.as_deref() == Some("invalid.json")));
}

#[test]
fn test_patches_are_applied_and_attributed_to_the_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = write(
        dir.path(),
        "queue.json",
        json!({
            "typeName": "AWS::SQS::Queue",
            "properties": { "QueueName": { "type": ["string"] } }
        }),
    );

    let patches = builtin_patches();
    let options = LoadOptions::default()
        .with_patcher(patches.patcher_for("AWS::SQS::Queue"))
        .with_error_root(dir.path());
    let loaded = registry_loader(options).load_file(&path).unwrap();

    assert_eq!(loaded.value.properties["QueueName"], json!({ "type": "string" }));
    assert_eq!(loaded.patches_applied.len(), 1);
    let patch = &loaded.patches_applied[0];
    assert_eq!(patch.pointer, "/properties/QueueName/type");
    assert_eq!(patch.file_name.as_deref(), Some("queue.json"));
}

#[test]
fn test_load_files_keeps_successes() {
    let dir = tempfile::tempdir().unwrap();
    let good = write(dir.path(), "good.json", queue());
    let bad = write(dir.path(), "bad.json", invalid());
    let missing = dir.path().join("missing.json");

    let options = LoadOptions::default().with_error_root(dir.path());
    let combined = registry_loader(options).load_files(&[good, bad, missing]);

    assert_eq!(combined.value.len(), 1);
    assert_eq!(combined.value[0].type_name, "AWS::SQS::Queue");
    let files: Vec<_> = combined.warnings.iter().map(|w| w.file.as_deref()).collect();
    assert_eq!(files, vec![Some("bad.json"), Some("missing.json")]);
}

#[test]
fn test_files_outside_the_error_root_step_out() {
    let dir = tempfile::tempdir().unwrap();
    let path = write(dir.path(), "legacy/invalid.json", invalid());

    let options = LoadOptions::default().with_error_root(dir.path().join("registry"));
    let err = registry_loader(options).load_file(&path).unwrap_err();
    match err {
        SpecError::SchemaValidation { file, .. } => {
            assert_eq!(
                file.map(PathBuf::from),
                Some(Path::new("..").join("legacy").join("invalid.json"))
            );
        }
        other => panic!("unexpected error: {}", other),
    }
}
