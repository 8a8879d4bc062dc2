//! Snapshots of a populated specification database survive a round trip

use rstest::rstest;
use serde_json::json;
use service_spec::loading::RegistryResource;
use service_spec::model::{Resource, Service, TypeDefinition, HAS_RESOURCE, RESOURCE, SERVICE, USES_TYPE};
use service_spec::store::{Comparison, Database};
use service_spec::{import_registry_resource, spec_database, ImportContext, ProblemReport, Snapshot, SpecError};

fn populated() -> Database {
    let mut db = spec_database();
    let mut report = ProblemReport::new();
    let resources = [
        json!({
            "typeName": "AWS::S3::Bucket",
            "properties": {
                "BucketName": { "type": "string" },
                "Rules": { "type": "array", "items": { "$ref": "#/definitions/Rule" } },
                "Arn": { "type": "string" }
            },
            "definitions": {
                "Rule": { "type": "object", "properties": { "Id": { "type": "string" } } }
            },
            "readOnlyProperties": ["/properties/Arn"]
        }),
        json!({
            "typeName": "AWS::S3::BucketPolicy",
            "properties": { "PolicyDocument": { "type": "object" } }
        }),
        json!({
            "typeName": "AWS::SQS::Queue",
            "properties": { "QueueName": { "type": "string" } }
        }),
    ];
    for resource in resources {
        let resource: RegistryResource = serde_json::from_value(resource).unwrap();
        import_registry_resource(ImportContext {
            db: &mut db,
            report: &mut report,
            resource: &resource,
            legacy: None,
            docs: None,
            file: None,
        })
        .unwrap()
        .unwrap();
    }
    db
}

fn reload(snapshot: &Snapshot, pretty: bool) -> Database {
    let json = snapshot.to_json(pretty).unwrap();
    let mut db = spec_database();
    db.load(&Snapshot::from_json(&json).unwrap()).unwrap();
    db
}

#[rstest]
#[case(false)]
#[case(true)]
fn test_lookups_survive_roundtrip(#[case] pretty: bool) {
    let original = populated();
    let restored = reload(&original.save().unwrap(), pretty);

    for name in [SERVICE, RESOURCE, "typeDefinition"] {
        assert_eq!(original.len(name).unwrap(), restored.len(name).unwrap(), "{}", name);
    }

    let before = original
        .lookup::<Resource>(RESOURCE, "cloudFormationType", Comparison::Equals, "AWS::S3::Bucket")
        .unwrap();
    let after = restored
        .lookup::<Resource>(RESOURCE, "cloudFormationType", Comparison::Equals, "AWS::S3::Bucket")
        .unwrap();
    assert_eq!(before.len(), 1);
    assert_eq!(before[0].id, after[0].id);
    assert_eq!(before[0].entity, after[0].entity);
}

#[rstest]
#[case(false)]
#[case(true)]
fn test_relations_survive_roundtrip(#[case] pretty: bool) {
    let original = populated();
    let restored = reload(&original.save().unwrap(), pretty);

    let s3 = restored
        .lookup::<Service>(SERVICE, "name", Comparison::Equals, "aws-s3")
        .unwrap();
    let resources: Vec<&str> = restored
        .follow::<Resource>(HAS_RESOURCE, s3[0].id)
        .unwrap()
        .iter()
        .map(|r| r.entity.name.as_str())
        .collect();
    assert_eq!(resources, vec!["Bucket", "BucketPolicy"]);

    let bucket = restored
        .lookup::<Resource>(RESOURCE, "name", Comparison::Equals, "Bucket")
        .unwrap()[0]
        .id;
    let before: Vec<_> = original
        .follow::<TypeDefinition>(USES_TYPE, bucket)
        .unwrap()
        .into_iter()
        .map(|t| (t.id, t.entity.clone()))
        .collect();
    let after: Vec<_> = restored
        .follow::<TypeDefinition>(USES_TYPE, bucket)
        .unwrap()
        .into_iter()
        .map(|t| (t.id, t.entity.clone()))
        .collect();
    assert_eq!(before, after);
    assert_eq!(after[0].1.name, "Rule");
}

#[test]
fn test_save_is_deterministic() {
    let first = populated().save().unwrap();
    let second = populated().save().unwrap();
    assert_eq!(first.checksum, second.checksum);
    assert_eq!(first.to_json(false).unwrap(), second.to_json(false).unwrap());
}

#[test]
fn test_tampered_snapshot_is_rejected() {
    let mut snapshot = populated().save().unwrap();
    snapshot
        .collections
        .get_mut(RESOURCE)
        .unwrap()[0]
        .entity["name"] = json!("Tampered");

    let mut db = populated();
    let err = db.load(&snapshot).unwrap_err();
    assert!(matches!(err, SpecError::ChecksumMismatch { .. }));
    // content is untouched when verification fails
    assert_eq!(db.len(RESOURCE).unwrap(), 3);
}

#[test]
fn test_snapshot_file_roundtrip() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested/db.json");
    let snapshot = populated().save().unwrap();
    snapshot.write_to(&path, true).unwrap();

    let read = Snapshot::read_from(&path).unwrap();
    assert_eq!(read, snapshot);
    assert_eq!(read.entity_count(SERVICE), 2);
    assert_eq!(read.entity_count("missing"), 0);
}
