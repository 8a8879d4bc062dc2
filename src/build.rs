//! Batch pipeline
//!
//! Loads every registry schema under the configured directory, one after
//! another, imports the valid ones and writes the database snapshot and the
//! problem report. A failing input only skips that input.

use serde_json::Value;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::config::SpecConfig;
use crate::error::{Result, SpecError};
use crate::import::{import_registry_resource, ImportContext};
use crate::loading::{
    DocumentationSource, LegacySpecification, LoadOptions, LoadResult, Loader, RegistryResource,
    LEGACY_SPEC_SCHEMA, REGISTRY_RESOURCE_SCHEMA,
};
use crate::model::spec_database;
use crate::patches::builtin_patches;
use crate::patching::PatchRegistry;
use crate::report::{Location, ProblemKind, ProblemReport, ReportSummary};
use crate::store::Database;

/// Result of a build
#[derive(Debug)]
pub struct BuildOutput {
    pub db: Database,
    pub report: ProblemReport,
    pub summary: ReportSummary,
    /// Resource types imported, in import order
    pub imported: Vec<String>,
}

/// Registry schema files below `dir`, in a stable order
pub fn discover_registry_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in WalkDir::new(dir).sort_by_file_name() {
        let entry = entry.map_err(|e| SpecError::LoadIo {
            file: dir.display().to_string(),
            message: e.to_string(),
        })?;
        let path = entry.path();
        if entry.file_type().is_file() && path.extension().map_or(false, |ext| ext == "json") {
            files.push(path.to_path_buf());
        }
    }
    Ok(files)
}

/// Assembles the database from configured sources
pub struct SpecBuilder {
    config: SpecConfig,
    patches: PatchRegistry,
}

impl SpecBuilder {
    /// Builder using the built-in patches
    pub fn new(config: SpecConfig) -> Self {
        Self::with_patches(config, builtin_patches())
    }

    pub fn with_patches(config: SpecConfig, patches: PatchRegistry) -> Self {
        Self { config, patches }
    }

    pub fn config(&self) -> &SpecConfig {
        &self.config
    }

    fn load_options(&self) -> LoadOptions {
        let options = LoadOptions::default().must_validate(self.config.validation.must_validate);
        match self.config.error_root() {
            Some(root) => options.with_error_root(root),
            None => options,
        }
    }

    /// Legacy specification, if configured; an unreadable one is reported and ignored
    fn load_legacy(&self, report: &mut ProblemReport) -> Option<LegacySpecification> {
        let path = self.config.sources.legacy_spec.as_deref()?;
        let options = self.load_options().must_validate(false);
        let loaded = if self.config.validation.validate_legacy {
            Loader::<LegacySpecification>::from_embedded_schema(LEGACY_SPEC_SCHEMA, options)
                .and_then(|loader| loader.load_file(path))
        } else {
            read_json(path).and_then(|value| {
                serde_json::from_value::<LegacySpecification>(value)
                    .map(LoadResult::new)
                    .map_err(|e| SpecError::InvalidFormat(e.to_string()))
            })
        };

        match loaded {
            Ok(loaded) => {
                let mut bound = report.bind("legacy-spec", Some(path.display().to_string()));
                loaded.record(&mut bound);
                info!(resources = loaded.value.resource_types.len(), "loaded legacy specification");
                Some(loaded.value)
            }
            Err(e) => {
                warn!(error = %e, "ignoring legacy specification");
                report.warning(
                    ProblemKind::LoadIo,
                    Some("legacy-spec"),
                    e.to_string(),
                    Location::file(path.display().to_string()),
                );
                None
            }
        }
    }

    /// Documentation, if configured; absence or failure is not fatal
    fn load_documentation(&self, report: &mut ProblemReport) -> Option<DocumentationSource> {
        let path = self.config.sources.documentation.as_deref()?;
        let loaded = read_json(path).and_then(|value| {
            serde_json::from_value::<DocumentationSource>(value).map_err(|e| SpecError::InvalidFormat(e.to_string()))
        });
        match loaded {
            Ok(docs) => {
                info!(entries = docs.len(), "loaded documentation");
                Some(docs)
            }
            Err(e) => {
                report.warning(
                    ProblemKind::LoadIo,
                    Some("documentation"),
                    e.to_string(),
                    Location::file(path.display().to_string()),
                );
                None
            }
        }
    }

    /// Run the whole pipeline in memory
    pub fn build(&self) -> Result<BuildOutput> {
        let mut db = spec_database();
        let mut report = ProblemReport::new();
        let mut imported = Vec::new();

        let legacy = self.load_legacy(&mut report);
        let docs = self.load_documentation(&mut report);
        let loader = Loader::<RegistryResource>::from_embedded_schema(REGISTRY_RESOURCE_SCHEMA, self.load_options())?;

        let files = discover_registry_files(&self.config.sources.registry_dir)?;
        info!(files = files.len(), dir = %self.config.sources.registry_dir.display(), "building specification");

        for path in &files {
            let file_name = loader.display_name(path);

            let type_name = match peek_type_name(path) {
                Ok(name) => name,
                Err(e) => {
                    report.failure(ProblemKind::LoadIo, None, e.to_string(), Location::file(file_name));
                    continue;
                }
            };
            let patcher = type_name.as_deref().and_then(|t| self.patches.patcher_for(t));
            let patched_loader = loader.with_patcher(patcher);
            let subject = type_name.clone().unwrap_or_else(|| file_name.clone());

            let loaded = match patched_loader.load_file(path) {
                Ok(loaded) => loaded,
                Err(e) => {
                    let kind = match e {
                        SpecError::SchemaValidation { .. } => ProblemKind::SchemaValidation,
                        _ => ProblemKind::LoadIo,
                    };
                    report.failure(kind, Some(&subject), e.to_string(), Location::file(file_name));
                    continue;
                }
            };
            loaded.record(&mut report.bind(subject.as_str(), Some(file_name.clone())));
            debug!(resource = %subject, patches = loaded.patches_applied.len(), "loaded");

            let resource = loaded.value;
            let legacy_slice = legacy.as_ref().and_then(|l| l.for_resource(&resource.type_name));
            let id = import_registry_resource(ImportContext {
                db: &mut db,
                report: &mut report,
                resource: &resource,
                legacy: legacy_slice.as_ref(),
                docs: docs.as_ref(),
                file: Some(file_name),
            })?;
            if id.is_some() {
                imported.push(resource.type_name);
            }
        }

        let summary = report.summary();
        info!(resources = imported.len(), %summary, "build finished");
        Ok(BuildOutput {
            db,
            report,
            summary,
            imported,
        })
    }

    /// Run the pipeline and write the snapshot and problem report
    pub fn build_and_write(&self) -> Result<BuildOutput> {
        let output = self.build()?;
        let snapshot = output.db.save()?;
        snapshot.write_to(&self.config.output.path, self.config.output.format.is_pretty())?;
        output.report.write_to(&self.config.output.report_path)?;
        info!(
            snapshot = %self.config.output.path.display(),
            report = %self.config.output.report_path.display(),
            entities = snapshot.total_entities(),
            "wrote build output"
        );
        Ok(output)
    }
}

fn read_json(path: &Path) -> Result<Value> {
    let text = std::fs::read_to_string(path).map_err(|e| SpecError::LoadIo {
        file: path.display().to_string(),
        message: e.to_string(),
    })?;
    serde_json::from_str(&text).map_err(|e| SpecError::LoadIo {
        file: path.display().to_string(),
        message: e.to_string(),
    })
}

/// `typeName` of a registry document, read before patches are chosen
fn peek_type_name(path: &Path) -> Result<Option<String>> {
    let value = read_json(path)?;
    Ok(value.get("typeName").and_then(Value::as_str).map(String::from))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Resource, RESOURCE};
    use serde_json::json;

    fn write(dir: &Path, name: &str, value: Value) {
        std::fs::write(dir.join(name), serde_json::to_string_pretty(&value).unwrap()).unwrap();
    }

    #[test]
    fn test_discovery_is_sorted_and_filtered() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "b.json", json!({}));
        write(dir.path(), "a.json", json!({}));
        std::fs::write(dir.path().join("notes.txt"), "x").unwrap();

        let files = discover_registry_files(dir.path()).unwrap();
        let names: Vec<_> = files
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["a.json", "b.json"]);
    }

    #[test]
    fn test_build_skips_invalid_resources() {
        let dir = tempfile::tempdir().unwrap();
        let registry = dir.path().join("registry");
        std::fs::create_dir_all(&registry).unwrap();
        write(
            &registry,
            "aws-sqs-queue.json",
            json!({
                "typeName": "AWS::SQS::Queue",
                "properties": { "QueueName": { "type": "string" }, "Arn": { "type": "string" } },
                "readOnlyProperties": ["/properties/Arn"]
            }),
        );
        write(&registry, "broken.json", json!({ "typeName": "Broken" }));

        let mut config = SpecConfig::default();
        config.sources.registry_dir = registry;
        config.output.path = dir.path().join("out/db.json");
        config.output.report_path = dir.path().join("out/problems.json");

        let output = SpecBuilder::new(config.clone()).build_and_write().unwrap();
        assert_eq!(output.imported, vec!["AWS::SQS::Queue"]);
        assert_eq!(output.summary.failures, 1);
        assert_eq!(output.report.all()[0].location.file.as_deref(), Some("registry/broken.json"));

        let snapshot = crate::store::Snapshot::read_from(&config.output.path).unwrap();
        let mut db = spec_database();
        db.load(&snapshot).unwrap();
        let queue = db.all::<Resource>(RESOURCE).unwrap();
        assert_eq!(queue[0].attributes.keys().collect::<Vec<_>>(), vec!["Arn"]);
        assert!(config.output.report_path.exists());
    }
}
