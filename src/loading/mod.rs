//! Loading source documents
//!
//! A [`Loader`] reads a document, runs the configured patcher over it,
//! validates the corrected tree against a JSON Schema and finally
//! deserializes it. With `must_validate` set, any validation finding fails
//! the load; otherwise findings are returned as warnings and the
//! best-effort value is kept.
//!
//! The validation schemas ship inside the binary (see [`EMBEDDED_SCHEMAS`]).

pub mod sources;
pub mod validator;

pub use sources::{
    DocumentationSource, LegacyAttribute, LegacyProperty, LegacyPropertyType, LegacyResource, LegacyResourceSpec,
    LegacySpecification, LegacyTypeRef, LegacyUpdateType, RegistryResource,
};
pub use validator::{format_findings, validate, KeywordFailure, SchemaValidator, ValidationFinding};

use include_dir::{include_dir, Dir};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::fmt;
use std::marker::PhantomData;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::error::{Result, SpecError};
use crate::patching::{apply_patcher, PatchProblem, PatchReport, Patcher};
use crate::report::{BoundProblemReport, ProblemKind};

/// JSON Schemas compiled into the binary
pub static EMBEDDED_SCHEMAS: Dir<'_> = include_dir!("$CARGO_MANIFEST_DIR/schemas");

/// Schema for one registry resource document
pub const REGISTRY_RESOURCE_SCHEMA: &str = "registry-resource.schema.json";
/// Schema for the legacy specification document
pub const LEGACY_SPEC_SCHEMA: &str = "legacy-spec.schema.json";

/// Read an embedded schema by file name
pub fn embedded_schema(name: &str) -> Result<Value> {
    let file = EMBEDDED_SCHEMAS
        .get_file(name)
        .ok_or_else(|| SpecError::InvalidSchema(format!("no embedded schema named '{}'", name)))?;
    let text = file
        .contents_utf8()
        .ok_or_else(|| SpecError::InvalidSchema(format!("embedded schema '{}' is not UTF-8", name)))?;
    Ok(serde_json::from_str(text)?)
}

#[derive(Debug, Clone)]
pub struct LoadOptions {
    /// Fail on any validation finding (default `true`)
    pub must_validate: bool,
    /// Applied to the document before it is validated
    pub patcher: Option<Patcher>,
    /// File names in findings are made relative to this directory
    pub error_root_directory: Option<PathBuf>,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self {
            must_validate: true,
            patcher: None,
            error_root_directory: None,
        }
    }
}

impl LoadOptions {
    pub fn must_validate(mut self, must_validate: bool) -> Self {
        self.must_validate = must_validate;
        self
    }

    pub fn with_patcher(mut self, patcher: Option<Patcher>) -> Self {
        self.patcher = patcher;
        self
    }

    pub fn with_error_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.error_root_directory = Some(root.into());
        self
    }
}

/// A non-fatal loading finding
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LoadWarning {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pointer: Option<String>,
    pub message: String,
}

impl LoadWarning {
    fn from_finding(finding: &ValidationFinding) -> Self {
        Self {
            file: None,
            pointer: Some(finding.pointer.clone()),
            message: finding.to_string(),
        }
    }

    /// A failed load, demoted to a warning when results are combined
    pub fn from_error(error: &SpecError) -> Self {
        let file = match error {
            SpecError::LoadIo { file, .. } => Some(file.clone()),
            SpecError::SchemaValidation { file, .. } => file.clone(),
            _ => None,
        };
        Self {
            file,
            pointer: None,
            message: error.to_string(),
        }
    }

    fn located(mut self, file_name: &str) -> Self {
        self.file.get_or_insert_with(|| file_name.to_string());
        self
    }
}

impl fmt::Display for LoadWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(file) = &self.file {
            write!(f, "{}: ", file)?;
        }
        write!(f, "{}", self.message)
    }
}

/// A successfully loaded value with everything that happened on the way
#[derive(Debug, Clone)]
pub struct LoadResult<T> {
    pub value: T,
    /// Validation findings tolerated because validation was advisory
    pub warnings: Vec<LoadWarning>,
    pub patches_applied: Vec<PatchReport>,
    /// Patches that could not be applied
    pub patch_problems: Vec<PatchProblem>,
}

impl<T> LoadResult<T> {
    pub fn new(value: T) -> Self {
        Self {
            value,
            warnings: Vec::new(),
            patches_applied: Vec::new(),
            patch_problems: Vec::new(),
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> LoadResult<U> {
        LoadResult {
            value: f(self.value),
            warnings: self.warnings,
            patches_applied: self.patches_applied,
            patch_problems: self.patch_problems,
        }
    }

    /// Record warnings and patch problems in a problem report
    pub fn record(&self, report: &mut BoundProblemReport<'_>) {
        for warning in &self.warnings {
            report.warning(
                ProblemKind::AdvisoryFinding,
                warning.message.clone(),
                warning.pointer.as_deref(),
            );
        }
        for problem in &self.patch_problems {
            let message = match &problem.patch {
                Some(patch) => format!("patch '{}': {} ({})", patch, problem.message, problem.reason),
                None => format!("{} ({})", problem.message, problem.reason),
            };
            report.warning(ProblemKind::PatchApplication, message, Some(&problem.pointer));
        }
    }

    fn located(mut self, file_name: &str) -> Self {
        self.warnings = self.warnings.into_iter().map(|w| w.located(file_name)).collect();
        for patch in &mut self.patches_applied {
            patch.file_name = Some(file_name.to_string());
        }
        self
    }
}

/// Combine individual loads: successes are collected, failures become warnings
pub fn combine_load_results<T>(results: impl IntoIterator<Item = Result<LoadResult<T>>>) -> LoadResult<Vec<T>> {
    let mut combined = LoadResult::new(Vec::new());
    for result in results {
        match result {
            Ok(loaded) => {
                combined.value.push(loaded.value);
                combined.warnings.extend(loaded.warnings);
                combined.patches_applied.extend(loaded.patches_applied);
                combined.patch_problems.extend(loaded.patch_problems);
            }
            Err(e) => combined.warnings.push(LoadWarning::from_error(&e)),
        }
    }
    combined
}

/// Patches, validates and deserializes documents of one kind
pub struct Loader<T> {
    validator: Arc<SchemaValidator>,
    options: LoadOptions,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Clone for Loader<T> {
    fn clone(&self) -> Self {
        Self {
            validator: Arc::clone(&self.validator),
            options: self.options.clone(),
            _marker: PhantomData,
        }
    }
}

impl<T> fmt::Debug for Loader<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Loader").field("options", &self.options).finish()
    }
}

impl<T: DeserializeOwned> Loader<T> {
    pub fn new(validator: SchemaValidator, options: LoadOptions) -> Self {
        Self {
            validator: Arc::new(validator),
            options,
            _marker: PhantomData,
        }
    }

    /// Loader validating against one of the [`EMBEDDED_SCHEMAS`]
    pub fn from_embedded_schema(name: &str, options: LoadOptions) -> Result<Self> {
        let schema = embedded_schema(name)?;
        Ok(Self::new(SchemaValidator::new(&schema)?, options))
    }

    pub fn options(&self) -> &LoadOptions {
        &self.options
    }

    /// Same validator, different patcher
    pub fn with_patcher(&self, patcher: Option<Patcher>) -> Self {
        Self {
            validator: Arc::clone(&self.validator),
            options: self.options.clone().with_patcher(patcher),
            _marker: PhantomData,
        }
    }

    /// Patch, validate and deserialize an in-memory document
    pub fn load(&self, document: Value) -> Result<LoadResult<T>> {
        let (document, patches_applied, patch_problems) = match &self.options.patcher {
            Some(patcher) => {
                let outcome = apply_patcher(&document, patcher);
                (outcome.root, outcome.patches, outcome.problems)
            }
            None => (document, Vec::new(), Vec::new()),
        };

        let findings = self.validator.validate(&document);
        if self.options.must_validate && !findings.is_empty() {
            return Err(SpecError::SchemaValidation {
                file: None,
                details: format_findings(&findings),
            });
        }
        if !findings.is_empty() {
            debug!(count = findings.len(), "tolerating validation findings");
        }

        let value = serde_json::from_value(document).map_err(|e| SpecError::InvalidFormat(e.to_string()))?;
        Ok(LoadResult {
            value,
            warnings: findings.iter().map(LoadWarning::from_finding).collect(),
            patches_applied,
            patch_problems,
        })
    }

    /// Load a file; file names in findings follow `error_root_directory`
    pub fn load_file(&self, path: &Path) -> Result<LoadResult<T>> {
        let file_name = self.display_name(path);
        let load = || -> Result<LoadResult<T>> {
            let text = std::fs::read_to_string(path)?;
            let document: Value = serde_json::from_str(&text)?;
            self.load(document)
        };
        match load() {
            Ok(loaded) => Ok(loaded.located(&file_name)),
            Err(e) => {
                warn!(file = %file_name, error = %e, "failed to load");
                Err(e.located(&file_name))
            }
        }
    }

    /// Load files one after another, keeping the successes
    pub fn load_files<P: AsRef<Path>>(&self, paths: &[P]) -> LoadResult<Vec<T>> {
        combine_load_results(paths.iter().map(|p| self.load_file(p.as_ref())))
    }

    /// Name of `path` as it appears in findings
    pub fn display_name(&self, path: &Path) -> String {
        let relative = match self.options.error_root_directory.as_deref() {
            Some(root) => relative_path(path, root),
            None => path.to_path_buf(),
        };
        relative.to_string_lossy().into_owned()
    }
}

/// `path` expressed relative to `root`, stepping out with `..` where needed
///
/// Purely lexical. When the two cannot be related (one absolute and one
/// relative, or `root` climbs with `..` past the shared prefix) `path` is
/// returned unchanged.
pub fn relative_path(path: &Path, root: &Path) -> PathBuf {
    if path.is_absolute() != root.is_absolute() {
        return path.to_path_buf();
    }
    let path_parts: Vec<Component<'_>> = path.components().filter(|c| *c != Component::CurDir).collect();
    let root_parts: Vec<Component<'_>> = root.components().filter(|c| *c != Component::CurDir).collect();
    let shared = path_parts
        .iter()
        .zip(&root_parts)
        .take_while(|(a, b)| a == b)
        .count();

    let mut relative = PathBuf::new();
    for part in &root_parts[shared..] {
        match part {
            Component::Normal(_) => relative.push(".."),
            _ => return path.to_path_buf(),
        }
    }
    for part in &path_parts[shared..] {
        relative.push(part.as_os_str());
    }
    relative
}
