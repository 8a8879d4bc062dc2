//! Configuration for specification builds
//!
//! Supports loading configuration from:
//! - Default values
//! - Config file (spec-build.toml)
//! - Environment variables (SPEC_BUILD__*)
//!
//! ## Example config file (spec-build.toml):
//! ```toml
//! [sources]
//! registry_dir = "sources/registry/us-east-1"
//! legacy_spec = "sources/legacy/us-east-1.json"
//! documentation = "sources/docs/cloudformation-docs.json"
//! error_root_directory = "sources"
//!
//! [validation]
//! must_validate = true
//! validate_legacy = false
//!
//! [output]
//! path = "build/db.json"
//! format = "pretty"
//! report_path = "build/problems.json"
//! ```

use config_crate::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{Result, SpecError};

/// Main configuration for a specification build
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SpecConfig {
    /// Input documents
    #[serde(default)]
    pub sources: SourcesConfig,

    /// Validation settings
    #[serde(default)]
    pub validation: ValidationConfig,

    /// Output settings
    #[serde(default)]
    pub output: OutputConfig,
}

/// Input locations
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourcesConfig {
    /// Directory of registry resource schemas, one JSON file per resource type
    #[serde(default = "default_registry_dir")]
    pub registry_dir: PathBuf,

    /// Legacy specification document
    #[serde(default)]
    pub legacy_spec: Option<PathBuf>,

    /// Documentation document
    #[serde(default)]
    pub documentation: Option<PathBuf>,

    /// File names in findings are made relative to this directory
    #[serde(default)]
    pub error_root_directory: Option<PathBuf>,
}

/// Validation configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationConfig {
    /// Skip resources whose schema fails validation
    #[serde(default = "default_true")]
    pub must_validate: bool,

    /// Validate the legacy specification (advisory only)
    #[serde(default)]
    pub validate_legacy: bool,
}

/// Output configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Database snapshot file
    #[serde(default = "default_output_path")]
    pub path: PathBuf,

    /// Output format (pretty or compact)
    #[serde(default)]
    pub format: OutputFormat,

    /// Problem report file
    #[serde(default = "default_report_path")]
    pub report_path: PathBuf,
}

/// Output format for JSON
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Pretty,
    Compact,
}

impl OutputFormat {
    pub fn is_pretty(self) -> bool {
        self == OutputFormat::Pretty
    }
}

// Default value functions
fn default_registry_dir() -> PathBuf {
    PathBuf::from("sources/registry")
}

fn default_true() -> bool {
    true
}

fn default_output_path() -> PathBuf {
    PathBuf::from("build/db.json")
}

fn default_report_path() -> PathBuf {
    PathBuf::from("build/problems.json")
}

impl Default for SourcesConfig {
    fn default() -> Self {
        Self {
            registry_dir: default_registry_dir(),
            legacy_spec: None,
            documentation: None,
            error_root_directory: None,
        }
    }
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            must_validate: true,
            validate_legacy: false,
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            path: default_output_path(),
            format: OutputFormat::Pretty,
            report_path: default_report_path(),
        }
    }
}

impl SpecConfig {
    /// Load configuration from default locations
    pub fn load() -> Result<Self> {
        Self::load_from(None)
    }

    /// Load configuration, layering an explicit file over the default locations
    pub fn load_from(config_path: Option<&Path>) -> Result<Self> {
        let mut builder = Config::builder();

        let config_locations = ["spec-build.toml", ".spec-build.toml", "config/spec-build.toml"];

        for location in config_locations {
            builder = builder.add_source(File::with_name(location).required(false));
        }

        // Load from XDG config directory
        if let Some(config_dir) = directories::ProjectDirs::from("dev", "service-spec", "spec-build") {
            let xdg_config = config_dir.config_dir().join("spec-build.toml");
            if xdg_config.exists() {
                builder = builder.add_source(File::from(xdg_config).required(false));
            }
        }

        if let Some(path) = config_path {
            builder = builder.add_source(File::from(path).required(true));
        }

        // Load from environment variables (SPEC_BUILD__*)
        builder = builder.add_source(
            Environment::with_prefix("SPEC_BUILD")
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder.build()?;
        Ok(config.try_deserialize()?)
    }

    /// Save configuration to a file
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self).map_err(|e| SpecError::InvalidFormat(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Error root directory, defaulting to the parent of the registry directory
    pub fn error_root(&self) -> Option<PathBuf> {
        self.sources
            .error_root_directory
            .clone()
            .or_else(|| self.sources.registry_dir.parent().map(Path::to_path_buf))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = SpecConfig::default();
        assert!(config.validation.must_validate);
        assert!(!config.validation.validate_legacy);
        assert_eq!(config.output.path, PathBuf::from("build/db.json"));
        assert!(config.output.format.is_pretty());
    }

    #[test]
    fn test_serialize_config() {
        let config = SpecConfig::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        assert!(toml_str.contains("[sources]"));
        assert!(toml_str.contains("[validation]"));
        assert!(toml_str.contains("[output]"));
    }

    #[test]
    fn test_load_explicit_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("custom.toml");
        std::fs::write(
            &path,
            r#"
[sources]
registry_dir = "registry"
legacy_spec = "legacy.json"

[validation]
must_validate = false

[output]
format = "compact"
"#,
        )
        .unwrap();

        let config = SpecConfig::load_from(Some(&path)).unwrap();
        assert_eq!(config.sources.registry_dir, PathBuf::from("registry"));
        assert_eq!(config.sources.legacy_spec, Some(PathBuf::from("legacy.json")));
        assert!(!config.validation.must_validate);
        assert_eq!(config.output.format, OutputFormat::Compact);
        assert_eq!(config.output.report_path, PathBuf::from("build/problems.json"));
    }

    #[test]
    fn test_save_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("saved.toml");
        let mut config = SpecConfig::default();
        config.sources.documentation = Some(PathBuf::from("docs.json"));
        config.save(&path).unwrap();

        let reloaded = SpecConfig::load_from(Some(&path)).unwrap();
        assert_eq!(reloaded.sources.documentation, Some(PathBuf::from("docs.json")));
    }
}
