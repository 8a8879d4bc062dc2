//! Error types for the specification database

use thiserror::Error;

/// Result type for specification operations
pub type Result<T> = std::result::Result<T, SpecError>;

/// Specification build errors
///
/// Data-quality findings (patch problems, source conflicts, advisory
/// validation findings) are not errors: they are recorded in the
/// [`ProblemReport`](crate::report::ProblemReport) instead.
#[derive(Error, Debug)]
pub enum SpecError {
    #[error("Failed to load {file}: {message}")]
    LoadIo { file: String, message: String },

    #[error("Schema validation failed{}:\n{details}", for_file(.file))]
    SchemaValidation { file: Option<String>, details: String },

    #[error("Invalid validation schema: {0}")]
    InvalidSchema(String),

    #[error("Unknown collection: {0}")]
    UnknownCollection(String),

    #[error("Unknown index '{index}' on collection '{collection}'")]
    UnknownIndex { collection: String, index: String },

    #[error("Unknown relation: {0}")]
    UnknownRelation(String),

    #[error("Entity not found: {collection}{id}")]
    NotFound { collection: String, id: String },

    #[error("Identity violation: {0}")]
    IdentityViolation(String),

    #[error("Duplicate key '{key}' in unique index '{index}' of collection '{collection}'")]
    DuplicateKey {
        collection: String,
        index: String,
        key: String,
    },

    #[error("Collection '{collection}' does not hold {expected}")]
    CollectionType { collection: String, expected: String },

    #[error("Checksum mismatch: expected {expected}, got {actual}")]
    ChecksumMismatch { expected: String, actual: String },

    #[error("Incompatible snapshot format {found} (supported: {supported})")]
    IncompatibleSnapshot { found: String, supported: String },

    #[error("Invalid document: {0}")]
    InvalidFormat(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Semver error: {0}")]
    Semver(#[from] semver::Error),

    #[error("Configuration error: {0}")]
    Config(#[from] config_crate::ConfigError),
}

fn for_file(file: &Option<String>) -> String {
    file.as_deref().map(|f| format!(" for {}", f)).unwrap_or_default()
}

impl SpecError {
    /// Attach a file name to errors that carry one
    pub fn located(self, file_name: &str) -> Self {
        match self {
            SpecError::SchemaValidation { file: None, details } => SpecError::SchemaValidation {
                file: Some(file_name.to_string()),
                details,
            },
            SpecError::Io(e) => SpecError::LoadIo {
                file: file_name.to_string(),
                message: e.to_string(),
            },
            SpecError::Json(e) => SpecError::LoadIo {
                file: file_name.to_string(),
                message: e.to_string(),
            },
            other => other,
        }
    }

    /// Whether this error only affects the single input being processed
    pub fn is_input_failure(&self) -> bool {
        matches!(
            self,
            SpecError::LoadIo { .. }
                | SpecError::SchemaValidation { .. }
                | SpecError::InvalidFormat(_)
                | SpecError::Io(_)
                | SpecError::Json(_)
        )
    }
}
