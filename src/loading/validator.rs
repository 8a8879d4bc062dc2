//! JSON Schema validation with grouped, deepest-first findings

use jsonschema::{Draft, JSONSchema};
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

use crate::error::{Result, SpecError};

/// One failing keyword at an instance path
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct KeywordFailure {
    pub keyword: String,
    pub message: String,
    /// Pointer into the validation schema
    pub schema_path: String,
}

/// All failures found at one instance path
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValidationFinding {
    /// JSON pointer of the offending value in the validated document
    pub pointer: String,
    /// The offending value
    pub value: Value,
    pub failures: Vec<KeywordFailure>,
}

impl fmt::Display for ValidationFinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let caption = if self.pointer.is_empty() { "/" } else { &self.pointer };
        writeln!(f, "{}", caption)?;
        write!(f, "    {}", abbreviate(&self.value))?;
        for failure in &self.failures {
            write!(
                f,
                "\n    {}: {} ({})",
                failure.keyword, failure.message, failure.schema_path
            )?;
        }
        Ok(())
    }
}

const MAX_VALUE_WIDTH: usize = 200;

fn abbreviate(value: &Value) -> String {
    let text = value.to_string();
    if text.chars().count() <= MAX_VALUE_WIDTH {
        return text;
    }
    let cut: String = text.chars().take(MAX_VALUE_WIDTH).collect();
    format!("{}...", cut)
}

/// Format findings as one block per instance path
pub fn format_findings(findings: &[ValidationFinding]) -> String {
    findings
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("\n")
}

/// A compiled JSON Schema (draft 7)
pub struct SchemaValidator {
    schema: JSONSchema,
}

impl fmt::Debug for SchemaValidator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SchemaValidator").finish_non_exhaustive()
    }
}

impl SchemaValidator {
    pub fn new(schema: &Value) -> Result<Self> {
        let schema = JSONSchema::options()
            .with_draft(Draft::Draft7)
            .compile(schema)
            .map_err(|e| SpecError::InvalidSchema(e.to_string()))?;
        Ok(Self { schema })
    }

    /// Validate `value`, returning findings grouped by instance path
    ///
    /// Paths are ordered in reverse lexical order so the deepest (most
    /// specific) failures come first. An empty result means the value is valid.
    pub fn validate(&self, value: &Value) -> Vec<ValidationFinding> {
        let errors = match self.schema.validate(value) {
            Ok(()) => return Vec::new(),
            Err(errors) => errors,
        };

        let mut grouped: BTreeMap<String, ValidationFinding> = BTreeMap::new();
        for error in errors {
            let pointer = error.instance_path.to_string();
            let schema_path = error.schema_path.to_string();
            let keyword = schema_path
                .rsplit('/')
                .next()
                .unwrap_or_default()
                .to_string();
            let failure = KeywordFailure {
                keyword,
                message: error.to_string(),
                schema_path,
            };
            grouped
                .entry(pointer.clone())
                .or_insert_with(|| ValidationFinding {
                    pointer,
                    value: error.instance.clone().into_owned(),
                    failures: Vec::new(),
                })
                .failures
                .push(failure);
        }

        grouped.into_values().rev().collect()
    }

    pub fn is_valid(&self, value: &Value) -> bool {
        self.schema.is_valid(value)
    }
}

/// Validate `value` against `schema` in one step
pub fn validate(value: &Value, schema: &Value) -> Result<Vec<ValidationFinding>> {
    Ok(SchemaValidator::new(schema)?.validate(value))
}
