//! Problem Report
//!
//! Collects data-quality findings from every stage of a build, each tagged
//! with the resource it concerns and where in which source file it was found.
//! Findings never abort the batch; they are persisted next to the build output.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

use crate::error::Result;

/// Finding severity
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Warning,
    Failure,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Warning => write!(f, "warning"),
            Self::Failure => write!(f, "failure"),
        }
    }
}

/// What kind of problem was found
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ProblemKind {
    /// A source file could not be read or parsed
    LoadIo,
    /// A document failed schema validation
    SchemaValidation,
    /// A validation finding downgraded because validation is advisory
    AdvisoryFinding,
    /// A registered patch could not be applied
    PatchApplication,
    /// Two sources disagree on the same property or attribute
    ReconciliationConflict,
    /// Two sources declare the same attribute with the same shape
    Overlap,
    /// Anything else the importer could not make sense of
    ImportAnomaly,
}

impl ProblemKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::LoadIo => "load-io",
            Self::SchemaValidation => "schema-validation",
            Self::AdvisoryFinding => "advisory-finding",
            Self::PatchApplication => "patch-application",
            Self::ReconciliationConflict => "reconciliation-conflict",
            Self::Overlap => "overlap",
            Self::ImportAnomaly => "import-anomaly",
        }
    }
}

/// Where a finding was made
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
    /// JSON pointer into the file
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pointer: Option<String>,
}

impl Location {
    pub fn file(file: impl Into<String>) -> Self {
        Self {
            file: Some(file.into()),
            pointer: None,
        }
    }

    pub fn at(mut self, pointer: impl Into<String>) -> Self {
        self.pointer = Some(pointer.into());
        self
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.file, &self.pointer) {
            (Some(file), Some(pointer)) => write!(f, "{}#{}", file, pointer),
            (Some(file), None) => write!(f, "{}", file),
            (None, Some(pointer)) => write!(f, "#{}", pointer),
            (None, None) => write!(f, "-"),
        }
    }
}

/// A single finding
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Problem {
    pub severity: Severity,
    pub kind: ProblemKind,
    /// Resource type (or source name) the finding is about
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
    pub message: String,
    #[serde(default)]
    pub location: Location,
}

impl fmt::Display for Problem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}: ", self.kind.as_str(), self.severity)?;
        if let Some(subject) = &self.subject {
            write!(f, "{}: ", subject)?;
        }
        write!(f, "{} ({})", self.message, self.location)
    }
}

/// Counts by severity
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportSummary {
    pub failures: usize,
    pub warnings: usize,
}

impl fmt::Display for ReportSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} failure(s), {} warning(s)", self.failures, self.warnings)
    }
}

/// Accumulated findings of one build
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProblemReport {
    problems: Vec<Problem>,
}

impl ProblemReport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, problem: Problem) {
        self.problems.push(problem);
    }

    /// Record a failure
    pub fn failure(
        &mut self,
        kind: ProblemKind,
        subject: Option<&str>,
        message: impl Into<String>,
        location: Location,
    ) {
        self.push(Problem {
            severity: Severity::Failure,
            kind,
            subject: subject.map(String::from),
            message: message.into(),
            location,
        });
    }

    /// Record a warning
    pub fn warning(
        &mut self,
        kind: ProblemKind,
        subject: Option<&str>,
        message: impl Into<String>,
        location: Location,
    ) {
        self.push(Problem {
            severity: Severity::Warning,
            kind,
            subject: subject.map(String::from),
            message: message.into(),
            location,
        });
    }

    /// View of this report that tags every finding with one subject and file
    pub fn bind(&mut self, subject: impl Into<String>, file: Option<String>) -> BoundProblemReport<'_> {
        BoundProblemReport {
            report: self,
            subject: subject.into(),
            file,
        }
    }

    pub fn failures(&self) -> impl Iterator<Item = &Problem> {
        self.problems.iter().filter(|p| p.severity == Severity::Failure)
    }

    pub fn warnings(&self) -> impl Iterator<Item = &Problem> {
        self.problems.iter().filter(|p| p.severity == Severity::Warning)
    }

    pub fn of_kind(&self, kind: ProblemKind) -> impl Iterator<Item = &Problem> {
        self.problems.iter().filter(move |p| p.kind == kind)
    }

    pub fn all(&self) -> &[Problem] {
        &self.problems
    }

    pub fn len(&self) -> usize {
        self.problems.len()
    }

    pub fn is_empty(&self) -> bool {
        self.problems.is_empty()
    }

    pub fn has_failures(&self) -> bool {
        self.failures().next().is_some()
    }

    pub fn summary(&self) -> ReportSummary {
        ReportSummary {
            failures: self.failures().count(),
            warnings: self.warnings().count(),
        }
    }

    /// Format all findings followed by the summary line
    pub fn format_all(&self) -> String {
        let mut output = String::new();
        for problem in &self.problems {
            output.push_str(&format!("{}\n", problem));
        }
        if !self.is_empty() {
            output.push_str(&format!("\n{}\n", self.summary()));
        }
        output
    }

    pub fn write_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }
}

impl fmt::Display for ProblemReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.format_all())
    }
}

impl IntoIterator for ProblemReport {
    type Item = Problem;
    type IntoIter = std::vec::IntoIter<Problem>;

    fn into_iter(self) -> Self::IntoIter {
        self.problems.into_iter()
    }
}

impl<'a> IntoIterator for &'a ProblemReport {
    type Item = &'a Problem;
    type IntoIter = std::slice::Iter<'a, Problem>;

    fn into_iter(self) -> Self::IntoIter {
        self.problems.iter()
    }
}

/// A [`ProblemReport`] bound to one subject and source file
pub struct BoundProblemReport<'a> {
    report: &'a mut ProblemReport,
    subject: String,
    file: Option<String>,
}

impl BoundProblemReport<'_> {
    fn location(&self, pointer: Option<&str>) -> Location {
        Location {
            file: self.file.clone(),
            pointer: pointer.map(String::from),
        }
    }

    pub fn subject(&self) -> &str {
        &self.subject
    }

    pub fn failure(&mut self, kind: ProblemKind, message: impl Into<String>, pointer: Option<&str>) {
        let location = self.location(pointer);
        self.report.failure(kind, Some(&self.subject), message, location);
    }

    pub fn warning(&mut self, kind: ProblemKind, message: impl Into<String>, pointer: Option<&str>) {
        let location = self.location(pointer);
        self.report.warning(kind, Some(&self.subject), message, location);
    }
}
