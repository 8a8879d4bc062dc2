//! Patch Engine
//!
//! Upstream schema sources contain known defects that cannot be fixed at the
//! source quickly. Patches correct them before validation, and every
//! correction is auditable: it carries a [`Reason`] and the JSON pointer it
//! touched.
//!
//! A [`Patcher`] runs against a [`Lens`], a read-only cursor over the input
//! tree. Patchers never mutate the input; they *request* changes through the
//! lens. [`apply_patcher`] then folds all requests, in order, into a copy of
//! the tree and returns the copy together with a [`PatchReport`] per change.
//! The original tree is left untouched.

pub mod lens;
pub mod patcher;
pub mod registry;

pub use lens::{escape_segment, parse_pointer, Lens};
pub use patcher::{add_definitions, replace_definition_property, replace_resource_property, Patcher};
pub use registry::{NamedPatch, PatchRegistry};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use tracing::debug;

use lens::{PatchOp, PatchSession};

/// Why a patch exists
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ReasonKind {
    /// Works around a defect in the upstream source
    SourceIssue,
    /// Deliberately gives a value a more precise type than upstream does
    TypeEnrichment,
    Other,
}

/// Human-readable justification attached to every patch
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reason {
    pub kind: ReasonKind,
    pub description: String,
}

impl Reason {
    pub fn source_issue(description: impl Into<String>) -> Self {
        Self {
            kind: ReasonKind::SourceIssue,
            description: description.into(),
        }
    }

    pub fn type_enrichment(description: impl Into<String>) -> Self {
        Self {
            kind: ReasonKind::TypeEnrichment,
            description: description.into(),
        }
    }

    pub fn other(description: impl Into<String>) -> Self {
        Self {
            kind: ReasonKind::Other,
            description: description.into(),
        }
    }
}

impl fmt::Display for Reason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self.kind {
            ReasonKind::SourceIssue => "source issue",
            ReasonKind::TypeEnrichment => "type enrichment",
            ReasonKind::Other => "other",
        };
        write!(f, "{}: {}", kind, self.description)
    }
}

/// The change a patch made
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "lowercase")]
pub enum PatchOperation {
    Replace { old: Value, new: Value },
    Add {
        key: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        old: Option<Value>,
        value: Value,
    },
    Remove { key: String, old: Value },
}

/// Audit record of one applied change
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PatchReport {
    /// Name of the registered patch, if it was applied through a registry
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub patch: Option<String>,
    /// JSON pointer of the value that was changed (or of the object a key was added to/removed from)
    pub pointer: String,
    pub operation: PatchOperation,
    pub reason: Reason,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_name: Option<String>,
}

/// A requested change that could not be applied
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatchProblem {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub patch: Option<String>,
    pub pointer: String,
    pub message: String,
    pub reason: Reason,
}

/// Result of applying a patcher
#[derive(Debug, Clone)]
pub struct PatchOutcome {
    /// The corrected tree
    pub root: Value,
    /// Applied changes in application order
    pub patches: Vec<PatchReport>,
    /// Changes that could not be applied
    pub problems: Vec<PatchProblem>,
}

/// Run a patcher over `root` and fold its requests into a corrected copy
pub fn apply_patcher(root: &Value, patcher: &Patcher) -> PatchOutcome {
    let session = PatchSession::default();
    patcher.apply(&Lens::root(root, &session));
    let (requests, mut problems) = session.finish();

    let mut patched = root.clone();
    let mut patches = Vec::with_capacity(requests.len());

    for request in requests {
        let pointer = request.pointer();
        let Some(target) = patched.pointer_mut(&pointer) else {
            problems.push(PatchProblem {
                patch: request.patch,
                message: format!("no value at '{}' when applying patch", pointer),
                pointer,
                reason: request.reason,
            });
            continue;
        };

        let operation = match request.op {
            PatchOp::Replace(new) => {
                let old = std::mem::replace(target, new.clone());
                PatchOperation::Replace { old, new }
            }
            PatchOp::Set { key, value } => match target.as_object_mut() {
                Some(object) => {
                    let old = object.insert(key.clone(), value.clone());
                    PatchOperation::Add { key, old, value }
                }
                None => {
                    problems.push(PatchProblem {
                        patch: request.patch,
                        message: format!("cannot add '{}': '{}' is not an object", key, pointer),
                        pointer,
                        reason: request.reason,
                    });
                    continue;
                }
            },
            PatchOp::Remove { key } => {
                match target.as_object_mut().and_then(|object| object.remove(&key)) {
                    Some(old) => PatchOperation::Remove { key, old },
                    None => {
                        problems.push(PatchProblem {
                            patch: request.patch,
                            message: format!("cannot remove '{}': not present at '{}'", key, pointer),
                            pointer,
                            reason: request.reason,
                        });
                        continue;
                    }
                }
            }
        };

        debug!(pointer = %pointer, reason = %request.reason, "applied patch");
        patches.push(PatchReport {
            patch: request.patch,
            pointer,
            operation,
            reason: request.reason,
            file_name: None,
        });
    }

    PatchOutcome {
        root: patched,
        patches,
        problems,
    }
}
