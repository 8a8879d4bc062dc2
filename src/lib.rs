//! Service Specification Database
//!
//! Builds a queryable, typed database describing cloud resource types from
//! three upstream sources: per-resource registry schemas, a legacy
//! specification document and a documentation map.
//!
//! ## Features
//!
//! - **Entity Store**: Typed collections, secondary indexes, named relations
//!   and a checksummed snapshot format
//! - **Validated Loading**: Inputs are patched, then checked against embedded
//!   JSON Schemas before anything is imported
//! - **Auditable Patches**: Every correction to an upstream defect is recorded
//!   with its reason
//! - **Reconciliation**: Registry schemas are merged with legacy information
//!   into services, resources and deduplicated type definitions
//! - **Problem Report**: Failures and warnings are collected, never fatal to
//!   the whole build
//!
//! ## Pipeline
//!
//! ```text
//! sources/
//! ├── registry/*.json ──► patch ──► validate ──► import ──┐
//! ├── legacy.json ─────────────────────────────► merge ───┤
//! └── docs.json ───────────────────────────────► merge ───┤
//!                                                         ▼
//!                                      build/db.json + build/problems.json
//! ```

pub mod build;
pub mod checksum;
pub mod config;
pub mod error;
pub mod import;
pub mod loading;
pub mod model;
pub mod patches;
pub mod patching;
pub mod report;
pub mod store;

pub use build::{BuildOutput, SpecBuilder};
pub use checksum::Checksum;
pub use config::SpecConfig;
pub use error::{Result, SpecError};
pub use import::{import_registry_resource, ImportContext};
pub use model::spec_database;
pub use report::{ProblemKind, ProblemReport, Severity};
pub use store::{Database, EntityId, Snapshot};
