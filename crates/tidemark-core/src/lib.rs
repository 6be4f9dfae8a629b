//! Tidemark Core - Types for the schema migration engine
//!
//! This crate provides change records, their keys and operations, the
//! registry that orders them, and the schema snapshot that operations
//! transform.

pub mod error;
pub mod key;
pub mod manifest;
pub mod operation;
pub mod patch;
pub mod plan;
pub mod record;
pub mod registry;
pub mod schema;
pub mod state;

pub use error::{Error, OperationError, Result, SchemaError};
pub use key::MigrationKey;
pub use manifest::ManifestDir;
pub use operation::{Operation, OperationResult};
pub use patch::{apply_all, Patch};
pub use plan::{MigrationPlan, PlanStep};
pub use record::{ChangeRecord, Direction};
pub use registry::{RecordSource, Registry};
pub use schema::{Collection, Field, Schema};
pub use state::{AppliedRecord, StepMarker};
