//! Error types for Tidemark Core

use crate::key::MigrationKey;
use std::path::PathBuf;
use thiserror::Error;

/// Result type alias using Tidemark's Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised while building keys and loading change records
#[derive(Error, Debug)]
pub enum Error {
    #[error("Invalid migration key: {0}")]
    InvalidKey(String),

    #[error("Duplicate migration key: {0}")]
    DuplicateKey(MigrationKey),

    #[error("Malformed record {origin}: {reason}")]
    MalformedRecord { origin: String, reason: String },

    #[error("Unknown migration: {0}")]
    UnknownKey(String),

    #[error("Ambiguous migration reference {reference}: matches {candidates}")]
    AmbiguousKey { reference: String, candidates: String },

    #[error("Migration source not found: {0}")]
    SourceNotFound(PathBuf),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    pub fn malformed(origin: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::MalformedRecord {
            origin: origin.into(),
            reason: reason.into(),
        }
    }
}

/// Errors raised by a patch when the schema does not have the expected shape
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SchemaError {
    #[error("Collection not found: {0}")]
    CollectionNotFound(String),

    #[error("Collection already exists: {0}")]
    CollectionExists(String),

    #[error("Field {field} not found in collection {collection}")]
    FieldNotFound { collection: String, field: String },

    #[error("Invalid value for {key} on collection {collection}: {reason}")]
    InvalidValue {
        collection: String,
        key: String,
        reason: String,
    },
}

/// Failure reported by an `up` or `down` operation
#[derive(Error, Debug, Clone, PartialEq)]
pub enum OperationError {
    #[error(transparent)]
    Schema(#[from] SchemaError),

    #[error("{0}")]
    Failed(String),

    #[error("operation is not reversible: {0}")]
    Irreversible(String),

    #[error("operation panicked: {0}")]
    Panicked(String),
}

impl OperationError {
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed(message.into())
    }
}
