//! Tidemark Storage - Stores for migration state and the target schema
//!
//! This crate provides the traits the engine talks to and the backends
//! that persist applied migrations and the evolving schema.

#![allow(clippy::result_large_err)]

pub mod error;
pub mod traits;

#[cfg(feature = "redb")]
pub mod redb;

#[cfg(feature = "sqlite")]
pub mod sqlite;

pub mod memory;

pub use error::{StorageError, StorageResult};
pub use traits::{MarkOutcome, StateStore, TargetStore};

#[cfg(feature = "redb")]
pub use redb::RedbStore;

#[cfg(feature = "sqlite")]
pub use sqlite::SqliteStore;

pub use memory::{MemoryStateStore, MemoryTargetStore};
