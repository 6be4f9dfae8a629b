//! Store trait definitions

use crate::error::StorageResult;
use async_trait::async_trait;
use tidemark_core::{AppliedRecord, MigrationKey, Schema, StepMarker};

/// Outcome of recording a migration as applied
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarkOutcome {
    /// A new row was written
    Inserted,
    /// The key was already recorded; nothing was written
    AlreadyApplied,
}

/// Durable record of which change records have been applied
#[async_trait]
pub trait StateStore: Send + Sync {
    /// Applied records ordered by application time (ties broken by key)
    async fn list_applied(&self) -> StorageResult<Vec<AppliedRecord>>;

    /// Record `key` as applied. Recording an existing key writes nothing.
    async fn mark_applied(&self, key: &MigrationKey, name: &str) -> StorageResult<MarkOutcome>;

    /// Remove the record for `key`; fails with `NotApplied` if absent
    async fn mark_reverted(&self, key: &MigrationKey) -> StorageResult<()>;

    /// Whether `key` is currently recorded
    async fn is_applied(&self, key: &MigrationKey) -> StorageResult<bool> {
        Ok(self.list_applied().await?.iter().any(|r| &r.key == key))
    }
}

/// The store whose schema is being evolved
#[async_trait]
pub trait TargetStore: Send + Sync {
    /// Current schema snapshot (empty if nothing was ever committed)
    async fn load(&self) -> StorageResult<Schema>;

    /// Replace the schema and record the step that produced it, atomically
    async fn commit(&self, schema: &Schema, step: &StepMarker) -> StorageResult<()>;

    /// The step recorded by the most recent commit
    async fn last_step(&self) -> StorageResult<Option<StepMarker>>;
}
