//! In-memory stores for testing

use crate::error::{StorageError, StorageResult};
use crate::traits::{MarkOutcome, StateStore, TargetStore};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::RwLock;
use tidemark_core::{AppliedRecord, MigrationKey, Schema, StepMarker};

/// In-memory state store
///
/// Useful for testing and dry runs; nothing survives the process.
pub struct MemoryStateStore {
    applied: RwLock<BTreeMap<MigrationKey, AppliedRecord>>,
}

impl MemoryStateStore {
    pub fn new() -> Self {
        Self {
            applied: RwLock::new(BTreeMap::new()),
        }
    }
}

impl Default for MemoryStateStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl StateStore for MemoryStateStore {
    async fn list_applied(&self) -> StorageResult<Vec<AppliedRecord>> {
        let applied = self.applied.read().map_err(StorageError::lock)?;
        let mut records: Vec<AppliedRecord> = applied.values().cloned().collect();
        AppliedRecord::sort(&mut records);
        Ok(records)
    }

    async fn mark_applied(&self, key: &MigrationKey, name: &str) -> StorageResult<MarkOutcome> {
        let mut applied = self.applied.write().map_err(StorageError::lock)?;
        if applied.contains_key(key) {
            return Ok(MarkOutcome::AlreadyApplied);
        }

        let latest = applied.values().map(|r| r.applied_at).max();
        let record = AppliedRecord::new(key.clone(), name, AppliedRecord::next_timestamp(latest));
        applied.insert(key.clone(), record);
        Ok(MarkOutcome::Inserted)
    }

    async fn mark_reverted(&self, key: &MigrationKey) -> StorageResult<()> {
        let mut applied = self.applied.write().map_err(StorageError::lock)?;
        applied
            .remove(key)
            .map(|_| ())
            .ok_or_else(|| StorageError::NotApplied(key.clone()))
    }

    async fn is_applied(&self, key: &MigrationKey) -> StorageResult<bool> {
        let applied = self.applied.read().map_err(StorageError::lock)?;
        Ok(applied.contains_key(key))
    }
}

/// In-memory target store
pub struct MemoryTargetStore {
    inner: RwLock<(Schema, Option<StepMarker>)>,
}

impl MemoryTargetStore {
    pub fn new() -> Self {
        Self::with_schema(Schema::default())
    }

    /// Start from an existing schema
    pub fn with_schema(schema: Schema) -> Self {
        Self {
            inner: RwLock::new((schema, None)),
        }
    }
}

impl Default for MemoryTargetStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TargetStore for MemoryTargetStore {
    async fn load(&self) -> StorageResult<Schema> {
        let inner = self.inner.read().map_err(StorageError::lock)?;
        Ok(inner.0.clone())
    }

    async fn commit(&self, schema: &Schema, step: &StepMarker) -> StorageResult<()> {
        let mut inner = self.inner.write().map_err(StorageError::lock)?;
        *inner = (schema.clone(), Some(step.clone()));
        Ok(())
    }

    async fn last_step(&self) -> StorageResult<Option<StepMarker>> {
        let inner = self.inner.read().map_err(StorageError::lock)?;
        Ok(inner.1.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tidemark_core::{Collection, Direction};

    fn key(s: &str) -> MigrationKey {
        s.parse().unwrap()
    }

    #[tokio::test]
    async fn test_memory_state_store() {
        let store = MemoryStateStore::new();

        assert_eq!(
            store.mark_applied(&key("1_a"), "a").await.unwrap(),
            MarkOutcome::Inserted
        );
        assert_eq!(
            store.mark_applied(&key("2_b"), "b").await.unwrap(),
            MarkOutcome::Inserted
        );
        assert_eq!(
            store.mark_applied(&key("1_a"), "a").await.unwrap(),
            MarkOutcome::AlreadyApplied
        );

        let applied = store.list_applied().await.unwrap();
        assert_eq!(applied.len(), 2);
        assert_eq!(applied[0].key, key("1_a"));
        assert!(applied[0].applied_at <= applied[1].applied_at);

        store.mark_reverted(&key("2_b")).await.unwrap();
        assert!(!store.is_applied(&key("2_b")).await.unwrap());
        assert!(matches!(
            store.mark_reverted(&key("2_b")).await,
            Err(StorageError::NotApplied(_))
        ));
    }

    #[tokio::test]
    async fn test_memory_target_store() {
        let store = MemoryTargetStore::new();
        assert_eq!(store.load().await.unwrap(), Schema::default());
        assert!(store.last_step().await.unwrap().is_none());

        let schema = Schema::new().with_collection(Collection::new("c1", "notes"));
        let marker = StepMarker::new(key("1_a"), Direction::Up);
        store.commit(&schema, &marker).await.unwrap();

        assert_eq!(store.load().await.unwrap(), schema);
        assert_eq!(store.last_step().await.unwrap(), Some(marker));
    }
}
