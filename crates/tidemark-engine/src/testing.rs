//! Fault-injecting stores shared by the engine tests

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;
use tidemark_core::{AppliedRecord, MigrationKey, Schema, StepMarker};
use tidemark_storage::{
    MarkOutcome, MemoryStateStore, MemoryTargetStore, StateStore, StorageError, StorageResult,
    TargetStore,
};

async fn pause(millis: &AtomicU64) {
    let millis = millis.load(Ordering::SeqCst);
    if millis > 0 {
        tokio::time::sleep(Duration::from_millis(millis)).await;
    }
}

/// State store whose writes can be switched to fail or to stall
#[derive(Default)]
pub struct FlakyStateStore {
    inner: MemoryStateStore,
    fail_writes: AtomicBool,
    write_delay_ms: AtomicU64,
}

impl FlakyStateStore {
    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub fn delay_writes(&self, delay: Duration) {
        self.write_delay_ms
            .store(delay.as_millis() as u64, Ordering::SeqCst);
    }

    async fn check(&self) -> StorageResult<()> {
        pause(&self.write_delay_ms).await;
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StorageError::Database("disk full".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl StateStore for FlakyStateStore {
    async fn list_applied(&self) -> StorageResult<Vec<AppliedRecord>> {
        self.inner.list_applied().await
    }

    async fn mark_applied(&self, key: &MigrationKey, name: &str) -> StorageResult<MarkOutcome> {
        self.check().await?;
        self.inner.mark_applied(key, name).await
    }

    async fn mark_reverted(&self, key: &MigrationKey) -> StorageResult<()> {
        self.check().await?;
        self.inner.mark_reverted(key).await
    }
}

/// Target store that counts commits and can refuse or stall them
#[derive(Default)]
pub struct CountingTargetStore {
    inner: MemoryTargetStore,
    commits: AtomicUsize,
    fail_commits: AtomicBool,
    commit_delay_ms: AtomicU64,
}

impl CountingTargetStore {
    pub fn commits(&self) -> usize {
        self.commits.load(Ordering::SeqCst)
    }

    pub fn fail_commits(&self, fail: bool) {
        self.fail_commits.store(fail, Ordering::SeqCst);
    }

    pub fn delay_commits(&self, delay: Duration) {
        self.commit_delay_ms
            .store(delay.as_millis() as u64, Ordering::SeqCst);
    }
}

#[async_trait]
impl TargetStore for CountingTargetStore {
    async fn load(&self) -> StorageResult<Schema> {
        self.inner.load().await
    }

    async fn commit(&self, schema: &Schema, step: &StepMarker) -> StorageResult<()> {
        pause(&self.commit_delay_ms).await;
        if self.fail_commits.load(Ordering::SeqCst) {
            return Err(StorageError::Database("read-only target".to_string()));
        }
        self.commits.fetch_add(1, Ordering::SeqCst);
        self.inner.commit(schema, step).await
    }

    async fn last_step(&self) -> StorageResult<Option<StepMarker>> {
        self.inner.last_step().await
    }
}
