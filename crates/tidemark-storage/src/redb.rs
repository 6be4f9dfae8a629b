//! ReDB storage backend
//!
//! One database file holds both the applied-migrations table and the target
//! schema, so a single `RedbStore` serves as state store and target store.
//! ReDB takes an exclusive lock on the file while it is open.

use crate::error::{StorageError, StorageResult};
use crate::traits::{MarkOutcome, StateStore, TargetStore};
use async_trait::async_trait;
use redb::{Database, ReadableTable, TableDefinition};
use std::path::Path;
use std::sync::Mutex;
use tidemark_core::{AppliedRecord, MigrationKey, Schema, StepMarker};

// Table definitions
const APPLIED: TableDefinition<&str, &[u8]> = TableDefinition::new("applied_migrations");
const TARGET: TableDefinition<&str, &[u8]> = TableDefinition::new("target_schema");

const SCHEMA_ENTRY: &str = "schema";
const LAST_STEP_ENTRY: &str = "last_step";

/// ReDB storage backend
pub struct RedbStore {
    db: Mutex<Database>,
}

impl RedbStore {
    /// Open or create a ReDB database at the given path
    pub fn open(path: impl AsRef<Path>) -> StorageResult<Self> {
        let db = Database::create(path)?;

        // Initialize tables
        {
            let write_txn = db.begin_write()?;
            {
                write_txn.open_table(APPLIED)?;
                write_txn.open_table(TARGET)?;
            }
            write_txn.commit()?;
        }

        Ok(Self { db: Mutex::new(db) })
    }

    fn decode_applied(key: &str, value: &[u8]) -> StorageResult<AppliedRecord> {
        let record: AppliedRecord = serde_json::from_slice(value)?;
        if record.key.to_string() != key {
            return Err(StorageError::Corrupt {
                key: key.to_string(),
                reason: format!("row holds {}", record.key),
            });
        }
        Ok(record)
    }
}

#[async_trait]
impl StateStore for RedbStore {
    async fn list_applied(&self) -> StorageResult<Vec<AppliedRecord>> {
        let db = self.db.lock().map_err(StorageError::lock)?;
        let read_txn = db.begin_read()?;
        let table = read_txn.open_table(APPLIED)?;

        let mut records = Vec::new();
        for entry in table.iter()? {
            let (key, value) = entry?;
            records.push(Self::decode_applied(key.value(), value.value())?);
        }

        AppliedRecord::sort(&mut records);
        Ok(records)
    }

    async fn mark_applied(&self, key: &MigrationKey, name: &str) -> StorageResult<MarkOutcome> {
        let id = key.to_string();

        let db = self.db.lock().map_err(StorageError::lock)?;
        let write_txn = db.begin_write()?;
        let outcome = {
            let mut table = write_txn.open_table(APPLIED)?;
            if table.get(id.as_str())?.is_some() {
                MarkOutcome::AlreadyApplied
            } else {
                let mut latest = None;
                for entry in table.iter()? {
                    let (k, v) = entry?;
                    let existing = Self::decode_applied(k.value(), v.value())?;
                    latest = latest.max(Some(existing.applied_at));
                }

                let record =
                    AppliedRecord::new(key.clone(), name, AppliedRecord::next_timestamp(latest));
                let value = serde_json::to_vec(&record)?;
                table.insert(id.as_str(), value.as_slice())?;
                MarkOutcome::Inserted
            }
        };
        write_txn.commit()?;

        Ok(outcome)
    }

    async fn mark_reverted(&self, key: &MigrationKey) -> StorageResult<()> {
        let id = key.to_string();

        let db = self.db.lock().map_err(StorageError::lock)?;
        let write_txn = db.begin_write()?;
        let removed = write_txn
            .open_table(APPLIED)?
            .remove(id.as_str())?
            .is_some();

        if !removed {
            write_txn.abort()?;
            return Err(StorageError::NotApplied(key.clone()));
        }
        write_txn.commit()?;

        Ok(())
    }

    async fn is_applied(&self, key: &MigrationKey) -> StorageResult<bool> {
        let id = key.to_string();

        let db = self.db.lock().map_err(StorageError::lock)?;
        let read_txn = db.begin_read()?;
        let table = read_txn.open_table(APPLIED)?;
        let found = table.get(id.as_str())?.is_some();
        Ok(found)
    }
}

#[async_trait]
impl TargetStore for RedbStore {
    async fn load(&self) -> StorageResult<Schema> {
        let db = self.db.lock().map_err(StorageError::lock)?;
        let read_txn = db.begin_read()?;
        let table = read_txn.open_table(TARGET)?;

        let schema = match table.get(SCHEMA_ENTRY)? {
            Some(value) => serde_json::from_slice(value.value())?,
            None => Schema::default(),
        };
        Ok(schema)
    }

    async fn commit(&self, schema: &Schema, step: &StepMarker) -> StorageResult<()> {
        let schema_bytes = serde_json::to_vec(schema)?;
        let step_bytes = serde_json::to_vec(step)?;

        let db = self.db.lock().map_err(StorageError::lock)?;
        let write_txn = db.begin_write()?;
        {
            let mut table = write_txn.open_table(TARGET)?;
            table.insert(SCHEMA_ENTRY, schema_bytes.as_slice())?;
            table.insert(LAST_STEP_ENTRY, step_bytes.as_slice())?;
        }
        write_txn.commit()?;
        tracing::debug!("Committed target schema after {} {}", step.direction, step.key);

        Ok(())
    }

    async fn last_step(&self) -> StorageResult<Option<StepMarker>> {
        let db = self.db.lock().map_err(StorageError::lock)?;
        let read_txn = db.begin_read()?;
        let table = read_txn.open_table(TARGET)?;

        let step = match table.get(LAST_STEP_ENTRY)? {
            Some(value) => Some(serde_json::from_slice(value.value())?),
            None => None,
        };
        Ok(step)
    }
}
