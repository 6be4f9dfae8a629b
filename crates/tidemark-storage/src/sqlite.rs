//! SQLite storage backend

use crate::error::{StorageError, StorageResult};
use crate::traits::{MarkOutcome, StateStore, TargetStore};
use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::Mutex;
use tidemark_core::{AppliedRecord, MigrationKey, Schema, StepMarker};

const SCHEMA_ENTRY: &str = "schema";
const LAST_STEP_ENTRY: &str = "last_step";

/// SQLite storage backend
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open or create a SQLite database at the given path
    pub fn open(path: impl AsRef<Path>) -> StorageResult<Self> {
        let conn = Connection::open(path)?;

        let storage = Self { conn: Mutex::new(conn) };
        storage.init_tables()?;

        Ok(storage)
    }

    /// Create an in-memory SQLite database (for testing)
    pub fn in_memory() -> StorageResult<Self> {
        let conn = Connection::open_in_memory()?;

        let storage = Self { conn: Mutex::new(conn) };
        storage.init_tables()?;

        Ok(storage)
    }

    fn init_tables(&self) -> StorageResult<()> {
        let conn = self.conn.lock().map_err(StorageError::lock)?;

        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS applied_migrations (
                key TEXT PRIMARY KEY,
                data TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS target_schema (
                name TEXT PRIMARY KEY,
                data TEXT NOT NULL
            );
            "#,
        )?;

        Ok(())
    }

    fn read_applied(conn: &Connection) -> StorageResult<Vec<AppliedRecord>> {
        let mut stmt = conn.prepare("SELECT key, data FROM applied_migrations")?;

        let rows = stmt.query_map([], |row| {
            let key: String = row.get(0)?;
            let data: String = row.get(1)?;
            Ok((key, data))
        })?;

        let mut records = Vec::new();
        for row in rows {
            let (key, data) = row?;
            let record: AppliedRecord = serde_json::from_str(&data)?;
            if record.key.to_string() != key {
                return Err(StorageError::Corrupt {
                    key,
                    reason: format!("row holds {}", record.key),
                });
            }
            records.push(record);
        }

        Ok(records)
    }

    fn read_entry(conn: &Connection, name: &str) -> StorageResult<Option<String>> {
        let data = conn
            .query_row(
                "SELECT data FROM target_schema WHERE name = ?1",
                params![name],
                |row| row.get::<_, String>(0),
            )
            .optional()?;
        Ok(data)
    }
}

#[async_trait]
impl StateStore for SqliteStore {
    async fn list_applied(&self) -> StorageResult<Vec<AppliedRecord>> {
        let conn = self.conn.lock().map_err(StorageError::lock)?;
        let mut records = Self::read_applied(&conn)?;
        AppliedRecord::sort(&mut records);
        Ok(records)
    }

    async fn mark_applied(&self, key: &MigrationKey, name: &str) -> StorageResult<MarkOutcome> {
        let mut conn = self.conn.lock().map_err(StorageError::lock)?;
        let tx = conn.transaction()?;

        let existing = Self::read_applied(&tx)?;
        if existing.iter().any(|r| &r.key == key) {
            return Ok(MarkOutcome::AlreadyApplied);
        }

        let latest = existing.iter().map(|r| r.applied_at).max();
        let record = AppliedRecord::new(key.clone(), name, AppliedRecord::next_timestamp(latest));
        let data = serde_json::to_string(&record)?;

        tx.execute(
            "INSERT INTO applied_migrations (key, data) VALUES (?1, ?2)",
            params![key.to_string(), data],
        )?;
        tx.commit()?;

        Ok(MarkOutcome::Inserted)
    }

    async fn mark_reverted(&self, key: &MigrationKey) -> StorageResult<()> {
        let conn = self.conn.lock().map_err(StorageError::lock)?;

        let deleted = conn.execute(
            "DELETE FROM applied_migrations WHERE key = ?1",
            params![key.to_string()],
        )?;

        if deleted == 0 {
            return Err(StorageError::NotApplied(key.clone()));
        }
        Ok(())
    }

    async fn is_applied(&self, key: &MigrationKey) -> StorageResult<bool> {
        let conn = self.conn.lock().map_err(StorageError::lock)?;

        let found = conn
            .query_row(
                "SELECT 1 FROM applied_migrations WHERE key = ?1",
                params![key.to_string()],
                |_| Ok(()),
            )
            .optional()?;
        Ok(found.is_some())
    }
}

#[async_trait]
impl TargetStore for SqliteStore {
    async fn load(&self) -> StorageResult<Schema> {
        let conn = self.conn.lock().map_err(StorageError::lock)?;

        match Self::read_entry(&conn, SCHEMA_ENTRY)? {
            Some(data) => Ok(serde_json::from_str(&data)?),
            None => Ok(Schema::default()),
        }
    }

    async fn commit(&self, schema: &Schema, step: &StepMarker) -> StorageResult<()> {
        let schema_data = serde_json::to_string(schema)?;
        let step_data = serde_json::to_string(step)?;

        let mut conn = self.conn.lock().map_err(StorageError::lock)?;
        let tx = conn.transaction()?;
        tx.execute(
            "INSERT OR REPLACE INTO target_schema (name, data) VALUES (?1, ?2)",
            params![SCHEMA_ENTRY, schema_data],
        )?;
        tx.execute(
            "INSERT OR REPLACE INTO target_schema (name, data) VALUES (?1, ?2)",
            params![LAST_STEP_ENTRY, step_data],
        )?;
        tx.commit()?;
        tracing::debug!("Committed target schema after {} {}", step.direction, step.key);

        Ok(())
    }

    async fn last_step(&self) -> StorageResult<Option<StepMarker>> {
        let conn = self.conn.lock().map_err(StorageError::lock)?;

        match Self::read_entry(&conn, LAST_STEP_ENTRY)? {
            Some(data) => Ok(Some(serde_json::from_str(&data)?)),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tidemark_core::{Collection, Direction, Field};

    fn key(s: &str) -> MigrationKey {
        s.parse().unwrap()
    }

    #[tokio::test]
    async fn test_sqlite_state_store() {
        let store = SqliteStore::in_memory().unwrap();

        store.mark_applied(&key("1_a"), "a").await.unwrap();
        store.mark_applied(&key("2_b"), "b").await.unwrap();
        assert_eq!(
            store.mark_applied(&key("1_a"), "a").await.unwrap(),
            MarkOutcome::AlreadyApplied
        );

        let applied = store.list_applied().await.unwrap();
        assert_eq!(applied.len(), 2);
        assert_eq!(applied[1].key, key("2_b"));

        store.mark_reverted(&key("1_a")).await.unwrap();
        assert!(!store.is_applied(&key("1_a")).await.unwrap());
        assert!(matches!(
            store.mark_reverted(&key("1_a")).await,
            Err(StorageError::NotApplied(_))
        ));
    }

    #[tokio::test]
    async fn test_sqlite_target_store() {
        let store = SqliteStore::in_memory().unwrap();
        assert_eq!(store.load().await.unwrap(), Schema::default());

        let schema = Schema::new().with_collection(
            Collection::new("_pb_users_auth_", "users")
                .with_field(Field::new("select1466534506", "role", "select")),
        );
        let marker = StepMarker::new(key("1749253307_updated_users"), Direction::Up);
        store.commit(&schema, &marker).await.unwrap();

        assert_eq!(store.load().await.unwrap(), schema);
        assert_eq!(store.last_step().await.unwrap(), Some(marker));
    }
}
