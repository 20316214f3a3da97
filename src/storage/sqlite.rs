//! SQLite storage implementation
//!
//! This module provides a SQLite-based implementation of the [`KvStore`] trait.

use crate::storage::schema::initialize_schema;
use crate::storage::traits::{KvStore, StorageResult, Table, WriteOp};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// SQLite storage backend
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Opens or creates the database at `path`
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the SQLite database file
    ///
    /// # Returns
    ///
    /// * `Ok(SqliteStore)` - Successfully opened/created database
    /// * `Err(StorageError)` - Failed to open database
    pub fn open(path: &Path) -> StorageResult<Self> {
        let conn = Connection::open(path)?;

        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA temp_store = MEMORY;
        ",
        )?;

        initialize_schema(&conn)?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Creates an in-memory database
    pub fn new_in_memory() -> StorageResult<Self> {
        let conn = Connection::open_in_memory()?;
        initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        // A panic mid-statement leaves no partial transaction behind
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl KvStore for SqliteStore {
    fn get(&self, table: Table, key: &[u8]) -> StorageResult<Option<Vec<u8>>> {
        let conn = self.conn();
        let value = conn
            .query_row(
                &format!("SELECT value FROM {} WHERE key = ?1", table.name()),
                params![key],
                |row| row.get(0),
            )
            .optional()?;
        Ok(value)
    }

    fn batch_read(&self, table: Table, limit: usize) -> StorageResult<Vec<(Vec<u8>, Vec<u8>)>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!(
            "SELECT key, value FROM {} ORDER BY key ASC LIMIT ?1",
            table.name()
        ))?;

        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let rows = stmt
            .query_map(params![limit], |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(rows)
    }

    fn count(&self, table: Table) -> StorageResult<u64> {
        let conn = self.conn();
        let count: i64 = conn.query_row(
            &format!("SELECT COUNT(*) FROM {}", table.name()),
            [],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }

    fn clear(&self, table: Table) -> StorageResult<()> {
        let conn = self.conn();
        conn.execute(&format!("DELETE FROM {}", table.name()), [])?;
        Ok(())
    }

    fn commit(&self, ops: Vec<WriteOp>) -> StorageResult<()> {
        if ops.is_empty() {
            return Ok(());
        }

        let mut conn = self.conn();
        let tx = conn.transaction()?;

        for op in &ops {
            match op {
                WriteOp::Put { table, key, value } => {
                    tx.execute(
                        &format!(
                            "INSERT OR REPLACE INTO {} (key, value) VALUES (?1, ?2)",
                            table.name()
                        ),
                        params![key, value],
                    )?;
                }
                WriteOp::Delete { table, key } => {
                    tx.execute(
                        &format!("DELETE FROM {} WHERE key = ?1", table.name()),
                        params![key],
                    )?;
                }
            }
        }

        tx.commit()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_create_in_memory() {
        let store = SqliteStore::new_in_memory();
        assert!(store.is_ok());
    }

    #[test]
    fn test_put_get_delete() {
        let store = SqliteStore::new_in_memory().unwrap();

        store.put(Table::Meta, b"answer", b"42").unwrap();
        assert_eq!(store.get(Table::Meta, b"answer").unwrap(), Some(b"42".to_vec()));
        assert_eq!(store.get(Table::DocIds, b"answer").unwrap(), None);

        store.delete(Table::Meta, b"answer").unwrap();
        assert_eq!(store.get(Table::Meta, b"answer").unwrap(), None);
    }

    #[test]
    fn test_batch_read_is_ordered_by_key_bytes() {
        let store = SqliteStore::new_in_memory().unwrap();
        for id in [300u64, 2, 70_000, 1] {
            store
                .put(Table::Pending, &id.to_be_bytes(), b"x")
                .unwrap();
        }

        let keys: Vec<u64> = store
            .batch_read(Table::Pending, usize::MAX)
            .unwrap()
            .into_iter()
            .map(|(key, _)| u64::from_be_bytes(key.try_into().unwrap()))
            .collect();
        assert_eq!(keys, vec![1, 2, 300, 70_000]);

        assert_eq!(store.batch_read(Table::Pending, 2).unwrap().len(), 2);
    }

    #[test]
    fn test_commit_applies_all_ops() {
        let store = SqliteStore::new_in_memory().unwrap();
        store.put(Table::Pending, b"k", b"v").unwrap();

        store
            .commit(vec![
                WriteOp::delete(Table::Pending, b"k".to_vec()),
                WriteOp::put(Table::InFlight, b"k".to_vec(), b"v".to_vec()),
            ])
            .unwrap();

        assert_eq!(store.count(Table::Pending).unwrap(), 0);
        assert_eq!(store.count(Table::InFlight).unwrap(), 1);
    }

    #[test]
    fn test_clear() {
        let store = SqliteStore::new_in_memory().unwrap();
        store.put(Table::DocIds, b"a", b"1").unwrap();
        store.put(Table::DocIds, b"b", b"2").unwrap();
        store.clear(Table::DocIds).unwrap();
        assert_eq!(store.count(Table::DocIds).unwrap(), 0);
    }

    #[test]
    fn test_persists_across_reopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("frontier.db");

        {
            let store = SqliteStore::open(&path).unwrap();
            store.put(Table::Meta, b"config_hash", b"abc").unwrap();
        }

        let store = SqliteStore::open(&path).unwrap();
        assert_eq!(
            store.get(Table::Meta, b"config_hash").unwrap(),
            Some(b"abc".to_vec())
        );
    }
}
