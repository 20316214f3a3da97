//! Storage module for persisting crawl state
//!
//! This module backs the frontier in resumable mode:
//! - The [`KvStore`] interface the frontier writes through
//! - A SQLite implementation with WAL journaling
//! - Schema creation for the frontier tables

mod schema;
mod sqlite;
mod traits;

pub use sqlite::SqliteStore;
pub use traits::{KvStore, StorageError, StorageResult, Table, WriteOp};

use std::path::Path;

/// Metadata key under which the config fingerprint is stored
pub const CONFIG_HASH_KEY: &[u8] = b"config_hash";

/// Initializes or opens a storage database
///
/// # Arguments
///
/// * `path` - Path to the SQLite database file
///
/// # Returns
///
/// * `Ok(SqliteStore)` - Successfully initialized storage
/// * `Err(StorageError)` - Failed to initialize storage
pub fn open_storage(path: &Path) -> StorageResult<SqliteStore> {
    SqliteStore::open(path)
}

/// Removes all frontier state, keeping metadata
pub fn clear_frontier(store: &dyn KvStore) -> StorageResult<()> {
    for table in [Table::DocIds, Table::Pending, Table::InFlight] {
        store.clear(table)?;
    }
    Ok(())
}

/// Config fingerprint recorded by a previous run, if any
pub fn stored_config_hash(store: &dyn KvStore) -> StorageResult<Option<String>> {
    store
        .get(Table::Meta, CONFIG_HASH_KEY)?
        .map(|bytes| {
            String::from_utf8(bytes)
                .map_err(|_| StorageError::Corrupt("config hash is not UTF-8".to_string()))
        })
        .transpose()
}

/// Records the config fingerprint of the current run
pub fn record_config_hash(store: &dyn KvStore, hash: &str) -> StorageResult<()> {
    store.put(Table::Meta, CONFIG_HASH_KEY, hash.as_bytes())
}
