//! Storage traits and error types
//!
//! The frontier persists through the small [`KvStore`] interface: named
//! tables of ordered byte keys, plus an atomic multi-operation commit.

use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Corrupt record: {0}")]
    Corrupt(String),
}

/// Result type alias for storage operations
pub type StorageResult<T> = std::result::Result<T, StorageError>;

/// Logical tables of the frontier store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Table {
    /// Canonical URL -> doc id
    DocIds,
    /// Ordering key -> serialized URL awaiting a claim
    Pending,
    /// Doc id -> serialized URL claimed by a worker
    InFlight,
    /// Free-form metadata such as the config hash
    Meta,
}

impl Table {
    pub const ALL: [Table; 4] = [Table::DocIds, Table::Pending, Table::InFlight, Table::Meta];

    pub fn name(&self) -> &'static str {
        match self {
            Self::DocIds => "doc_ids",
            Self::Pending => "pending",
            Self::InFlight => "in_flight",
            Self::Meta => "meta",
        }
    }
}

/// One write inside a [`KvStore::commit`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteOp {
    Put {
        table: Table,
        key: Vec<u8>,
        value: Vec<u8>,
    },
    Delete {
        table: Table,
        key: Vec<u8>,
    },
}

impl WriteOp {
    pub fn put(table: Table, key: impl Into<Vec<u8>>, value: impl Into<Vec<u8>>) -> Self {
        Self::Put {
            table,
            key: key.into(),
            value: value.into(),
        }
    }

    pub fn delete(table: Table, key: impl Into<Vec<u8>>) -> Self {
        Self::Delete {
            table,
            key: key.into(),
        }
    }
}

/// Transactional key-value store
///
/// Implementations must be safe to share between workers.
pub trait KvStore: Send + Sync {
    /// Reads one value
    fn get(&self, table: Table, key: &[u8]) -> StorageResult<Option<Vec<u8>>>;

    /// Reads up to `limit` entries in ascending key order
    fn batch_read(&self, table: Table, limit: usize) -> StorageResult<Vec<(Vec<u8>, Vec<u8>)>>;

    /// Number of entries in a table
    fn count(&self, table: Table) -> StorageResult<u64>;

    /// Removes every entry of a table
    fn clear(&self, table: Table) -> StorageResult<()>;

    /// Applies all `ops` atomically: either every write lands or none does
    fn commit(&self, ops: Vec<WriteOp>) -> StorageResult<()>;

    fn put(&self, table: Table, key: &[u8], value: &[u8]) -> StorageResult<()> {
        self.commit(vec![WriteOp::put(table, key, value)])
    }

    fn delete(&self, table: Table, key: &[u8]) -> StorageResult<()> {
        self.commit(vec![WriteOp::delete(table, key)])
    }
}
