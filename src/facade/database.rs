use crate::core::{Result, Row};
use crate::storage::InMemoryStorage;
use crate::transaction::{Transaction, TransactionId};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

struct Shared {
    storage: RwLock<InMemoryStorage>,
    next_txn_id: AtomicU64,
}

/// Handle to a named in-memory database.
///
/// Cloning the handle does not copy data: every clone, and every
/// [`crate::DbContext`] opened on it, sees the same tables.
#[derive(Clone)]
pub struct InMemoryDB {
    name: Arc<str>,
    shared: Arc<Shared>,
}

impl InMemoryDB {
    pub fn new(name: impl AsRef<str>) -> Self {
        Self {
            name: Arc::from(name.as_ref()),
            shared: Arc::new(Shared {
                storage: RwLock::new(InMemoryStorage::new()),
                next_txn_id: AtomicU64::new(1),
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// True when both handles point at the same database.
    pub fn same_database(&self, other: &InMemoryDB) -> bool {
        Arc::ptr_eq(&self.shared, &other.shared)
    }

    /// Starts a write transaction. The database stays write-locked until the
    /// transaction is committed, rolled back or dropped.
    pub fn begin(&self) -> Result<Transaction<'_>> {
        let guard = self.shared.storage.write()?;
        let id = TransactionId(self.shared.next_txn_id.fetch_add(1, Ordering::SeqCst));
        Ok(Transaction::begin(id, guard))
    }

    /// Runs `f` against a consistent read view of the storage.
    pub fn read<R>(&self, f: impl FnOnce(&InMemoryStorage) -> Result<R>) -> Result<R> {
        let guard = self.shared.storage.read()?;
        f(&guard)
    }

    pub fn table_names(&self) -> Result<Vec<String>> {
        self.read(|storage| Ok(storage.table_names()))
    }

    pub fn row_count(&self, table: &str) -> Result<usize> {
        self.read(|storage| storage.row_count(table))
    }

    pub fn get_row(&self, table: &str, key: i64) -> Result<Option<Row>> {
        self.read(|storage| storage.get_row(table, key))
    }

    pub fn scan_table(&self, table: &str) -> Result<Vec<Row>> {
        self.read(|storage| storage.scan_table(table))
    }
}

impl std::fmt::Debug for InMemoryDB {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryDB").field("name", &self.name).finish()
    }
}
