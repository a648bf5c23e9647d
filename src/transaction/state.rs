// ============================================================================
// Transaction State Management
// ============================================================================
//
// A transaction holds the database write lock from begin to commit. Writes go
// to a staged copy of the storage; commit swaps the copy in, rollback (or
// dropping an active transaction) throws it away.
//
// Transaction moves through: Active -> Committed/Aborted
//
// ============================================================================

use super::Change;
use crate::core::{DbError, Result, Row};
use crate::storage::{DeleteRule, InMemoryStorage, TableSchema};
use std::sync::RwLockWriteGuard;
use tracing::{Level, event};

/// Unique identifier for a transaction within one database
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TransactionId(pub u64);

impl TransactionId {
    /// Get the raw ID value
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for TransactionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "txn_{}", self.0)
    }
}

/// Transaction state
///
/// State transitions:
/// ```text
/// Active ──commit──> Committed
///   │
///   └──rollback──> Aborted
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionState {
    /// Transaction is active and can execute operations
    Active,

    /// Transaction has been successfully committed
    Committed,

    /// Transaction has been aborted/rolled back
    Aborted,
}

impl TransactionState {
    /// Check if transaction can execute operations
    pub fn is_active(&self) -> bool {
        matches!(self, TransactionState::Active)
    }

    /// Check if transaction is in a terminal state
    pub fn is_terminal(&self) -> bool {
        matches!(self, TransactionState::Committed | TransactionState::Aborted)
    }
}

impl std::fmt::Display for TransactionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransactionState::Active => write!(f, "ACTIVE"),
            TransactionState::Committed => write!(f, "COMMITTED"),
            TransactionState::Aborted => write!(f, "ABORTED"),
        }
    }
}

/// A write transaction over an [`crate::InMemoryDB`].
pub struct Transaction<'db> {
    id: TransactionId,
    state: TransactionState,
    guard: RwLockWriteGuard<'db, InMemoryStorage>,
    /// Copy-on-write view every operation reads and writes
    staged: InMemoryStorage,
    changes: Vec<Change>,
    start_time: std::time::Instant,
}

impl<'db> Transaction<'db> {
    pub(crate) fn begin(id: TransactionId, guard: RwLockWriteGuard<'db, InMemoryStorage>) -> Self {
        let staged = guard.clone();
        event!(Level::TRACE, txn = %id, "transaction started");
        Self {
            id,
            state: TransactionState::Active,
            guard,
            staged,
            changes: Vec::new(),
            start_time: std::time::Instant::now(),
        }
    }

    pub fn id(&self) -> TransactionId {
        self.id
    }

    pub fn state(&self) -> TransactionState {
        self.state
    }

    pub fn change_count(&self) -> usize {
        self.changes.len()
    }

    /// Staged storage, including this transaction's uncommitted writes
    pub fn storage(&self) -> &InMemoryStorage {
        &self.staged
    }

    pub fn ensure_table(&mut self, schema: TableSchema) -> Result<()> {
        self.check_active()?;
        if self.staged.ensure_table(schema)? {
            event!(Level::DEBUG, txn = %self.id, "table created");
        }
        Ok(())
    }

    pub fn insert(&mut self, table: &str, row: Row) -> Result<i64> {
        self.check_active()?;
        let key = self.staged.insert_row(table, row)?;
        let stored = self.staged.get_row(table, key)?.unwrap_or_default();
        self.changes.push(Change::InsertRow {
            table: table.to_string(),
            key,
            row: stored,
        });
        Ok(key)
    }

    pub fn update(&mut self, table: &str, key: i64, row: Row) -> Result<()> {
        self.check_active()?;
        let old_row = self.staged.update_row(table, key, row.clone())?;
        self.changes.push(Change::UpdateRow {
            table: table.to_string(),
            key,
            old_row,
            new_row: row,
        });
        Ok(())
    }

    /// Deletes a row and, under [`DeleteRule::Cascade`], everything that
    /// references it. Returns the number of rows removed.
    pub fn delete(&mut self, table: &str, key: i64, rule: DeleteRule) -> Result<usize> {
        self.check_active()?;
        let deleted = self.staged.delete_row(table, key, rule)?;
        let count = deleted.len();
        self.changes.extend(deleted.into_iter().map(|d| Change::DeleteRow {
            table: d.table,
            key: d.key,
            old_row: d.row,
        }));
        Ok(count)
    }

    /// Publishes the staged storage and returns the change log.
    pub fn commit(mut self) -> Result<Vec<Change>> {
        self.check_active()?;
        *self.guard = std::mem::take(&mut self.staged);
        self.state = TransactionState::Committed;
        event!(
            Level::DEBUG,
            txn = %self.id,
            changes = self.changes.len(),
            elapsed_us = self.start_time.elapsed().as_micros() as u64,
            "transaction committed"
        );
        Ok(std::mem::take(&mut self.changes))
    }

    pub fn rollback(mut self) {
        self.abort("rolled back");
    }

    fn abort(&mut self, reason: &str) {
        if self.state.is_active() {
            self.state = TransactionState::Aborted;
            event!(
                Level::DEBUG,
                txn = %self.id,
                discarded = self.changes.len(),
                reason,
                "transaction aborted"
            );
        }
    }

    fn check_active(&self) -> Result<()> {
        if !self.state.is_active() {
            return Err(DbError::ExecutionError(format!(
                "Transaction {} is {}",
                self.id, self.state
            )));
        }
        Ok(())
    }
}

impl Drop for Transaction<'_> {
    fn drop(&mut self) {
        self.abort("dropped");
    }
}
