// ============================================================================
// Transaction Change Tracking
// ============================================================================
//
// Every write made through a Transaction is recorded as a Change. The log is
// what a committed save reports back to its caller.
//
// ============================================================================

use crate::core::Row;

/// A single write applied inside a transaction.
#[derive(Debug, Clone, PartialEq)]
pub enum Change {
    /// A new row, with its assigned identity filled in
    InsertRow { table: String, key: i64, row: Row },

    /// An existing row replaced in place
    UpdateRow {
        table: String,
        key: i64,
        old_row: Row,
        new_row: Row,
    },

    /// A removed row, either directly or by cascade
    DeleteRow { table: String, key: i64, old_row: Row },
}

impl Change {
    /// Get the table name affected by this change
    pub fn table_name(&self) -> &str {
        match self {
            Change::InsertRow { table, .. } => table,
            Change::UpdateRow { table, .. } => table,
            Change::DeleteRow { table, .. } => table,
        }
    }

    pub fn key(&self) -> i64 {
        match self {
            Change::InsertRow { key, .. }
            | Change::UpdateRow { key, .. }
            | Change::DeleteRow { key, .. } => *key,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Change::InsertRow { .. } => "insert",
            Change::UpdateRow { .. } => "update",
            Change::DeleteRow { .. } => "delete",
        }
    }
}

/// What a committed save wrote, in the order it was written.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SaveSummary {
    pub inserted: usize,
    pub updated: usize,
    pub deleted: usize,
    pub changes: Vec<Change>,
}

impl SaveSummary {
    pub fn from_changes(changes: Vec<Change>) -> Self {
        let mut summary = Self::default();
        for change in &changes {
            match change {
                Change::InsertRow { .. } => summary.inserted += 1,
                Change::UpdateRow { .. } => summary.updated += 1,
                Change::DeleteRow { .. } => summary.deleted += 1,
            }
        }
        summary.changes = changes;
        summary
    }

    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    /// Number of changes that touched `table`.
    pub fn count_for(&self, table: &str) -> usize {
        self.changes.iter().filter(|c| c.table_name() == table).count()
    }
}
