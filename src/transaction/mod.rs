// ============================================================================
// Transaction Management Module
// ============================================================================
//
// Copy-on-write transactions over the in-memory storage: writes are staged on
// a clone of the storage and published atomically on commit.
//
// ============================================================================

pub mod change;
pub mod state;

pub use change::{Change, SaveSummary};
pub use state::{Transaction, TransactionId, TransactionState};
