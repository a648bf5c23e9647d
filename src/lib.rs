// ============================================================================
// RustMemoMap Library
// ============================================================================
//
// Smart updates of entity graphs: a detached revision of a graph is merged
// onto the graph loaded by a DbContext, owned collections are reconciled by
// key at every level, and the context saves the result as inserts, updates
// and deletes in one transaction.
//
// ============================================================================

pub mod context;
pub mod core;
pub mod facade;
pub mod mapping;
pub mod storage;
pub mod transaction;

// Re-export main types for convenience
pub use context::{ChangeTracker, CollectionVisitor, ContextOptions, DbContext, Entity, InstanceTag};
pub use core::{Column, DataType, DbError, Result, Row, Value};
pub use facade::InMemoryDB;
pub use mapping::{
    EntityKey, EntityMap, Mapper, MapperConfig, MergePolicy, MergeReport, MergeScope, MergeStats,
    OrphanPolicy, UnmatchedKeyPolicy, merge_collection,
};
pub use transaction::{Change, SaveSummary};
