use crate::core::{Column, Result, Row};
use crate::storage::TableSchema;
use uuid::Uuid;

/// A type stored as one row of one table, possibly owning collections of
/// other entities.
///
/// The identity column is assigned by the store: a freshly built entity
/// carries key `0` until it is saved.
pub trait Entity: Sized + 'static {
    const TABLE: &'static str;

    fn columns() -> Vec<Column>;

    fn table_schema() -> TableSchema {
        TableSchema::new(Self::TABLE, Self::columns())
    }

    fn key(&self) -> i64;

    fn set_key(&mut self, key: i64);

    /// Key of the owning row; `None` for roots.
    fn parent_key(&self) -> Option<i64> {
        None
    }

    fn set_parent_key(&mut self, _parent_key: i64) {}

    /// Persisted columns only, in [`Entity::columns`] order.
    fn to_row(&self) -> Row;

    fn from_row(row: &Row) -> Result<Self>;

    /// Hands every owned collection to `visitor`, together with this
    /// entity's key.
    fn visit_collections<V: CollectionVisitor>(&mut self, _visitor: &mut V) -> Result<()> {
        Ok(())
    }
}

/// Callback interface for walking an entity graph one collection at a time.
pub trait CollectionVisitor {
    fn visit<C: Entity>(&mut self, parent_key: i64, children: &mut Vec<C>) -> Result<()>;
}

/// Per-instance marker that is never persisted nor copied by a merge.
///
/// Two values are equal only if they came from the same construction, so a
/// tag tells whether an element of a merged graph is the very object that
/// was loaded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct InstanceTag(Uuid);

impl InstanceTag {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for InstanceTag {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for InstanceTag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
