// ============================================================================
// Change Tracker
// ============================================================================
//
// Remembers the row every loaded or saved entity had when the context last
// saw it, grouped by the root of the graph it was reached from. A save diffs
// the graph it is handed against these snapshots: differing rows become
// updates, snapshots whose entity is no longer reachable become deletes.
//
// ============================================================================

use crate::core::Row;
use im::OrdMap;

/// Table plus key: the identity of one persisted entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EntityRef {
    pub table: &'static str,
    pub key: i64,
}

impl EntityRef {
    pub fn new(table: &'static str, key: i64) -> Self {
        Self { table, key }
    }
}

impl std::fmt::Display for EntityRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}#{}", self.table, self.key)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TrackedEntry {
    /// Row as last loaded or saved
    pub row: Row,
    /// Distance from the root; the root itself is 0
    pub depth: usize,
    pub root: EntityRef,
}

#[derive(Debug, Clone, Default)]
pub struct ChangeTracker {
    entries: OrdMap<EntityRef, TrackedEntry>,
}

impl ChangeTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn is_tracked(&self, table: &'static str, key: i64) -> bool {
        self.entries.contains_key(&EntityRef::new(table, key))
    }

    pub fn get(&self, entity: &EntityRef) -> Option<&TrackedEntry> {
        self.entries.get(entity)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&EntityRef, &TrackedEntry)> {
        self.entries.iter()
    }

    /// Entries reached from `root`, deepest first.
    pub fn entries_under(&self, root: &EntityRef) -> Vec<(EntityRef, TrackedEntry)> {
        let mut found: Vec<(EntityRef, TrackedEntry)> = self
            .entries
            .iter()
            .filter(|(_, entry)| entry.root == *root)
            .map(|(entity, entry)| (*entity, entry.clone()))
            .collect();
        found.sort_by(|a, b| b.1.depth.cmp(&a.1.depth).then(a.0.cmp(&b.0)));
        found
    }

    /// Drops every entry under `root` and tracks `entries` in their place.
    pub fn replace_root(&mut self, root: &EntityRef, entries: Vec<(EntityRef, TrackedEntry)>) {
        let stale: Vec<EntityRef> = self
            .entries
            .iter()
            .filter(|(_, entry)| entry.root == *root)
            .map(|(entity, _)| *entity)
            .collect();
        for entity in stale {
            self.entries.remove(&entity);
        }
        for (entity, entry) in entries {
            self.entries.insert(entity, entry);
        }
    }

    pub fn clear(&mut self) {
        self.entries = OrdMap::new();
    }
}
