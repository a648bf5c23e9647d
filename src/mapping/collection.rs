//! Keyed reconciliation of one collection.
//!
//! Given the elements currently held (`existing`) and the desired elements
//! (`incoming`), [`merge_collection`] updates matched elements in place,
//! drops unmatched existing ones and appends unmatched incoming ones. Nested
//! collections are handled by the `update` and `insert` callbacks, which is
//! how [`crate::Mapper`] recurses through a graph.

use super::config::{MergePolicy, OrphanPolicy, UnmatchedKeyPolicy};
use super::key::EntityKey;
use crate::core::{DbError, Result};
use std::collections::{HashMap, HashSet};
use tracing::{Level, event};

/// Outcome of merging one collection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectionDiff<K> {
    /// Keys of existing elements updated from an incoming counterpart
    pub updated: Vec<K>,
    /// Keys of existing elements dropped from the collection
    pub removed: Vec<K>,
    /// Keys of unmatched existing elements kept under [`OrphanPolicy::Retain`]
    pub retained: Vec<K>,
    /// Number of elements appended
    pub inserted: usize,
}

impl<K> Default for CollectionDiff<K> {
    fn default() -> Self {
        Self {
            updated: Vec::new(),
            removed: Vec::new(),
            retained: Vec::new(),
            inserted: 0,
        }
    }
}

impl<K> CollectionDiff<K> {
    pub fn is_unchanged(&self) -> bool {
        self.removed.is_empty() && self.inserted == 0
    }
}

/// Merges `incoming` into `existing`.
///
/// Elements are matched by `key_of`, compared by value; unset keys never
/// match. Matched pairs go through `update(existing, incoming)`. Each
/// unmatched incoming element goes through `insert`, which returns the
/// element to append. Unmatched existing elements are removed or retained
/// according to `policy.orphans`.
///
/// The resulting order is the retained existing elements in their original
/// order followed by new elements in incoming order.
///
/// Duplicate set keys in `incoming` fail with [`DbError::DuplicateKey`]. A set
/// key that matches nothing fails with [`DbError::DanglingReference`] unless
/// `policy.unmatched_key` is [`UnmatchedKeyPolicy::InsertAsNew`]. Both checks
/// run before `existing` is touched. An error returned by a callback leaves
/// every existing element in place, possibly already updated.
pub fn merge_collection<T, K>(
    entity: &str,
    policy: &MergePolicy,
    existing: &mut Vec<T>,
    incoming: Vec<T>,
    key_of: impl Fn(&T) -> K,
    mut update: impl FnMut(&mut T, T) -> Result<()>,
    mut insert: impl FnMut(T) -> Result<T>,
) -> Result<CollectionDiff<K>>
where
    K: EntityKey,
{
    let mut positions: HashMap<K, usize> = HashMap::with_capacity(incoming.len());
    for (idx, item) in incoming.iter().enumerate() {
        let key = key_of(item);
        if key.is_unset() {
            continue;
        }
        if positions.insert(key, idx).is_some() {
            return Err(DbError::DuplicateKey {
                entity: entity.to_string(),
                key: key.to_string(),
            });
        }
    }

    let existing_keys: HashSet<K> = existing
        .iter()
        .map(&key_of)
        .filter(|key| !key.is_unset())
        .collect();

    if policy.unmatched_key == UnmatchedKeyPolicy::Reject {
        let dangling = incoming
            .iter()
            .map(&key_of)
            .find(|key| !key.is_unset() && !existing_keys.contains(key));
        if let Some(key) = dangling {
            return Err(DbError::DanglingReference {
                entity: entity.to_string(),
                key: key.to_string(),
            });
        }
    }

    let mut pending: Vec<Option<T>> = incoming.into_iter().map(Some).collect();
    let mut diff = CollectionDiff::default();
    let mut keep = Vec::with_capacity(existing.len());

    for current in existing.iter_mut() {
        let key = key_of(current);
        let source = if key.is_unset() {
            None
        } else {
            positions.get(&key).and_then(|&idx| pending[idx].take())
        };

        match (source, policy.orphans) {
            (Some(source), _) => {
                update(current, source)?;
                diff.updated.push(key);
                keep.push(true);
            }
            (None, OrphanPolicy::Remove) => {
                diff.removed.push(key);
                keep.push(false);
            }
            (None, OrphanPolicy::Retain) => {
                diff.retained.push(key);
                keep.push(true);
            }
        }
    }

    let mut keep = keep.into_iter();
    existing.retain(|_| keep.next().unwrap_or(true));

    for source in pending.into_iter().flatten() {
        let key = key_of(&source);
        if !key.is_unset() {
            event!(Level::DEBUG, entity, key = %key, "unmatched key dropped, inserting as new");
        }
        existing.push(insert(source)?);
        diff.inserted += 1;
    }

    event!(
        Level::TRACE,
        entity,
        updated = diff.updated.len(),
        inserted = diff.inserted,
        removed = diff.removed.len(),
        "collection merged"
    );

    Ok(diff)
}
