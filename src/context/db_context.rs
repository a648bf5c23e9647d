use super::entity::{CollectionVisitor, Entity};
use super::options::ContextOptions;
use super::tracker::{ChangeTracker, EntityRef, TrackedEntry};
use crate::core::{DbError, Result, Row, Value};
use crate::facade::InMemoryDB;
use crate::storage::InMemoryStorage;
use crate::transaction::{SaveSummary, Transaction};
use std::collections::HashSet;
use tracing::{Level, event, info_span};

/// Unit of work over an [`InMemoryDB`].
///
/// A context loads entity graphs, remembers what it loaded, and on
/// [`DbContext::save`] writes the difference between a graph and that
/// snapshot in a single transaction. Several contexts may share one database.
pub struct DbContext {
    db: InMemoryDB,
    options: ContextOptions,
    tracker: ChangeTracker,
}

impl DbContext {
    pub fn new(db: &InMemoryDB, options: ContextOptions) -> Self {
        Self {
            db: db.clone(),
            options,
            tracker: ChangeTracker::new(),
        }
    }

    pub fn database(&self) -> &InMemoryDB {
        &self.db
    }

    pub fn options(&self) -> &ContextOptions {
        &self.options
    }

    pub fn tracker(&self) -> &ChangeTracker {
        &self.tracker
    }

    pub fn is_tracked<E: Entity>(&self, entity: &E) -> bool {
        self.tracker.is_tracked(E::TABLE, entity.key())
    }

    /// Persists a new graph. Every entity in it must be unsaved; keys and
    /// parent references are written back into the graph, which is then
    /// tracked like a loaded one.
    pub fn add<E: Entity>(&mut self, root: &mut E) -> Result<SaveSummary> {
        let span = info_span!("add", db = self.db.name(), table = E::TABLE);
        let _guard = span.enter();

        if root.key() != 0 {
            return Err(already_keyed(E::TABLE, root.key()));
        }
        root.visit_collections(&mut UnsetKeyCheck)?;

        self.persist(root)
    }

    /// Loads the root row `key` of `E` plus `depth` levels of owned
    /// collections, children ordered by key.
    ///
    /// Collections below `depth` are left empty and are not tracked, so
    /// saving the graph never deletes their rows.
    pub fn load<E: Entity>(&mut self, key: i64, depth: usize) -> Result<E> {
        let span = info_span!("load", db = self.db.name(), table = E::TABLE, key, depth);
        let _guard = span.enter();

        let root_ref = EntityRef::new(E::TABLE, key);
        let (root, entries) = self.db.read(|storage| {
            let row = if storage.table_exists(E::TABLE) {
                storage.get_row(E::TABLE, key)?
            } else {
                None
            };
            let row = row.ok_or_else(|| DbError::RowNotFound {
                table: E::TABLE.to_string(),
                key,
            })?;

            let mut root = E::from_row(&row)?;
            let mut loader = GraphLoader {
                storage,
                root: root_ref,
                remaining: depth,
                depth: 0,
                entries: vec![(
                    root_ref,
                    TrackedEntry {
                        row,
                        depth: 0,
                        root: root_ref,
                    },
                )],
            };
            root.visit_collections(&mut loader)?;
            Ok((root, loader.entries))
        })?;

        event!(Level::DEBUG, rows = entries.len(), "graph loaded");
        self.tracker.replace_root(&root_ref, entries);
        Ok(root)
    }

    /// Writes `root` and everything reachable from it.
    ///
    /// Unsaved entities are inserted parents first, with parent references
    /// taken from their owner. Tracked entities whose row changed are
    /// updated. Tracked entities of this graph that are no longer reachable
    /// are deleted deepest first; rows that still reference them are
    /// cascaded or block the save according to
    /// [`ContextOptions::cascade_delete`]. A keyed entity this context does
    /// not track fails with [`DbError::UntrackedEntity`].
    ///
    /// Either everything is committed or nothing is; on error, keys assigned
    /// during the attempt are reset in the graph.
    pub fn save<E: Entity>(&mut self, root: &mut E) -> Result<SaveSummary> {
        let span = info_span!("save", db = self.db.name(), table = E::TABLE, key = root.key());
        let _guard = span.enter();

        self.persist(root)
    }

    fn persist<E: Entity>(&mut self, root: &mut E) -> Result<SaveSummary> {
        let mut inserted = HashSet::new();
        match self.write_graph(root, &mut inserted) {
            Ok(summary) => {
                event!(
                    Level::INFO,
                    inserted = summary.inserted,
                    updated = summary.updated,
                    deleted = summary.deleted,
                    "changes saved"
                );
                Ok(summary)
            }
            Err(err) => {
                event!(Level::WARN, error = %err, "save rolled back");
                if inserted.contains(&EntityRef::new(E::TABLE, root.key())) {
                    root.set_key(0);
                }
                root.visit_collections(&mut KeyReset {
                    inserted: &inserted,
                })?;
                Err(err)
            }
        }
    }

    fn write_graph<E: Entity>(
        &mut self,
        root: &mut E,
        inserted: &mut HashSet<EntityRef>,
    ) -> Result<SaveSummary> {
        let previous_root = (root.key() != 0).then(|| EntityRef::new(E::TABLE, root.key()));

        let mut txn = self.db.begin()?;
        txn.ensure_table(E::table_schema())?;

        let mut writer = GraphWriter {
            txn: &mut txn,
            tracker: &self.tracker,
            log_values: self.options.sensitive_data_logging,
            root: EntityRef::new(E::TABLE, 0),
            depth: 0,
            seen: HashSet::new(),
            inserted,
            snapshots: Vec::new(),
        };
        let (root_ref, row) = writer.write_row(root)?;
        writer.root = root_ref;
        writer.snapshots.push((
            root_ref,
            TrackedEntry {
                row,
                depth: 0,
                root: root_ref,
            },
        ));
        root.visit_collections(&mut writer)?;

        let GraphWriter { seen, snapshots, .. } = writer;

        if let Some(previous) = previous_root {
            let rule = self.options.delete_rule();
            for (entity, _) in self.tracker.entries_under(&previous) {
                if seen.contains(&entity) {
                    continue;
                }
                // May already be gone through a cascade from its parent.
                if txn.storage().get_row(entity.table, entity.key)?.is_none() {
                    continue;
                }
                let removed = txn.delete(entity.table, entity.key, rule)?;
                event!(Level::DEBUG, entity = %entity, removed, "row deleted");
            }
        }

        event!(Level::TRACE, pending = txn.change_count(), "committing save");
        let changes = txn.commit()?;
        self.tracker.replace_root(&root_ref, snapshots);
        Ok(SaveSummary::from_changes(changes))
    }
}

impl std::fmt::Debug for DbContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DbContext")
            .field("db", &self.db)
            .field("options", &self.options)
            .field("tracked", &self.tracker.len())
            .finish()
    }
}

fn already_keyed(table: &str, key: i64) -> DbError {
    DbError::ConstraintViolation(format!(
        "Cannot add '{}' row {}: entity is already persisted",
        table, key
    ))
}

struct GraphLoader<'s> {
    storage: &'s InMemoryStorage,
    root: EntityRef,
    remaining: usize,
    depth: usize,
    entries: Vec<(EntityRef, TrackedEntry)>,
}

impl GraphLoader<'_> {
    fn load_children<C: Entity>(
        &mut self,
        rows: Vec<(i64, Row)>,
        children: &mut Vec<C>,
    ) -> Result<()> {
        children.clear();
        for (key, row) in rows {
            let mut child = C::from_row(&row)?;
            self.entries.push((
                EntityRef::new(C::TABLE, key),
                TrackedEntry {
                    row,
                    depth: self.depth,
                    root: self.root,
                },
            ));
            child.visit_collections(self)?;
            children.push(child);
        }
        Ok(())
    }
}

impl CollectionVisitor for GraphLoader<'_> {
    fn visit<C: Entity>(&mut self, parent_key: i64, children: &mut Vec<C>) -> Result<()> {
        if self.remaining == 0 || !self.storage.table_exists(C::TABLE) {
            return Ok(());
        }

        let schema = C::table_schema();
        let parent_column = schema.parent_column().ok_or_else(|| {
            DbError::Configuration(format!("'{}' has no parent reference column", C::TABLE))
        })?;
        let mut rows = self
            .storage
            .find_rows(C::TABLE, &parent_column.name, &Value::Integer(parent_key))?;
        rows.sort_by_key(|(key, _)| *key);

        self.remaining -= 1;
        self.depth += 1;
        let result = self.load_children(rows, children);
        self.depth -= 1;
        self.remaining += 1;
        result
    }
}

struct GraphWriter<'a, 'db> {
    txn: &'a mut Transaction<'db>,
    tracker: &'a ChangeTracker,
    log_values: bool,
    root: EntityRef,
    depth: usize,
    seen: HashSet<EntityRef>,
    inserted: &'a mut HashSet<EntityRef>,
    snapshots: Vec<(EntityRef, TrackedEntry)>,
}

impl GraphWriter<'_, '_> {
    /// Inserts or updates the row of `entity` and returns its identity and
    /// the row now stored.
    fn write_row<C: Entity>(&mut self, entity: &mut C) -> Result<(EntityRef, Row)> {
        let row = entity.to_row();

        if entity.key() == 0 {
            let key = self.txn.insert(C::TABLE, row)?;
            entity.set_key(key);
            let entity_ref = EntityRef::new(C::TABLE, key);
            self.inserted.insert(entity_ref);
            let row = entity.to_row();
            self.log_write("insert", &entity_ref, &row);
            return Ok((entity_ref, row));
        }

        let entity_ref = EntityRef::new(C::TABLE, entity.key());
        let changed = self
            .tracker
            .get(&entity_ref)
            .map(|tracked| tracked.row != row)
            .ok_or_else(|| DbError::UntrackedEntity {
                table: C::TABLE.to_string(),
                key: entity_ref.key,
            })?;
        if !self.seen.insert(entity_ref) {
            return Err(DbError::DuplicateKey {
                entity: C::TABLE.to_string(),
                key: entity_ref.key.to_string(),
            });
        }
        if changed {
            self.txn.update(C::TABLE, entity_ref.key, row.clone())?;
            self.log_write("update", &entity_ref, &row);
        }
        Ok((entity_ref, row))
    }

    fn write_child<C: Entity>(&mut self, parent_key: i64, child: &mut C) -> Result<()> {
        if let Some(previous) = child.parent_key()
            && child.key() != 0
            && previous != parent_key
        {
            event!(
                Level::DEBUG,
                table = C::TABLE,
                key = child.key(),
                from = previous,
                to = parent_key,
                "entity moved to another parent"
            );
        }
        child.set_parent_key(parent_key);
        let (entity_ref, row) = self.write_row(child)?;
        self.snapshots.push((
            entity_ref,
            TrackedEntry {
                row,
                depth: self.depth,
                root: self.root,
            },
        ));
        child.visit_collections(self)
    }

    fn log_write(&self, action: &'static str, entity: &EntityRef, row: &Row) {
        if self.log_values {
            event!(Level::DEBUG, action, entity = %entity, row = ?row, "row written");
        } else {
            event!(Level::DEBUG, action, entity = %entity, "row written");
        }
    }
}

impl CollectionVisitor for GraphWriter<'_, '_> {
    fn visit<C: Entity>(&mut self, parent_key: i64, children: &mut Vec<C>) -> Result<()> {
        self.txn.ensure_table(C::table_schema())?;

        self.depth += 1;
        let result = children
            .iter_mut()
            .try_for_each(|child| self.write_child(parent_key, child));
        self.depth -= 1;
        result
    }
}

struct UnsetKeyCheck;

impl CollectionVisitor for UnsetKeyCheck {
    fn visit<C: Entity>(&mut self, _parent_key: i64, children: &mut Vec<C>) -> Result<()> {
        for child in children.iter_mut() {
            if child.key() != 0 {
                return Err(already_keyed(C::TABLE, child.key()));
            }
            child.visit_collections(self)?;
        }
        Ok(())
    }
}

/// Undoes the key assignments of a save that did not commit.
struct KeyReset<'a> {
    inserted: &'a HashSet<EntityRef>,
}

impl CollectionVisitor for KeyReset<'_> {
    fn visit<C: Entity>(&mut self, parent_key: i64, children: &mut Vec<C>) -> Result<()> {
        for child in children.iter_mut() {
            if self.inserted.contains(&EntityRef::new(C::TABLE, child.key())) {
                child.set_key(0);
                child.set_parent_key(parent_key);
            }
            child.visit_collections(self)?;
        }
        Ok(())
    }
}
