use super::collection::{self, CollectionDiff};
use super::config::MapperConfig;
use super::key::EntityKey;
use crate::core::Result;
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{Level, event, info_span};

/// Per-entity counters accumulated over one merge.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeStats {
    pub updated: usize,
    pub inserted: usize,
    pub removed: usize,
    pub retained: usize,
}

impl MergeStats {
    fn add<K>(&mut self, diff: &CollectionDiff<K>) {
        self.updated += diff.updated.len();
        self.inserted += diff.inserted;
        self.removed += diff.removed.len();
        self.retained += diff.retained.len();
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MergeReport {
    entities: BTreeMap<&'static str, MergeStats>,
}

impl MergeReport {
    /// Counters for `entity`; zero when the merge never reached it.
    pub fn stats(&self, entity: &str) -> MergeStats {
        self.entities.get(entity).copied().unwrap_or_default()
    }

    pub fn total(&self) -> MergeStats {
        self.entities.values().fold(MergeStats::default(), |mut acc, s| {
            acc.updated += s.updated;
            acc.inserted += s.inserted;
            acc.removed += s.removed;
            acc.retained += s.retained;
            acc
        })
    }

    /// True when the merge neither inserted nor removed anything.
    pub fn is_structurally_unchanged(&self) -> bool {
        let total = self.total();
        total.inserted == 0 && total.removed == 0
    }

    pub fn iter(&self) -> impl Iterator<Item = (&'static str, &MergeStats)> {
        self.entities.iter().map(|(name, stats)| (*name, stats))
    }
}

/// State threaded through one merge.
///
/// An [`crate::EntityMap`]'s apply function receives the scope and calls
/// [`MergeScope::merge_collection`] for every collection the entity owns.
pub struct MergeScope<'a> {
    config: &'a MapperConfig,
    report: RefCell<MergeReport>,
}

impl<'a> MergeScope<'a> {
    fn new(config: &'a MapperConfig) -> Self {
        Self {
            config,
            report: RefCell::new(MergeReport::default()),
        }
    }

    /// Merges `incoming` into the collection `existing` owned by the entity
    /// keyed `parent_key`, using the map registered for `T`.
    ///
    /// New elements are built from `T::default()`, receive the incoming
    /// fields (and, recursively, their children) and are attached to
    /// `parent_key`. Their own key stays unset.
    pub fn merge_collection<T: 'static, K: EntityKey>(
        &self,
        parent_key: K,
        existing: &mut Vec<T>,
        incoming: Vec<T>,
    ) -> Result<()> {
        let map = self.config.entity_map::<T, K>()?;

        let diff = collection::merge_collection(
            map.name(),
            self.config.policy(),
            existing,
            incoming,
            |item| map.key_of(item),
            |destination, source| map.apply(self, destination, source),
            |source| {
                let mut fresh = map.create();
                map.apply(self, &mut fresh, source)?;
                map.attach(&mut fresh, parent_key);
                Ok(fresh)
            },
        )?;

        self.report
            .borrow_mut()
            .entities
            .entry(map.name())
            .or_default()
            .add(&diff);
        Ok(())
    }

    fn record_root(&self, entity: &'static str) {
        self.report.borrow_mut().entities.entry(entity).or_default().updated += 1;
    }

    fn into_report(self) -> MergeReport {
        self.report.into_inner()
    }
}

/// Applies detached graphs onto loaded ones according to a [`MapperConfig`].
#[derive(Clone, Debug)]
pub struct Mapper {
    config: Arc<MapperConfig>,
}

impl Mapper {
    pub fn new(config: MapperConfig) -> Self {
        Self {
            config: Arc::new(config),
        }
    }

    pub fn config(&self) -> &MapperConfig {
        &self.config
    }

    /// Merges the detached `source` graph onto `destination`.
    ///
    /// The root keys must agree unless the source key is unset. The merge
    /// runs on a copy of `destination`, which is replaced only when every
    /// level merged cleanly; on error `destination` is untouched.
    pub fn map<T: Clone + 'static>(&self, source: T, destination: &mut T) -> Result<MergeReport> {
        let root = self.config.root_map::<T>()?;
        let span = info_span!("map", entity = root.name);
        let _guard = span.enter();

        let scope = MergeScope::new(&self.config);
        let mut staged = destination.clone();
        if let Err(err) = (root.merge)(&scope, &mut staged, source) {
            event!(Level::WARN, error = %err, "merge rejected");
            return Err(err);
        }
        scope.record_root(root.name);

        *destination = staged;
        let report = scope.into_report();
        let total = report.total();
        event!(
            Level::DEBUG,
            updated = total.updated,
            inserted = total.inserted,
            removed = total.removed,
            retained = total.retained,
            "merge applied"
        );
        Ok(report)
    }
}
