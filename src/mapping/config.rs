use super::key::EntityKey;
use super::mapper::MergeScope;
use crate::core::{DbError, Result};
use serde::{Deserialize, Serialize};
use std::any::{Any, TypeId, type_name};
use std::collections::HashMap;

/// What to do with an incoming element whose key is set but matches nothing
/// in the existing collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnmatchedKeyPolicy {
    /// Fail the merge with [`DbError::DanglingReference`].
    #[default]
    Reject,
    /// Insert it as a new element; its key is dropped and reassigned on save.
    InsertAsNew,
}

/// What to do with an existing element that has no incoming counterpart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrphanPolicy {
    #[default]
    Remove,
    Retain,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MergePolicy {
    pub unmatched_key: UnmatchedKeyPolicy,
    pub orphans: OrphanPolicy,
}

impl MergePolicy {
    pub fn unmatched_key(mut self, policy: UnmatchedKeyPolicy) -> Self {
        self.unmatched_key = policy;
        self
    }

    pub fn orphans(mut self, policy: OrphanPolicy) -> Self {
        self.orphans = policy;
        self
    }

    /// Parse a policy from JSON, e.g. `{"unmatched_key": "insert_as_new"}`.
    /// Missing fields keep their defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| DbError::Configuration(e.to_string()))
    }
}

/// Copies the mapped fields of `source` onto `destination` and merges its
/// owned collections through the scope.
pub type ApplyFn<T> = fn(&MergeScope<'_>, &mut T, T) -> Result<()>;

/// How one entity kind is matched and merged.
///
/// `apply` decides which fields are copied. Keys, parent references and
/// transient fields are left out of it and therefore never overwritten.
pub struct EntityMap<T, K> {
    name: &'static str,
    key_of: fn(&T) -> K,
    attach: fn(&mut T, K),
    apply: ApplyFn<T>,
    create: fn() -> T,
}

impl<T: Default + 'static, K: EntityKey> EntityMap<T, K> {
    pub fn new(name: &'static str, key_of: fn(&T) -> K, apply: ApplyFn<T>) -> Self {
        Self {
            name,
            key_of,
            attach: |_, _| {},
            apply,
            create: T::default,
        }
    }

    /// Sets the parent reference of elements newly added to a collection.
    pub fn with_parent(mut self, attach: fn(&mut T, K)) -> Self {
        self.attach = attach;
        self
    }
}

impl<T, K: EntityKey> EntityMap<T, K> {
    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn key_of(&self, item: &T) -> K {
        (self.key_of)(item)
    }

    pub fn attach(&self, item: &mut T, parent_key: K) {
        (self.attach)(item, parent_key)
    }

    pub fn apply(&self, scope: &MergeScope<'_>, destination: &mut T, source: T) -> Result<()> {
        (self.apply)(scope, destination, source)
    }

    pub fn create(&self) -> T {
        (self.create)()
    }
}

type RootMergeFn<T> = dyn Fn(&MergeScope<'_>, &mut T, T) -> Result<()> + Send + Sync;

/// Key-type-erased entry point used for the root of a graph.
pub(crate) struct RootMap<T> {
    pub(crate) name: &'static str,
    pub(crate) merge: Box<RootMergeFn<T>>,
}

struct RegisteredMap {
    name: &'static str,
    typed: Box<dyn Any + Send + Sync>,
    root: Box<dyn Any + Send + Sync>,
}

/// Immutable set of entity maps plus the merge policy.
///
/// Built once with [`MapperConfig::builder`] and handed to a
/// [`crate::Mapper`]; nothing is registered globally.
pub struct MapperConfig {
    policy: MergePolicy,
    maps: HashMap<TypeId, RegisteredMap>,
}

impl MapperConfig {
    pub fn builder() -> MapperConfigBuilder {
        MapperConfigBuilder::default()
    }

    pub fn policy(&self) -> &MergePolicy {
        &self.policy
    }

    pub fn contains<T: 'static>(&self) -> bool {
        self.maps.contains_key(&TypeId::of::<T>())
    }

    pub fn entity_names(&self) -> Vec<&'static str> {
        let mut names: Vec<&'static str> = self.maps.values().map(|m| m.name).collect();
        names.sort_unstable();
        names
    }

    pub(crate) fn entity_map<T: 'static, K: EntityKey>(&self) -> Result<&EntityMap<T, K>> {
        let registered = self
            .maps
            .get(&TypeId::of::<T>())
            .ok_or_else(|| DbError::MappingNotConfigured(type_name::<T>().to_string()))?;
        registered
            .typed
            .downcast_ref::<EntityMap<T, K>>()
            .ok_or_else(|| {
                DbError::Configuration(format!(
                    "'{}' is not keyed by {}",
                    registered.name,
                    type_name::<K>()
                ))
            })
    }

    pub(crate) fn root_map<T: 'static>(&self) -> Result<&RootMap<T>> {
        self.maps
            .get(&TypeId::of::<T>())
            .and_then(|registered| registered.root.downcast_ref::<RootMap<T>>())
            .ok_or_else(|| DbError::MappingNotConfigured(type_name::<T>().to_string()))
    }
}

impl std::fmt::Debug for MapperConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MapperConfig")
            .field("policy", &self.policy)
            .field("entities", &self.entity_names())
            .finish()
    }
}

#[derive(Default)]
pub struct MapperConfigBuilder {
    policy: MergePolicy,
    maps: HashMap<TypeId, RegisteredMap>,
    duplicates: Vec<&'static str>,
}

impl MapperConfigBuilder {
    pub fn policy(mut self, policy: MergePolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Registers the map for `T`. Registering a type twice fails the build.
    pub fn entity<T: Default + 'static, K: EntityKey>(mut self, map: EntityMap<T, K>) -> Self {
        let name = map.name;
        let key_of = map.key_of;
        let apply = map.apply;

        let root = RootMap::<T> {
            name,
            merge: Box::new(
                move |scope: &MergeScope<'_>, destination: &mut T, source: T| -> Result<()> {
                    let source_key = key_of(&source);
                    let destination_key = key_of(destination);
                    if !source_key.is_unset() && source_key != destination_key {
                        return Err(DbError::KeyMismatch {
                            entity: name.to_string(),
                            source_key: source_key.to_string(),
                            destination_key: destination_key.to_string(),
                        });
                    }
                    apply(scope, destination, source)
                },
            ),
        };

        let registered = RegisteredMap {
            name,
            typed: Box::new(map),
            root: Box::new(root),
        };
        if self.maps.insert(TypeId::of::<T>(), registered).is_some() {
            self.duplicates.push(name);
        }
        self
    }

    pub fn build(self) -> Result<MapperConfig> {
        if !self.duplicates.is_empty() {
            return Err(DbError::Configuration(format!(
                "entity registered more than once: {}",
                self.duplicates.join(", ")
            )));
        }
        Ok(MapperConfig {
            policy: self.policy,
            maps: self.maps,
        })
    }
}
