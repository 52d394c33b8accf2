//! The shared global namespace.

use std::fmt;

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use crate::graph::CellId;

/// Identifies one scheduling pass. Strictly increasing.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Generation(pub u64);

impl Generation {
    pub fn next(self) -> Self {
        Generation(self.0 + 1)
    }
}

impl fmt::Display for Generation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "gen {}", self.0)
    }
}

#[derive(Debug, Clone)]
enum Slot<V> {
    Published {
        value: V,
        owner: CellId,
        generation: Generation,
    },
    /// The owner's last run failed, was blocked or was cancelled.
    Stale { owner: CellId, generation: Generation },
}

impl<V> Slot<V> {
    fn owner(&self) -> CellId {
        match self {
            Slot::Published { owner, .. } | Slot::Stale { owner, .. } => *owner,
        }
    }

    fn generation(&self) -> Generation {
        match self {
            Slot::Published { generation, .. } | Slot::Stale { generation, .. } => *generation,
        }
    }
}

/// What a lookup of a global name finds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Symbol<'a, V> {
    /// Published by its owning cell.
    Published {
        value: &'a V,
        owner: CellId,
        generation: Generation,
    },
    /// Owned, but the owner's latest result is not usable.
    Stale { owner: CellId, generation: Generation },
    /// Supplied from outside the notebook.
    External(&'a V),
    /// Nothing is known about this name.
    Absent,
}

impl<V> Symbol<'_, V> {
    pub fn state_name(&self) -> &'static str {
        match self {
            Symbol::Published { .. } => "published",
            Symbol::Stale { .. } => "stale",
            Symbol::External(_) => "external",
            Symbol::Absent => "absent",
        }
    }
}

/// Global name to value map, written only by committed cell results.
///
/// Cell-published values take precedence over external values of the same
/// name.
#[derive(Debug, Clone)]
pub struct Namespace<V> {
    slots: FxHashMap<String, Slot<V>>,
    externals: FxHashMap<String, V>,
}

impl<V> Default for Namespace<V> {
    fn default() -> Self {
        Self {
            slots: FxHashMap::default(),
            externals: FxHashMap::default(),
        }
    }
}

impl<V> Namespace<V> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Publish a value. Rejected when the name already holds a result from a
    /// newer generation.
    pub fn publish(
        &mut self,
        name: impl Into<String>,
        value: V,
        owner: CellId,
        generation: Generation,
    ) -> bool {
        let name = name.into();
        if let Some(slot) = self.slots.get(&name)
            && slot.generation() > generation
        {
            tracing::debug!(
                "Rejected publish of '{}' from {} at {}: slot holds {}",
                name,
                owner,
                generation,
                slot.generation()
            );
            return false;
        }
        self.slots.insert(
            name,
            Slot::Published {
                value,
                owner,
                generation,
            },
        );
        true
    }

    /// Mark a name stale if `owner` holds it.
    pub fn invalidate(&mut self, name: &str, owner: CellId, generation: Generation) {
        match self.slots.get(name) {
            Some(slot) if slot.owner() != owner || slot.generation() > generation => {}
            _ => {
                self.slots
                    .insert(name.to_string(), Slot::Stale { owner, generation });
            }
        }
    }

    /// Drop a name if `owner` holds it.
    pub fn remove(&mut self, name: &str, owner: CellId) {
        if self.slots.get(name).is_some_and(|slot| slot.owner() == owner) {
            self.slots.remove(name);
        }
    }

    /// Drop every name held by `owner`.
    pub fn remove_owner(&mut self, owner: CellId) {
        self.slots.retain(|_, slot| slot.owner() != owner);
    }

    pub fn set_external(&mut self, name: impl Into<String>, value: V) {
        self.externals.insert(name.into(), value);
    }

    pub fn remove_external(&mut self, name: &str) -> Option<V> {
        self.externals.remove(name)
    }

    /// The usable value of a name, if any.
    pub fn get(&self, name: &str) -> Option<&V> {
        match self.slots.get(name) {
            Some(Slot::Published { value, .. }) => Some(value),
            Some(Slot::Stale { .. }) => None,
            None => self.externals.get(name),
        }
    }

    pub fn lookup(&self, name: &str) -> Symbol<'_, V> {
        match self.slots.get(name) {
            Some(Slot::Published {
                value,
                owner,
                generation,
            }) => Symbol::Published {
                value,
                owner: *owner,
                generation: *generation,
            },
            Some(Slot::Stale { owner, generation }) => Symbol::Stale {
                owner: *owner,
                generation: *generation,
            },
            None => match self.externals.get(name) {
                Some(value) => Symbol::External(value),
                None => Symbol::Absent,
            },
        }
    }

    /// Published names held by `owner`, sorted.
    pub fn published_by(&self, owner: CellId) -> Vec<(&str, &V)> {
        let mut names: Vec<(&str, &V)> = self
            .slots
            .iter()
            .filter_map(|(name, slot)| match slot {
                Slot::Published { value, owner: o, .. } if *o == owner => {
                    Some((name.as_str(), value))
                }
                _ => None,
            })
            .collect();
        names.sort_by(|a, b| a.0.cmp(b.0));
        names
    }

    /// All published names, sorted.
    pub fn published(&self) -> Vec<(&str, &V)> {
        let mut names: Vec<(&str, &V)> = self
            .slots
            .iter()
            .filter_map(|(name, slot)| match slot {
                Slot::Published { value, .. } => Some((name.as_str(), value)),
                Slot::Stale { .. } => None,
            })
            .collect();
        names.sort_by(|a, b| a.0.cmp(b.0));
        names
    }
}
