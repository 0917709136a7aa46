//! Internal state-tracking structures used by [`crate::store::Store`].
//!
//! Not part of the public API. `AtomState<T>` caches a computed atom's
//! value alongside the dependency epochs it was computed against, so a
//! later read can tell in O(deps) whether the cache is still valid
//! without re-running the read function. `Mounted` tracks which atoms
//! currently have listeners, so unused computed atoms can be dropped
//! from the dependency graph instead of recomputing forever.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};

use crate::error::{NexusError, Result};
use crate::types::{AtomId, EpochNumber, Listener};

/// Cached state for a single atom.
#[derive(Debug, Clone)]
pub struct AtomState<T> {
    /// Dependency epochs captured the last time this atom was computed.
    pub dependencies: HashMap<AtomId, EpochNumber>,
    /// Version number, incremented every time `value` changes.
    pub epoch: EpochNumber,
    /// Cached value, `None` if never computed or explicitly invalidated.
    pub value: Option<T>,
}

impl<T> AtomState<T> {
    pub fn new() -> Self {
        Self {
            dependencies: HashMap::new(),
            epoch: 0,
            value: None,
        }
    }

    pub fn with_value(value: T) -> Self {
        Self {
            dependencies: HashMap::new(),
            epoch: 1,
            value: Some(value),
        }
    }

    /// True when a cached value exists and every dependency is still at
    /// the epoch it was read at.
    pub fn is_fresh(&self, get_epoch: impl Fn(AtomId) -> Option<EpochNumber>) -> bool {
        self.value.is_some()
            && self
                .dependencies
                .iter()
                .all(|(id, epoch)| get_epoch(*id) == Some(*epoch))
    }

    pub fn invalidate(&mut self) {
        self.value = None;
    }

    pub fn set_value(&mut self, value: T) {
        self.value = Some(value);
        self.epoch += 1;
    }

    pub fn add_dependency(&mut self, atom_id: AtomId, epoch: EpochNumber) {
        self.dependencies.insert(atom_id, epoch);
    }

    pub fn clear_dependencies(&mut self) {
        self.dependencies.clear();
    }
}

impl<T> Default for AtomState<T> {
    fn default() -> Self {
        Self::new()
    }
}

static LISTENER_ID_COUNTER: AtomicU64 = AtomicU64::new(0);

pub fn next_listener_id() -> u64 {
    LISTENER_ID_COUNTER.fetch_add(1, Ordering::Relaxed)
}

/// Subscription bookkeeping for one atom. Only atoms with at least one
/// listener (directly, or transitively through a subscribed dependent)
/// have an entry.
pub struct Mounted {
    listeners: Vec<(u64, Listener)>,
    pub dependencies: HashSet<AtomId>,
    pub dependents: HashSet<AtomId>,
}

impl Mounted {
    pub fn new() -> Self {
        Self {
            listeners: Vec::new(),
            dependencies: HashSet::new(),
            dependents: HashSet::new(),
        }
    }

    pub fn add_listener(&mut self, listener: Listener) -> u64 {
        let id = next_listener_id();
        self.listeners.push((id, listener));
        id
    }

    /// Removes the listener with `id`. Returns `true` if no listeners
    /// remain, signalling the caller should unmount this atom.
    pub fn remove_listener(&mut self, id: u64) -> bool {
        self.listeners.retain(|(lid, _)| *lid != id);
        self.listeners.is_empty()
    }

    pub fn has_listeners(&self) -> bool {
        !self.listeners.is_empty()
    }

    pub fn add_dependency(&mut self, atom_id: AtomId) {
        self.dependencies.insert(atom_id);
    }

    pub fn add_dependent(&mut self, atom_id: AtomId) {
        self.dependents.insert(atom_id);
    }

    pub fn remove_dependent(&mut self, atom_id: &AtomId) {
        self.dependents.remove(atom_id);
    }

    /// Runs every listener, catching panics so one misbehaving listener
    /// can't stop the rest (or the writer that triggered this) from
    /// running.
    pub fn notify_listeners(&self) {
        for (id, listener) in &self.listeners {
            let listener = listener.clone();
            if std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| listener())).is_err() {
                tracing::error!(listener_id = id, "atom listener panicked");
            }
        }
    }
}

impl Default for Mounted {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Mounted {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Mounted")
            .field("listeners_count", &self.listeners.len())
            .field("dependencies", &self.dependencies)
            .field("dependents", &self.dependents)
            .finish()
    }
}

/// Orders a set of atoms so that every atom appears after all of its
/// dependencies, via Kahn's algorithm. Used to recompute invalidated
/// computed atoms in the right order after a write.
pub struct TopologicalSorter {
    pub atoms: Vec<AtomId>,
    /// For each atom, the set of atoms that directly depend on it.
    pub dependents: HashMap<AtomId, HashSet<AtomId>>,
}

impl TopologicalSorter {
    pub fn sort(&self) -> Result<Vec<AtomId>> {
        let mut in_degree: HashMap<AtomId, usize> =
            self.atoms.iter().map(|a| (*a, 0)).collect();
        for atom in &self.atoms {
            if let Some(dependents) = self.dependents.get(atom) {
                for d in dependents {
                    if let Some(c) = in_degree.get_mut(d) {
                        *c += 1;
                    }
                }
            }
        }

        let mut queue: VecDeque<AtomId> = in_degree
            .iter()
            .filter(|(_, c)| **c == 0)
            .map(|(a, _)| *a)
            .collect();
        let mut order = Vec::with_capacity(self.atoms.len());

        while let Some(atom) = queue.pop_front() {
            order.push(atom);
            if let Some(dependents) = self.dependents.get(&atom) {
                for d in dependents {
                    if let Some(c) = in_degree.get_mut(d) {
                        *c -= 1;
                        if *c == 0 {
                            queue.push_back(*d);
                        }
                    }
                }
            }
        }

        if order.len() != self.atoms.len() {
            return Err(NexusError::Policy(
                "cycle detected among computed atoms".into(),
            ));
        }
        Ok(order)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn atom_state_starts_empty() {
        let state: AtomState<i32> = AtomState::new();
        assert_eq!(state.epoch, 0);
        assert!(state.value.is_none());
    }

    #[test]
    fn set_value_bumps_epoch() {
        let mut state = AtomState::with_value(1);
        state.set_value(2);
        assert_eq!(state.epoch, 2);
        assert_eq!(state.value, Some(2));
    }

    #[test]
    fn is_fresh_checks_dependency_epochs() {
        let mut state = AtomState::with_value(10);
        state.add_dependency(1, 3);
        let epochs: HashMap<AtomId, EpochNumber> = [(1, 3)].into_iter().collect();
        assert!(state.is_fresh(|id| epochs.get(&id).copied()));

        let stale_epochs: HashMap<AtomId, EpochNumber> = [(1, 4)].into_iter().collect();
        assert!(!state.is_fresh(|id| stale_epochs.get(&id).copied()));
    }

    #[test]
    fn mounted_listener_lifecycle() {
        let mut mounted = Mounted::new();
        let id = mounted.add_listener(std::sync::Arc::new(|| {}));
        assert!(mounted.has_listeners());
        let now_empty = mounted.remove_listener(id);
        assert!(now_empty);
        assert!(!mounted.has_listeners());
    }

    #[test]
    fn topological_sort_orders_dependencies_first() {
        // 1 -> 2 -> 3 (2 depends on 1, 3 depends on 2)
        let mut dependents = HashMap::new();
        dependents.insert(1, HashSet::from([2]));
        dependents.insert(2, HashSet::from([3]));
        let sorter = TopologicalSorter {
            atoms: vec![1, 2, 3],
            dependents,
        };
        let order = sorter.sort().unwrap();
        let pos = |id: AtomId| order.iter().position(|a| *a == id).unwrap();
        assert!(pos(1) < pos(2));
        assert!(pos(2) < pos(3));
    }

    #[test]
    fn topological_sort_detects_cycles() {
        let mut dependents = HashMap::new();
        dependents.insert(1, HashSet::from([2]));
        dependents.insert(2, HashSet::from([1]));
        let sorter = TopologicalSorter {
            atoms: vec![1, 2],
            dependents,
        };
        assert!(sorter.sort().is_err());
    }
}
