//! The reactive store: owns every atom's cached value, tracks
//! dependencies between computed atoms, and drives subscriptions.
//!
//! Atoms are immutable descriptors (see `atom.rs`) — all mutable state
//! lives here, type-erased behind `Box<dyn Any + Send + Sync>` so a
//! single store can hold atoms of arbitrary, unrelated `T`s. Dependency
//! tracking uses epoch numbers rather than value-equality diffs: each
//! atom's cached state records the epoch of every atom it read during
//! its last computation, and a cache is valid exactly when every one of
//! those epochs still matches the dependency's current epoch.

use std::any::Any;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::Utc;
use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};

use crate::atom::{Atom, ErasedAtom, Scope, WritableAtom};
use crate::config::StoreConfig;
use crate::equality::{equal, EqualityMode};
use crate::error::{NexusError, Result};
use crate::events::StoreChangeEvent;
use crate::internals::{next_listener_id, AtomState, Mounted, TopologicalSorter};
use crate::serializer::Serializer;
use crate::types::{AtomId, EpochNumber, Listener, SetStateAction, Unsubscribe};
use crate::value::{AtomData, Value};

type ErasedState = Arc<RwLock<Box<dyn Any + Send + Sync>>>;
type DependencyAccumulator = Arc<Mutex<HashMap<AtomId, EpochNumber>>>;

pub struct Store {
    atom_states: DashMap<AtomId, ErasedState>,
    epochs: DashMap<AtomId, EpochNumber>,
    /// For each atom, the set of atoms that directly depend on it.
    dependents_of: DashMap<AtomId, HashSet<AtomId>>,
    erased_atoms: DashMap<AtomId, Arc<dyn ErasedAtom>>,
    atom_listeners: Arc<DashMap<AtomId, Mounted>>,
    global_listeners: Arc<Mutex<Vec<(u64, Arc<dyn Fn(&StoreChangeEvent) + Send + Sync>)>>>,
    reading_stack: Mutex<Vec<(AtomId, DependencyAccumulator)>>,
    pending_changed: Mutex<HashSet<AtomId>>,
    batch_depth: Mutex<u32>,
    destroyed: AtomicBool,
    serializer: Serializer,
    equality: EqualityMode,
}

impl Store {
    pub fn new() -> Self {
        Self::with_config(StoreConfig::default())
    }

    pub fn with_config(config: StoreConfig) -> Self {
        Self {
            atom_states: DashMap::new(),
            epochs: DashMap::new(),
            dependents_of: DashMap::new(),
            erased_atoms: DashMap::new(),
            atom_listeners: Arc::new(DashMap::new()),
            global_listeners: Arc::new(Mutex::new(Vec::new())),
            reading_stack: Mutex::new(Vec::new()),
            pending_changed: Mutex::new(HashSet::new()),
            batch_depth: Mutex::new(0),
            destroyed: AtomicBool::new(false),
            serializer: Serializer::new(config.serializer),
            equality: config.equality,
        }
    }

    pub fn serializer(&self) -> &Serializer {
        &self.serializer
    }

    fn ensure_not_destroyed(&self) -> Result<()> {
        if self.destroyed.load(Ordering::SeqCst) {
            Err(NexusError::StoreDestroyed)
        } else {
            Ok(())
        }
    }

    pub fn is_destroyed(&self) -> bool {
        self.destroyed.load(Ordering::SeqCst)
    }

    // -- reads ---------------------------------------------------------

    pub fn get<T: AtomData>(&self, atom: &Atom<T>) -> Result<T> {
        self.ensure_not_destroyed()?;
        self.erased_atoms
            .entry(atom.id())
            .or_insert_with(|| Arc::new(atom.clone()));

        let value = match self.try_cached(atom) {
            Some(v) => v,
            None => self.compute_and_cache(atom)?,
        };
        self.record_as_dependency(atom.id());
        Ok(value)
    }

    fn try_cached<T: AtomData>(&self, atom: &Atom<T>) -> Option<T> {
        let state_arc = self.atom_states.get(&atom.id())?;
        let lock = state_arc.read();
        let state = lock.downcast_ref::<AtomState<T>>()?;
        if state.is_fresh(|id| self.epochs.get(&id).map(|e| *e)) {
            state.value.clone()
        } else {
            None
        }
    }

    fn compute_and_cache<T: AtomData>(&self, atom: &Atom<T>) -> Result<T> {
        let accum: DependencyAccumulator = Arc::new(Mutex::new(HashMap::new()));
        self.reading_stack.lock().push((atom.id(), accum.clone()));
        let scope = Scope::new(self);
        let result = atom.evaluate(&scope);
        self.reading_stack.lock().pop();
        let value = result?;

        let new_deps = Arc::try_unwrap(accum)
            .map(|m| m.into_inner())
            .unwrap_or_default();
        let new_dep_ids: HashSet<AtomId> = new_deps.keys().copied().collect();

        let entry = self
            .atom_states
            .entry(atom.id())
            .or_insert_with(|| Arc::new(RwLock::new(Box::new(AtomState::<T>::new()) as Box<dyn Any + Send + Sync>)));
        let mut lock = entry.write();
        let (old_dep_ids, new_epoch) = match lock.downcast_mut::<AtomState<T>>() {
            Some(state) => {
                let old: HashSet<AtomId> = state.dependencies.keys().copied().collect();
                state.clear_dependencies();
                for (id, epoch) in &new_deps {
                    state.add_dependency(*id, *epoch);
                }
                state.set_value(value.clone());
                (old, state.epoch)
            }
            None => {
                let mut fresh = AtomState::with_value(value.clone());
                for (id, epoch) in &new_deps {
                    fresh.add_dependency(*id, *epoch);
                }
                let epoch = fresh.epoch;
                *lock = Box::new(fresh);
                (HashSet::new(), epoch)
            }
        };
        drop(lock);

        self.apply_dependency_edges(atom.id(), &old_dep_ids, &new_dep_ids);
        self.epochs.insert(atom.id(), new_epoch);
        Ok(value)
    }

    fn record_as_dependency(&self, id: AtomId) {
        if let Some((_, accum)) = self.reading_stack.lock().last() {
            let epoch = self.epochs.get(&id).map(|e| *e).unwrap_or(0);
            accum.lock().insert(id, epoch);
        }
    }

    fn apply_dependency_edges(
        &self,
        atom_id: AtomId,
        old_deps: &HashSet<AtomId>,
        new_deps: &HashSet<AtomId>,
    ) {
        for removed in old_deps.difference(new_deps) {
            if let Some(mut set) = self.dependents_of.get_mut(removed) {
                set.remove(&atom_id);
            }
        }
        for added in new_deps.difference(old_deps) {
            self.dependents_of
                .entry(*added)
                .or_insert_with(HashSet::new)
                .insert(atom_id);
        }
    }

    // -- writes ----------------------------------------------------------

    pub fn set<T: AtomData>(
        &self,
        atom: &WritableAtom<T>,
        action: impl Into<SetStateAction<T>>,
    ) -> Result<()> {
        self.ensure_not_destroyed()?;
        self.erased_atoms
            .entry(atom.id())
            .or_insert_with(|| Arc::new(atom.clone()));

        let prev = self.get(atom.as_atom())?;
        let next = action.into().resolve(prev);

        if atom.is_primitive() {
            tracing::debug!(atom_id = atom.id(), name = ?atom.name(), "writing primitive atom");
            self.begin_batch();
            if self.write_primitive(atom.id(), next) {
                self.propagate_changes(atom.id());
            }
            self.end_batch();
            Ok(())
        } else {
            let scope = Scope::new(self);
            self.begin_batch();
            let result = atom.run_write(&scope, next);
            self.end_batch();
            result
        }
    }

    /// Writes `value` into atom `id`'s cached state, bumping its epoch
    /// and flagging it changed only if `value` differs from whatever was
    /// cached under the store's configured equality check. Returns
    /// whether the write actually changed anything.
    fn write_primitive<T: AtomData>(&self, id: AtomId, value: T) -> bool {
        let entry = self
            .atom_states
            .entry(id)
            .or_insert_with(|| Arc::new(RwLock::new(Box::new(AtomState::<T>::new()) as Box<dyn Any + Send + Sync>)));
        let mut lock = entry.write();
        let (changed, new_epoch) = match lock.downcast_mut::<AtomState<T>>() {
            Some(state) => {
                if state.value.as_ref().is_some_and(|old| self.unchanged(old, &value)) {
                    (false, state.epoch)
                } else {
                    state.set_value(value);
                    (true, state.epoch)
                }
            }
            None => {
                *lock = Box::new(AtomState::with_value(value));
                (true, 1)
            }
        };
        drop(lock);
        if changed {
            self.epochs.insert(id, new_epoch);
            self.pending_changed.lock().insert(id);
        }
        changed
    }

    /// Compares `a` and `b` under the store's configured equality mode,
    /// via the same `Value` representation the serializer produces.
    /// Serialization failure is treated as "changed" rather than
    /// silently skipping the write.
    fn unchanged<T: AtomData>(&self, a: &T, b: &T) -> bool {
        match (self.serializer.to_value(a), self.serializer.to_value(b)) {
            (Ok(av), Ok(bv)) => equal(self.equality, &av, &bv),
            _ => false,
        }
    }

    fn propagate_changes(&self, root: AtomId) {
        let affected = self.collect_transitive_dependents(root);
        if affected.is_empty() {
            return;
        }
        let dependents: HashMap<AtomId, HashSet<AtomId>> = affected
            .iter()
            .filter_map(|id| self.dependents_of.get(id).map(|d| (*id, d.clone())))
            .collect();
        let sorter = TopologicalSorter {
            atoms: affected.iter().copied().collect(),
            dependents,
        };
        let order = sorter.sort().unwrap_or_else(|_| affected.iter().copied().collect());

        for id in order {
            let before = self.epochs.get(&id).map(|e| *e);
            if let Some(handle) = self.erased_atoms.get(&id) {
                let _ = handle.read_value(self, &self.serializer);
            }
            let after = self.epochs.get(&id).map(|e| *e);
            if before != after {
                self.pending_changed.lock().insert(id);
            }
        }
    }

    fn collect_transitive_dependents(&self, root: AtomId) -> HashSet<AtomId> {
        let mut result = HashSet::new();
        let mut queue = VecDeque::new();
        queue.push_back(root);
        while let Some(current) = queue.pop_front() {
            if let Some(deps) = self.dependents_of.get(&current) {
                for d in deps.iter() {
                    if result.insert(*d) {
                        queue.push_back(*d);
                    }
                }
            }
        }
        result
    }

    // -- type-erased access (registry, snapshots, restoration) ----------

    pub fn erased(&self, id: AtomId) -> Option<Arc<dyn ErasedAtom>> {
        self.erased_atoms.get(&id).map(|e| e.clone())
    }

    pub fn all_erased(&self) -> Vec<Arc<dyn ErasedAtom>> {
        self.erased_atoms.iter().map(|e| e.value().clone()).collect()
    }

    pub fn register_erased(&self, handle: Arc<dyn ErasedAtom>) {
        self.erased_atoms.insert(handle.id(), handle);
    }

    pub fn get_value(&self, id: AtomId) -> Result<Value> {
        let handle = self
            .erased_atoms
            .get(&id)
            .ok_or_else(|| NexusError::AtomNotFound(id.to_string()))?
            .clone();
        handle.read_value(self, &self.serializer)
    }

    pub fn set_value(&self, id: AtomId, value: Value) -> Result<()> {
        let handle = self
            .erased_atoms
            .get(&id)
            .ok_or_else(|| NexusError::AtomNotFound(id.to_string()))?
            .clone();
        handle.write_value(self, &self.serializer, value)
    }

    // -- subscriptions ----------------------------------------------------

    pub fn subscribe_atom<T: AtomData>(
        &self,
        atom: &Atom<T>,
        listener: impl Fn() + Send + Sync + 'static,
    ) -> Unsubscribe {
        let id = atom.id();
        let listener: Listener = Arc::new(listener);
        let listener_id = {
            let mut entry = self.atom_listeners.entry(id).or_insert_with(Mounted::new);
            entry.add_listener(listener)
        };
        let listeners = self.atom_listeners.clone();
        Box::new(move || {
            let mut empty = false;
            if let Some(mut entry) = listeners.get_mut(&id) {
                empty = entry.remove_listener(listener_id);
            }
            if empty {
                listeners.remove(&id);
            }
        })
    }

    pub fn subscribe(&self, listener: impl Fn(&StoreChangeEvent) + Send + Sync + 'static) -> Unsubscribe {
        let listener_id = next_listener_id();
        let listener: Arc<dyn Fn(&StoreChangeEvent) + Send + Sync> = Arc::new(listener);
        self.global_listeners.lock().push((listener_id, listener));
        let listeners = self.global_listeners.clone();
        Box::new(move || {
            listeners.lock().retain(|(id, _)| *id != listener_id);
        })
    }

    // -- batching ----------------------------------------------------------

    /// Runs `f` with notifications suspended, flushing them once the
    /// outermost batch completes. If `f` panics, the batch is aborted
    /// instead of completed: `batch_depth` still unwinds correctly and
    /// any pending notifications for this batch are dropped rather than
    /// flushed, so a subsequent `batch` call starts clean.
    pub fn batch<R>(&self, f: impl FnOnce() -> R) -> R {
        self.begin_batch();
        match std::panic::catch_unwind(std::panic::AssertUnwindSafe(f)) {
            Ok(result) => {
                self.end_batch();
                result
            }
            Err(panic) => {
                self.abort_batch();
                std::panic::resume_unwind(panic);
            }
        }
    }

    fn begin_batch(&self) {
        *self.batch_depth.lock() += 1;
    }

    fn end_batch(&self) {
        let should_flush = {
            let mut depth = self.batch_depth.lock();
            *depth -= 1;
            *depth == 0
        };
        if should_flush {
            self.flush();
        }
    }

    /// Unwinds one batch level without flushing. Once the outermost
    /// level is reached, pending notifications accumulated during the
    /// aborted batch are dropped instead of firing.
    fn abort_batch(&self) {
        let depth = {
            let mut depth = self.batch_depth.lock();
            *depth = depth.saturating_sub(1);
            *depth
        };
        if depth == 0 {
            self.pending_changed.lock().clear();
        }
    }

    fn flush(&self) {
        let changed: HashSet<AtomId> = std::mem::take(&mut *self.pending_changed.lock());
        if changed.is_empty() {
            return;
        }
        for id in &changed {
            if let Some(mounted) = self.atom_listeners.get(id) {
                mounted.notify_listeners();
            }
        }

        let has_global = !self.global_listeners.lock().is_empty();
        if has_global {
            let mut new_state = HashMap::new();
            for id in &changed {
                if let Ok(v) = self.get_value(*id) {
                    new_state.insert(*id, v);
                }
            }
            let event = StoreChangeEvent {
                new_state,
                timestamp: Utc::now(),
            };
            for (id, listener) in self.global_listeners.lock().iter() {
                let listener = listener.clone();
                let event_ref = &event;
                if std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| listener(event_ref))).is_err() {
                    tracing::error!(listener_id = id, "store listener panicked");
                }
            }
        }
    }

    // -- lifecycle ----------------------------------------------------------

    /// Forces every previously-accessed atom to recompute from scratch.
    /// Primitive atoms revert to their construction-time initial value
    /// (atom descriptors are immutable, so that value was never lost);
    /// computed atoms are recomputed against the reset graph. Existing
    /// listeners are notified of the resulting change.
    pub fn reset(&self) -> Result<()> {
        self.ensure_not_destroyed()?;
        tracing::debug!("resetting store");
        self.begin_batch();
        let ids: Vec<AtomId> = self.atom_states.iter().map(|e| *e.key()).collect();
        self.atom_states.clear();
        self.epochs.clear();
        self.dependents_of.clear();
        for id in &ids {
            if let Some(handle) = self.erased_atoms.get(id) {
                let _ = handle.read_value(self, &self.serializer);
            }
            self.pending_changed.lock().insert(*id);
        }
        self.end_batch();
        Ok(())
    }

    /// Tears the store down. Every subsequent operation (including
    /// another `destroy()`) returns [`NexusError::StoreDestroyed`].
    pub fn destroy(&self) {
        tracing::info!("destroying store");
        self.destroyed.store(true, Ordering::SeqCst);
        self.atom_states.clear();
        self.epochs.clear();
        self.dependents_of.clear();
        self.erased_atoms.clear();
        self.atom_listeners.clear();
        self.global_listeners.lock().clear();
        self.pending_changed.lock().clear();
    }
}

impl Default for Store {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store")
            .field("atom_count", &self.atom_states.len())
            .field("destroyed", &self.is_destroyed())
            .finish()
    }
}
