//! Process-scoped directory mapping atom identity to descriptor.
//!
//! Atoms are created independently of any store (see `atom.rs`); the
//! registry is the place a caller can hand an atom a discoverable name,
//! then look it up by id or name later without having to keep the
//! original `Atom`/`WritableAtom` handle around — useful for restoration
//! paths driven by a snapshot's stored names rather than live handles.

use std::sync::Arc;

use dashmap::DashMap;

use crate::atom::ErasedAtom;
use crate::store::Store;
use crate::types::AtomId;

#[derive(Default)]
pub struct Registry {
    descriptors: DashMap<AtomId, Arc<dyn ErasedAtom>>,
    by_name: DashMap<String, AtomId>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an atom descriptor. If another atom was already
    /// registered under the same name, this registration wins and the
    /// collision is logged — the registry never errors on this.
    pub fn register(&self, handle: Arc<dyn ErasedAtom>) {
        let id = handle.id();
        if let Some(name) = handle.name() {
            if let Some(prev) = self.by_name.insert(name.to_string(), id) {
                if prev != id {
                    tracing::warn!(
                        name,
                        previous_atom_id = prev,
                        new_atom_id = id,
                        "atom name collision in registry; most recent registration wins"
                    );
                }
            }
        }
        self.descriptors.insert(id, handle);
    }

    pub fn get(&self, id: AtomId) -> Option<Arc<dyn ErasedAtom>> {
        self.descriptors.get(&id).map(|e| e.clone())
    }

    pub fn get_by_name(&self, name: &str) -> Option<Arc<dyn ErasedAtom>> {
        let id = *self.by_name.get(name)?;
        self.get(id)
    }

    pub fn get_all(&self) -> Vec<Arc<dyn ErasedAtom>> {
        self.descriptors.iter().map(|e| e.value().clone()).collect()
    }

    /// Removes an atom's descriptor and, if present, its name mapping.
    pub fn forget(&self, id: AtomId) {
        if let Some((_, handle)) = self.descriptors.remove(&id) {
            if let Some(name) = handle.name() {
                self.by_name.remove_if(name, |_, v| *v == id);
            }
        }
    }

    pub fn clear(&self) {
        self.descriptors.clear();
        self.by_name.clear();
    }

    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }

    /// Pushes every currently-registered descriptor into `store`'s own
    /// type-erased atom table, so `store.get_value`/`store.set_value`
    /// work for atoms the store has never directly seen via `get`/`set`.
    pub fn attach_store(&self, store: &Store) {
        for handle in self.get_all() {
            store.register_erased(handle);
        }
    }
}
