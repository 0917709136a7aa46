//! # nexus-state
//!
//! A reactive state store built from fine-grained atoms — primitive,
//! computed, and writable — with automatic dependency tracking,
//! epoch-based cache invalidation, and batched subscriptions. Layered
//! on top is a time-travel subsystem: tracked atoms can be snapshotted,
//! diffed, and restored (plain or transactional, with rollback
//! checkpoints), and a delta-compressed history gives undo/redo/jump-to
//! without keeping a full snapshot per step.
//!
//! ## Core Concepts
//!
//! - **Atoms** ([`atom`]): immutable descriptors for a piece of state.
//! - **Store** ([`store`]): the runtime container that owns atom
//!   values, tracks dependencies, and drives subscriptions.
//! - **Tracker** ([`tracker`]) and **Registry** ([`registry`]): opt-in
//!   bookkeeping the time-travel subsystem layers on top of the store.
//! - **Snapshots** ([`snapshot`]): captured state, validated, diffed,
//!   and restored.
//! - **History** ([`history`]): undo/redo/jump-to over snapshots, plain
//!   or delta-compressed.
//! - **Controller** ([`controller`]): wires all of the above together.
//!
//! ## Example
//!
//! ```
//! use nexus_state::{atom, atom_computed, Store};
//!
//! let store = Store::new();
//! let count = atom(0);
//! assert_eq!(store.get(count.as_atom()).unwrap(), 0);
//!
//! store.set(&count, 5).unwrap();
//! let count_ref = count.clone();
//! let doubled = atom_computed(move |scope| Ok(scope.get(count_ref.as_atom())? * 2));
//! assert_eq!(store.get(&doubled).unwrap(), 10);
//!
//! let unsub = store.subscribe_atom(count.as_atom(), || {
//!     println!("count changed");
//! });
//! store.set(&count, 6).unwrap();
//! unsub();
//! ```

pub mod atom;
pub mod config;
pub mod controller;
pub mod equality;
pub mod error;
pub mod events;
pub mod history;
pub mod registry;
pub mod serializer;
pub mod snapshot;
pub mod store;
pub mod tracker;
pub mod types;
pub mod value;

mod internals;

pub use atom::{atom, atom_computed, atom_writable, Atom, ErasedAtom, PrimitiveAtom, Scope, WritableAtom};
pub use controller::Controller;
pub use error::{NexusError, Result};
pub use registry::Registry;
pub use store::Store;
pub use tracker::{TrackedAtom, Tracker};
pub use types::{AtomId, AtomVariant, EpochNumber, Listener, SetStateAction, Unsubscribe};
pub use value::{AtomData, Value};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_basic_import() {
        let _store = Store::new();
    }
}
