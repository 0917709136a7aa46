//! Core type aliases and small shared types.
//!
//! A trait-object `Getter`/`Setter` pair (each with a generic
//! `get<T>`/`set<T>` method) is not object-safe, so read/write closures
//! take a concrete [`crate::atom::Scope`] reference instead — see
//! `atom.rs`.

use std::sync::Arc;

/// Unique identifier for each atom, assigned once at construction and
/// never reused.
pub type AtomId = u64;

/// Version number for an atom's cached value, incremented on every
/// value-changing write or recomputation. Used for epoch-based cache
/// invalidation of computed atoms.
pub type EpochNumber = u64;

/// The three atom shapes a value in this store can take.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum AtomVariant {
    /// Holds a value directly; writable without custom logic.
    Primitive,
    /// Derived from other atoms via a read function, but also exposes a
    /// custom write function that can update other atoms.
    Writable,
    /// Derived from other atoms via a pure read function; read-only.
    Computed,
}

impl AtomVariant {
    pub fn as_str(&self) -> &'static str {
        match self {
            AtomVariant::Primitive => "primitive",
            AtomVariant::Writable => "writable",
            AtomVariant::Computed => "computed",
        }
    }
}

/// A value to set, or a function from the previous value to the next one.
pub enum SetStateAction<T> {
    Value(T),
    Updater(Box<dyn FnOnce(T) -> T + Send>),
}

impl<T> From<T> for SetStateAction<T> {
    fn from(value: T) -> Self {
        SetStateAction::Value(value)
    }
}

impl<T> SetStateAction<T> {
    pub fn resolve(self, prev: T) -> T {
        match self {
            SetStateAction::Value(v) => v,
            SetStateAction::Updater(f) => f(prev),
        }
    }
}

/// Listener callback registered per-atom or on the whole store. Callbacks
/// are parameterless — they re-read whatever state they need via the
/// store rather than receiving it as an argument.
pub type Listener = Arc<dyn Fn() + Send + Sync>;

/// Unsubscribe handle returned by `subscribe`/`subscribe_atom`. Calling it
/// more than once is a no-op.
pub type Unsubscribe = Box<dyn FnOnce() + Send>;
