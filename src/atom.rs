//! Atom primitives and factory functions.
//!
//! An atom is an immutable descriptor for a piece of state: either a
//! directly-held value (`Primitive`), or a pure function of other atoms
//! (`Computed`), or a derived value with custom write logic
//! (`Writable`). Atoms never hold their own value — the store does —
//! so they're cheap to clone and pass around.

use std::marker::PhantomData;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::error::{NexusError, Result};
use crate::serializer::Serializer;
use crate::store::Store;
use crate::types::{AtomId, AtomVariant, SetStateAction};
use crate::value::{AtomData, Value};

static ATOM_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

fn next_atom_id() -> AtomId {
    ATOM_ID_COUNTER.fetch_add(1, Ordering::Relaxed)
}

/// A read-access handle passed into computed-atom read functions and
/// writable-atom write functions. Plain struct with generic methods —
/// not a trait object — since `get`/`set` need to be generic over `T`
/// and trait objects can't carry generic methods.
pub struct Scope<'a> {
    store: &'a Store,
}

impl<'a> Scope<'a> {
    pub(crate) fn new(store: &'a Store) -> Self {
        Self { store }
    }

    pub fn get<T: AtomData>(&self, atom: &Atom<T>) -> Result<T> {
        self.store.get(atom)
    }

    pub fn set<T: AtomData>(
        &self,
        atom: &WritableAtom<T>,
        action: impl Into<SetStateAction<T>>,
    ) -> Result<()> {
        self.store.set(atom, action)
    }
}

type ReadFn<T> = Arc<dyn Fn(&Scope) -> Result<T> + Send + Sync>;
type WriteFn<T> = Arc<dyn Fn(&Scope, T) -> Result<()> + Send + Sync>;

/// How an atom's value is produced.
#[derive(Clone)]
pub enum Compute<T> {
    /// Holds a value directly; the store may overwrite it freely.
    Value(T),
    /// Computed from other atoms via a pure read function.
    Derived(ReadFn<T>),
}

/// Core atom type: a value or a computation, with an id and an
/// optional debug name.
#[derive(Clone)]
pub struct Atom<T: AtomData> {
    pub(crate) id: AtomId,
    pub(crate) name: Option<String>,
    pub(crate) variant: AtomVariant,
    pub(crate) compute: Compute<T>,
    _phantom: PhantomData<T>,
}

impl<T: AtomData> Atom<T> {
    pub fn id(&self) -> AtomId {
        self.id
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn variant(&self) -> AtomVariant {
        self.variant
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.name = Some(label.into());
        self
    }

    pub(crate) fn evaluate(&self, scope: &Scope) -> Result<T> {
        match &self.compute {
            Compute::Value(v) => Ok(v.clone()),
            Compute::Derived(read) => read(scope),
        }
    }
}

impl<T: AtomData> std::fmt::Debug for Atom<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Atom")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("variant", &self.variant)
            .finish()
    }
}

impl<T: AtomData> std::fmt::Display for Atom<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.name {
            Some(name) => write!(f, "atom{}:{}", self.id, name),
            None => write!(f, "atom{}", self.id),
        }
    }
}

/// A writable atom: a base [`Atom`] plus, optionally, custom write
/// logic. `write: None` means "primitive" — the store sets the value
/// directly. `write: Some(_)` means a derived atom whose writes run
/// arbitrary logic against other atoms (spec's "writable" variant).
#[derive(Clone)]
pub struct WritableAtom<T: AtomData> {
    pub(crate) atom: Atom<T>,
    pub(crate) write: Option<WriteFn<T>>,
}

pub type PrimitiveAtom<T> = WritableAtom<T>;

impl<T: AtomData> WritableAtom<T> {
    pub fn as_atom(&self) -> &Atom<T> {
        &self.atom
    }

    pub fn id(&self) -> AtomId {
        self.atom.id
    }

    pub fn name(&self) -> Option<&str> {
        self.atom.name.as_deref()
    }

    pub fn is_primitive(&self) -> bool {
        self.write.is_none()
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.atom.name = Some(label.into());
        self
    }

    pub(crate) fn run_write(&self, scope: &Scope, value: T) -> Result<()> {
        match &self.write {
            Some(write) => write(scope, value),
            None => Err(NexusError::Policy(format!(
                "atom {} has no custom write function",
                self.atom.id
            ))),
        }
    }
}

impl<T: AtomData> std::fmt::Debug for WritableAtom<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WritableAtom")
            .field("id", &self.atom.id)
            .field("name", &self.atom.name)
            .field("variant", &self.atom.variant)
            .finish()
    }
}

/// Create a primitive atom holding `initial_value`.
pub fn atom<T: AtomData>(initial_value: T) -> PrimitiveAtom<T> {
    PrimitiveAtom {
        atom: Atom {
            id: next_atom_id(),
            name: None,
            variant: AtomVariant::Primitive,
            compute: Compute::Value(initial_value),
            _phantom: PhantomData,
        },
        write: None,
    }
}

/// Create a read-only atom computed from other atoms.
pub fn atom_computed<T, F>(read: F) -> Atom<T>
where
    T: AtomData,
    F: Fn(&Scope) -> Result<T> + Send + Sync + 'static,
{
    Atom {
        id: next_atom_id(),
        name: None,
        variant: AtomVariant::Computed,
        compute: Compute::Derived(Arc::new(read)),
        _phantom: PhantomData,
    }
}

/// Create a derived atom with both custom read and write logic.
pub fn atom_writable<T, R, W>(read: R, write: W) -> WritableAtom<T>
where
    T: AtomData,
    R: Fn(&Scope) -> Result<T> + Send + Sync + 'static,
    W: Fn(&Scope, T) -> Result<()> + Send + Sync + 'static,
{
    WritableAtom {
        atom: Atom {
            id: next_atom_id(),
            name: None,
            variant: AtomVariant::Writable,
            compute: Compute::Derived(Arc::new(read)),
            _phantom: PhantomData,
        },
        write: Some(Arc::new(write)),
    }
}

/// Type-erased access to an atom, used by the registry and the
/// time-travel subsystem to operate over heterogeneous atom types.
pub trait ErasedAtom: Send + Sync {
    fn id(&self) -> AtomId;
    fn name(&self) -> Option<&str>;
    fn variant(&self) -> AtomVariant;
    fn read_value(&self, store: &Store, serializer: &Serializer) -> Result<Value>;
    fn write_value(&self, store: &Store, serializer: &Serializer, value: Value) -> Result<()>;
}

impl<T: AtomData> ErasedAtom for Atom<T> {
    fn id(&self) -> AtomId {
        self.id
    }

    fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    fn variant(&self) -> AtomVariant {
        self.variant
    }

    fn read_value(&self, store: &Store, serializer: &Serializer) -> Result<Value> {
        let value = store.get(self)?;
        serializer.to_value(&value)
    }

    fn write_value(&self, _store: &Store, _serializer: &Serializer, _value: Value) -> Result<()> {
        Err(NexusError::Policy(format!(
            "atom {} is read-only and cannot be restored directly",
            self.id
        )))
    }
}

impl<T: AtomData> ErasedAtom for WritableAtom<T> {
    fn id(&self) -> AtomId {
        self.atom.id
    }

    fn name(&self) -> Option<&str> {
        self.atom.name.as_deref()
    }

    fn variant(&self) -> AtomVariant {
        self.atom.variant
    }

    fn read_value(&self, store: &Store, serializer: &Serializer) -> Result<Value> {
        let value = store.get(&self.atom)?;
        serializer.to_value(&value)
    }

    fn write_value(&self, store: &Store, serializer: &Serializer, value: Value) -> Result<()> {
        let typed: T = serializer.from_value(&value)?;
        store.set(self, typed)
    }
}
