//! Integration tests for primitive atom creation and basic store reads/writes.

use nexus_state::types::SetStateAction;
use nexus_state::{atom, Store};

#[test]
fn atom_creation_assigns_a_positive_id() {
    let count = atom(0);
    assert!(count.id() > 0);
}

#[test]
fn atom_with_label_carries_a_debug_name() {
    let count = atom(0).with_label("counter");
    assert_eq!(count.name(), Some("counter"));
    assert!(count.as_atom().to_string().contains("counter"));
}

#[test]
fn atom_ids_are_unique_across_creations() {
    let a1 = atom(1);
    let a2 = atom(2);
    let a3 = atom(3);
    assert_ne!(a1.id(), a2.id());
    assert_ne!(a2.id(), a3.id());
    assert_ne!(a1.id(), a3.id());
}

#[test]
fn store_creation_does_not_panic() {
    let _store = Store::new();
}

#[test]
fn read_returns_initial_value_without_an_explicit_write() {
    let store = Store::new();
    let count = atom(42);
    assert_eq!(store.get(count.as_atom()).unwrap(), 42);
}

#[test]
fn repeated_reads_return_the_same_value() {
    let store = Store::new();
    let count = atom(42);
    assert_eq!(store.get(count.as_atom()).unwrap(), 42);
    assert_eq!(store.get(count.as_atom()).unwrap(), 42);
}

#[test]
fn independent_atoms_do_not_interfere() {
    let store = Store::new();
    let a = atom(1);
    let b = atom(2);
    let c = atom(3);
    assert_eq!(store.get(a.as_atom()).unwrap(), 1);
    assert_eq!(store.get(b.as_atom()).unwrap(), 2);
    assert_eq!(store.get(c.as_atom()).unwrap(), 3);
}

#[test]
fn write_then_read_sees_the_new_value() {
    let store = Store::new();
    let count = atom(0);
    store.set(&count, 5).unwrap();
    assert_eq!(store.get(count.as_atom()).unwrap(), 5);
}

#[test]
fn sequential_writes_each_take_effect() {
    let store = Store::new();
    let count = atom(0);
    store.set(&count, 1).unwrap();
    assert_eq!(store.get(count.as_atom()).unwrap(), 1);
    store.set(&count, 2).unwrap();
    assert_eq!(store.get(count.as_atom()).unwrap(), 2);
    store.set(&count, 100).unwrap();
    assert_eq!(store.get(count.as_atom()).unwrap(), 100);
}

#[test]
fn writes_to_one_atom_do_not_affect_another() {
    let store = Store::new();
    let a = atom(1);
    let b = atom(2);
    store.set(&a, 10).unwrap();
    store.set(&b, 20).unwrap();
    assert_eq!(store.get(a.as_atom()).unwrap(), 10);
    assert_eq!(store.get(b.as_atom()).unwrap(), 20);
}

#[test]
fn set_accepts_an_updater_function() {
    let store = Store::new();
    let count = atom(0);
    store.set(&count, SetStateAction::Updater(Box::new(|prev: i32| prev + 1))).unwrap();
    assert_eq!(store.get(count.as_atom()).unwrap(), 1);
    store.set(&count, SetStateAction::Updater(Box::new(|prev: i32| prev * 2))).unwrap();
    assert_eq!(store.get(count.as_atom()).unwrap(), 2);
}

#[test]
fn the_same_atom_holds_independent_values_per_store() {
    let count = atom(0);
    let id = count.id();

    let store1 = Store::new();
    let store2 = Store::new();
    store1.set(&count, 10).unwrap();
    store2.set(&count, 20).unwrap();

    assert_eq!(store1.get(count.as_atom()).unwrap(), 10);
    assert_eq!(store2.get(count.as_atom()).unwrap(), 20);
    assert_eq!(count.id(), id);
}
