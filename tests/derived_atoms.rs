//! Integration tests for computed atoms: dependency tracking, automatic
//! recomputation, and epoch-based selective invalidation.

use nexus_state::{atom, atom_computed, Store};

#[test]
fn computed_atom_reads_its_dependency() {
    let store = Store::new();
    let count = atom(3);
    let count_ref = count.clone();
    let doubled = atom_computed(move |scope| Ok(scope.get(count_ref.as_atom())? * 2));
    assert_eq!(store.get(&doubled).unwrap(), 6);
}

#[test]
fn computed_atom_updates_when_its_dependency_changes() {
    let store = Store::new();
    let count = atom(3);
    let count_ref = count.clone();
    let doubled = atom_computed(move |scope| Ok(scope.get(count_ref.as_atom())? * 2));

    assert_eq!(store.get(&doubled).unwrap(), 6);
    store.set(&count, 5).unwrap();
    assert_eq!(store.get(&doubled).unwrap(), 10);
    store.set(&count, 0).unwrap();
    assert_eq!(store.get(&doubled).unwrap(), 0);
}

#[test]
fn computed_atoms_can_chain() {
    let store = Store::new();
    let count = atom(1);
    let count_ref = count.clone();
    let doubled = atom_computed(move |scope| Ok(scope.get(count_ref.as_atom())? * 2));
    let quadrupled = atom_computed(move |scope| Ok(scope.get(&doubled)? * 2));

    assert_eq!(store.get(&quadrupled).unwrap(), 4);
    store.set(&count, 2).unwrap();
    assert_eq!(store.get(&quadrupled).unwrap(), 8);
}

#[test]
fn diamond_dependency_recomputes_correctly() {
    // count
    //  /  \
    // +1  +2
    //  \  /
    //  sum
    let store = Store::new();
    let count = atom(10);
    let count_a = count.clone();
    let count_b = count.clone();
    let plus_one = atom_computed(move |scope| Ok(scope.get(count_a.as_atom())? + 1));
    let plus_two = atom_computed(move |scope| Ok(scope.get(count_b.as_atom())? + 2));
    let plus_one_ref = plus_one.clone();
    let plus_two_ref = plus_two.clone();
    let sum = atom_computed(move |scope| Ok(scope.get(&plus_one_ref)? + scope.get(&plus_two_ref)?));

    assert_eq!(store.get(&sum).unwrap(), 23);
    store.set(&count, 5).unwrap();
    assert_eq!(store.get(&sum).unwrap(), 13);
}

#[test]
fn invalidation_propagates_through_a_chain() {
    let store = Store::new();
    let base = atom(1);
    let base_ref = base.clone();
    let derived1 = atom_computed(move |scope| Ok(scope.get(base_ref.as_atom())? + 1));
    let derived1_ref = derived1.clone();
    let derived2 = atom_computed(move |scope| Ok(scope.get(&derived1_ref)? + 1));
    let derived2_ref = derived2.clone();
    let derived3 = atom_computed(move |scope| Ok(scope.get(&derived2_ref)? + 1));

    assert_eq!(store.get(&derived3).unwrap(), 4);
    store.set(&base, 10).unwrap();
    assert_eq!(store.get(&derived1).unwrap(), 11);
    assert_eq!(store.get(&derived2).unwrap(), 12);
    assert_eq!(store.get(&derived3).unwrap(), 13);
}

#[test]
fn unaffected_computed_atoms_keep_their_cached_value() {
    let store = Store::new();
    let a = atom(1);
    let b = atom(2);
    let a_ref = a.clone();
    let b_ref = b.clone();
    let a_plus_10 = atom_computed(move |scope| Ok(scope.get(a_ref.as_atom())? + 10));
    let b_plus_10 = atom_computed(move |scope| Ok(scope.get(b_ref.as_atom())? + 10));

    assert_eq!(store.get(&a_plus_10).unwrap(), 11);
    assert_eq!(store.get(&b_plus_10).unwrap(), 12);

    store.set(&a, 5).unwrap();
    assert_eq!(store.get(&a_plus_10).unwrap(), 15);
    assert_eq!(store.get(&b_plus_10).unwrap(), 12);
}

#[test]
fn conditional_dependencies_are_re_evaluated_on_each_read() {
    let store = Store::new();
    let use_a = atom(true);
    let a = atom(10);
    let b = atom(20);
    let use_a_ref = use_a.clone();
    let a_ref = a.clone();
    let b_ref = b.clone();
    let conditional = atom_computed(move |scope| {
        if scope.get(use_a_ref.as_atom())? {
            scope.get(a_ref.as_atom())
        } else {
            scope.get(b_ref.as_atom())
        }
    });

    assert_eq!(store.get(&conditional).unwrap(), 10);

    store.set(&use_a, false).unwrap();
    assert_eq!(store.get(&conditional).unwrap(), 20);

    // `a` is no longer a live dependency, so changing it must not matter.
    store.set(&a, 999).unwrap();
    assert_eq!(store.get(&conditional).unwrap(), 20);
}
