//! Integration tests exercising the time-travel subsystem end to end:
//! tracking, snapshotting, diffing, transactional restore, and
//! delta-compressed undo/redo through the [`Controller`].

use chrono::Utc;

use nexus_state::atom;
use nexus_state::config::{ControllerConfig, RestorationConfig, SnapshotConfig, TrackerConfig};
use nexus_state::snapshot::comparator::{diff, DiffKind};
use nexus_state::snapshot::creator::SnapshotCreator;
use nexus_state::snapshot::restorer::Restorer;
use nexus_state::tracker::Tracker;
use nexus_state::Controller;
use nexus_state::Store;

#[test]
fn snapshot_capture_and_transactional_restore_round_trip() {
    let store = Store::new();
    let tracker = Tracker::new(TrackerConfig::default());
    let count = atom(1).with_label("count");
    store.get(count.as_atom()).unwrap();
    tracker.track(count.id(), Some("count".into()), Utc::now());

    let creator = SnapshotCreator::new(SnapshotConfig::default());
    let before = creator.create(&store, &tracker, None, None).unwrap();

    store.set(&count, 2).unwrap();
    let after = creator.create(&store, &tracker, None, None).unwrap();

    let d = diff(&before, &after, nexus_state::equality::EqualityMode::Deep);
    let entry = d.entries.iter().find(|e| e.atom_id == count.id()).unwrap();
    assert_eq!(entry.kind, DiffKind::Modified);

    let restorer = Restorer::new(RestorationConfig::default(), 10);
    restorer.restore_with_transaction(&store, &before).unwrap();
    assert_eq!(store.get(count.as_atom()).unwrap(), 1);
}

#[test]
fn controller_undo_redo_round_trips_through_a_tracked_atom() {
    let store = Store::new();
    let controller = Controller::new(ControllerConfig::default());
    controller.attach(&store);

    let count = atom(0).with_label("count");
    store.get(count.as_atom()).unwrap();
    controller.track(count.id(), Some("count".into()), Utc::now());
    controller.record_if_changed(&store).unwrap();

    store.set(&count, 1).unwrap();
    controller.record_if_changed(&store).unwrap();

    store.set(&count, 2).unwrap();
    controller.record_if_changed(&store).unwrap();

    assert_eq!(store.get(count.as_atom()).unwrap(), 2);
    controller.undo(&store).unwrap();
    assert_eq!(store.get(count.as_atom()).unwrap(), 1);
    controller.undo(&store).unwrap();
    assert_eq!(store.get(count.as_atom()).unwrap(), 0);
    controller.redo(&store).unwrap();
    assert_eq!(store.get(count.as_atom()).unwrap(), 1);
}

#[test]
fn rollback_undoes_a_transactional_restore_via_its_checkpoint() {
    let store = Store::new();
    let count = atom(5).with_label("count");
    store.get(count.as_atom()).unwrap();

    let restorer = Restorer::new(RestorationConfig::default(), 10);
    let tracker = Tracker::new(TrackerConfig::default());
    tracker.track(count.id(), Some("count".into()), Utc::now());
    let creator = SnapshotCreator::new(SnapshotConfig::default());
    let snapshot = creator.create(&store, &tracker, None, None).unwrap();

    store.set(&count, 42).unwrap();
    restorer.restore_with_transaction(&store, &snapshot).unwrap();
    assert_eq!(store.get(count.as_atom()).unwrap(), 5);

    let checkpoint = restorer.last_checkpoint().unwrap();
    restorer.rollback(&store, &checkpoint.id).unwrap();
    assert_eq!(store.get(count.as_atom()).unwrap(), 42);
}

#[test]
fn destroyed_store_drops_its_erased_atoms_so_restoration_skips_them() {
    let store = Store::new();
    let count = atom(1).with_label("count");
    store.get(count.as_atom()).unwrap();
    let tracker = Tracker::new(TrackerConfig::default());
    tracker.track(count.id(), Some("count".into()), Utc::now());
    let creator = SnapshotCreator::new(SnapshotConfig::default());
    let snapshot = creator.create(&store, &tracker, None, None).unwrap();

    store.destroy();
    assert!(matches!(
        store.get(count.as_atom()),
        Err(nexus_state::NexusError::StoreDestroyed)
    ));

    // Restoration itself goes through `set_value`, which only checks the
    // (now-cleared) erased-atom registry rather than the destroyed flag,
    // so a destroyed store's atoms are simply skipped under the default
    // not-found policy rather than the whole restore erroring out.
    let restorer = Restorer::new(RestorationConfig::default(), 10);
    let outcome = restorer.restore(&store, &snapshot).unwrap();
    assert_eq!(outcome.skipped, vec![count.id()]);
    assert!(outcome.restored.is_empty());
}
