//! Wires the store together with tracking, snapshotting, and history
//! into the single time-travel entry point callers interact with.
//!
//! Construction order mirrors teardown order in reverse: [`Registry`]
//! and [`Tracker`] come up first (nothing downstream needs them torn
//! down early), then [`SnapshotCreator`]/[`Validator`]/[`Restorer`],
//! then the history timeline. `dispose()` unwinds that, and is
//! idempotent — calling it twice is a no-op the second time.
//!
//! Two write paths exist side by side: a "raw write" (`store.set`/
//! `store.set_value` directly, used by [`Restorer`] to apply a snapshot
//! without perturbing history) and the "wrapped write"
//! ([`Controller::set`]), which performs the raw write and then offers
//! the result to auto-capture. Everything driven by the application
//! should go through the wrapped write; everything driven by time
//! travel itself uses the raw one.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use chrono::{DateTime, Utc};

use crate::atom::WritableAtom;
use crate::config::{ControllerConfig, DeltaConfig};
use crate::error::Result;
use crate::events::{HistoryChangeEvent, SnapshotCreatedEvent};
use crate::history::delta::{ChainLink, DeltaHistory, DeltaStats};
use crate::history::navigator::Navigator;
use crate::history::Timeline;
use crate::registry::Registry;
use crate::snapshot::comparator::{self, Diff, DiffFormat};
use crate::snapshot::creator::SnapshotCreator;
use crate::snapshot::restorer::{Checkpoint, RestorationOutcome, Restorer};
use crate::snapshot::Snapshot;
use crate::store::Store;
use crate::tracker::Tracker;
use crate::types::{AtomId, SetStateAction, Unsubscribe};
use crate::value::{AtomData, Value};

/// Result of [`Controller::capture_with_result`]: the snapshot captured
/// (or the last one on record, if nothing changed) plus whether a new
/// history entry was actually recorded.
#[derive(Debug, Clone)]
pub struct CaptureOutcome {
    pub snapshot: Snapshot,
    pub recorded: bool,
}

/// Time-travel controller: the thing applications construct and call
/// `undo`/`redo`/`set`/`restore` on. Owns the store's auxiliary
/// subsystems; the store itself is shared (`Arc`-free here — callers
/// keep the `Store` alive and pass a reference in).
pub struct Controller {
    config: ControllerConfig,
    registry: Registry,
    tracker: Tracker,
    creator: SnapshotCreator,
    restorer: Restorer,
    history: Mutex<DeltaHistory>,
    /// Suppresses auto-capture while a restore triggered by undo/redo/
    /// jump_to is in flight, so restoring old state doesn't itself get
    /// recorded as a new history entry.
    time_traveling: AtomicBool,
    /// Suppresses auto-capture on wrapped writes without affecting
    /// manual `capture`/`capture_with_result` calls.
    auto_capture_paused: AtomicBool,
    disposed: AtomicBool,
}

impl Controller {
    pub fn new(config: ControllerConfig) -> Self {
        Self {
            registry: Registry::new(),
            tracker: Tracker::new(config.tracker),
            creator: SnapshotCreator::new(config.snapshot.clone()),
            restorer: Restorer::new(config.restoration, config.max_checkpoints),
            history: Mutex::new(DeltaHistory::new(config.delta)),
            time_traveling: AtomicBool::new(false),
            auto_capture_paused: AtomicBool::new(false),
            disposed: AtomicBool::new(false),
            config,
        }
    }

    /// Attaches the controller to a store: registers every currently
    /// known atom and seeds the history timeline with an empty baseline.
    pub fn attach(&self, store: &Store) {
        self.registry.attach_store(store);
        let initial = Snapshot::new(Default::default(), Default::default());
        self.history.lock().unwrap().add(initial);
    }

    pub fn track(&self, id: AtomId, name: Option<String>, now: DateTime<Utc>) {
        self.tracker.track(id, name, now);
    }

    pub fn is_traveling(&self) -> bool {
        self.time_traveling.load(Ordering::SeqCst)
    }

    // -- wrapped writes ----------------------------------------------------

    /// Performs the write (the "raw write", `store.set`), then — unless
    /// auto-capture is paused, a time-travel restore is in flight, or
    /// [`crate::config::SnapshotConfig::auto_capture`] is off — offers
    /// the resulting state to [`Controller::record_if_changed`].
    pub fn set<T: AtomData>(
        &self,
        store: &Store,
        atom: &WritableAtom<T>,
        action: impl Into<SetStateAction<T>>,
    ) -> Result<()> {
        store.set(atom, action)?;
        if self.config.snapshot.auto_capture
            && !self.auto_capture_paused.load(Ordering::SeqCst)
            && !self.is_traveling()
        {
            self.record_if_changed(store)?;
        }
        Ok(())
    }

    pub fn pause_auto_capture(&self) {
        self.auto_capture_paused.store(true, Ordering::SeqCst);
    }

    pub fn resume_auto_capture(&self) {
        self.auto_capture_paused.store(false, Ordering::SeqCst);
    }

    // -- capture -------------------------------------------------------

    /// Should be called by the owner after every store write that isn't
    /// itself a time-travel restore; records a history entry if the
    /// resulting state differs from the last one captured. [`Controller::set`]
    /// calls this automatically.
    pub fn record_if_changed(&self, store: &Store) -> Result<Option<Snapshot>> {
        if self.is_traveling() {
            return Ok(None);
        }
        let snapshot = self.creator.maybe_create(store, &self.tracker, false, None, None)?;
        if let Some(snapshot) = &snapshot {
            self.history.lock().unwrap().add(snapshot.clone());
        }
        Ok(snapshot)
    }

    /// Always captures a new snapshot and records it, regardless of
    /// whether anything changed since the last one.
    pub fn capture(&self, store: &Store, action: Option<&str>) -> Result<Snapshot> {
        let snapshot = self.creator.create(store, &self.tracker, action, None)?;
        self.history.lock().unwrap().add(snapshot.clone());
        Ok(snapshot)
    }

    /// Like [`Controller::capture`], but skips recording (and reports
    /// `recorded: false`) if the state hasn't changed since the last
    /// capture made through this controller.
    pub fn capture_with_result(&self, store: &Store, action: Option<&str>) -> Result<CaptureOutcome> {
        match self.creator.maybe_create(store, &self.tracker, false, action, None)? {
            Some(snapshot) => {
                self.history.lock().unwrap().add(snapshot.clone());
                Ok(CaptureOutcome { snapshot, recorded: true })
            }
            None => {
                let snapshot = self
                    .get_current_snapshot()
                    .unwrap_or_else(|| Snapshot::new(Default::default(), Default::default()));
                Ok(CaptureOutcome { snapshot, recorded: false })
            }
        }
    }

    pub fn create_snapshot(&self, store: &Store) -> Result<Snapshot> {
        self.creator.create(store, &self.tracker, None, None)
    }

    pub fn get_current_snapshot(&self) -> Option<Snapshot> {
        self.history.lock().unwrap().current()
    }

    // -- restore / rollback ----------------------------------------------

    pub fn restore(&self, store: &Store, snapshot: &Snapshot) -> Result<RestorationOutcome> {
        self.time_traveling.store(true, Ordering::SeqCst);
        let result = self.restorer.restore(store, snapshot);
        self.time_traveling.store(false, Ordering::SeqCst);
        result
    }

    pub fn restore_with_transaction(&self, store: &Store, snapshot: &Snapshot) -> Result<RestorationOutcome> {
        self.time_traveling.store(true, Ordering::SeqCst);
        let result = self.restorer.restore_with_transaction(store, snapshot);
        self.time_traveling.store(false, Ordering::SeqCst);
        result
    }

    pub fn rollback(&self, store: &Store, checkpoint_id: &str) -> Result<()> {
        self.time_traveling.store(true, Ordering::SeqCst);
        let result = self.restorer.rollback(store, checkpoint_id);
        self.time_traveling.store(false, Ordering::SeqCst);
        result
    }

    pub fn rollback_to_checkpoint(&self, store: &Store, checkpoint_id: &str) -> Result<()> {
        self.rollback(store, checkpoint_id)
    }

    pub fn get_checkpoints(&self) -> Vec<Checkpoint> {
        self.restorer.checkpoints()
    }

    pub fn get_last_checkpoint(&self) -> Option<Checkpoint> {
        self.restorer.last_checkpoint()
    }

    /// Restores a caller-supplied map of atom values directly, bypassing
    /// history (the map doesn't have to have come from a snapshot this
    /// controller ever captured).
    pub fn import_state(&self, store: &Store, state: HashMap<AtomId, Value>) -> Result<RestorationOutcome> {
        let snapshot = Snapshot::new(state, HashMap::new());
        self.restore(store, &snapshot)
    }

    // -- undo / redo / jump_to ---------------------------------------------

    fn with_navigator<'a>(&'a self, store: &'a Store) -> Navigator<'a> {
        Navigator::new(store, &self.restorer)
    }

    pub fn undo(&self, store: &Store) -> Result<Option<RestorationOutcome>> {
        self.time_traveling.store(true, Ordering::SeqCst);
        let mut history = self.history.lock().unwrap();
        let navigator = self.with_navigator(store);
        let result = navigator.undo(&mut *history as &mut dyn Timeline);
        drop(history);
        self.time_traveling.store(false, Ordering::SeqCst);
        result
    }

    pub fn redo(&self, store: &Store) -> Result<Option<RestorationOutcome>> {
        self.time_traveling.store(true, Ordering::SeqCst);
        let mut history = self.history.lock().unwrap();
        let navigator = self.with_navigator(store);
        let result = navigator.redo(&mut *history as &mut dyn Timeline);
        drop(history);
        self.time_traveling.store(false, Ordering::SeqCst);
        result
    }

    pub fn jump_to(&self, store: &Store, index: usize) -> Result<Option<RestorationOutcome>> {
        self.time_traveling.store(true, Ordering::SeqCst);
        let mut history = self.history.lock().unwrap();
        let navigator = self.with_navigator(store);
        let result = navigator.jump_to(&mut *history as &mut dyn Timeline, index);
        drop(history);
        self.time_traveling.store(false, Ordering::SeqCst);
        result
    }

    pub fn can_undo(&self) -> bool {
        self.history.lock().unwrap().stats().0 > 0
    }

    pub fn can_redo(&self) -> bool {
        self.history.lock().unwrap().stats().1 > 0
    }

    pub fn clear_history(&self) {
        self.history.lock().unwrap().clear();
    }

    pub fn get_history(&self) -> Vec<Snapshot> {
        self.history.lock().unwrap().all()
    }

    pub fn get_history_stats(&self) -> (usize, usize) {
        self.history.lock().unwrap().stats()
    }

    // -- diff / comparison ------------------------------------------------

    pub fn compare_snapshots(&self, a: &Snapshot, b: &Snapshot, mode: crate::equality::EqualityMode) -> Diff {
        comparator::diff(a, b, mode)
    }

    /// Diffs `other` against a fresh capture of the store's live state.
    pub fn compare_with_current(
        &self,
        store: &Store,
        other: &Snapshot,
        mode: crate::equality::EqualityMode,
    ) -> Result<Diff> {
        let current = self.creator.create(store, &self.tracker, None, None)?;
        Ok(comparator::diff(other, &current, mode))
    }

    /// Diffs `since` against the last snapshot recorded in history
    /// (not a fresh live capture — see [`Controller::compare_with_current`]
    /// for that).
    pub fn get_diff_since(&self, since: &Snapshot, mode: crate::equality::EqualityMode) -> Option<Diff> {
        let current = self.get_current_snapshot()?;
        Some(comparator::diff(since, &current, mode))
    }

    pub fn visualize_changes(&self, diff: &Diff, format: DiffFormat) -> String {
        comparator::format_diff(diff, format)
    }

    pub fn export_comparison(&self, diff: &Diff, format: DiffFormat) -> String {
        comparator::format_diff(diff, format)
    }

    // -- subscriptions ------------------------------------------------------

    pub fn subscribe_history(&self, listener: impl Fn(&HistoryChangeEvent) + Send + Sync + 'static) -> Unsubscribe {
        self.history.lock().unwrap().on_change(listener)
    }

    pub fn subscribe_snapshots(&self, listener: impl Fn(&SnapshotCreatedEvent) + Send + Sync + 'static) -> Unsubscribe {
        self.creator.on_create(listener)
    }

    // -- tracker maintenance ------------------------------------------------

    pub fn sweep_tracker(&self, now: DateTime<Utc>) -> Vec<AtomId> {
        self.tracker.sweep(now)
    }

    pub fn get_stale_atoms(&self, now: DateTime<Utc>) -> Vec<AtomId> {
        self.tracker.stale_atoms(now)
    }

    /// Forgets up to `count` stale atoms (all of them if `None`),
    /// dropping them from both the tracker and the registry.
    pub fn cleanup_atoms(&self, now: DateTime<Utc>, count: Option<usize>) -> Vec<AtomId> {
        let removed = self.tracker.cleanup_atoms(now, count);
        for id in &removed {
            self.registry.forget(*id);
        }
        removed
    }

    pub fn forget_atom(&self, id: AtomId) {
        self.tracker.forget(id);
        self.registry.forget(id);
    }

    // -- delta history ------------------------------------------------------

    pub fn get_delta_chain(&self) -> Vec<ChainLink> {
        self.history.lock().unwrap().chain()
    }

    pub fn get_delta_stats(&self) -> DeltaStats {
        self.history.lock().unwrap().delta_stats()
    }

    /// Unconditionally records a fresh full-snapshot entry, resetting
    /// the delta chain regardless of the configured bounds.
    pub fn force_full_snapshot(&self, store: &Store) -> Result<Snapshot> {
        let snapshot = self.creator.create(store, &self.tracker, None, None)?;
        self.history.lock().unwrap().force_full_snapshot(snapshot.clone());
        Ok(snapshot)
    }

    /// Replaces the delta-chain bounds used for future captures.
    /// Already-recorded entries are unaffected.
    pub fn set_delta_strategy(&self, config: DeltaConfig) {
        self.history.lock().unwrap().set_config(config);
    }

    pub fn reconstruct_to(&self, index: usize) -> Option<Snapshot> {
        self.history.lock().unwrap().reconstruct(index)
    }

    /// Always `true`: the controller hardcodes [`DeltaHistory`] rather
    /// than [`crate::history::manager::HistoryManager`].
    pub fn is_delta_enabled(&self) -> bool {
        true
    }

    // -- misc -----------------------------------------------------------

    pub fn get_version(&self) -> &'static str {
        env!("CARGO_PKG_VERSION")
    }

    pub fn config(&self) -> &ControllerConfig {
        &self.config
    }

    /// Tears down the controller's wiring. Idempotent: a second call is
    /// a no-op.
    pub fn dispose(&self) {
        if self.disposed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.tracker.clear();
        self.registry.clear();
        self.history.lock().unwrap().clear();
        tracing::info!("time-travel controller disposed");
    }
}

impl Drop for Controller {
    fn drop(&mut self) {
        self.dispose();
    }
}
