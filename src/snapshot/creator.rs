//! Captures a typed state map of tracked atoms with metadata.
//!
//! By default, three filters apply in order when deciding whether an
//! atom is captured: (1) it must be tracked (see
//! [`crate::tracker::Tracker`]), (2) [`SnapshotConfig::should_capture`]
//! must allow its name, (3) an optional caller-supplied predicate gets
//! the final say. Passing an explicit atom id set to `create`/
//! `maybe_create` bypasses all three and captures exactly that set. A
//! transform hook then gets to rewrite each captured value before it's
//! stored.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::config::SnapshotConfig;
use crate::equality::equal;
use crate::error::Result;
use crate::events::SnapshotCreatedEvent;
use crate::internals::next_listener_id;
use crate::store::Store;
use crate::tracker::Tracker;
use crate::types::{AtomId, Unsubscribe};
use crate::value::Value;

use super::Snapshot;

type Filter = Arc<dyn Fn(AtomId, &str) -> bool + Send + Sync>;
type Transform = Arc<dyn Fn(AtomId, Value) -> Value + Send + Sync>;
type CreateListeners = Arc<Mutex<Vec<(u64, Arc<dyn Fn(&SnapshotCreatedEvent) + Send + Sync>)>>>;

pub struct SnapshotCreator {
    config: SnapshotConfig,
    filter: Option<Filter>,
    transform: Option<Transform>,
    on_create: CreateListeners,
    last_state: Mutex<Option<HashMap<AtomId, Value>>>,
}

impl SnapshotCreator {
    pub fn new(config: SnapshotConfig) -> Self {
        Self {
            config,
            filter: None,
            transform: None,
            on_create: Arc::new(Mutex::new(Vec::new())),
            last_state: Mutex::new(None),
        }
    }

    pub fn with_filter(mut self, filter: impl Fn(AtomId, &str) -> bool + Send + Sync + 'static) -> Self {
        self.filter = Some(Arc::new(filter));
        self
    }

    pub fn with_transform(mut self, transform: impl Fn(AtomId, Value) -> Value + Send + Sync + 'static) -> Self {
        self.transform = Some(Arc::new(transform));
        self
    }

    pub fn on_create(&self, listener: impl Fn(&SnapshotCreatedEvent) + Send + Sync + 'static) -> Unsubscribe {
        let id = next_listener_id();
        self.on_create.lock().unwrap().push((id, Arc::new(listener)));
        let listeners = self.on_create.clone();
        Box::new(move || {
            listeners.lock().unwrap().retain(|(lid, _)| *lid != id);
        })
    }

    fn eligible_atoms(&self, tracker: &Tracker) -> Vec<AtomId> {
        tracker
            .tracked_ids()
            .into_iter()
            .filter(|id| {
                let tracked = match tracker.get(*id) {
                    Some(t) => t,
                    None => return false,
                };
                let name = tracked.name.clone().unwrap_or_default();
                if !self.config.should_capture(&name) {
                    return false;
                }
                match &self.filter {
                    Some(f) => f(*id, &name),
                    None => true,
                }
            })
            .collect()
    }

    /// Enumerates the atoms this capture should include: `atom_ids` if
    /// given (bypassing the tracked/name filters entirely), or every
    /// eligible tracked atom otherwise.
    fn capture_state(
        &self,
        store: &Store,
        tracker: &Tracker,
        atom_ids: Option<&[AtomId]>,
    ) -> Result<(HashMap<AtomId, Value>, HashMap<AtomId, String>)> {
        let ids: Vec<AtomId> = match atom_ids {
            Some(ids) => ids.to_vec(),
            None => self.eligible_atoms(tracker),
        };
        let mut state = HashMap::new();
        let mut names = HashMap::new();
        for id in ids {
            let mut value = store.get_value(id)?;
            if let Some(transform) = &self.transform {
                value = transform(id, value);
            }
            state.insert(id, value);
            if let Some(name) = tracker.get(id).and_then(|t| t.name) {
                names.insert(id, name);
            }
        }
        Ok((state, names))
    }

    fn notify(&self, snapshot: &Snapshot) {
        let event = SnapshotCreatedEvent {
            snapshot_id: snapshot.id.clone(),
            atom_count: snapshot.atom_count(),
            timestamp: snapshot.created_at,
        };
        for (_, listener) in self.on_create.lock().unwrap().iter() {
            listener(&event);
        }
    }

    /// Always captures a new snapshot, regardless of whether anything
    /// changed since the last one. `action` labels the snapshot;
    /// `atom_ids`, if given, captures exactly that set instead of every
    /// eligible tracked atom.
    pub fn create(
        &self,
        store: &Store,
        tracker: &Tracker,
        action: Option<&str>,
        atom_ids: Option<&[AtomId]>,
    ) -> Result<Snapshot> {
        let (state, names) = self.capture_state(store, tracker, atom_ids)?;
        *self.last_state.lock().unwrap() = Some(state.clone());
        let mut snapshot = Snapshot::new(state, names);
        if let Some(action) = action {
            snapshot = snapshot.with_action(action);
        }
        self.notify(&snapshot);
        Ok(snapshot)
    }

    /// Captures a new snapshot unless the resulting state is structurally
    /// equal to the last one captured through this creator, in which
    /// case `Ok(None)` is returned instead. `skip_state_check` forces a
    /// capture even when nothing changed.
    pub fn maybe_create(
        &self,
        store: &Store,
        tracker: &Tracker,
        skip_state_check: bool,
        action: Option<&str>,
        atom_ids: Option<&[AtomId]>,
    ) -> Result<Option<Snapshot>> {
        let (state, names) = self.capture_state(store, tracker, atom_ids)?;
        if !skip_state_check {
            let unchanged = self
                .last_state
                .lock()
                .unwrap()
                .as_ref()
                .is_some_and(|prev| states_equal(prev, &state));
            if unchanged {
                return Ok(None);
            }
        }
        *self.last_state.lock().unwrap() = Some(state.clone());
        let mut snapshot = Snapshot::new(state, names);
        if let Some(action) = action {
            snapshot = snapshot.with_action(action);
        }
        self.notify(&snapshot);
        Ok(Some(snapshot))
    }
}

fn states_equal(a: &HashMap<AtomId, Value>, b: &HashMap<AtomId, Value>) -> bool {
    a.len() == b.len()
        && a.iter()
            .all(|(id, v)| b.get(id).is_some_and(|v2| equal(crate::equality::EqualityMode::Deep, v, v2)))
}
