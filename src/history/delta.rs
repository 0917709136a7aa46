//! Delta-compressed history: instead of storing a full [`Snapshot`] per
//! entry, most entries store only the atoms that changed since the
//! previous one. A chain of deltas is periodically collapsed back into
//! a full snapshot per [`DeltaConfig`]'s bounds, and reconstruction
//! replays a chain forward from the nearest full snapshot (or cached
//! intermediate), caching the results it computes along the way.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::config::DeltaConfig;
use crate::equality::{equal, EqualityMode};
use crate::events::HistoryChangeEvent;
use crate::internals::next_listener_id;
use crate::snapshot::Snapshot;
use crate::types::{AtomId, Unsubscribe};
use crate::value::Value;

use super::Timeline;

type ChangeListeners = Arc<Mutex<Vec<(u64, Arc<dyn Fn(&HistoryChangeEvent) + Send + Sync>)>>>;

const RECONSTRUCTION_CACHE_CAPACITY: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum EntryKind {
    Full,
    Delta,
}

/// Per-entry chain metadata, exposed without paying for a full
/// reconstruction of every entry.
#[derive(Debug, Clone, Serialize)]
pub struct ChainLink {
    pub index: usize,
    pub kind: EntryKind,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DeltaStats {
    pub entry_count: usize,
    pub chain_length_since_full: usize,
    pub chain_size_since_full: usize,
    pub last_full_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum DeltaOp {
    Added,
    Removed,
    Modified,
}

#[derive(Debug, Clone, Serialize)]
pub struct AtomDelta {
    pub atom_id: AtomId,
    pub op: DeltaOp,
    pub before: Option<Value>,
    pub after: Option<Value>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Delta {
    pub id: String,
    pub created_at: DateTime<Utc>,
    pub ops: Vec<AtomDelta>,
}

/// Computes the set of atom-level changes needed to turn `before` into
/// `after`. Unchanged atoms are omitted entirely.
pub fn calculate_delta(before: &Snapshot, after: &Snapshot, mode: EqualityMode) -> Delta {
    let mut ops = Vec::new();
    for (id, value) in &after.state {
        match before.state.get(id) {
            None => ops.push(AtomDelta {
                atom_id: *id,
                op: DeltaOp::Added,
                before: None,
                after: Some(value.clone()),
            }),
            Some(prev) if !equal(mode, prev, value) => ops.push(AtomDelta {
                atom_id: *id,
                op: DeltaOp::Modified,
                before: Some(prev.clone()),
                after: Some(value.clone()),
            }),
            Some(_) => {}
        }
    }
    for (id, value) in &before.state {
        if !after.state.contains_key(id) {
            ops.push(AtomDelta {
                atom_id: *id,
                op: DeltaOp::Removed,
                before: Some(value.clone()),
                after: None,
            });
        }
    }
    Delta {
        id: Uuid::new_v4().to_string(),
        created_at: Utc::now(),
        ops,
    }
}

/// Applies `delta` on top of `base`, producing the snapshot it encodes.
pub fn apply_delta(base: &Snapshot, delta: &Delta, names: &HashMap<AtomId, String>) -> Snapshot {
    let mut state = base.state.clone();
    let mut merged_names = base.names.clone();
    merged_names.extend(names.clone());
    for op in &delta.ops {
        match op.op {
            DeltaOp::Added | DeltaOp::Modified => {
                if let Some(value) = &op.after {
                    state.insert(op.atom_id, value.clone());
                }
            }
            DeltaOp::Removed => {
                state.remove(&op.atom_id);
            }
        }
    }
    Snapshot::new(state, merged_names)
}

fn estimate_size(delta: &Delta) -> usize {
    serde_json::to_vec(delta).map(|bytes| bytes.len()).unwrap_or(0)
}

enum Entry {
    Full(Snapshot),
    Delta(Delta, HashMap<AtomId, String>),
}

/// Delta-aware history: a single append-only timeline of full snapshots
/// and deltas, with `cursor` marking the current position (everything
/// after it is the redo stack, matching [`super::manager::HistoryManager`]).
pub struct DeltaHistory {
    config: DeltaConfig,
    entries: Vec<Entry>,
    cursor: Option<usize>,
    chain_length_since_full: usize,
    chain_size_since_full: usize,
    last_full_at: DateTime<Utc>,
    cache: Mutex<HashMap<usize, Snapshot>>,
    cache_order: Mutex<VecDeque<usize>>,
    on_change: ChangeListeners,
}

impl DeltaHistory {
    pub fn new(config: DeltaConfig) -> Self {
        Self {
            config,
            entries: Vec::new(),
            cursor: None,
            chain_length_since_full: 0,
            chain_size_since_full: 0,
            last_full_at: Utc::now(),
            cache: Mutex::new(HashMap::new()),
            cache_order: Mutex::new(VecDeque::new()),
            on_change: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn on_change(&self, listener: impl Fn(&HistoryChangeEvent) + Send + Sync + 'static) -> Unsubscribe {
        let id = next_listener_id();
        self.on_change.lock().unwrap().push((id, Arc::new(listener)));
        let listeners = self.on_change.clone();
        Box::new(move || {
            listeners.lock().unwrap().retain(|(lid, _)| *lid != id);
        })
    }

    fn notify(&self) {
        let (past_len, future_len) = self.stats();
        let event = HistoryChangeEvent {
            past_len,
            future_len,
            current_snapshot_id: self.cursor.and_then(|c| self.reconstruct(c)).map(|s| s.id),
        };
        for (_, listener) in self.on_change.lock().unwrap().iter() {
            listener(&event);
        }
    }

    fn should_force_full(&self) -> bool {
        self.chain_length_since_full + 1 >= self.config.max_delta_chain_length
            || self.chain_length_since_full + 1 >= self.config.full_snapshot_interval
            || Utc::now() - self.last_full_at >= self.config.max_delta_chain_age
            || self.chain_size_since_full >= self.config.max_delta_chain_size
    }

    fn truncate_to_cursor(&mut self) {
        let keep = self.cursor.map(|c| c + 1).unwrap_or(0);
        self.entries.truncate(keep);
        self.invalidate_cache();
    }

    fn invalidate_cache(&self) {
        self.cache.lock().unwrap().clear();
        self.cache_order.lock().unwrap().clear();
    }

    fn push_full(&mut self, snapshot: Snapshot) {
        self.entries.push(Entry::Full(snapshot));
        self.chain_length_since_full = 0;
        self.chain_size_since_full = 0;
        self.last_full_at = Utc::now();
        self.cursor = Some(self.entries.len() - 1);
    }

    /// Records `snapshot` as the new current entry, storing it as a full
    /// snapshot or a delta against the entry at the current cursor
    /// depending on the configured chain bounds.
    pub fn add(&mut self, snapshot: Snapshot) {
        self.truncate_to_cursor();
        if self.entries.is_empty() || self.should_force_full() {
            self.push_full(snapshot);
            self.notify();
            return;
        }
        let base = self
            .reconstruct(self.cursor.expect("non-empty entries implies a cursor"))
            .expect("cursor always points at a reconstructible entry");
        let delta = calculate_delta(&base, &snapshot, self.config.change_detection);
        self.chain_size_since_full += estimate_size(&delta);
        self.chain_length_since_full += 1;
        self.entries.push(Entry::Delta(delta, snapshot.names.clone()));
        self.cursor = Some(self.entries.len() - 1);
        self.notify();
    }

    /// Unconditionally records `snapshot` as a full entry, resetting the
    /// delta chain regardless of the configured bounds.
    pub fn force_full_snapshot(&mut self, snapshot: Snapshot) {
        self.truncate_to_cursor();
        self.push_full(snapshot);
        self.notify();
    }

    fn cache_get(&self, index: usize) -> Option<Snapshot> {
        self.cache.lock().unwrap().get(&index).cloned()
    }

    fn cache_put(&self, index: usize, snapshot: Snapshot) {
        let mut cache = self.cache.lock().unwrap();
        let mut order = self.cache_order.lock().unwrap();
        if !cache.contains_key(&index) {
            order.push_back(index);
            while order.len() > RECONSTRUCTION_CACHE_CAPACITY {
                if let Some(oldest) = order.pop_front() {
                    cache.remove(&oldest);
                }
            }
        }
        cache.insert(index, snapshot);
    }

    /// Reconstructs the snapshot at `index`, replaying deltas forward
    /// from the nearest full snapshot or cached entry (whichever is
    /// closer), and caching every intermediate it computes.
    pub fn reconstruct(&self, index: usize) -> Option<Snapshot> {
        if index >= self.entries.len() {
            return None;
        }
        if let Entry::Full(snapshot) = &self.entries[index] {
            return Some(snapshot.clone());
        }
        if let Some(cached) = self.cache_get(index) {
            return Some(cached);
        }

        let mut start = index;
        while start > 0 {
            if matches!(self.entries[start], Entry::Full(_)) || self.cache_get(start).is_some() {
                break;
            }
            start -= 1;
        }

        let mut snapshot = match &self.entries[start] {
            Entry::Full(snapshot) => snapshot.clone(),
            Entry::Delta(_, _) => self.cache_get(start)?,
        };
        for entry_index in start + 1..=index {
            snapshot = match &self.entries[entry_index] {
                Entry::Full(full) => full.clone(),
                Entry::Delta(delta, names) => apply_delta(&snapshot, delta, names),
            };
            self.cache_put(entry_index, snapshot.clone());
        }
        Some(snapshot)
    }

    pub fn stats(&self) -> (usize, usize) {
        match self.cursor {
            Some(cursor) => (cursor, self.entries.len() - cursor - 1),
            None => (0, 0),
        }
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.cursor = None;
        self.chain_length_since_full = 0;
        self.chain_size_since_full = 0;
        self.invalidate_cache();
        self.notify();
    }

    /// Reconstructs every entry in the timeline, in order.
    pub fn all(&self) -> Vec<Snapshot> {
        (0..self.entries.len())
            .filter_map(|i| self.reconstruct(i))
            .collect()
    }

    /// Per-entry chain composition (full vs. delta) without paying the
    /// cost of reconstructing each one.
    pub fn chain(&self) -> Vec<ChainLink> {
        self.entries
            .iter()
            .enumerate()
            .map(|(index, entry)| match entry {
                Entry::Full(snapshot) => ChainLink {
                    index,
                    kind: EntryKind::Full,
                    created_at: snapshot.created_at,
                },
                Entry::Delta(delta, _) => ChainLink {
                    index,
                    kind: EntryKind::Delta,
                    created_at: delta.created_at,
                },
            })
            .collect()
    }

    pub fn delta_stats(&self) -> DeltaStats {
        DeltaStats {
            entry_count: self.entries.len(),
            chain_length_since_full: self.chain_length_since_full,
            chain_size_since_full: self.chain_size_since_full,
            last_full_at: self.last_full_at,
        }
    }

    /// Replaces the delta-chain bounds used for future `add` calls.
    /// Already-recorded entries are unaffected.
    pub fn set_config(&mut self, config: DeltaConfig) {
        self.config = config;
    }

    pub fn config(&self) -> DeltaConfig {
        self.config
    }
}

impl Timeline for DeltaHistory {
    fn undo(&mut self) -> Option<Snapshot> {
        let cursor = self.cursor?;
        if cursor == 0 {
            return None;
        }
        self.cursor = Some(cursor - 1);
        let result = self.reconstruct(cursor - 1);
        self.notify();
        result
    }

    fn redo(&mut self) -> Option<Snapshot> {
        let cursor = self.cursor?;
        if cursor + 1 >= self.entries.len() {
            return None;
        }
        self.cursor = Some(cursor + 1);
        let result = self.reconstruct(cursor + 1);
        self.notify();
        result
    }

    fn jump_to(&mut self, index: usize) -> Option<Snapshot> {
        if index >= self.entries.len() {
            return None;
        }
        self.cursor = Some(index);
        let result = self.reconstruct(index);
        self.notify();
        result
    }

    fn current(&self) -> Option<Snapshot> {
        self.reconstruct(self.cursor?)
    }
}
