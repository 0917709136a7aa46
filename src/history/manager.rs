//! Plain undo/redo history: a past/current/future triple of snapshots.
//!
//! This is the non-delta-compressed history manager — every entry is a
//! full [`Snapshot`]. For long-running sessions where that gets
//! expensive, see [`super::delta::DeltaHistory`].

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use crate::events::HistoryChangeEvent;
use crate::internals::next_listener_id;
use crate::snapshot::Snapshot;
use crate::types::Unsubscribe;

use super::Timeline;

type ChangeListeners = Arc<Mutex<Vec<(u64, Arc<dyn Fn(&HistoryChangeEvent) + Send + Sync>)>>>;
type Compressor = Arc<dyn Fn(Snapshot) -> Snapshot + Send + Sync>;

pub struct HistoryManager {
    max_history: usize,
    past: VecDeque<Snapshot>,
    current: Option<Snapshot>,
    future: VecDeque<Snapshot>,
    compress: Option<Compressor>,
    on_change: ChangeListeners,
}

impl HistoryManager {
    pub fn new(config: crate::config::HistoryConfig) -> Self {
        Self {
            max_history: config.max_history,
            past: VecDeque::new(),
            current: None,
            future: VecDeque::new(),
            compress: None,
            on_change: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn with_compression(mut self, compress: impl Fn(Snapshot) -> Snapshot + Send + Sync + 'static) -> Self {
        self.compress = Some(Arc::new(compress));
        self
    }

    pub fn on_change(&self, listener: impl Fn(&HistoryChangeEvent) + Send + Sync + 'static) -> Unsubscribe {
        let id = next_listener_id();
        self.on_change.lock().unwrap().push((id, Arc::new(listener)));
        let listeners = self.on_change.clone();
        Box::new(move || {
            listeners.lock().unwrap().retain(|(lid, _)| *lid != id);
        })
    }

    /// Records `snapshot` as the new current entry, pushing whatever was
    /// current into `past` and discarding the redo stack — the standard
    /// "a new action invalidates redo" rule.
    pub fn add(&mut self, snapshot: Snapshot) {
        if let Some(previous) = self.current.take() {
            let entry = match &self.compress {
                Some(f) => f(previous),
                None => previous,
            };
            self.past.push_back(entry);
            while self.past.len() > self.max_history {
                self.past.pop_front();
            }
        }
        self.future.clear();
        self.current = Some(snapshot);
        self.notify();
    }

    pub fn stats(&self) -> (usize, usize) {
        (self.past.len(), self.future.len())
    }

    pub fn clear(&mut self) {
        self.past.clear();
        self.future.clear();
        self.current = None;
        self.notify();
    }

    fn notify(&self) {
        let event = HistoryChangeEvent {
            past_len: self.past.len(),
            future_len: self.future.len(),
            current_snapshot_id: self.current.as_ref().map(|s| s.id.clone()),
        };
        for (_, listener) in self.on_change.lock().unwrap().iter() {
            listener(&event);
        }
    }
}

impl Timeline for HistoryManager {
    fn undo(&mut self) -> Option<Snapshot> {
        let previous = self.past.pop_back()?;
        if let Some(current) = self.current.take() {
            self.future.push_front(current);
        }
        self.current = Some(previous.clone());
        self.notify();
        Some(previous)
    }

    fn redo(&mut self) -> Option<Snapshot> {
        let next = self.future.pop_front()?;
        if let Some(current) = self.current.take() {
            self.past.push_back(current);
        }
        self.current = Some(next.clone());
        self.notify();
        Some(next)
    }

    fn jump_to(&mut self, index: usize) -> Option<Snapshot> {
        let mut timeline: Vec<Snapshot> = self.past.iter().cloned().collect();
        if let Some(current) = &self.current {
            timeline.push(current.clone());
        }
        timeline.extend(self.future.iter().cloned());
        if index >= timeline.len() {
            return None;
        }
        let target = timeline[index].clone();
        self.past = timeline[..index].iter().cloned().collect();
        self.future = timeline[index + 1..].iter().cloned().collect();
        self.current = Some(target.clone());
        self.notify();
        Some(target)
    }

    fn current(&self) -> Option<Snapshot> {
        self.current.clone()
    }
}
