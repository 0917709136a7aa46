//! Tracks which atoms participate in time travel: access/change
//! counters, reference counts, and TTL-based garbage collection for
//! atoms nobody has touched in a while.
//!
//! Separate from [`crate::store::Store`]'s own epoch bookkeeping — the
//! store tracks freshness for *every* atom it has ever computed, forever.
//! The tracker is an opt-in layer on top, scoped to whichever atoms the
//! time-travel subsystem cares about snapshotting.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use dashmap::DashMap;

use crate::config::TrackerConfig;
use crate::events::TrackingEvent;
use crate::types::AtomId;

#[derive(Debug, Clone)]
pub struct TrackedAtom {
    pub atom_id: AtomId,
    pub name: Option<String>,
    pub access_count: u64,
    pub change_count: u64,
    pub ref_count: u64,
    pub last_access: DateTime<Utc>,
    pub marked_for_cleanup: bool,
}

impl TrackedAtom {
    fn new(atom_id: AtomId, name: Option<String>, now: DateTime<Utc>) -> Self {
        Self {
            atom_id,
            name,
            access_count: 0,
            change_count: 0,
            ref_count: 0,
            last_access: now,
            marked_for_cleanup: false,
        }
    }
}

pub struct Tracker {
    config: TrackerConfig,
    tracked: DashMap<AtomId, TrackedAtom>,
}

impl Tracker {
    pub fn new(config: TrackerConfig) -> Self {
        Self {
            config,
            tracked: DashMap::new(),
        }
    }

    /// Starts tracking `id`, or bumps its ref count if already tracked.
    /// Concurrent `track` calls for the same atom coalesce onto one
    /// entry rather than racing to create duplicates.
    pub fn track(&self, id: AtomId, name: Option<String>, now: DateTime<Utc>) {
        let mut entry = self
            .tracked
            .entry(id)
            .or_insert_with(|| TrackedAtom::new(id, name.clone(), now));
        entry.ref_count += 1;
        if entry.name.is_none() {
            entry.name = name;
        }
        entry.marked_for_cleanup = false;
    }

    /// Releases one reference. The entry is dropped once `ref_count`
    /// reaches zero, independent of TTL.
    pub fn untrack(&self, id: AtomId) {
        let remove = match self.tracked.get_mut(&id) {
            Some(mut entry) => {
                entry.ref_count = entry.ref_count.saturating_sub(1);
                entry.ref_count == 0
            }
            None => false,
        };
        if remove {
            self.tracked.remove(&id);
        }
    }

    pub fn is_tracked(&self, id: AtomId) -> bool {
        self.tracked.contains_key(&id)
    }

    pub fn get(&self, id: AtomId) -> Option<TrackedAtom> {
        self.tracked.get(&id).map(|e| e.clone())
    }

    pub fn tracked_ids(&self) -> Vec<AtomId> {
        self.tracked.iter().map(|e| *e.key()).collect()
    }

    pub fn record_access(&self, id: AtomId, now: DateTime<Utc>) -> Option<TrackingEvent> {
        let mut entry = self.tracked.get_mut(&id)?;
        entry.access_count += 1;
        entry.last_access = now;
        entry.marked_for_cleanup = false;
        Some(TrackingEvent::Accessed {
            atom_id: id,
            access_count: entry.access_count,
        })
    }

    pub fn record_change(&self, id: AtomId, now: DateTime<Utc>) -> Option<TrackingEvent> {
        let mut entry = self.tracked.get_mut(&id)?;
        entry.change_count += 1;
        entry.last_access = now;
        Some(TrackingEvent::Changed {
            atom_id: id,
            change_count: entry.change_count,
        })
    }

    pub fn mark_for_cleanup(&self, id: AtomId) {
        if let Some(mut entry) = self.tracked.get_mut(&id) {
            entry.marked_for_cleanup = true;
        }
    }

    /// Sweeps atoms past their TTL with no active references and at
    /// least `min_access_before_eviction` recorded accesses, removing
    /// them and returning which ids were cleaned up.
    pub fn sweep(&self, now: DateTime<Utc>) -> Vec<AtomId> {
        let ttl = match self.config.ttl {
            Some(ttl) => ttl,
            None => return Vec::new(),
        };

        let expired: Vec<AtomId> = self
            .tracked
            .iter()
            .filter(|e| {
                e.ref_count == 0
                    && e.access_count >= self.config.min_access_before_eviction
                    && now - e.last_access > ttl
            })
            .map(|e| *e.key())
            .collect();

        for id in &expired {
            self.tracked.remove(id);
            tracing::debug!(atom_id = id, "tracker swept expired atom");
        }
        expired
    }

    /// Atoms eligible for cleanup right now: expired by TTL, or
    /// explicitly marked via [`Tracker::mark_for_cleanup`].
    pub fn stale_atoms(&self, now: DateTime<Utc>) -> Vec<AtomId> {
        let ttl = self.config.ttl;
        self.tracked
            .iter()
            .filter(|e| {
                e.marked_for_cleanup
                    || ttl.is_some_and(|ttl| {
                        e.ref_count == 0
                            && e.access_count >= self.config.min_access_before_eviction
                            && now - e.last_access > ttl
                    })
            })
            .map(|e| *e.key())
            .collect()
    }

    /// Forgets up to `limit` stale atoms (oldest-accessed first), or all
    /// of them when `limit` is `None`. Returns the ids actually removed.
    pub fn cleanup_atoms(&self, now: DateTime<Utc>, limit: Option<usize>) -> Vec<AtomId> {
        let mut stale: Vec<(AtomId, DateTime<Utc>)> = self
            .stale_atoms(now)
            .into_iter()
            .filter_map(|id| self.tracked.get(&id).map(|e| (id, e.last_access)))
            .collect();
        stale.sort_by_key(|(_, last_access)| *last_access);
        if let Some(limit) = limit {
            stale.truncate(limit);
        }
        let removed: Vec<AtomId> = stale.into_iter().map(|(id, _)| id).collect();
        for id in &removed {
            self.tracked.remove(id);
        }
        removed
    }

    /// Unconditionally stops tracking `id`, regardless of ref count.
    pub fn forget(&self, id: AtomId) {
        self.tracked.remove(&id);
    }

    pub fn clear(&self) {
        self.tracked.clear();
    }

    pub fn len(&self) -> usize {
        self.tracked.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracked.is_empty()
    }

    pub fn stats(&self) -> HashMap<AtomId, (u64, u64)> {
        self.tracked
            .iter()
            .map(|e| (*e.key(), (e.access_count, e.change_count)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn track_then_record_access_increments_counter() {
        let tracker = Tracker::new(TrackerConfig::default());
        let now = Utc::now();
        tracker.track(1, Some("count".into()), now);
        let event = tracker.record_access(1, now).unwrap();
        assert!(matches!(event, TrackingEvent::Accessed { access_count: 1, .. }));
    }

    #[test]
    fn concurrent_track_calls_coalesce_ref_count() {
        let tracker = Tracker::new(TrackerConfig::default());
        let now = Utc::now();
        tracker.track(1, None, now);
        tracker.track(1, None, now);
        assert_eq!(tracker.get(1).unwrap().ref_count, 2);
        tracker.untrack(1);
        assert!(tracker.is_tracked(1));
        tracker.untrack(1);
        assert!(!tracker.is_tracked(1));
    }

    #[test]
    fn sweep_removes_expired_unreferenced_atoms() {
        let config = TrackerConfig::default()
            .with_ttl(Some(Duration::seconds(1)))
            .with_min_access_before_eviction(1);
        let tracker = Tracker::new(config);
        let t0 = Utc::now();
        tracker.track(1, None, t0);
        tracker.record_access(1, t0);
        tracker.untrack(1);

        let later = t0 + Duration::seconds(5);
        let swept = tracker.sweep(later);
        assert_eq!(swept, vec![1]);
        assert!(!tracker.is_tracked(1));
    }

    #[test]
    fn sweep_skips_atoms_still_referenced() {
        let config = TrackerConfig::default().with_ttl(Some(Duration::seconds(1)));
        let tracker = Tracker::new(config);
        let t0 = Utc::now();
        tracker.track(1, None, t0);
        tracker.record_access(1, t0);
        let swept = tracker.sweep(t0 + Duration::seconds(5));
        assert!(swept.is_empty());
    }

    #[test]
    fn disabled_ttl_never_sweeps() {
        let tracker = Tracker::new(TrackerConfig::default().with_ttl(None));
        let t0 = Utc::now();
        tracker.track(1, None, t0);
        tracker.untrack(1);
        tracker.track(1, None, t0);
        tracker.record_access(1, t0);
        tracker.untrack(1);
        assert!(tracker.sweep(t0 + Duration::days(365)).is_empty());
    }
}
