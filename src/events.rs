//! Event payload types emitted by the store and the time-travel
//! subsystem.

use std::collections::HashMap;

use chrono::{DateTime, Utc};

use crate::types::AtomId;
use crate::value::Value;

/// Emitted to whole-store listeners after a batch of writes settles.
#[derive(Debug, Clone)]
pub struct StoreChangeEvent {
    pub new_state: HashMap<AtomId, Value>,
    pub timestamp: DateTime<Utc>,
}

/// Emitted by the snapshot creator whenever a snapshot is captured.
#[derive(Debug, Clone)]
pub struct SnapshotCreatedEvent {
    pub snapshot_id: String,
    pub atom_count: usize,
    pub timestamp: DateTime<Utc>,
}

/// Emitted by the atom tracker on access/change/cleanup.
#[derive(Debug, Clone)]
pub enum TrackingEvent {
    Accessed { atom_id: AtomId, access_count: u64 },
    Changed { atom_id: AtomId, change_count: u64 },
    CleanedUp { atom_id: AtomId },
}

/// Emitted by the history manager whenever past/future shift.
#[derive(Debug, Clone)]
pub struct HistoryChangeEvent {
    pub past_len: usize,
    pub future_len: usize,
    pub current_snapshot_id: Option<String>,
}
