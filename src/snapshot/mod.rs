//! Whole-store snapshots: capture, structural validation, restoration
//! (plain and transactional), and diff/format.

pub mod comparator;
pub mod creator;
pub mod restorer;
pub mod validator;

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::types::AtomId;
use crate::value::Value;

/// A point-in-time capture of a subset of the store's atoms.
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub id: String,
    pub created_at: DateTime<Utc>,
    /// Optional caller-supplied label, e.g. `"snap1"` or `"set count"`.
    pub action: Option<String>,
    /// Captured value per atom.
    pub state: HashMap<AtomId, Value>,
    /// Display name per atom, carried alongside `state` so a restorer can
    /// report a human-readable identity even when the atom itself is
    /// gone from the registry.
    pub names: HashMap<AtomId, String>,
}

impl Snapshot {
    pub fn new(state: HashMap<AtomId, Value>, names: HashMap<AtomId, String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            created_at: Utc::now(),
            action: None,
            state,
            names,
        }
    }

    pub fn with_action(mut self, action: impl Into<String>) -> Self {
        self.action = Some(action.into());
        self
    }

    pub fn atom_count(&self) -> usize {
        self.state.len()
    }
}
