//! Undo/redo history over snapshots, plus a delta-compressed variant
//! for long-running sessions.

pub mod delta;
pub mod manager;
pub mod navigator;

use crate::snapshot::Snapshot;

/// Common interface the navigator drives, implemented by both the plain
/// [`manager::HistoryManager`] and the delta-compressed [`delta::DeltaHistory`].
pub trait Timeline {
    fn undo(&mut self) -> Option<Snapshot>;
    fn redo(&mut self) -> Option<Snapshot>;
    fn jump_to(&mut self, index: usize) -> Option<Snapshot>;
    fn current(&self) -> Option<Snapshot>;
}
