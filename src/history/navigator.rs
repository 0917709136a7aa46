//! Bridges a [`Timeline`] (undo/redo/jumpTo bookkeeping) to the
//! [`Restorer`] that actually applies a snapshot back onto a [`Store`].

use crate::error::Result;
use crate::snapshot::restorer::{Restorer, RestorationOutcome};
use crate::store::Store;

use super::Timeline;

pub struct Navigator<'a> {
    store: &'a Store,
    restorer: &'a Restorer,
}

impl<'a> Navigator<'a> {
    pub fn new(store: &'a Store, restorer: &'a Restorer) -> Self {
        Self { store, restorer }
    }

    /// Moves `timeline` one step back and restores that snapshot onto
    /// the store. Returns `Ok(None)` if there was nothing to undo.
    pub fn undo(&self, timeline: &mut dyn Timeline) -> Result<Option<RestorationOutcome>> {
        self.apply(timeline.undo())
    }

    pub fn redo(&self, timeline: &mut dyn Timeline) -> Result<Option<RestorationOutcome>> {
        self.apply(timeline.redo())
    }

    pub fn jump_to(&self, timeline: &mut dyn Timeline, index: usize) -> Result<Option<RestorationOutcome>> {
        self.apply(timeline.jump_to(index))
    }

    fn apply(&self, snapshot: Option<crate::snapshot::Snapshot>) -> Result<Option<RestorationOutcome>> {
        match snapshot {
            Some(snapshot) => Ok(Some(self.restorer.restore(self.store, &snapshot)?)),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::atom::atom;
    use crate::config::{HistoryConfig, RestorationConfig};
    use crate::history::manager::HistoryManager;
    use crate::snapshot::Snapshot;
    use crate::value::Value;
    use std::collections::HashMap;

    fn snapshot_with(id: u64, value: i64) -> Snapshot {
        Snapshot::new(HashMap::from([(id, Value::Int(value))]), HashMap::new())
    }

    #[test]
    fn undo_restores_the_previous_snapshot_onto_the_store() {
        let store = Store::new();
        let count = atom(0).with_label("count");
        store.get(count.as_atom()).unwrap();

        let mut history = HistoryManager::new(HistoryConfig::default());
        history.add(snapshot_with(count.id(), 1));
        store.set(&count, 1).unwrap();
        history.add(snapshot_with(count.id(), 2));
        store.set(&count, 2).unwrap();

        let restorer = Restorer::new(RestorationConfig::default(), 10);
        let navigator = Navigator::new(&store, &restorer);
        navigator.undo(&mut history).unwrap();
        assert_eq!(store.get(count.as_atom()).unwrap(), 1);
    }

    #[test]
    fn undo_on_empty_history_is_a_no_op() {
        let store = Store::new();
        let mut history = HistoryManager::new(HistoryConfig::default());
        let restorer = Restorer::new(RestorationConfig::default(), 10);
        let navigator = Navigator::new(&store, &restorer);
        assert!(navigator.undo(&mut history).unwrap().is_none());
    }
}
