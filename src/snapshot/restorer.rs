//! Applies a snapshot to the store.
//!
//! Plain restore validates, then writes every atom in the snapshot back
//! through [`crate::store::Store::set_value`], honoring
//! [`crate::config::RestorationConfig`]'s `on_atom_not_found`/`on_error`
//! policy. `always_transactional` (or calling [`Restorer::rollback`]
//! directly) runs the restore inside a checkpoint: pre-images of every
//! targeted atom are captured first, and a mid-restore failure rolls
//! every atom back to its pre-image when `on_error` is `Rollback` rather
//! than leaving a half-applied state.
//!
//! Atoms are applied in sorted-id order, in chunks of `batch_size` (or
//! all at once if unset), each chunk its own store batch. A `timeout`
//! aborts the remaining chunks and marks the outcome `interrupted`
//! rather than failing it. `on_progress` fires after every atom,
//! transactional or not.
//!
//! Only one restore runs at a time per `Restorer`; a concurrent caller
//! blocks on the internal lock until the in-flight restore finishes
//! rather than being rejected.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::config::{NotFoundPolicy, OnErrorPolicy, RestorationConfig};
use crate::error::{FailedAtom, NexusError, Result};
use crate::store::Store;
use crate::types::AtomId;
use crate::value::Value;

use super::validator::Validator;
use super::Snapshot;

#[derive(Debug, Clone)]
pub struct Checkpoint {
    pub id: String,
    pub created_at: DateTime<Utc>,
    pub pre_images: HashMap<AtomId, Value>,
}

#[derive(Debug, Clone, Default)]
pub struct RestorationOutcome {
    pub restored: Vec<AtomId>,
    pub skipped: Vec<AtomId>,
    pub errors: Vec<String>,
    /// Set when a `timeout` cut the restore short before every atom was
    /// applied. Not an error: whatever was applied before the cutoff
    /// stays applied.
    pub interrupted: bool,
}

#[derive(Debug, Clone)]
pub struct RestoreProgress {
    pub current_index: usize,
    pub total_atoms: usize,
    pub current_atom_name: Option<String>,
    pub is_rollback: bool,
    pub timestamp: DateTime<Utc>,
}

type ProgressListener = Arc<dyn Fn(&RestoreProgress) + Send + Sync>;

pub struct Restorer {
    config: RestorationConfig,
    validator: Validator,
    checkpoints: Mutex<VecDeque<Checkpoint>>,
    max_checkpoints: usize,
    in_flight: Mutex<()>,
    on_progress: Option<ProgressListener>,
}

impl Restorer {
    pub fn new(config: RestorationConfig, max_checkpoints: usize) -> Self {
        Self {
            config,
            validator: Validator::with_default_rules(),
            checkpoints: Mutex::new(VecDeque::new()),
            max_checkpoints,
            in_flight: Mutex::new(()),
            on_progress: None,
        }
    }

    pub fn with_validator(mut self, validator: Validator) -> Self {
        self.validator = validator;
        self
    }

    pub fn with_on_progress(mut self, listener: impl Fn(&RestoreProgress) + Send + Sync + 'static) -> Self {
        self.on_progress = Some(Arc::new(listener));
        self
    }

    pub fn restore(&self, store: &Store, snapshot: &Snapshot) -> Result<RestorationOutcome> {
        let _guard = self.in_flight.lock().unwrap();
        if self.config.always_transactional {
            self.restore_with_transaction_locked(store, snapshot)
        } else {
            self.restore_plain_locked(store, snapshot)
        }
    }

    pub fn restore_with_transaction(&self, store: &Store, snapshot: &Snapshot) -> Result<RestorationOutcome> {
        let _guard = self.in_flight.lock().unwrap();
        self.restore_with_transaction_locked(store, snapshot)
    }

    fn restore_plain_locked(&self, store: &Store, snapshot: &Snapshot) -> Result<RestorationOutcome> {
        self.validate(snapshot)?;
        self.apply(store, snapshot, false)
    }

    fn restore_with_transaction_locked(&self, store: &Store, snapshot: &Snapshot) -> Result<RestorationOutcome> {
        self.validate(snapshot)?;

        let mut pre_images = HashMap::new();
        for id in snapshot.state.keys() {
            if let Ok(v) = store.get_value(*id) {
                pre_images.insert(*id, v);
            }
        }
        let checkpoint = Checkpoint {
            id: Uuid::new_v4().to_string(),
            created_at: Utc::now(),
            pre_images: pre_images.clone(),
        };
        self.push_checkpoint(checkpoint);

        match self.apply(store, snapshot, false) {
            Ok(outcome) => Ok(outcome),
            Err(err) => {
                if self.config.on_error == OnErrorPolicy::Rollback {
                    tracing::warn!(error = %err, "transactional restore failed, rolling back");
                    self.apply_pre_images(store, &pre_images);
                }
                Err(err)
            }
        }
    }

    fn apply_pre_images(&self, store: &Store, pre_images: &HashMap<AtomId, Value>) {
        let total = pre_images.len();
        let mut ids: Vec<AtomId> = pre_images.keys().copied().collect();
        ids.sort();
        store.batch(|| {
            for (index, id) in ids.iter().enumerate() {
                let value = pre_images.get(id).cloned().unwrap();
                let _ = store.set_value(*id, value);
                if let Some(listener) = &self.on_progress {
                    listener(&RestoreProgress {
                        current_index: index + 1,
                        total_atoms: total,
                        current_atom_name: None,
                        is_rollback: true,
                        timestamp: Utc::now(),
                    });
                }
            }
        });
    }

    fn validate(&self, snapshot: &Snapshot) -> Result<()> {
        let result = self.validator.validate(snapshot);
        if !result.is_valid() {
            return Err(NexusError::InvalidSnapshot(result.errors));
        }
        Ok(())
    }

    fn apply(&self, store: &Store, snapshot: &Snapshot, is_rollback: bool) -> Result<RestorationOutcome> {
        let mut ids: Vec<AtomId> = snapshot.state.keys().copied().collect();
        ids.sort();
        let total = ids.len();
        let chunk_size = self.config.batch_size.unwrap_or(total).max(1);
        let start = Utc::now();

        let mut restored = Vec::new();
        let mut skipped = Vec::new();
        let mut errors = Vec::new();
        let mut failed_atoms = Vec::new();
        let mut abort = false;
        let mut interrupted = false;
        let mut applied = 0usize;

        for chunk in ids.chunks(chunk_size) {
            if abort || interrupted {
                break;
            }
            store.batch(|| {
                for id in chunk {
                    if abort || interrupted {
                        return;
                    }
                    if let Some(timeout) = self.config.timeout {
                        if Utc::now() - start > timeout {
                            interrupted = true;
                            return;
                        }
                    }

                    let value = snapshot.state.get(id).cloned().unwrap();
                    match store.set_value(*id, value) {
                        Ok(()) => restored.push(*id),
                        Err(NexusError::AtomNotFound(_)) => match self.config.on_atom_not_found {
                            NotFoundPolicy::Skip => skipped.push(*id),
                            NotFoundPolicy::Throw => {
                                let name = snapshot.names.get(id).cloned().unwrap_or_else(|| id.to_string());
                                errors.push(format!("atom {id} not found"));
                                failed_atoms.push(FailedAtom {
                                    name,
                                    atom_id: Some(*id),
                                    error: "not found".into(),
                                });
                                if self.config.on_error != OnErrorPolicy::Continue {
                                    abort = true;
                                }
                            }
                        },
                        Err(e) => {
                            let name = snapshot.names.get(id).cloned().unwrap_or_else(|| id.to_string());
                            errors.push(format!("atom {id}: {e}"));
                            failed_atoms.push(FailedAtom {
                                name,
                                atom_id: Some(*id),
                                error: e.to_string(),
                            });
                            if self.config.on_error != OnErrorPolicy::Continue {
                                abort = true;
                            }
                        }
                    }

                    applied += 1;
                    if let Some(listener) = &self.on_progress {
                        listener(&RestoreProgress {
                            current_index: applied,
                            total_atoms: total,
                            current_atom_name: snapshot.names.get(id).cloned(),
                            is_rollback,
                            timestamp: Utc::now(),
                        });
                    }
                }
            });
        }

        if interrupted {
            return Ok(RestorationOutcome {
                restored,
                skipped,
                errors,
                interrupted: true,
            });
        }
        if abort {
            return Err(NexusError::Restoration { errors, failed_atoms });
        }
        Ok(RestorationOutcome {
            restored,
            skipped,
            errors,
            interrupted: false,
        })
    }

    fn push_checkpoint(&self, checkpoint: Checkpoint) {
        let mut list = self.checkpoints.lock().unwrap();
        list.push_back(checkpoint);
        while list.len() > self.max_checkpoints {
            list.pop_front();
        }
        if let Some(timeout) = self.config.checkpoint_timeout {
            let now = Utc::now();
            list.retain(|c| now - c.created_at <= timeout);
        }
    }

    pub fn last_checkpoint(&self) -> Option<Checkpoint> {
        self.checkpoints.lock().unwrap().back().cloned()
    }

    pub fn checkpoint(&self, id: &str) -> Option<Checkpoint> {
        self.checkpoints.lock().unwrap().iter().find(|c| c.id == id).cloned()
    }

    pub fn checkpoints(&self) -> Vec<Checkpoint> {
        self.checkpoints.lock().unwrap().iter().cloned().collect()
    }

    /// Restores every atom in `checkpoint_id`'s pre-images, undoing
    /// whatever restore created that checkpoint.
    pub fn rollback(&self, store: &Store, checkpoint_id: &str) -> Result<()> {
        let checkpoint = self
            .checkpoint(checkpoint_id)
            .ok_or_else(|| NexusError::CheckpointNotFound(checkpoint_id.to_string()))?;
        self.apply_pre_images(store, &checkpoint.pre_images);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::atom::atom;

    #[test]
    fn plain_restore_writes_every_atom() {
        let store = Store::new();
        let count = atom(0).with_label("count");
        store.get(count.as_atom()).unwrap();

        let snapshot = Snapshot::new(
            HashMap::from([(count.id(), Value::Int(42))]),
            HashMap::from([(count.id(), "count".to_string())]),
        );
        let restorer = Restorer::new(RestorationConfig::default(), 10);
        let outcome = restorer.restore(&store, &snapshot).unwrap();
        assert_eq!(outcome.restored, vec![count.id()]);
        assert!(!outcome.interrupted);
        assert_eq!(store.get(count.as_atom()).unwrap(), 42);
    }

    #[test]
    fn unknown_atom_is_skipped_by_default() {
        let store = Store::new();
        let snapshot = Snapshot::new(HashMap::from([(999, Value::Int(1))]), HashMap::new());
        let restorer = Restorer::new(RestorationConfig::default(), 10);
        let outcome = restorer.restore(&store, &snapshot).unwrap();
        assert_eq!(outcome.skipped, vec![999]);
    }

    #[test]
    fn strict_policy_throws_on_unknown_atom() {
        let store = Store::new();
        let snapshot = Snapshot::new(HashMap::from([(999, Value::Int(1))]), HashMap::new());
        let restorer = Restorer::new(RestorationConfig::strict(), 10);
        let result = restorer.restore(&store, &snapshot);
        assert!(matches!(result, Err(NexusError::Restoration { .. })));
    }

    #[test]
    fn transactional_restore_rolls_back_on_failure() {
        let store = Store::new();
        let count = atom(7).with_label("count");
        store.get(count.as_atom()).unwrap();

        let mut state = HashMap::new();
        state.insert(count.id(), Value::Int(100));
        state.insert(999, Value::Int(1)); // unknown atom, forces failure under strict policy
        let snapshot = Snapshot::new(state, HashMap::new());

        let restorer = Restorer::new(RestorationConfig::strict(), 10);
        let result = restorer.restore_with_transaction(&store, &snapshot);
        assert!(result.is_err());
        assert_eq!(store.get(count.as_atom()).unwrap(), 7);
    }

    #[test]
    fn continue_policy_keeps_applying_after_a_failed_atom() {
        let store = Store::new();
        let count = atom(0).with_label("count");
        store.get(count.as_atom()).unwrap();

        let mut state = HashMap::new();
        state.insert(999, Value::Int(1)); // unknown, errors under Throw not-found policy
        state.insert(count.id(), Value::Int(5));
        let snapshot = Snapshot::new(state, HashMap::new());

        let config = RestorationConfig::default()
            .with_on_atom_not_found(NotFoundPolicy::Throw)
            .with_on_error(OnErrorPolicy::Continue);
        let restorer = Restorer::new(config, 10);
        let outcome = restorer.restore(&store, &snapshot).unwrap();
        assert_eq!(outcome.restored, vec![count.id()]);
        assert_eq!(outcome.errors.len(), 1);
        assert_eq!(store.get(count.as_atom()).unwrap(), 5);
    }

    #[test]
    fn batch_size_chunks_application() {
        let store = Store::new();
        let a = atom(0).with_label("a");
        let b = atom(0).with_label("b");
        store.get(a.as_atom()).unwrap();
        store.get(b.as_atom()).unwrap();

        let snapshot = Snapshot::new(
            HashMap::from([(a.id(), Value::Int(1)), (b.id(), Value::Int(2))]),
            HashMap::new(),
        );
        let config = RestorationConfig::default().with_batch_size(Some(1));
        let restorer = Restorer::new(config, 10);
        let outcome = restorer.restore(&store, &snapshot).unwrap();
        assert_eq!(outcome.restored.len(), 2);
    }

    #[test]
    fn timeout_marks_outcome_interrupted_without_erroring() {
        let store = Store::new();
        let count = atom(0).with_label("count");
        store.get(count.as_atom()).unwrap();

        let snapshot = Snapshot::new(HashMap::from([(count.id(), Value::Int(1))]), HashMap::new());
        let config = RestorationConfig::default().with_timeout(Some(chrono::Duration::zero()));
        let restorer = Restorer::new(config, 10);
        let outcome = restorer.restore(&store, &snapshot).unwrap();
        assert!(outcome.interrupted);
    }

    #[test]
    fn on_progress_fires_once_per_atom() {
        let store = Store::new();
        let count = atom(0).with_label("count");
        store.get(count.as_atom()).unwrap();

        let calls = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let calls_clone = calls.clone();
        let snapshot = Snapshot::new(HashMap::from([(count.id(), Value::Int(9))]), HashMap::new());
        let restorer = Restorer::new(RestorationConfig::default(), 10)
            .with_on_progress(move |_progress| {
                calls_clone.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            });
        restorer.restore(&store, &snapshot).unwrap();
        assert_eq!(calls.load(std::sync::atomic::Ordering::SeqCst), 1);
    }

    #[test]
    fn rollback_restores_checkpoint_pre_images() {
        let store = Store::new();
        let count = atom(1).with_label("count");
        store.get(count.as_atom()).unwrap();

        let snapshot = Snapshot::new(HashMap::from([(count.id(), Value::Int(2))]), HashMap::new());
        let restorer = Restorer::new(RestorationConfig::default(), 10);
        restorer.restore_with_transaction(&store, &snapshot).unwrap();
        assert_eq!(store.get(count.as_atom()).unwrap(), 2);

        let checkpoint = restorer.last_checkpoint().unwrap();
        restorer.rollback(&store, &checkpoint.id).unwrap();
        assert_eq!(store.get(count.as_atom()).unwrap(), 1);
    }

    #[test]
    fn rollback_with_unknown_checkpoint_errors() {
        let store = Store::new();
        let restorer = Restorer::new(RestorationConfig::default(), 10);
        assert!(matches!(
            restorer.rollback(&store, "nope"),
            Err(NexusError::CheckpointNotFound(_))
        ));
    }

    #[test]
    fn checkpoints_are_capped_by_recency() {
        let store = Store::new();
        let count = atom(1).with_label("count");
        store.get(count.as_atom()).unwrap();
        let restorer = Restorer::new(RestorationConfig::default(), 2);

        for i in 0..5 {
            let snapshot = Snapshot::new(HashMap::from([(count.id(), Value::Int(i))]), HashMap::new());
            restorer.restore_with_transaction(&store, &snapshot).unwrap();
        }
        assert_eq!(restorer.checkpoints().len(), 2);
    }

    #[test]
    fn checkpoints_older_than_timeout_are_evicted() {
        let store = Store::new();
        let count = atom(1).with_label("count");
        store.get(count.as_atom()).unwrap();
        let config = RestorationConfig::default().with_checkpoint_timeout(Some(chrono::Duration::zero()));
        let restorer = Restorer::new(config, 10);

        let snapshot = Snapshot::new(HashMap::from([(count.id(), Value::Int(2))]), HashMap::new());
        restorer.restore_with_transaction(&store, &snapshot).unwrap();
        assert!(restorer.checkpoints().is_empty());
    }
}
