//! One small `*Config` struct per tunable component, each with a
//! `Default` matching the documented default behavior and `with_*`
//! builder setters.

use chrono::Duration;

use crate::equality::EqualityMode;
use crate::serializer::SerializerConfig;

/// Store-wide tuning.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    pub serializer: SerializerConfig,
    /// Equality check `set` uses to decide whether a write actually
    /// changed a primitive atom's value before bumping its epoch and
    /// notifying subscribers.
    pub equality: EqualityMode,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            serializer: SerializerConfig::default(),
            equality: EqualityMode::Shallow,
        }
    }
}

impl StoreConfig {
    pub fn with_serializer(mut self, serializer: SerializerConfig) -> Self {
        self.serializer = serializer;
        self
    }

    pub fn with_equality(mut self, mode: EqualityMode) -> Self {
        self.equality = mode;
        self
    }
}

/// Access-tracking and TTL-based cleanup for the atom tracker.
#[derive(Debug, Clone, Copy)]
pub struct TrackerConfig {
    /// How long an atom may go unaccessed before it's eligible for
    /// cleanup. `None` disables TTL-based eviction.
    pub ttl: Option<Duration>,
    /// Minimum accesses recorded before TTL eviction is considered, to
    /// avoid sweeping atoms nobody ever actually read.
    pub min_access_before_eviction: u64,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            ttl: Some(Duration::minutes(30)),
            min_access_before_eviction: 1,
        }
    }
}

impl TrackerConfig {
    pub fn with_ttl(mut self, ttl: Option<Duration>) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn with_min_access_before_eviction(mut self, n: u64) -> Self {
        self.min_access_before_eviction = n;
        self
    }
}

/// Which atoms a snapshot capture includes.
#[derive(Debug, Clone, Default)]
pub struct SnapshotConfig {
    /// If set, only atoms whose name is in this list are captured.
    pub include_names: Option<Vec<String>>,
    /// Atom names excluded even if they'd otherwise match `include_names`.
    pub exclude_names: Vec<String>,
    /// Whether a change to a tracked atom triggers an automatic capture.
    pub auto_capture: bool,
}

impl SnapshotConfig {
    pub fn with_include_names(mut self, names: Vec<String>) -> Self {
        self.include_names = Some(names);
        self
    }

    pub fn with_exclude_names(mut self, names: Vec<String>) -> Self {
        self.exclude_names = names;
        self
    }

    pub fn with_auto_capture(mut self, auto_capture: bool) -> Self {
        self.auto_capture = auto_capture;
        self
    }

    pub fn should_capture(&self, name: &str) -> bool {
        if self.exclude_names.iter().any(|n| n == name) {
            return false;
        }
        match &self.include_names {
            Some(names) => names.iter().any(|n| n == name),
            None => true,
        }
    }
}

/// What to do when a restoration target can't be resolved or fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NotFoundPolicy {
    /// Abort the whole restoration with [`crate::error::NexusError::AtomNotFound`].
    Throw,
    /// Skip the entry and continue.
    #[default]
    Skip,
}

/// What a restore does when an atom write fails (or an unknown atom is
/// configured to be treated as an error rather than skipped).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OnErrorPolicy {
    /// Abort the restore and, for a transactional restore, roll every
    /// atom back to its pre-image.
    Rollback,
    /// Record the error and keep applying the remaining atoms.
    Continue,
    /// Abort the restore without rolling back.
    Throw,
}

/// Policy surface for [`crate::snapshot::restorer::Restorer`].
#[derive(Debug, Clone, Copy)]
pub struct RestorationConfig {
    pub on_atom_not_found: NotFoundPolicy,
    /// What to do when applying an atom fails (or `on_atom_not_found`
    /// treats an unknown atom as an error rather than skipping it).
    pub on_error: OnErrorPolicy,
    /// Run plain restores inside an implicit checkpoint/rollback
    /// transaction even when the caller didn't ask for one explicitly.
    pub always_transactional: bool,
    /// Apply atoms in chunks of this size, each its own store batch,
    /// instead of the whole snapshot in one batch. `None` applies
    /// everything in a single batch.
    pub batch_size: Option<usize>,
    /// Abort the apply loop (marking the outcome `interrupted`) once
    /// this much time has elapsed since the restore started.
    pub timeout: Option<Duration>,
    /// Checkpoints older than this are evicted regardless of
    /// `max_checkpoints`. `None` disables age-based eviction.
    pub checkpoint_timeout: Option<Duration>,
}

impl Default for RestorationConfig {
    fn default() -> Self {
        Self {
            on_atom_not_found: NotFoundPolicy::Skip,
            on_error: OnErrorPolicy::Rollback,
            always_transactional: false,
            batch_size: None,
            timeout: None,
            checkpoint_timeout: None,
        }
    }
}

impl RestorationConfig {
    pub fn with_on_atom_not_found(mut self, policy: NotFoundPolicy) -> Self {
        self.on_atom_not_found = policy;
        self
    }

    pub fn with_on_error(mut self, policy: OnErrorPolicy) -> Self {
        self.on_error = policy;
        self
    }

    pub fn with_always_transactional(mut self, v: bool) -> Self {
        self.always_transactional = v;
        self
    }

    pub fn with_batch_size(mut self, size: Option<usize>) -> Self {
        self.batch_size = size;
        self
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_checkpoint_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.checkpoint_timeout = timeout;
        self
    }

    pub fn strict() -> Self {
        Self {
            on_atom_not_found: NotFoundPolicy::Throw,
            on_error: OnErrorPolicy::Rollback,
            always_transactional: true,
            ..Self::default()
        }
    }
}

/// Bounds on the undo/redo history list.
#[derive(Debug, Clone, Copy)]
pub struct HistoryConfig {
    pub max_history: usize,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self { max_history: 100 }
    }
}

impl HistoryConfig {
    pub fn with_max_history(mut self, max: usize) -> Self {
        self.max_history = max;
        self
    }
}

/// Delta-chain bounds for the delta-aware history manager. A chain of
/// deltas is collapsed back into a full snapshot once any bound is hit,
/// trading replay time against memory.
#[derive(Debug, Clone, Copy)]
pub struct DeltaConfig {
    pub change_detection: EqualityMode,
    pub full_snapshot_interval: usize,
    pub max_delta_chain_length: usize,
    pub max_delta_chain_age: Duration,
    pub max_delta_chain_size: usize,
}

impl Default for DeltaConfig {
    fn default() -> Self {
        Self {
            change_detection: EqualityMode::Deep,
            full_snapshot_interval: 20,
            max_delta_chain_length: 50,
            max_delta_chain_age: Duration::minutes(10),
            max_delta_chain_size: 1_000_000,
        }
    }
}

impl DeltaConfig {
    pub fn with_change_detection(mut self, mode: EqualityMode) -> Self {
        self.change_detection = mode;
        self
    }

    pub fn with_full_snapshot_interval(mut self, n: usize) -> Self {
        self.full_snapshot_interval = n;
        self
    }

    pub fn with_max_delta_chain_length(mut self, n: usize) -> Self {
        self.max_delta_chain_length = n;
        self
    }

    pub fn with_max_delta_chain_age(mut self, age: Duration) -> Self {
        self.max_delta_chain_age = age;
        self
    }

    pub fn with_max_delta_chain_size(mut self, bytes: usize) -> Self {
        self.max_delta_chain_size = bytes;
        self
    }
}

/// Top-level controller wiring: how aggressively it auto-captures and
/// how many checkpoints it retains.
#[derive(Debug, Clone)]
pub struct ControllerConfig {
    pub history: HistoryConfig,
    pub delta: DeltaConfig,
    pub restoration: RestorationConfig,
    pub snapshot: SnapshotConfig,
    pub tracker: TrackerConfig,
    pub max_checkpoints: usize,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            history: HistoryConfig::default(),
            delta: DeltaConfig::default(),
            restoration: RestorationConfig::default(),
            snapshot: SnapshotConfig::default(),
            tracker: TrackerConfig::default(),
            max_checkpoints: 20,
        }
    }
}

impl ControllerConfig {
    pub fn with_history(mut self, history: HistoryConfig) -> Self {
        self.history = history;
        self
    }

    pub fn with_delta(mut self, delta: DeltaConfig) -> Self {
        self.delta = delta;
        self
    }

    pub fn with_restoration(mut self, restoration: RestorationConfig) -> Self {
        self.restoration = restoration;
        self
    }

    pub fn with_snapshot(mut self, snapshot: SnapshotConfig) -> Self {
        self.snapshot = snapshot;
        self
    }

    pub fn with_tracker(mut self, tracker: TrackerConfig) -> Self {
        self.tracker = tracker;
        self
    }

    pub fn with_max_checkpoints(mut self, n: usize) -> Self {
        self.max_checkpoints = n;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_config_respects_include_and_exclude() {
        let cfg = SnapshotConfig::default()
            .with_include_names(vec!["a".into(), "b".into()])
            .with_exclude_names(vec!["b".into()]);
        assert!(cfg.should_capture("a"));
        assert!(!cfg.should_capture("b"));
        assert!(!cfg.should_capture("c"));
    }

    #[test]
    fn snapshot_config_captures_everything_by_default() {
        let cfg = SnapshotConfig::default();
        assert!(cfg.should_capture("anything"));
    }

    #[test]
    fn restoration_config_strict_preset() {
        let cfg = RestorationConfig::strict();
        assert_eq!(cfg.on_atom_not_found, NotFoundPolicy::Throw);
        assert_eq!(cfg.on_error, OnErrorPolicy::Rollback);
        assert!(cfg.always_transactional);
    }
}
