//! Error taxonomy for nexus-state.

use thiserror::Error;

/// Crate-wide error type.
///
/// Validators never construct this type directly (they accumulate
/// messages in a `ValidationResult` instead); it is raised by the store,
/// by the restorer in strict mode, and by checkpoint/history lookups.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum NexusError {
    /// Any operation performed on a store after `destroy()`.
    #[error("store has been destroyed")]
    StoreDestroyed,

    /// A snapshot failed structural validation (strict-mode restore abort).
    #[error("invalid snapshot: {0:?}")]
    InvalidSnapshot(Vec<String>),

    /// A restoration target atom could not be resolved and the configured
    /// `onAtomNotFound` policy is `throw`.
    #[error("atom not found: {0}")]
    AtomNotFound(String),

    /// Aggregated failures from a restoration promoted to an error
    /// (strict mode, or `skipErrors = false`).
    #[error("restoration failed with {} error(s)", .errors.len())]
    Restoration {
        errors: Vec<String>,
        failed_atoms: Vec<FailedAtom>,
    },

    /// A rollback or commit referenced a checkpoint that no longer exists
    /// (evicted, never created, or already consumed).
    #[error("checkpoint not found: {0}")]
    CheckpointNotFound(String),

    /// An atom's read or write closure panicked or returned an error.
    #[error("atom {0} evaluation failed: {1}")]
    Evaluation(String, String),

    /// A configured policy escalated a recoverable condition into a hard
    /// failure (`onAtomNotFound = throw`, `onError = throw`).
    #[error("{0}")]
    Policy(String),

    /// Generic catch-all, used sparingly when adapting foreign errors.
    #[error("{0}")]
    Other(String),
}

/// One atom's failure detail inside a [`NexusError::Restoration`].
#[derive(Debug, Clone, PartialEq)]
pub struct FailedAtom {
    pub name: String,
    pub atom_id: Option<crate::types::AtomId>,
    pub error: String,
}

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, NexusError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_destroyed_message() {
        let err = NexusError::StoreDestroyed;
        assert_eq!(err.to_string(), "store has been destroyed");
    }

    #[test]
    fn restoration_counts_errors() {
        let err = NexusError::Restoration {
            errors: vec!["a".into(), "b".into()],
            failed_atoms: vec![FailedAtom {
                name: "count".into(),
                atom_id: Some(1),
                error: "boom".into(),
            }],
        };
        assert!(err.to_string().contains("2 error"));
    }

    #[test]
    fn checkpoint_not_found_carries_id() {
        let err = NexusError::CheckpointNotFound("cp-1".into());
        assert!(err.to_string().contains("cp-1"));
    }
}
