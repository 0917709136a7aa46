//! Rule-based structural validation of snapshots.
//!
//! Validators never throw — a validation failure is data
//! ([`ValidationResult`]), not control flow. It's the restorer's job to
//! decide whether a failed validation aborts the restore
//! ([`crate::error::NexusError::InvalidSnapshot`]) or is merely logged.

use std::sync::Arc;

use chrono::{Duration, Utc};

use crate::value::Value;

use super::Snapshot;

pub type Rule = Arc<dyn Fn(&Snapshot) -> Result<(), String> + Send + Sync>;

#[derive(Debug, Clone, Default)]
pub struct ValidationResult {
    pub errors: Vec<String>,
}

impl ValidationResult {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }
}

pub struct Validator {
    rules: Vec<(String, Rule)>,
}

impl Validator {
    /// A validator with no rules at all.
    pub fn empty() -> Self {
        Self { rules: Vec::new() }
    }

    /// A validator seeded with the default structural rules.
    pub fn with_default_rules() -> Self {
        let mut validator = Self::empty();
        for (name, rule) in default_rules() {
            validator.add_rule(name, rule);
        }
        validator
    }

    pub fn add_rule(&mut self, name: impl Into<String>, rule: impl Fn(&Snapshot) -> Result<(), String> + Send + Sync + 'static) {
        self.rules.push((name.into(), Arc::new(rule)));
    }

    pub fn remove_rule(&mut self, name: &str) {
        self.rules.retain(|(n, _)| n != name);
    }

    pub fn rule_names(&self) -> Vec<&str> {
        self.rules.iter().map(|(n, _)| n.as_str()).collect()
    }

    pub fn validate(&self, snapshot: &Snapshot) -> ValidationResult {
        let mut errors = Vec::new();
        for (name, rule) in &self.rules {
            if let Err(message) = rule(snapshot) {
                errors.push(format!("{name}: {message}"));
            }
        }
        ValidationResult { errors }
    }
}

impl Default for Validator {
    fn default() -> Self {
        Self::with_default_rules()
    }
}

fn default_rules() -> Vec<(&'static str, Rule)> {
    vec![
        (
            "non_empty_id",
            Arc::new(|snapshot: &Snapshot| {
                if snapshot.id.trim().is_empty() {
                    Err("snapshot id must not be empty".to_string())
                } else {
                    Ok(())
                }
            }),
        ),
        (
            "no_error_placeholders",
            Arc::new(|snapshot: &Snapshot| {
                let bad: Vec<String> = snapshot
                    .state
                    .iter()
                    .filter(|(_, v)| matches!(v, Value::Error { .. }))
                    .map(|(id, _)| id.to_string())
                    .collect();
                if bad.is_empty() {
                    Ok(())
                } else {
                    Err(format!("atoms failed to serialize: {}", bad.join(", ")))
                }
            }),
        ),
        (
            "timestamp_not_in_future",
            Arc::new(|snapshot: &Snapshot| {
                if snapshot.created_at > Utc::now() + Duration::seconds(5) {
                    Err("snapshot timestamp is in the future".to_string())
                } else {
                    Ok(())
                }
            }),
        ),
    ]
}
