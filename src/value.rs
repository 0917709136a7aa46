//! The dynamic value representation used for snapshots, diffing, and
//! equality checks.
//!
//! Atoms in this crate are statically typed (`Atom<T>`), but the
//! time-travel subsystem has to treat atom values uniformly: a snapshot
//! holds values from however many distinct `T`s are registered, and a
//! diff compares two arbitrary values. `Value` is that common
//! representation — a JSON-like tree extended with `Date`, `Regexp`,
//! `Map`, `Set`, plus opaque `Function`/`Symbol`/`Error` placeholders for
//! value kinds that a serialized atom graph can encounter even though
//! they have no literal Rust type.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// Bound required of any type stored in an atom.
///
/// An atom's value must be cloneable (the store hands out owned copies),
/// thread-shareable (the store's internal maps are `Send + Sync`), and
/// convertible to/from [`Value`] so the time-travel subsystem can
/// snapshot, diff, and restore it without knowing its concrete type.
pub trait AtomData: Clone + Send + Sync + Serialize + DeserializeOwned + 'static {}
impl<T> AtomData for T where T: Clone + Send + Sync + Serialize + DeserializeOwned + 'static {}

/// A JSON-like dynamic value, extended with the special cases the
/// Advanced Serializer has to account for.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", content = "data")]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    List(Vec<Value>),
    /// A JS-style object: insertion-ordered string-keyed map.
    Object(Vec<(String, Value)>),
    /// A JS-style `Map`: arbitrary key/value pairs, order preserved.
    Map(Vec<(Value, Value)>),
    /// A JS-style `Set`: unique values, order preserved.
    Set(Vec<Value>),
    Date(DateTime<Utc>),
    /// Serialized regular expression source (no pattern compiled here —
    /// this crate only round-trips the literal text).
    Regexp(String),
    /// Placeholder for a function-shaped value. Real Rust values are
    /// never literally functions, but atoms occasionally hold callback
    /// types (e.g. an `on_mount` cleanup); the serializer policy for
    /// those is "replace with this marker" rather than fail.
    Function { debug_name: Option<String> },
    /// Placeholder for a symbol-shaped value (unique, non-serializable
    /// identity), carrying only its description.
    Symbol(String),
    /// A captured error value (message only; no downcasting).
    Error { message: String },
}

impl Value {
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Str(_) => "string",
            Value::List(_) => "array",
            Value::Object(_) => "object",
            Value::Map(_) => "map",
            Value::Set(_) => "set",
            Value::Date(_) => "date",
            Value::Regexp(_) => "regexp",
            Value::Function { .. } => "function",
            Value::Symbol(_) => "symbol",
            Value::Error { .. } => "error",
        }
    }

    pub fn as_object(&self) -> Option<&[(String, Value)]> {
        match self {
            Value::Object(fields) => Some(fields),
            _ => None,
        }
    }

    /// Convert a `serde_json::Value` (the result of `serde_json::to_value`
    /// on any `AtomData`) into our extended representation. Plain JSON has
    /// no Date/Regexp/Map/Set/Function/Symbol/Error of its own — those
    /// only appear when a caller builds a `Value` directly, or via
    /// [`crate::serializer::Serializer`]'s shape-sniffing classifier.
    pub fn from_json(json: serde_json::Value) -> Value {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Value::Int(i)
                } else {
                    Value::Float(n.as_f64().unwrap_or(f64::NAN))
                }
            }
            serde_json::Value::String(s) => Value::Str(s),
            serde_json::Value::Array(items) => {
                Value::List(items.into_iter().map(Value::from_json).collect())
            }
            serde_json::Value::Object(map) => Value::Object(
                map.into_iter()
                    .map(|(k, v)| (k, Value::from_json(v)))
                    .collect(),
            ),
        }
    }

    /// Convert back to a `serde_json::Value`, losslessly for the plain
    /// JSON subset and with a best-effort encoding for the extended
    /// kinds (used by snapshot export, not atom restoration — atom
    /// restoration uses [`crate::serializer::Serializer::from_value`]).
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Null => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::Int(i) => serde_json::Value::from(*i),
            Value::Float(f) => serde_json::Number::from_f64(*f)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            Value::Str(s) => serde_json::Value::String(s.clone()),
            Value::List(items) | Value::Set(items) => {
                serde_json::Value::Array(items.iter().map(Value::to_json).collect())
            }
            Value::Object(fields) => serde_json::Value::Object(
                fields
                    .iter()
                    .map(|(k, v)| (k.clone(), v.to_json()))
                    .collect(),
            ),
            Value::Map(pairs) => serde_json::Value::Array(
                pairs
                    .iter()
                    .map(|(k, v)| serde_json::Value::Array(vec![k.to_json(), v.to_json()]))
                    .collect(),
            ),
            Value::Date(d) => serde_json::Value::String(d.to_rfc3339()),
            Value::Regexp(src) => serde_json::Value::String(src.clone()),
            Value::Function { debug_name } => serde_json::Value::String(format!(
                "[Function{}]",
                debug_name
                    .as_deref()
                    .map(|n| format!(": {n}"))
                    .unwrap_or_default()
            )),
            Value::Symbol(desc) => serde_json::Value::String(format!("Symbol({desc})")),
            Value::Error { message } => serde_json::Value::String(format!("Error: {message}")),
        }
    }
}

/// Structural equality used by `shallow_equal`/`deep_equal` (see
/// `equality.rs`). `PartialEq` is hand-rolled rather than derived so
/// `Float(NaN) == Float(NaN)` is false — a deliberate choice, not an
/// oversight (see `DESIGN.md` for the reasoning), so clone/restore never
/// silently treats a `NaN` as unchanged.
impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b, // NaN != NaN, intentionally
            (Value::Int(a), Value::Float(b)) | (Value::Float(b), Value::Int(a)) => {
                (*a as f64) == *b
            }
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::List(a), Value::Set(b)) | (Value::Set(a), Value::List(b)) => a == b,
            (Value::List(a), Value::List(b)) | (Value::Set(a), Value::Set(b)) => a == b,
            (Value::Object(a), Value::Object(b)) => {
                let am: BTreeMap<_, _> = a.iter().map(|(k, v)| (k.clone(), v)).collect();
                let bm: BTreeMap<_, _> = b.iter().map(|(k, v)| (k.clone(), v)).collect();
                am.len() == bm.len() && am.iter().all(|(k, v)| bm.get(k) == Some(v))
            }
            (Value::Map(a), Value::Map(b)) => a == b,
            (Value::Date(a), Value::Date(b)) => a == b,
            (Value::Regexp(a), Value::Regexp(b)) => a == b,
            (Value::Symbol(a), Value::Symbol(b)) => a == b,
            (Value::Error { message: a }, Value::Error { message: b }) => a == b,
            (Value::Function { .. }, Value::Function { .. }) => false,
            _ => false,
        }
    }
}

impl PartialOrd for Value {
    /// Only used to give deterministic iteration order to `Set`
    /// serialization in formatted output; not a meaningful total order.
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        format!("{self:?}").partial_cmp(&format!("{other:?}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nan_is_not_equal_to_itself() {
        assert_ne!(Value::Float(f64::NAN), Value::Float(f64::NAN));
    }

    #[test]
    fn object_equality_ignores_field_order() {
        let a = Value::Object(vec![
            ("a".into(), Value::Int(1)),
            ("b".into(), Value::Int(2)),
        ]);
        let b = Value::Object(vec![
            ("b".into(), Value::Int(2)),
            ("a".into(), Value::Int(1)),
        ]);
        assert_eq!(a, b);
    }

    #[test]
    fn json_roundtrip_preserves_plain_values() {
        let json = serde_json::json!({"a": 1, "b": [true, null, "x"]});
        let value = Value::from_json(json.clone());
        assert_eq!(value.to_json(), json);
    }

    #[test]
    fn type_name_reports_extended_kinds() {
        assert_eq!(Value::Date(Utc::now()).type_name(), "date");
        assert_eq!(Value::Regexp("^a+$".into()).type_name(), "regexp");
    }
}
