//! Shallow/deep structural equality and deep-copy utilities over
//! [`crate::value::Value`].
//!
//! Plain free functions rather than a trait hierarchy — there is exactly
//! one value representation in this crate, so a trait would add
//! indirection without a second implementation to justify it.

use crate::value::Value;

/// Reference-then-shallow-structural equality, as used by `Store::set`:
/// reference equality followed by a one-level structural check for
/// composite values.
///
/// Two composite values (`Object`/`Map`/`List`/`Set`) are shallow-equal
/// when they have the same length and each top-level entry is equal by
/// `==` (i.e. nested composites are compared by the `Value` `PartialEq`
/// impl one level down, not recursively re-diffed). `NaN` is never equal
/// to itself (see `Value`'s `PartialEq` impl).
pub fn shallow_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Object(fa), Value::Object(fb)) => {
            if fa.len() != fb.len() {
                return false;
            }
            fa.iter().all(|(k, v)| {
                fb.iter()
                    .find(|(k2, _)| k2 == k)
                    .map(|(_, v2)| v == v2)
                    .unwrap_or(false)
            })
        }
        (Value::List(la), Value::List(lb)) | (Value::Set(la), Value::Set(lb)) => {
            la.len() == lb.len() && la.iter().zip(lb.iter()).all(|(x, y)| x == y)
        }
        (Value::Map(ma), Value::Map(mb)) => {
            ma.len() == mb.len() && ma.iter().zip(mb.iter()).all(|(x, y)| x == y)
        }
        _ => a == b,
    }
}

/// Full recursive structural equality. Used by the delta calculator and
/// snapshot comparator when configured for deep change detection.
pub fn deep_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Object(fa), Value::Object(fb)) => {
            if fa.len() != fb.len() {
                return false;
            }
            fa.iter().all(|(k, v)| {
                fb.iter()
                    .find(|(k2, _)| k2 == k)
                    .map(|(_, v2)| deep_equal(v, v2))
                    .unwrap_or(false)
            })
        }
        (Value::List(la), Value::List(lb)) | (Value::Set(la), Value::Set(lb)) => {
            la.len() == lb.len() && la.iter().zip(lb.iter()).all(|(x, y)| deep_equal(x, y))
        }
        (Value::Map(ma), Value::Map(mb)) => {
            ma.len() == mb.len()
                && ma
                    .iter()
                    .zip(mb.iter())
                    .all(|(x, y)| deep_equal(&x.0, &y.0) && deep_equal(&x.1, &y.1))
        }
        _ => a == b,
    }
}

/// Structural-equality mode selectable by configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EqualityMode {
    Shallow,
    #[default]
    Deep,
}

pub fn equal(mode: EqualityMode, a: &Value, b: &Value) -> bool {
    match mode {
        EqualityMode::Shallow => shallow_equal(a, b),
        EqualityMode::Deep => deep_equal(a, b),
    }
}

/// Deep-copy a value. `Value` is an owned tree with no interior sharing
/// or cycles, so a deep copy is exactly `Clone::clone` — this function
/// exists so call sites read as "I want an independent copy" rather than
/// relying on an incidental `Clone` derive, and so a future value kind
/// with interior sharing has one place to special-case.
pub fn deep_clone(value: &Value) -> Value {
    value.clone()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn shallow_equal_compares_one_level_of_objects() {
        let a = Value::Object(vec![("x".into(), Value::Int(1))]);
        let b = Value::Object(vec![("x".into(), Value::Int(1))]);
        assert!(shallow_equal(&a, &b));
    }

    #[test]
    fn shallow_equal_rejects_nested_changes_just_like_deep() {
        let a = Value::Object(vec![(
            "nested".into(),
            Value::Object(vec![("y".into(), Value::Int(1))]),
        )]);
        let b = Value::Object(vec![(
            "nested".into(),
            Value::Object(vec![("y".into(), Value::Int(2))]),
        )]);
        assert!(!shallow_equal(&a, &b));
        assert!(!deep_equal(&a, &b));
    }

    #[test]
    fn deep_equal_ignores_object_key_order_recursively() {
        let a = Value::Object(vec![(
            "outer".into(),
            Value::Object(vec![
                ("a".into(), Value::Int(1)),
                ("b".into(), Value::Int(2)),
            ]),
        )]);
        let b = Value::Object(vec![(
            "outer".into(),
            Value::Object(vec![
                ("b".into(), Value::Int(2)),
                ("a".into(), Value::Int(1)),
            ]),
        )]);
        assert!(deep_equal(&a, &b));
    }

    #[test]
    fn nan_breaks_equality_in_both_modes() {
        let a = Value::Float(f64::NAN);
        let b = Value::Float(f64::NAN);
        assert!(!shallow_equal(&a, &b));
        assert!(!deep_equal(&a, &b));
    }

    #[test]
    fn deep_clone_is_independent() {
        let original = Value::Date(Utc::now());
        let copy = deep_clone(&original);
        assert_eq!(original, copy);
    }
}
