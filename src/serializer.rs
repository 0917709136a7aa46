//! Converts arbitrary atom values to/from [`crate::value::Value`] for
//! snapshot storage.
//!
//! Every atom here is statically typed (`T: Serialize + DeserializeOwned`),
//! so most conversion is just "serialize via serde_json" — but a restore
//! that receives a [`Value`] and an atom-variant hint still has to decide
//! how to deserialize it: an RFC 3339 string really is a `Date`, an array
//! of pairs really is a `Map`. That shape-sniffing is exactly what
//! [`SerializerConfig`] configures.

use chrono::DateTime;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::{NexusError, Result};
use crate::value::Value;

/// Policy knobs for the Advanced Serializer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SerializerConfig {
    /// Reclassify RFC 3339 strings as [`Value::Date`] on the way in.
    pub detect_dates: bool,
    /// Reclassify `/pattern/flags`-shaped strings as [`Value::Regexp`].
    pub detect_regexp: bool,
    /// Maximum tree depth walked before the serializer gives up and
    /// emits a [`Value::Error`] placeholder instead of recursing
    /// further. A `Value` tree is owned and acyclic by construction, so
    /// this guards against pathological depth, not a true cycle.
    pub max_depth: usize,
}

impl Default for SerializerConfig {
    fn default() -> Self {
        Self {
            detect_dates: true,
            detect_regexp: false,
            max_depth: 64,
        }
    }
}

/// Stateless (aside from its config) converter between `AtomData` and
/// [`Value`].
#[derive(Debug, Clone, Default)]
pub struct Serializer {
    config: SerializerConfig,
}

impl Serializer {
    pub fn new(config: SerializerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &SerializerConfig {
        &self.config
    }

    /// Serialize any atom-shaped value into a [`Value`].
    pub fn to_value<T: Serialize>(&self, value: &T) -> Result<Value> {
        let json = serde_json::to_value(value)
            .map_err(|e| NexusError::Other(format!("serialize failed: {e}")))?;
        Ok(self.classify(json, 0))
    }

    /// Deserialize a [`Value`] back into a concrete type. The value is
    /// first flattened back to plain JSON (the extended kinds encode to
    /// their JSON-serde-compatible form — e.g. `Date` to an RFC 3339
    /// string) so any `Deserialize` impl that round-trips through the
    /// same shape `to_value` produced will succeed.
    pub fn from_value<T: DeserializeOwned>(&self, value: &Value) -> Result<T> {
        let json = self.unclassify(value);
        serde_json::from_value(json).map_err(|e| NexusError::Other(format!("deserialize failed: {e}")))
    }

    fn classify(&self, json: serde_json::Value, depth: usize) -> Value {
        if depth > self.config.max_depth {
            return Value::Error {
                message: format!("max serialization depth ({}) exceeded", self.config.max_depth),
            };
        }
        match json {
            serde_json::Value::String(s) => {
                if self.config.detect_dates {
                    if let Ok(d) = DateTime::parse_from_rfc3339(&s) {
                        return Value::Date(d.with_timezone(&chrono::Utc));
                    }
                }
                if self.config.detect_regexp && is_regexp_literal(&s) {
                    return Value::Regexp(s);
                }
                Value::Str(s)
            }
            serde_json::Value::Array(items) => Value::List(
                items
                    .into_iter()
                    .map(|v| self.classify(v, depth + 1))
                    .collect(),
            ),
            serde_json::Value::Object(map) => Value::Object(
                map.into_iter()
                    .map(|(k, v)| (k, self.classify(v, depth + 1)))
                    .collect(),
            ),
            other => Value::from_json(other),
        }
    }

    fn unclassify(&self, value: &Value) -> serde_json::Value {
        match value {
            Value::List(items) => {
                serde_json::Value::Array(items.iter().map(|v| self.unclassify(v)).collect())
            }
            Value::Object(fields) => serde_json::Value::Object(
                fields
                    .iter()
                    .map(|(k, v)| (k.clone(), self.unclassify(v)))
                    .collect(),
            ),
            other => other.to_json(),
        }
    }

    /// Wrap a value explicitly as a JS-style `Map` (pairs, order
    /// preserved) rather than relying on shape detection.
    pub fn map_value(pairs: Vec<(Value, Value)>) -> Value {
        Value::Map(pairs)
    }

    /// Wrap a value explicitly as a JS-style `Set`.
    pub fn set_value(items: Vec<Value>) -> Value {
        Value::Set(items)
    }
}

fn is_regexp_literal(s: &str) -> bool {
    s.len() > 1 && s.starts_with('/') && s.rfind('/').is_some_and(|i| i > 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use serde::Deserialize;

    #[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
    struct User {
        name: String,
        age: u32,
    }

    #[test]
    fn round_trips_plain_struct() {
        let ser = Serializer::default();
        let user = User {
            name: "Ada".into(),
            age: 30,
        };
        let value = ser.to_value(&user).unwrap();
        let back: User = ser.from_value(&value).unwrap();
        assert_eq!(user, back);
    }

    #[test]
    fn detects_rfc3339_dates_by_default() {
        let ser = Serializer::default();
        let now = Utc::now();
        let value = ser.to_value(&now).unwrap();
        assert!(matches!(value, Value::Date(_)));
        let back: DateTime<chrono::Utc> = ser.from_value(&value).unwrap();
        assert_eq!(back.timestamp_millis(), now.timestamp_millis());
    }

    #[test]
    fn date_detection_can_be_disabled() {
        let ser = Serializer::new(SerializerConfig {
            detect_dates: false,
            ..Default::default()
        });
        let now = Utc::now();
        let value = ser.to_value(&now).unwrap();
        assert!(matches!(value, Value::Str(_)));
    }

    #[test]
    fn map_and_set_helpers_round_trip_via_json() {
        let pairs = vec![
            (Value::Str("a".into()), Value::Int(1)),
            (Value::Str("b".into()), Value::Int(2)),
        ];
        let map = Serializer::map_value(pairs.clone());
        assert_eq!(map, Value::Map(pairs));

        let items = vec![Value::Int(1), Value::Int(2)];
        let set = Serializer::set_value(items.clone());
        assert_eq!(set, Value::Set(items));
    }

    #[test]
    fn excessive_depth_yields_error_placeholder() {
        let ser = Serializer::new(SerializerConfig {
            max_depth: 1,
            ..Default::default()
        });
        let nested = serde_json::json!({"a": {"b": {"c": 1}}});
        let value = ser.classify(nested, 0);
        match value {
            Value::Object(fields) => {
                assert_eq!(fields.len(), 1);
                assert!(matches!(fields[0].1, Value::Object(_)));
                if let Value::Object(inner) = &fields[0].1 {
                    assert!(matches!(inner[0].1, Value::Error { .. }));
                }
            }
            other => panic!("expected object, got {other:?}"),
        }
    }
}
