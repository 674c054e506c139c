//! Field values stored on records and used as constraint operands.
//!
//! Values arrive as untyped JSON and are coerced against the schema when a
//! dataset is loaded or a constraint is resolved, so that time fields carry
//! real timestamps and relational fields carry record identifiers.

use crate::record::RecordId;
use chrono::{DateTime, Utc};
use serde::Serialize;

/// A single field value
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    UInt(u64),
    Float(f64),
    Time(DateTime<Utc>),
    Text(String),
    Ref(RecordId),
}

impl Value {
    /// Convert an untyped JSON value. Arrays and objects have no field
    /// representation and become `Null`.
    pub fn from_json(value: &serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(*b),
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Value::Int(i)
                } else if let Some(u) = n.as_u64() {
                    Value::UInt(u)
                } else {
                    n.as_f64().map(Value::Float).unwrap_or(Value::Null)
                }
            }
            serde_json::Value::String(s) => Value::Text(s.clone()),
            serde_json::Value::Array(_) | serde_json::Value::Object(_) => Value::Null,
        }
    }

    #[inline]
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Position of the value on a numeric axis.
    ///
    /// Times map to seconds since the Unix epoch so that distances between
    /// time values are measured in seconds.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(i) => Some(*i as f64),
            Value::UInt(u) => Some(*u as f64),
            Value::Float(f) if f.is_finite() => Some(*f),
            Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            Value::Time(t) => Some(t.timestamp() as f64 + f64::from(t.timestamp_subsec_nanos()) / 1e9),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Interpret the value as a reference to another record
    pub fn as_record_id(&self) -> Option<RecordId> {
        match self {
            Value::Ref(id) => Some(id.clone()),
            Value::Int(i) if *i >= 0 => Some(RecordId::Integer(*i as u64)),
            Value::UInt(u) => Some(RecordId::Integer(*u)),
            Value::Text(s) => Some(RecordId::parse(s)),
            _ => None,
        }
    }

    /// Parse a text value as an RFC 3339 timestamp; other values pass through.
    /// Integers and floats are taken as seconds since the epoch.
    pub fn into_time(self) -> Value {
        match self {
            Value::Text(s) => match DateTime::parse_from_rfc3339(&s) {
                Ok(t) => Value::Time(t.with_timezone(&Utc)),
                Err(_) => Value::Text(s),
            },
            Value::Int(i) => DateTime::from_timestamp(i, 0).map(Value::Time).unwrap_or(Value::Null),
            Value::Float(f) if f.is_finite() => {
                let secs = f.floor();
                let nanos = ((f - secs) * 1e9) as u32;
                DateTime::from_timestamp(secs as i64, nanos)
                    .map(Value::Time)
                    .unwrap_or(Value::Null)
            }
            other => other,
        }
    }

    /// Turn a scalar into a record reference; already-null values stay null
    pub fn into_ref(self) -> Value {
        match self.as_record_id() {
            Some(id) => Value::Ref(id),
            None => Value::Null,
        }
    }

    /// Equality used by filters: numbers compare numerically across
    /// representations, references compare against scalar identifiers.
    pub fn loose_eq(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Null, _) | (_, Value::Null) => false,
            (Value::Text(a), Value::Text(b)) => a == b,
            (Value::Ref(a), b) | (b, Value::Ref(a)) => b.as_record_id().as_ref() == Some(a),
            (a, b) => match (a.as_f64(), b.as_f64()) {
                (Some(x), Some(y)) => x == y,
                _ => false,
            },
        }
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<u64> for Value {
    fn from(v: u64) -> Self {
        Value::UInt(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(v: DateTime<Utc>) -> Self {
        Value::Time(v)
    }
}

impl From<RecordId> for Value {
    fn from(v: RecordId) -> Self {
        Value::Ref(v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_from_json_numbers() {
        assert_eq!(Value::from_json(&json!(3)), Value::Int(3));
        assert_eq!(Value::from_json(&json!(u64::MAX)), Value::UInt(u64::MAX));
        assert_eq!(Value::from_json(&json!(1.5)), Value::Float(1.5));
        assert_eq!(Value::from_json(&json!([1, 2])), Value::Null);
    }

    #[test]
    fn test_unsigned_and_time_axis() {
        assert_eq!(Value::UInt(u64::MAX).as_f64(), Some(u64::MAX as f64));
        let t = Value::from("1970-01-01T00:01:00Z").into_time();
        assert_eq!(t.as_f64(), Some(60.0));
        assert_eq!(Value::Int(90).into_time().as_f64(), Some(90.0));
    }

    #[test]
    fn test_loose_eq() {
        assert!(Value::Int(3).loose_eq(&Value::Float(3.0)));
        assert!(!Value::Null.loose_eq(&Value::Null));
        assert!(Value::Ref(RecordId::Integer(7)).loose_eq(&Value::Int(7)));
        assert!(Value::from("a").loose_eq(&Value::from("a")));
        assert!(!Value::from("a").loose_eq(&Value::Int(1)));
    }
}
