use crate::value::Value;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

/// Primary key of a record.
///
/// Ordering is total and deterministic; it is the final tiebreak for every
/// ranked result.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RecordId {
    Integer(u64),
    Uuid(Uuid),
    String(String),
}

impl RecordId {
    /// Parse an identifier from text, preferring integers then UUIDs
    pub fn parse(s: &str) -> Self {
        if let Ok(i) = s.parse::<u64>() {
            RecordId::Integer(i)
        } else if let Ok(u) = Uuid::parse_str(s) {
            RecordId::Uuid(u)
        } else {
            RecordId::String(s.to_string())
        }
    }
}

impl std::fmt::Display for RecordId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RecordId::String(s) => write!(f, "{}", s),
            RecordId::Uuid(u) => write!(f, "{}", u),
            RecordId::Integer(i) => write!(f, "{}", i),
        }
    }
}

impl From<String> for RecordId {
    fn from(s: String) -> Self {
        RecordId::String(s)
    }
}

impl From<&str> for RecordId {
    fn from(s: &str) -> Self {
        RecordId::String(s.to_string())
    }
}

impl From<u64> for RecordId {
    fn from(i: u64) -> Self {
        RecordId::Integer(i)
    }
}

impl From<Uuid> for RecordId {
    fn from(u: Uuid) -> Self {
        RecordId::Uuid(u)
    }
}

/// A stored row of one concrete entity type
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Record {
    pub id: RecordId,
    /// Concrete entity type the record was stored under
    pub entity: String,
    pub fields: BTreeMap<String, Value>,
}

impl Record {
    #[inline]
    #[must_use]
    pub fn new(entity: impl Into<String>, id: impl Into<RecordId>) -> Self {
        Self {
            id: id.into(),
            entity: entity.into(),
            fields: BTreeMap::new(),
        }
    }

    #[inline]
    #[must_use]
    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(name.into(), value.into());
        self
    }

    /// Field value, `None` when the field is missing or null
    #[inline]
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field).filter(|v| !v.is_null())
    }

    /// Numeric position of a field, `None` for null or non-ordinal values
    #[inline]
    pub fn ordinal(&self, field: &str) -> Option<f64> {
        self.get(field).and_then(Value::as_f64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_id_ordering() {
        let mut ids = vec![RecordId::Integer(10), RecordId::Integer(2), RecordId::Integer(7)];
        ids.sort();
        assert_eq!(ids, vec![RecordId::Integer(2), RecordId::Integer(7), RecordId::Integer(10)]);
    }

    #[test]
    fn test_record_id_parse() {
        assert_eq!(RecordId::parse("42"), RecordId::Integer(42));
        assert!(matches!(RecordId::parse("67e55044-10b1-426f-9247-bb680e5fe0c8"), RecordId::Uuid(_)));
        assert_eq!(RecordId::parse("abc"), RecordId::String("abc".to_string()));
    }

    #[test]
    fn test_null_fields_read_as_missing() {
        let record = Record::new("Sample", 1u64)
            .with_field("depth", 12.5)
            .with_field("note", Value::Null);
        assert_eq!(record.ordinal("depth"), Some(12.5));
        assert!(record.get("note").is_none());
        assert!(record.get("absent").is_none());
    }
}
