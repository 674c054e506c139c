//! JSON dataset loading.
//!
//! A dataset bundles entity definitions and raw records. Loading coerces
//! each value against its field kind: time fields parse RFC 3339 strings,
//! relational fields become record references.

use crate::schema::{EntityDef, FieldKind, InMemorySchema, SchemaRegistry};
use crate::{Error, Record, RecordId, RecordStore, Result, Value};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;
use tracing::debug;

#[derive(Debug, Clone, Deserialize)]
pub struct Dataset {
    pub entities: Vec<EntityDef>,
    #[serde(default)]
    pub records: Vec<RawRecord>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawRecord {
    pub entity: String,
    pub id: RecordId,
    #[serde(default)]
    pub fields: BTreeMap<String, serde_json::Value>,
}

impl Dataset {
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let data = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&data)?)
    }

    /// Build the schema registry and populated record store
    pub fn into_parts(self) -> Result<(InMemorySchema, RecordStore)> {
        let schema = InMemorySchema::from_defs(self.entities);
        let store = RecordStore::new();
        let count = self.records.len();
        for raw in self.records {
            if !schema.has_entity(&raw.entity) {
                return Err(Error::UnknownEntity(raw.entity));
            }
            if schema.is_abstract(&raw.entity) {
                return Err(Error::AbstractEntity(raw.entity));
            }
            let record = coerce_record(&schema, raw);
            store.insert(record)?;
        }
        debug!("Loaded {} records into {} entity types", count, store.entity_names().len());
        Ok((schema, store))
    }
}

/// Coerce a raw value for a field kind
pub fn coerce_value(kind: &FieldKind, value: Value) -> Value {
    match kind {
        FieldKind::Ordinal { time: true } => value.into_time(),
        FieldKind::Relational { .. } if !value.is_null() => value.into_ref(),
        _ => value,
    }
}

fn coerce_record(schema: &InMemorySchema, raw: RawRecord) -> Record {
    let fields = schema.fields(&raw.entity);
    let mut record = Record::new(raw.entity, raw.id);
    for (name, json) in raw.fields {
        let value = Value::from_json(&json);
        let value = match fields.iter().find(|f| f.name == name) {
            Some(meta) => coerce_value(&meta.kind, value),
            None => value,
        };
        record.fields.insert(name, value);
    }
    record
}
