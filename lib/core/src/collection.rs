use crate::{Error, Filter, Record, RecordId, Result};
use ahash::{AHashMap, AHashSet};
use parking_lot::RwLock;
use rand::seq::IndexedRandom;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

/// Summary aggregate over the non-null values of an ordinal field
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Aggregate {
    pub count: usize,
    pub min: f64,
    pub max: f64,
    /// Population standard deviation
    pub stddev: f64,
}

/// Data-access contract consumed by the ranking engine.
///
/// Scans return records in ascending primary-key order.
pub trait DataSource: Send + Sync {
    /// Number of stored records of exactly this entity type
    fn count(&self, entity: &str) -> usize;

    fn scan(&self, entity: &str, filter: &dyn Filter) -> Result<Vec<Record>>;

    fn get(&self, entity: &str, id: &RecordId) -> Option<Record>;

    /// Random sample of up to `n` non-null ordinal values of `field`
    fn sample(&self, entity: &str, field: &str, n: usize) -> Vec<f64>;

    fn distinct_count(&self, entity: &str, field: &str) -> usize;

    fn aggregate(&self, entity: &str, field: &str) -> Option<Aggregate>;

    /// Whether `sample` is meaningful for this backend
    fn supports_sampling(&self) -> bool {
        true
    }
}

/// In-memory record store keyed by entity type then primary key
#[derive(Clone, Default)]
pub struct RecordStore {
    entities: Arc<RwLock<AHashMap<String, BTreeMap<RecordId, Record>>>>,
}

impl RecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a record
    pub fn upsert(&self, record: Record) -> Result<()> {
        if record.entity.is_empty() {
            return Err(Error::UnknownEntity(String::new()));
        }
        self.entities
            .write()
            .entry(record.entity.clone())
            .or_default()
            .insert(record.id.clone(), record);
        Ok(())
    }

    /// Insert a record, failing if the key is taken
    pub fn insert(&self, record: Record) -> Result<()> {
        let mut entities = self.entities.write();
        let table = entities.entry(record.entity.clone()).or_default();
        if table.contains_key(&record.id) {
            return Err(Error::RecordExists {
                entity: record.entity.clone(),
                id: record.id.to_string(),
            });
        }
        table.insert(record.id.clone(), record);
        Ok(())
    }

    pub fn batch_upsert(&self, records: Vec<Record>) -> Result<()> {
        let count = records.len();
        for record in records {
            self.upsert(record)?;
        }
        debug!("Upserted {} records", count);
        Ok(())
    }

    /// Delete a record by key
    pub fn delete(&self, entity: &str, id: &RecordId) -> Result<bool> {
        let mut entities = self.entities.write();
        Ok(entities
            .get_mut(entity)
            .map(|table| table.remove(id).is_some())
            .unwrap_or(false))
    }

    /// Entity types that currently hold records
    pub fn entity_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.entities.read().keys().cloned().collect();
        names.sort();
        names
    }

    fn ordinal_values(&self, entity: &str, field: &str) -> Vec<f64> {
        self.entities
            .read()
            .get(entity)
            .map(|table| table.values().filter_map(|r| r.ordinal(field)).collect())
            .unwrap_or_default()
    }
}

impl DataSource for RecordStore {
    fn count(&self, entity: &str) -> usize {
        self.entities.read().get(entity).map(BTreeMap::len).unwrap_or(0)
    }

    fn scan(&self, entity: &str, filter: &dyn Filter) -> Result<Vec<Record>> {
        let entities = self.entities.read();
        Ok(entities
            .get(entity)
            .map(|table| {
                table
                    .values()
                    .filter(|record| filter.matches(record))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    fn get(&self, entity: &str, id: &RecordId) -> Option<Record> {
        self.entities.read().get(entity).and_then(|table| table.get(id)).cloned()
    }

    fn sample(&self, entity: &str, field: &str, n: usize) -> Vec<f64> {
        let values = self.ordinal_values(entity, field);
        let mut rng = rand::rng();
        values.choose_multiple(&mut rng, n).copied().collect()
    }

    fn distinct_count(&self, entity: &str, field: &str) -> usize {
        let entities = self.entities.read();
        let Some(table) = entities.get(entity) else {
            return 0;
        };
        let distinct: AHashSet<String> = table
            .values()
            .filter_map(|r| r.get(field))
            .map(|v| serde_json::to_string(v).unwrap_or_default())
            .collect();
        distinct.len()
    }

    fn aggregate(&self, entity: &str, field: &str) -> Option<Aggregate> {
        let values = self.ordinal_values(entity, field);
        if values.is_empty() {
            return None;
        }
        let count = values.len();
        let mean = values.iter().sum::<f64>() / count as f64;
        let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / count as f64;
        let min = values.iter().copied().fold(f64::INFINITY, f64::min);
        let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        Some(Aggregate {
            count,
            min,
            max,
            stddev: variance.sqrt(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Expr, Value};

    fn store_with_depths(depths: &[Option<f64>]) -> RecordStore {
        let store = RecordStore::new();
        for (i, depth) in depths.iter().enumerate() {
            let value = depth.map(Value::Float).unwrap_or(Value::Null);
            store
                .upsert(Record::new("Sample", i as u64).with_field("depth", value))
                .unwrap();
        }
        store
    }

    #[test]
    fn test_scan_is_key_ordered_and_filtered() {
        let store = store_with_depths(&[Some(5.0), Some(50.0), Some(15.0), None]);
        let all = store.scan("Sample", &Expr::True).unwrap();
        let ids: Vec<_> = all.iter().map(|r| r.id.clone()).collect();
        assert_eq!(ids, (0..4u64).map(RecordId::Integer).collect::<Vec<_>>());

        let shallow = store.scan("Sample", &Expr::between("depth", None, Some(20.0))).unwrap();
        assert_eq!(shallow.len(), 2);
        assert!(store.scan("Unknown", &Expr::True).unwrap().is_empty());
    }

    #[test]
    fn test_insert_rejects_duplicates() {
        let store = RecordStore::new();
        store.insert(Record::new("Sample", 1u64)).unwrap();
        assert!(matches!(
            store.insert(Record::new("Sample", 1u64)),
            Err(Error::RecordExists { .. })
        ));
        assert!(store.delete("Sample", &RecordId::Integer(1)).unwrap());
        assert_eq!(store.count("Sample"), 0);
    }

    #[test]
    fn test_sample_skips_nulls() {
        let store = store_with_depths(&[Some(1.0), None, Some(3.0), None]);
        let mut sample = store.sample("Sample", "depth", 10);
        sample.sort_by(|a, b| a.partial_cmp(b).unwrap());
        assert_eq!(sample, vec![1.0, 3.0]);
        assert_eq!(store.sample("Sample", "depth", 1).len(), 1);
    }

    #[test]
    fn test_aggregate_and_distinct() {
        let store = store_with_depths(&[Some(2.0), Some(4.0), Some(4.0), Some(4.0), Some(5.0), Some(5.0), Some(7.0), Some(9.0)]);
        let agg = store.aggregate("Sample", "depth").unwrap();
        assert_eq!(agg.count, 8);
        assert_eq!(agg.min, 2.0);
        assert_eq!(agg.max, 9.0);
        assert!((agg.stddev - 2.0).abs() < 1e-12);
        assert_eq!(store.distinct_count("Sample", "depth"), 5);
        assert!(store.aggregate("Sample", "missing").is_none());
    }
}
