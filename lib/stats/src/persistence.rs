use crate::error::Result;
use crate::statistic::{FieldStatistic, StatKey};
use ahash::AHashMap;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;

/// Storage for recorded statistics.
///
/// Several entries may exist per key between an insert and the following
/// `delete_older_than`; readers take the most recent one.
pub trait StatisticPersistence: Send + Sync {
    fn insert(&self, stat: &FieldStatistic) -> Result<()>;

    /// Most recently recorded entry for the key
    fn latest(&self, key: &StatKey) -> Result<Option<FieldStatistic>>;

    /// Delete entries for the key recorded strictly before `cutoff`
    fn delete_older_than(&self, key: &StatKey, cutoff: DateTime<Utc>) -> Result<usize>;

    /// Every entry recorded for one field of one entity type
    fn list(&self, entity: &str, field: &str) -> Result<Vec<FieldStatistic>>;
}

/// Process-local statistics storage
#[derive(Debug, Default)]
pub struct MemoryStatistics {
    entries: RwLock<AHashMap<StatKey, Vec<FieldStatistic>>>,
}

impl MemoryStatistics {
    pub fn new() -> Self {
        Self::default()
    }
}

impl StatisticPersistence for MemoryStatistics {
    fn insert(&self, stat: &FieldStatistic) -> Result<()> {
        self.entries
            .write()
            .entry(stat.key())
            .or_default()
            .push(stat.clone());
        Ok(())
    }

    fn latest(&self, key: &StatKey) -> Result<Option<FieldStatistic>> {
        Ok(self
            .entries
            .read()
            .get(key)
            .and_then(|list| list.iter().max_by_key(|s| s.recorded_at))
            .cloned())
    }

    fn delete_older_than(&self, key: &StatKey, cutoff: DateTime<Utc>) -> Result<usize> {
        let mut entries = self.entries.write();
        let Some(list) = entries.get_mut(key) else {
            return Ok(0);
        };
        let before = list.len();
        list.retain(|s| s.recorded_at >= cutoff);
        Ok(before - list.len())
    }

    fn list(&self, entity: &str, field: &str) -> Result<Vec<FieldStatistic>> {
        Ok(self
            .entries
            .read()
            .iter()
            .filter(|(key, _)| key.entity == entity && key.field == field)
            .flat_map(|(_, list)| list.iter().cloned())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::statistic::StatisticKind;
    use chrono::Duration;

    #[test]
    fn test_latest_and_supersede() {
        let storage = MemoryStatistics::new();
        let key = StatKey::new("Sample", "depth", StatisticKind::Stddev);
        let t0 = Utc::now();
        let t1 = t0 + Duration::seconds(1);

        storage.insert(&FieldStatistic::new(&key, 1.0, t0)).unwrap();
        storage.insert(&FieldStatistic::new(&key, 2.0, t1)).unwrap();
        assert_eq!(storage.latest(&key).unwrap().unwrap().value, 2.0);

        assert_eq!(storage.delete_older_than(&key, t1).unwrap(), 1);
        assert_eq!(storage.list("Sample", "depth").unwrap().len(), 1);
        assert!(storage
            .latest(&StatKey::new("Sample", "depth", StatisticKind::Count))
            .unwrap()
            .is_none());
    }
}
