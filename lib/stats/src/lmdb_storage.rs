// LMDB-backed statistics persistence, shared across process restarts
use crate::error::Result;
use crate::persistence::StatisticPersistence;
use crate::statistic::{FieldStatistic, StatKey};
use chrono::{DateTime, Utc};
use heed::{Database, Env, EnvOpenOptions};
use std::path::Path;
use std::sync::Arc;

const DB_STATISTICS: &str = "field_statistics";

// Unit separator keeps "percentile_5" from prefixing "percentile_50"
const SEP: char = '\u{1f}';

pub struct LmdbStatistics {
    env: Arc<Env>,
    stats_db: Database<heed::types::Str, heed::types::Bytes>,
}

impl LmdbStatistics {
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self> {
        std::fs::create_dir_all(&path)?;

        let env = Arc::new(
            unsafe {
                EnvOpenOptions::new()
                    .map_size(1024 * 1024 * 1024) // 1GB is plenty for estimates
                    .max_dbs(4)
                    .open(path)?
            }
        );

        let mut wtxn = env.write_txn()?;
        let stats_db = env.create_database(&mut wtxn, Some(DB_STATISTICS))?;
        wtxn.commit()?;

        Ok(Self { env, stats_db })
    }

    fn field_prefix(entity: &str, field: &str) -> String {
        format!("{entity}{SEP}{field}{SEP}")
    }

    fn key_prefix(key: &StatKey) -> String {
        format!("{}{}{SEP}", Self::field_prefix(&key.entity, &key.field), key.kind)
    }

    fn entry_key(stat: &FieldStatistic) -> String {
        // Zero-padded nanos sort chronologically under byte order
        let nanos = stat.recorded_at.timestamp_nanos_opt().unwrap_or_default().max(0);
        format!("{}{:020}", Self::key_prefix(&stat.key()), nanos)
    }

    fn scan_prefix(&self, prefix: &str) -> Result<Vec<(String, FieldStatistic)>> {
        let rtxn = self.env.read_txn()?;
        let mut entries = Vec::new();
        for result in self.stats_db.prefix_iter(&rtxn, prefix)? {
            let (key, data) = result?;
            let stat: FieldStatistic = bincode::deserialize(data)?;
            entries.push((key.to_string(), stat));
        }
        Ok(entries)
    }
}

impl StatisticPersistence for LmdbStatistics {
    fn insert(&self, stat: &FieldStatistic) -> Result<()> {
        let data = bincode::serialize(stat)?;
        let mut wtxn = self.env.write_txn()?;
        self.stats_db.put(&mut wtxn, &Self::entry_key(stat), &data)?;
        wtxn.commit()?;
        Ok(())
    }

    fn latest(&self, key: &StatKey) -> Result<Option<FieldStatistic>> {
        let entries = self.scan_prefix(&Self::key_prefix(key))?;
        Ok(entries.into_iter().last().map(|(_, stat)| stat))
    }

    fn delete_older_than(&self, key: &StatKey, cutoff: DateTime<Utc>) -> Result<usize> {
        let stale: Vec<String> = self
            .scan_prefix(&Self::key_prefix(key))?
            .into_iter()
            .filter(|(_, stat)| stat.recorded_at < cutoff)
            .map(|(k, _)| k)
            .collect();

        let mut wtxn = self.env.write_txn()?;
        let mut deleted = 0;
        for k in &stale {
            if self.stats_db.delete(&mut wtxn, k)? {
                deleted += 1;
            }
        }
        wtxn.commit()?;
        Ok(deleted)
    }

    fn list(&self, entity: &str, field: &str) -> Result<Vec<FieldStatistic>> {
        Ok(self
            .scan_prefix(&Self::field_prefix(entity, field))?
            .into_iter()
            .map(|(_, stat)| stat)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::statistic::StatisticKind;
    use chrono::Duration;

    #[test]
    fn test_lmdb_roundtrip_and_supersede() {
        let dir = tempfile::tempdir().unwrap();
        let storage = LmdbStatistics::new(dir.path()).unwrap();
        let key = StatKey::new("Sample", "depth", StatisticKind::Percentile(5));
        let other = StatKey::new("Sample", "depth", StatisticKind::Percentile(50));
        let t0 = Utc::now();
        let t1 = t0 + Duration::seconds(2);

        storage.insert(&FieldStatistic::new(&key, 4.0, t0)).unwrap();
        storage.insert(&FieldStatistic::new(&key, 5.0, t1)).unwrap();
        storage.insert(&FieldStatistic::new(&other, 50.0, t0)).unwrap();

        assert_eq!(storage.latest(&key).unwrap().unwrap().value, 5.0);
        assert_eq!(storage.latest(&other).unwrap().unwrap().value, 50.0);
        assert_eq!(storage.list("Sample", "depth").unwrap().len(), 3);

        assert_eq!(storage.delete_older_than(&key, t1).unwrap(), 1);
        assert_eq!(storage.list("Sample", "depth").unwrap().len(), 2);
    }
}
