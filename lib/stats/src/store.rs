//! Statistics store
//!
//! Caches field estimates (row counts, distinct counts, spreads, percentile
//! samples) behind a TTL. Reads and recomputations are serialized per key so
//! that concurrent queries racing on an expired entry trigger a single
//! recomputation.

use crate::error::{Result, StatsError};
use crate::persistence::{MemoryStatistics, StatisticPersistence};
use crate::statistic::{Direction, FieldStatistic, StatKey, StatisticKind};
use ahash::AHashMap;
use chrono::Utc;
use parking_lot::Mutex;
use siftrank_core::{DataSource, FieldKind, FieldMeta};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Field name used for entity-level statistics such as row counts
pub const ENTITY_FIELD: &str = "*";

/// Cache behaviour of a [`StatisticsStore`]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StatsConfig {
    /// Age after which an entry is recomputed; `None` keeps entries forever
    pub ttl: Option<Duration>,
    /// When false every read recomputes and nothing is recorded
    pub enabled: bool,
}

impl StatsConfig {
    /// Build from a timeout in seconds; a negative timeout, or one too large
    /// for a `Duration`, disables expiry
    pub fn from_timeout_secs(secs: f64, enabled: bool) -> Self {
        let ttl = if secs < 0.0 {
            None
        } else {
            Duration::try_from_secs_f64(secs).ok()
        };
        Self { ttl, enabled }
    }
}

impl Default for StatsConfig {
    fn default() -> Self {
        Self {
            ttl: Some(Duration::from_secs(60)),
            enabled: true,
        }
    }
}

pub struct StatisticsStore {
    persistence: Arc<dyn StatisticPersistence>,
    config: StatsConfig,
    key_locks: Mutex<AHashMap<StatKey, Arc<Mutex<()>>>>,
}

impl StatisticsStore {
    pub fn new(persistence: Arc<dyn StatisticPersistence>, config: StatsConfig) -> Self {
        Self {
            persistence,
            config,
            key_locks: Mutex::new(AHashMap::new()),
        }
    }

    pub fn in_memory(config: StatsConfig) -> Self {
        Self::new(Arc::new(MemoryStatistics::new()), config)
    }

    pub fn config(&self) -> StatsConfig {
        self.config
    }

    fn key_lock(&self, key: &StatKey) -> Arc<Mutex<()>> {
        self.key_locks
            .lock()
            .entry(key.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Cached value for the key if present and younger than the TTL
    fn fresh(&self, key: &StatKey) -> Option<f64> {
        let stat = match self.persistence.latest(key) {
            Ok(stat) => stat?,
            Err(e) => {
                warn!("Failed to read statistic {}: {}", key, e);
                return None;
            }
        };
        match self.config.ttl {
            None => Some(stat.value),
            Some(ttl) => {
                let age = Utc::now().signed_duration_since(stat.recorded_at);
                let expired = age.to_std().map(|age| age > ttl).unwrap_or(false);
                if expired {
                    debug!("Statistic {} expired after {:?}", key, age);
                    None
                } else {
                    Some(stat.value)
                }
            }
        }
    }

    /// Record a new value and delete the entries it supersedes
    pub fn record(&self, key: &StatKey, value: f64) {
        if !self.config.enabled {
            return;
        }
        let stat = FieldStatistic::new(key, value, Utc::now());
        if let Err(e) = self.persistence.insert(&stat) {
            warn!("Failed to record statistic {}: {}", key, e);
            return;
        }
        if let Err(e) = self.persistence.delete_older_than(key, stat.recorded_at) {
            warn!("Failed to delete superseded statistic {}: {}", key, e);
        }
    }

    /// Cached value, or the result of `compute` recorded under the key.
    ///
    /// `compute` returning `None` means the statistic is unavailable; nothing
    /// is recorded and the next read tries again.
    pub fn get_or_compute<F>(&self, entity: &str, field: &str, kind: StatisticKind, compute: F) -> Option<f64>
    where
        F: FnOnce() -> Option<f64>,
    {
        if !self.config.enabled {
            return compute();
        }
        let key = StatKey::new(entity, field, kind);
        let lock = self.key_lock(&key);
        let _guard = lock.lock();

        if let Some(value) = self.fresh(&key) {
            return Some(value);
        }

        debug!("Computing statistic {}", key);
        let value = compute();
        match value {
            Some(v) => self.record(&key, v),
            None => debug!("Statistic {} unavailable", key),
        }
        value
    }

    /// Record percentile samples from a sorted sample, one every `step`
    /// percent including both ends
    pub fn record_percentiles(&self, entity: &str, field: &str, sorted: &[f64], step: u8) {
        if sorted.is_empty() {
            return;
        }
        let step = step.clamp(1, 100) as usize;
        let last = sorted.len() - 1;
        let mut points: Vec<u8> = (0..=100).step_by(step).map(|p| p as u8).collect();
        if points.last() != Some(&100) {
            points.push(100);
        }
        for p in points {
            let idx = ((f64::from(p) / 100.0) * last as f64).round() as usize;
            let key = StatKey::new(entity, field, StatisticKind::Percentile(p));
            self.record(&key, sorted[idx.min(last)]);
        }
    }

    /// Recorded percentile sample values for a field, ascending and deduplicated
    pub fn percentiles(&self, entity: &str, field: &str) -> Vec<f64> {
        let stats = match self.persistence.list(entity, field) {
            Ok(stats) => stats,
            Err(e) => {
                warn!("Failed to list statistics for {}.{}: {}", entity, field, e);
                return Vec::new();
            }
        };
        let mut values: Vec<f64> = stats
            .into_iter()
            .filter(|s| matches!(s.kind, StatisticKind::Percentile(_)))
            .map(|s| s.value)
            .filter(|v| v.is_finite())
            .collect();
        values.sort_by(f64::total_cmp);
        values.dedup();
        values
    }

    /// Closest recorded percentile sample on the given side of `value`
    pub fn next_percentile(&self, entity: &str, field: &str, value: f64, direction: Direction) -> Option<f64> {
        let admitted = self
            .percentiles(entity, field)
            .into_iter()
            .filter(|p| direction.admits(*p, value));
        if direction.is_downward() {
            admitted.last()
        } else {
            admitted.min_by(f64::total_cmp)
        }
    }

    /// Percentile bucket enclosing `[lo, hi]`: the next recorded percentile
    /// at or below the lower edge and the next one strictly above the upper
    /// edge. A single supplied bound is used as both edges.
    pub fn segment_bounds(
        &self,
        entity: &str,
        field: &str,
        lo: Option<f64>,
        hi: Option<f64>,
    ) -> Result<(Option<f64>, Option<f64>)> {
        let (lo_edge, hi_edge) = match (lo, hi) {
            (None, None) => return Ok((None, None)),
            (Some(lo), Some(hi)) => (lo, hi),
            (Some(edge), None) | (None, Some(edge)) => (edge, edge),
        };
        if lo_edge > hi_edge {
            return Err(StatsError::InvalidSegment { lo: lo_edge, hi: hi_edge });
        }
        Ok((
            self.next_percentile(entity, field, lo_edge, Direction::Lte),
            self.next_percentile(entity, field, hi_edge, Direction::Gt),
        ))
    }

    /// Cached row count of an entity type
    pub fn row_count(&self, source: &dyn DataSource, entity: &str) -> usize {
        self.get_or_compute(entity, ENTITY_FIELD, StatisticKind::Count, || {
            Some(source.count(entity) as f64)
        })
        .map(|c| c as usize)
        .unwrap_or(0)
    }

    /// Estimate how many distinct values a field can take.
    ///
    /// Relational fields report the referenced entity's row count. Otherwise
    /// small owners are enumerated by row count, mid-sized owners get a
    /// distinct-value scan, and larger ones are reported as `None`.
    pub fn estimate_cardinality(
        &self,
        source: &dyn DataSource,
        entity: &str,
        field: &FieldMeta,
        owner_row_count_upper_bound: usize,
        max_enumerable: usize,
        max_distinct_scan: usize,
    ) -> Option<usize> {
        if let FieldKind::Relational { target } = &field.kind {
            return Some(self.row_count(source, target));
        }
        if owner_row_count_upper_bound < max_enumerable {
            return Some(owner_row_count_upper_bound);
        }
        if owner_row_count_upper_bound < max_distinct_scan {
            return self
                .get_or_compute(entity, &field.name, StatisticKind::Distinct, || {
                    Some(source.distinct_count(entity, &field.name) as f64)
                })
                .map(|c| c as usize);
        }
        None
    }
}
