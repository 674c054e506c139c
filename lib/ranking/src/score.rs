//! Scoring model
//!
//! A soft range scores 1.0 for values inside it and decays as
//! `spread / (spread + distance)` outside, where `spread` is the field's
//! estimated standard deviation. Per-field scores combine by arithmetic
//! mean into a whole-record score in `[0, 1]`.

use crate::config::EngineConfig;
use crate::constraint::Desiderata;
use siftrank_core::{DataSource, Record};
use siftrank_stats::{StatisticKind, StatisticsStore};
use std::collections::BTreeMap;
use tracing::debug;

/// Score of one value against a soft range.
///
/// An unusable spread (unavailable, zero or non-finite) means the field has
/// no opinion and every value scores 1.0. Otherwise a null value scores 0.0.
/// Times are compared in seconds since the epoch.
pub fn unit_score(value: Option<f64>, lo: Option<f64>, hi: Option<f64>, spread: Option<f64>) -> f64 {
    let spread = match spread {
        Some(s) if s.is_finite() && s > 0.0 => s,
        _ => return 1.0,
    };
    let Some(value) = value else {
        return 0.0;
    };
    let distance = match (lo, hi) {
        (Some(lo), _) if value < lo => lo - value,
        (_, Some(hi)) if value > hi => value - hi,
        _ => return 1.0,
    };
    spread / (spread + distance)
}

/// Arithmetic mean of per-field scores; 1.0 when there are none
pub fn combine(scores: &BTreeMap<String, f64>) -> f64 {
    if scores.is_empty() {
        return 1.0;
    }
    scores.values().sum::<f64>() / scores.len() as f64
}

/// One soft range bound to a record column
#[derive(Debug, Clone, PartialEq)]
pub struct ScoreTerm {
    /// Name reported in explain output
    pub key: String,
    /// Field read from the scored record
    pub column: String,
    pub lo: Option<f64>,
    pub hi: Option<f64>,
    pub spread: Option<f64>,
}

impl ScoreTerm {
    #[inline]
    pub fn score(&self, record: Option<&Record>) -> f64 {
        let value = record.and_then(|r| r.ordinal(&self.column));
        unit_score(value, self.lo, self.hi, self.spread)
    }

    /// Best score any value at `edge` or beyond can reach
    #[inline]
    pub fn score_at(&self, edge: f64) -> f64 {
        unit_score(Some(edge), self.lo, self.hi, self.spread)
    }

    /// Whether the term can tell records apart
    #[inline]
    pub fn has_opinion(&self) -> bool {
        matches!(self.spread, Some(s) if s.is_finite() && s > 0.0)
    }
}

/// Scoring expression evaluated in process over fetched records
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScoreExpr {
    pub terms: Vec<ScoreTerm>,
}

impl ScoreExpr {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }

    /// Prefix explain keys, e.g. `author.` for terms read through a relation
    #[must_use]
    pub fn with_key_prefix(mut self, prefix: &str) -> Self {
        for term in &mut self.terms {
            term.key = format!("{}{}", prefix, term.key);
        }
        self
    }

    /// Per-field scores for a record; `None` scores the record as all-null
    pub fn explain(&self, record: Option<&Record>) -> BTreeMap<String, f64> {
        self.terms
            .iter()
            .map(|t| (t.key.clone(), t.score(record)))
            .collect()
    }

    pub fn evaluate(&self, record: &Record) -> (f64, BTreeMap<String, f64>) {
        let explain = self.explain(Some(record));
        (combine(&explain), explain)
    }
}

/// Builds scoring expressions, estimating spreads through the statistics store
pub struct ScoreModel<'a> {
    source: &'a dyn DataSource,
    stats: &'a StatisticsStore,
    config: &'a EngineConfig,
}

impl<'a> ScoreModel<'a> {
    pub fn new(source: &'a dyn DataSource, stats: &'a StatisticsStore, config: &'a EngineConfig) -> Self {
        Self { source, stats, config }
    }

    /// Scoring expression for the soft ranges of one entity type
    pub fn build(&self, entity: &str, desiderata: &Desiderata) -> ScoreExpr {
        let terms = desiderata
            .iter()
            .map(|(field, lo, hi)| ScoreTerm {
                key: field.to_string(),
                column: field.to_string(),
                lo,
                hi,
                spread: self.spread_estimate(entity, field, self.config.sample_size),
            })
            .collect();
        ScoreExpr { terms }
    }

    /// Estimated standard deviation of a field, cached in the statistics
    /// store. `None` when no usable estimate exists.
    pub fn spread_estimate(&self, entity: &str, field: &str, sample_size: usize) -> Option<f64> {
        self.stats
            .get_or_compute(entity, field, StatisticKind::Stddev, || {
                if self.config.use_sampling && self.source.supports_sampling() {
                    self.sampled_spread(entity, field, sample_size)
                } else {
                    self.aggregate_spread(entity, field)
                }
            })
            .filter(|s| s.is_finite() && *s > 0.0)
    }

    fn sampled_spread(&self, entity: &str, field: &str, sample_size: usize) -> Option<f64> {
        let n = sample_size.clamp(1, crate::config::MAX_SAMPLE_SIZE);
        for attempt in 0..self.config.sample_retries.max(1) {
            let mut sample = self.source.sample(entity, field, n);
            if sample.is_empty() {
                continue;
            }
            sample.sort_by(f64::total_cmp);
            self.stats
                .record_percentiles(entity, field, &sample, self.config.percentile_step);
            debug!(
                "Sampled {} values of {}.{} after {} retries",
                sample.len(),
                entity,
                field,
                attempt
            );
            return Some(sample_stddev(&sample));
        }
        debug!("No non-null sample for {}.{}", entity, field);
        None
    }

    /// Spread of a uniform distribution between the field's min and max
    fn aggregate_spread(&self, entity: &str, field: &str) -> Option<f64> {
        let agg = self.source.aggregate(entity, field)?;
        if agg.count == 0 {
            return None;
        }
        let width = agg.max - agg.min;
        let quantiles: Vec<f64> = (0..=100u8).map(|p| agg.min + width * f64::from(p) / 100.0).collect();
        self.stats
            .record_percentiles(entity, field, &quantiles, self.config.percentile_step);
        Some(width / 12f64.sqrt())
    }
}

fn sample_stddev(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1.0);
    variance.sqrt()
}
