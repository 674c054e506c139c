//! Ranked results with per-field score explanations

use crate::error::Diagnostic;
use ordered_float::OrderedFloat;
use serde::Serialize;
use siftrank_core::{Record, RecordId, Value};
use std::cmp::Ordering;
use std::collections::BTreeMap;

/// A record with its whole-record score and per-field unit scores
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoredRecord {
    pub record: Record,
    pub score: f64,
    pub explain: BTreeMap<String, f64>,
}

impl ScoredRecord {
    pub fn new(record: Record, score: f64, explain: BTreeMap<String, f64>) -> Self {
        Self { record, score, explain }
    }

    /// Unscored hard match
    pub fn perfect(record: Record) -> Self {
        Self::new(record, 1.0, BTreeMap::new())
    }

    #[inline]
    pub fn id(&self) -> &RecordId {
        &self.record.id
    }
}

/// Secondary ordering applied between equal scores
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SortKey {
    pub field: String,
    pub descending: bool,
}

impl SortKey {
    pub fn asc(field: impl Into<String>) -> Self {
        Self { field: field.into(), descending: false }
    }

    pub fn desc(field: impl Into<String>) -> Self {
        Self { field: field.into(), descending: true }
    }

    /// Parse `field` or `-field` (descending)
    pub fn parse(key: &str) -> Self {
        match key.strip_prefix('-') {
            Some(field) => Self::desc(field),
            None => Self::asc(key),
        }
    }
}

// Nulls sort after values in either direction
fn compare_field(a: &Record, b: &Record, key: &SortKey) -> Ordering {
    let ordering = match (a.get(&key.field), b.get(&key.field)) {
        (None, None) => return Ordering::Equal,
        (None, Some(_)) => return Ordering::Greater,
        (Some(_), None) => return Ordering::Less,
        (Some(x), Some(y)) => compare_values(x, y),
    };
    if key.descending {
        ordering.reverse()
    } else {
        ordering
    }
}

fn compare_values(x: &Value, y: &Value) -> Ordering {
    match (x.as_f64(), y.as_f64()) {
        (Some(a), Some(b)) => OrderedFloat(a).cmp(&OrderedFloat(b)),
        _ => match (x, y) {
            (Value::Text(a), Value::Text(b)) => a.cmp(b),
            (Value::Ref(a), Value::Ref(b)) => a.cmp(b),
            _ => Ordering::Equal,
        },
    }
}

/// Ranking order: score descending, then primary key ascending. The caller's
/// keys break the remaining ties between records of different entity types
/// that share a key; entity name makes the order total.
pub fn rank_order(a: &ScoredRecord, b: &ScoredRecord, order: &[SortKey]) -> Ordering {
    OrderedFloat(b.score)
        .cmp(&OrderedFloat(a.score))
        .then_with(|| a.record.id.cmp(&b.record.id))
        .then_with(|| {
            order
                .iter()
                .map(|key| compare_field(&a.record, &b.record, key))
                .find(|o| *o != Ordering::Equal)
                .unwrap_or(Ordering::Equal)
        })
        .then_with(|| a.record.entity.cmp(&b.record.entity))
}

pub fn sort_ranked(hits: &mut [ScoredRecord], order: &[SortKey]) {
    hits.sort_by(|a, b| rank_order(a, b, order));
}

/// Summary of one query
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SearchStats {
    /// Records fetched from the data source before group matching
    pub candidates: usize,
    /// Records at or above the threshold
    pub matched: usize,
    pub best_score: Option<f64>,
    pub mean_score: Option<f64>,
    pub elapsed_ms: u64,
}

impl SearchStats {
    pub fn summarize(candidates: usize, hits: &[ScoredRecord], elapsed_ms: u64) -> Self {
        let best_score = hits.iter().map(|h| h.score).fold(None, |best: Option<f64>, s| {
            Some(best.map_or(s, |b| b.max(s)))
        });
        let mean_score = if hits.is_empty() {
            None
        } else {
            Some(hits.iter().map(|h| h.score).sum::<f64>() / hits.len() as f64)
        };
        Self {
            candidates,
            matched: hits.len(),
            best_score,
            mean_score,
            elapsed_ms,
        }
    }
}

/// Result of [`MatchEngine::search`](crate::MatchEngine::search)
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SearchResponse {
    /// Requested page of ranked records
    pub hits: Vec<ScoredRecord>,
    /// Records at or above the threshold across all pages
    pub total: usize,
    /// Records passing the hard constraints, before any score threshold
    pub hard_match_count: usize,
    /// Constraints dropped during resolution
    pub ignored: Vec<Diagnostic>,
    /// Soft scoring was skipped because there were too many hard matches
    pub soft_skipped: bool,
    pub stats: SearchStats,
}

impl SearchResponse {
    pub fn ids(&self) -> Vec<RecordId> {
        self.hits.iter().map(|h| h.record.id.clone()).collect()
    }

    pub fn scores(&self) -> Vec<f64> {
        self.hits.iter().map(|h| h.score).collect()
    }
}

impl IntoIterator for SearchResponse {
    type Item = ScoredRecord;
    type IntoIter = std::vec::IntoIter<ScoredRecord>;

    fn into_iter(self) -> Self::IntoIter {
        self.hits.into_iter()
    }
}
