//! Statistic records and lookup keys

use crate::error::StatsError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Kind of a cached estimate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StatisticKind {
    /// Row count of an entity type
    Count,
    /// Number of distinct values of a field
    Distinct,
    /// Standard deviation (spread) of an ordinal field
    Stddev,
    /// Value at the given percentile (0..=100) of an ordinal field
    Percentile(u8),
}

impl fmt::Display for StatisticKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StatisticKind::Count => write!(f, "count"),
            StatisticKind::Distinct => write!(f, "distinct"),
            StatisticKind::Stddev => write!(f, "stddev"),
            StatisticKind::Percentile(p) => write!(f, "percentile_{}", p),
        }
    }
}

/// Cache key: one estimate per entity type, field and kind
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StatKey {
    pub entity: String,
    pub field: String,
    pub kind: StatisticKind,
}

impl StatKey {
    pub fn new(entity: impl Into<String>, field: impl Into<String>, kind: StatisticKind) -> Self {
        Self {
            entity: entity.into(),
            field: field.into(),
            kind,
        }
    }
}

impl fmt::Display for StatKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}:{}", self.entity, self.field, self.kind)
    }
}

/// One recorded estimate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldStatistic {
    pub entity: String,
    pub field: String,
    pub kind: StatisticKind,
    pub value: f64,
    pub recorded_at: DateTime<Utc>,
}

impl FieldStatistic {
    pub fn new(key: &StatKey, value: f64, recorded_at: DateTime<Utc>) -> Self {
        Self {
            entity: key.entity.clone(),
            field: key.field.clone(),
            kind: key.kind,
            value,
            recorded_at,
        }
    }

    pub fn key(&self) -> StatKey {
        StatKey::new(self.entity.clone(), self.field.clone(), self.kind)
    }
}

/// Direction of a percentile lookup relative to a probe value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Lt,
    Lte,
    Gt,
    Gte,
}

impl Direction {
    /// Whether `candidate` lies on this side of `probe`
    #[inline]
    pub fn admits(self, candidate: f64, probe: f64) -> bool {
        match self {
            Direction::Lt => candidate < probe,
            Direction::Lte => candidate <= probe,
            Direction::Gt => candidate > probe,
            Direction::Gte => candidate >= probe,
        }
    }

    /// Lookups below the probe want the largest admitted value
    #[inline]
    pub fn is_downward(self) -> bool {
        matches!(self, Direction::Lt | Direction::Lte)
    }
}

impl FromStr for Direction {
    type Err = StatsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "lt" => Ok(Direction::Lt),
            "lte" => Ok(Direction::Lte),
            "gt" => Ok(Direction::Gt),
            "gte" => Ok(Direction::Gte),
            other => Err(StatsError::InvalidDirection(other.to_string())),
        }
    }
}
