//! Engine configuration

use serde::{Deserialize, Serialize};
use siftrank_stats::StatsConfig;

/// Upper limit on rows drawn per spread sample
pub const MAX_SAMPLE_SIZE: usize = 1000;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Age in seconds after which a cached statistic is recomputed.
    /// Negative values keep statistics forever.
    pub stats_timeout_secs: f64,
    pub cache_statistics: bool,
    /// Related entities at or below this size are prefetched whole
    pub max_enumerable: usize,
    pub max_distinct_scan: usize,
    pub sample_size: usize,
    /// Attempts at drawing a non-empty sample before a spread is unavailable
    pub sample_retries: usize,
    pub percentile_step: u8,
    pub max_topk_iterations: usize,
    pub score_epsilon: f64,
    /// Estimate spreads from random samples; otherwise from min/max aggregates
    pub use_sampling: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            stats_timeout_secs: 60.0,
            cache_statistics: true,
            max_enumerable: 100,
            max_distinct_scan: 10_000,
            sample_size: MAX_SAMPLE_SIZE,
            sample_retries: 100,
            percentile_step: 5,
            max_topk_iterations: 10,
            score_epsilon: 1e-12,
            use_sampling: true,
        }
    }
}

impl EngineConfig {
    pub fn stats_config(&self) -> StatsConfig {
        StatsConfig::from_timeout_secs(self.stats_timeout_secs, self.cache_statistics)
    }
}
