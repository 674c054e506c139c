//! Match engine
//!
//! Applies hard constraints as a filter and soft constraints as a score,
//! drops records below the threshold and returns the rest ranked. Queries
//! against an abstract entity type run once per concrete descendant and the
//! merged results are ranked together.

use crate::config::EngineConfig;
use crate::constraint::ConstraintSet;
use crate::error::{Diagnostic, Result};
use crate::explain::{sort_ranked, ScoredRecord, SearchResponse, SearchStats, SortKey};
use crate::resolve::ResolvedQuery;
use crate::score::{ScoreExpr, ScoreModel};
use crate::topk::{TopKApproximator, TopKResult};
use crate::virtual_field::VirtualFieldProcessor;
use siftrank_core::{DataSource, Deadline, Error, Record, RecordId, SchemaRegistry};
use siftrank_stats::StatisticsStore;
use std::sync::Arc;
use std::time::Instant;
use tracing::debug;

/// Records scored between deadline checks
pub(crate) const CHECK_INTERVAL: usize = 1024;

/// Per-query parameters
#[derive(Debug, Clone, Default)]
pub struct SearchOptions {
    /// Minimum score; 1.0 keeps hard matches only and skips scoring
    pub threshold: f64,
    /// Ordering applied to records tied on score and primary key
    pub order: Vec<SortKey>,
    pub offset: usize,
    pub limit: Option<usize>,
    /// Skip soft scoring when there are more hard matches than this
    pub skip_soft_above: Option<usize>,
    pub deadline: Deadline,
}

impl SearchOptions {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    #[must_use]
    pub fn with_threshold(mut self, threshold: f64) -> Self {
        self.threshold = threshold;
        self
    }

    #[inline]
    #[must_use]
    pub fn with_order(mut self, order: Vec<SortKey>) -> Self {
        self.order = order;
        self
    }

    #[inline]
    #[must_use]
    pub fn with_page(mut self, offset: usize, limit: Option<usize>) -> Self {
        self.offset = offset;
        self.limit = limit;
        self
    }

    #[inline]
    #[must_use]
    pub fn with_skip_soft_above(mut self, hard_matches: usize) -> Self {
        self.skip_soft_above = Some(hard_matches);
        self
    }

    #[inline]
    #[must_use]
    pub fn with_deadline(mut self, deadline: Deadline) -> Self {
        self.deadline = deadline;
        self
    }

    fn skips_soft(&self, hard_matches: usize) -> bool {
        self.skip_soft_above.is_some_and(|limit| hard_matches > limit)
    }
}

/// Thresholded matches of one concrete entity type, before pagination
#[derive(Debug, Clone, Default)]
pub struct RankedMatches {
    pub hits: Vec<ScoredRecord>,
    pub candidates: usize,
    pub hard_match_count: usize,
    pub soft_skipped: bool,
    pub diagnostics: Vec<Diagnostic>,
}

impl RankedMatches {
    fn absorb(&mut self, other: RankedMatches) {
        self.hits.extend(other.hits);
        self.candidates += other.candidates;
        self.hard_match_count += other.hard_match_count;
        self.soft_skipped |= other.soft_skipped;
        for d in other.diagnostics {
            if !self.diagnostics.contains(&d) {
                self.diagnostics.push(d);
            }
        }
    }
}

pub struct MatchEngine {
    schema: Arc<dyn SchemaRegistry>,
    source: Arc<dyn DataSource>,
    stats: Arc<StatisticsStore>,
    config: EngineConfig,
}

impl MatchEngine {
    /// Engine with a process-local statistics cache
    pub fn new(schema: Arc<dyn SchemaRegistry>, source: Arc<dyn DataSource>, config: EngineConfig) -> Self {
        let stats = Arc::new(StatisticsStore::in_memory(config.stats_config()));
        Self::with_stats(schema, source, stats, config)
    }

    pub fn with_stats(
        schema: Arc<dyn SchemaRegistry>,
        source: Arc<dyn DataSource>,
        stats: Arc<StatisticsStore>,
        config: EngineConfig,
    ) -> Self {
        Self { schema, source, stats, config }
    }

    pub fn schema(&self) -> &dyn SchemaRegistry {
        self.schema.as_ref()
    }

    pub fn source(&self) -> &dyn DataSource {
        self.source.as_ref()
    }

    pub fn stats(&self) -> &StatisticsStore {
        &self.stats
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn score_model(&self) -> ScoreModel<'_> {
        ScoreModel::new(self.source.as_ref(), &self.stats, &self.config)
    }

    /// Concrete entity types a query against `entity` runs on
    pub(crate) fn concrete_types(&self, entity: &str) -> Result<Vec<String>> {
        if !self.schema.has_entity(entity) {
            return Err(Error::UnknownEntity(entity.to_string()).into());
        }
        if self.schema.is_abstract(entity) {
            Ok(self.schema.concrete_descendants(entity))
        } else {
            Ok(vec![entity.to_string()])
        }
    }

    /// Rank the records of `entity` against a constraint set
    pub fn search(&self, entity: &str, constraints: &ConstraintSet, options: &SearchOptions) -> Result<SearchResponse> {
        let started = Instant::now();
        options.deadline.check()?;

        let mut merged = RankedMatches::default();
        for concrete in self.concrete_types(entity)? {
            merged.absorb(self.search_concrete(&concrete, constraints, options)?);
        }
        sort_ranked(&mut merged.hits, &options.order);

        let total = merged.hits.len();
        let elapsed_ms = started.elapsed().as_millis() as u64;
        let stats = SearchStats::summarize(merged.candidates, &merged.hits, elapsed_ms);
        let hits: Vec<ScoredRecord> = merged
            .hits
            .into_iter()
            .skip(options.offset)
            .take(options.limit.unwrap_or(usize::MAX))
            .collect();

        debug!(
            "Search on {}: {} candidates, {} hard matches, {} above threshold {} in {}ms",
            entity, stats.candidates, merged.hard_match_count, total, options.threshold, elapsed_ms
        );

        Ok(SearchResponse {
            hits,
            total,
            hard_match_count: merged.hard_match_count,
            ignored: merged.diagnostics,
            soft_skipped: merged.soft_skipped,
            stats,
        })
    }

    fn search_concrete(&self, entity: &str, constraints: &ConstraintSet, options: &SearchOptions) -> Result<RankedMatches> {
        let resolved = ResolvedQuery::resolve(self.schema.as_ref(), entity, constraints);
        if resolved.has_virtual() {
            return VirtualFieldProcessor::new(self).search(&resolved, options);
        }

        let candidates = self.source.scan(entity, &resolved.native_filter())?;
        options.deadline.check()?;

        let hard_match_count = candidates.len();
        let soft_skipped = options.skips_soft(hard_match_count);
        if soft_skipped {
            debug!(
                "{} hard matches on {} exceed the soft scoring limit",
                hard_match_count, entity
            );
        }
        let expr = if soft_skipped || options.threshold >= 1.0 {
            ScoreExpr::empty()
        } else {
            self.score_model().build(entity, &resolved.desiderata(None))
        };

        let hits = self.score_records(candidates, &expr, options)?;
        Ok(RankedMatches {
            hits,
            candidates: hard_match_count,
            hard_match_count,
            soft_skipped,
            diagnostics: resolved.diagnostics,
        })
    }

    fn score_records(&self, records: Vec<Record>, expr: &ScoreExpr, options: &SearchOptions) -> Result<Vec<ScoredRecord>> {
        let floor = options.threshold - self.config.score_epsilon;
        let mut hits = Vec::with_capacity(records.len());
        for (i, record) in records.into_iter().enumerate() {
            if i % CHECK_INTERVAL == 0 {
                options.deadline.check()?;
            }
            let (score, explain) = expr.evaluate(&record);
            if score >= floor {
                hits.push(ScoredRecord::new(record, score, explain));
            }
        }
        Ok(hits)
    }

    /// Number of records passing the hard constraints, without scoring
    pub fn hard_match_count(&self, entity: &str, constraints: &ConstraintSet, deadline: &Deadline) -> Result<usize> {
        let options = SearchOptions::new()
            .with_threshold(1.0)
            .with_page(0, Some(0))
            .with_deadline(deadline.clone());
        Ok(self.search(entity, constraints, &options)?.hard_match_count)
    }

    /// Best `k` records, avoiding a full scoring pass where possible
    pub fn top_k(&self, entity: &str, constraints: &ConstraintSet, k: usize, deadline: &Deadline) -> Result<TopKResult> {
        TopKApproximator::new(self).top_k(entity, constraints, k, deadline)
    }

    /// Look up records by `(entity type, id)`, preserving order. Abstract
    /// entity types are looked up in each concrete descendant.
    pub fn retrieve_by_ids(&self, refs: &[(String, RecordId)]) -> Vec<Option<Record>> {
        refs.iter().map(|(entity, id)| self.retrieve_one(entity, id)).collect()
    }

    pub(crate) fn retrieve_one(&self, entity: &str, id: &RecordId) -> Option<Record> {
        if self.schema.is_abstract(entity) {
            self.schema
                .concrete_descendants(entity)
                .iter()
                .find_map(|concrete| self.source.get(concrete, id))
        } else {
            self.source.get(entity, id)
        }
    }
}
