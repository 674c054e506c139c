//! Approximate top-K retrieval
//!
//! Instead of scoring every hard match, each soft-constrained field gets a
//! scan window around its range, bounded by recorded percentiles. Windows
//! grow outward one percentile step per iteration until no record outside
//! them can beat the current k-th best score, or the iteration cap is hit.

use crate::constraint::ConstraintSet;
use crate::engine::{MatchEngine, SearchOptions};
use crate::error::{Diagnostic, Result};
use crate::explain::{sort_ranked, ScoredRecord};
use crate::resolve::ResolvedQuery;
use crate::score::ScoreExpr;
use ahash::AHashSet;
use serde::Serialize;
use siftrank_core::{Deadline, Expr, Record, RecordId};
use siftrank_stats::Direction;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum TopKState {
    Init,
    Expanding { iteration: usize },
    /// No unseen record can outscore the result
    Converged,
    /// Iteration cap reached; the result is best-effort
    Exhausted,
}

/// How a top-K result was produced
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TopKStrategy {
    /// Percentile window expansion
    Windowed,
    /// Full search truncated to k
    FullScan,
    /// No soft opinion; first k hard matches in key order
    KeyOrder,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TopKResult {
    pub hits: Vec<ScoredRecord>,
    pub state: TopKState,
    pub strategy: TopKStrategy,
    /// Expansion iterations run after the initial windows
    pub iterations: usize,
    /// Records fetched from the data source
    pub fetched: usize,
    pub ignored: Vec<Diagnostic>,
}

impl TopKResult {
    /// Whether the result may miss records that outscore its last hit
    pub fn is_approximate(&self) -> bool {
        self.state == TopKState::Exhausted
    }

    pub fn ids(&self) -> Vec<RecordId> {
        self.hits.iter().map(|h| h.record.id.clone()).collect()
    }
}

/// Scan window of one soft-constrained field; a `None` edge is retired
#[derive(Debug, Clone)]
struct FieldWindow {
    term: usize,
    column: String,
    below: Option<f64>,
    above: Option<f64>,
}

impl FieldWindow {
    fn retired(&self) -> bool {
        self.below.is_none() && self.above.is_none()
    }
}

/// Best k records seen so far
struct Running<'e> {
    k: usize,
    expr: &'e ScoreExpr,
    hits: Vec<ScoredRecord>,
    seen: AHashSet<RecordId>,
    fetched: usize,
}

impl<'e> Running<'e> {
    fn new(k: usize, expr: &'e ScoreExpr) -> Self {
        Self {
            k,
            expr,
            hits: Vec::with_capacity(k + 1),
            seen: AHashSet::new(),
            fetched: 0,
        }
    }

    fn kth_score(&self) -> Option<f64> {
        if self.hits.len() < self.k {
            None
        } else {
            self.hits.last().map(|h| h.score)
        }
    }

    fn merge(&mut self, records: Vec<Record>) {
        self.fetched += records.len();
        let min_score = self.kth_score();
        for record in records {
            if !self.seen.insert(record.id.clone()) {
                continue;
            }
            let (score, explain) = self.expr.evaluate(&record);
            if min_score.is_some_and(|min| score < min) {
                continue;
            }
            self.hits.push(ScoredRecord::new(record, score, explain));
        }
        sort_ranked(&mut self.hits, &[]);
        self.hits.truncate(self.k);
    }
}

pub struct TopKApproximator<'a> {
    engine: &'a MatchEngine,
}

impl<'a> TopKApproximator<'a> {
    pub fn new(engine: &'a MatchEngine) -> Self {
        Self { engine }
    }

    pub fn top_k(&self, entity: &str, constraints: &ConstraintSet, k: usize, deadline: &Deadline) -> Result<TopKResult> {
        deadline.check()?;
        let concrete = self.engine.concrete_types(entity)?;
        if k == 0 || self.engine.schema().is_abstract(entity) || concrete.len() != 1 {
            return self.full_scan(entity, constraints, k, deadline);
        }

        let resolved = ResolvedQuery::resolve(self.engine.schema(), entity, constraints);
        if resolved.has_virtual() {
            return self.full_scan(entity, constraints, k, deadline);
        }
        let desiderata = resolved.desiderata(None);
        if desiderata.is_empty() {
            return self.key_order(&resolved, k, deadline);
        }
        if self.engine.source().count(entity) <= k {
            return self.full_scan(entity, constraints, k, deadline);
        }

        let expr = self.engine.score_model().build(entity, &desiderata);
        if !expr.terms.iter().any(|t| t.has_opinion()) {
            return self.key_order(&resolved, k, deadline);
        }
        self.windowed(&resolved, &expr, k, deadline)
    }

    fn full_scan(&self, entity: &str, constraints: &ConstraintSet, k: usize, deadline: &Deadline) -> Result<TopKResult> {
        let options = SearchOptions::new()
            .with_threshold(0.0)
            .with_page(0, Some(k))
            .with_deadline(deadline.clone());
        let response = self.engine.search(entity, constraints, &options)?;
        debug!("Top-{} on {} by full search", k, entity);
        Ok(TopKResult {
            hits: response.hits,
            state: TopKState::Converged,
            strategy: TopKStrategy::FullScan,
            iterations: 0,
            fetched: response.stats.candidates,
            ignored: response.ignored,
        })
    }

    fn key_order(&self, resolved: &ResolvedQuery, k: usize, deadline: &Deadline) -> Result<TopKResult> {
        let records = self
            .engine
            .source()
            .scan(&resolved.entity, &resolved.native_filter())?;
        deadline.check()?;
        let fetched = records.len();
        let hits = records.into_iter().take(k).map(ScoredRecord::perfect).collect();
        debug!("Top-{} on {} in key order", k, resolved.entity);
        Ok(TopKResult {
            hits,
            state: TopKState::Converged,
            strategy: TopKStrategy::KeyOrder,
            iterations: 0,
            fetched,
            ignored: resolved.diagnostics.clone(),
        })
    }

    fn windowed(&self, resolved: &ResolvedQuery, expr: &ScoreExpr, k: usize, deadline: &Deadline) -> Result<TopKResult> {
        let entity = resolved.entity.as_str();
        let source = self.engine.source();
        let stats = self.engine.stats();
        let config = self.engine.config();
        let hard = resolved.native_filter();
        let fetch = |window: Expr| -> Result<Vec<Record>> {
            Ok(source.scan(entity, &Expr::and(vec![hard.clone(), window]))?)
        };

        let mut state = TopKState::Init;
        let mut running = Running::new(k, expr);
        let mut windows = Vec::new();
        for (idx, term) in expr.terms.iter().enumerate().filter(|(_, t)| t.has_opinion()) {
            let (pl, ph) = stats.segment_bounds(entity, &term.column, term.lo, term.hi)?;
            // A side with no bound or no enclosing percentile is open from the start
            let window = FieldWindow {
                term: idx,
                column: term.column.clone(),
                below: term.lo.and(pl),
                above: term.hi.and(ph),
            };
            running.merge(fetch(Expr::between(&window.column, window.below, window.above))?);
            windows.push(window);
        }
        debug!("Top-{} on {}: {:?} fetched {} records", k, entity, state, running.fetched);

        let mut iterations = 0;
        loop {
            deadline.check()?;
            let bound = unseen_bound(expr, &windows);
            if running.kth_score().is_some_and(|kth| kth >= bound - config.score_epsilon) {
                state = TopKState::Converged;
                break;
            }
            if windows.iter().all(FieldWindow::retired) {
                // Every record with a value in a windowed field was fetched
                running.merge(fetch(Expr::True)?);
                state = TopKState::Converged;
                break;
            }
            if iterations >= config.max_topk_iterations {
                state = TopKState::Exhausted;
                break;
            }
            iterations += 1;
            state = TopKState::Expanding { iteration: iterations };

            for window in &mut windows {
                if let Some(edge) = window.below {
                    let next = stats.next_percentile(entity, &window.column, edge, Direction::Lt);
                    running.merge(fetch(Expr::range(&window.column, next, true, Some(edge), false))?);
                    window.below = next;
                }
                if let Some(edge) = window.above {
                    let next = stats.next_percentile(entity, &window.column, edge, Direction::Gt);
                    running.merge(fetch(Expr::range(&window.column, Some(edge), false, next, true))?);
                    window.above = next;
                }
            }
            debug!(
                "Top-{} on {}: {:?}, {} fetched, k-th score {:?}, unseen bound {}",
                k,
                entity,
                state,
                running.fetched,
                running.kth_score(),
                unseen_bound(expr, &windows)
            );
        }
        debug!("Top-{} on {} finished {:?} after {} iterations", k, entity, state, iterations);

        Ok(TopKResult {
            hits: running.hits,
            state,
            strategy: TopKStrategy::Windowed,
            iterations,
            fetched: running.fetched,
            ignored: resolved.diagnostics.clone(),
        })
    }
}

/// Highest score a record outside every window could reach. Retired sides
/// have nothing left beyond them, so only a null value remains (score 0);
/// fields without an opinion score 1.0 regardless.
fn unseen_bound(expr: &ScoreExpr, windows: &[FieldWindow]) -> f64 {
    if expr.terms.is_empty() {
        return 1.0;
    }
    let total: f64 = expr
        .terms
        .iter()
        .enumerate()
        .map(|(idx, term)| match windows.iter().find(|w| w.term == idx) {
            Some(window) => {
                let below = window.below.map_or(0.0, |edge| term.score_at(edge));
                let above = window.above.map_or(0.0, |edge| term.score_at(edge));
                below.max(above)
            }
            None => 1.0,
        })
        .sum();
    total / expr.terms.len() as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::constraint::Constraint;
    use siftrank_core::{EntityDef, FieldMeta, InMemorySchema, RecordStore, Value};
    use std::sync::Arc;

    fn engine(rows: u64, config: EngineConfig) -> MatchEngine {
        let schema = InMemorySchema::new().with_entity(
            EntityDef::new("Sample")
                .with_field(FieldMeta::ordinal("depth"))
                .with_field(FieldMeta::ordinal("age"))
                .with_field(FieldMeta::categorical("kind")),
        );
        let store = RecordStore::new();
        for i in 0..rows {
            let kind = if i % 3 == 0 { "rock" } else { "sand" };
            store
                .upsert(
                    Record::new("Sample", i)
                        .with_field("depth", (i % 100) as f64 + (i as f64) / (rows as f64))
                        .with_field("age", ((i * 37) % 1000) as f64)
                        .with_field("kind", kind),
                )
                .unwrap();
        }
        MatchEngine::new(Arc::new(schema), Arc::new(store), config)
    }

    fn range(field: &str, lo: i64, hi: i64) -> Constraint {
        Constraint::soft_range(field, Some(Value::Int(lo)), Some(Value::Int(hi)))
    }

    fn full_scores(engine: &MatchEngine, set: &ConstraintSet, k: usize) -> Vec<f64> {
        engine
            .search("Sample", set, &SearchOptions::new().with_page(0, Some(k)))
            .unwrap()
            .scores()
    }

    #[test]
    fn test_converges_on_inner_window() {
        let engine = engine(2000, EngineConfig::default());
        let set = ConstraintSet::single([range("depth", 40, 60)]);
        let result = engine.top_k("Sample", &set, 10, &Deadline::none()).unwrap();
        assert_eq!(result.strategy, TopKStrategy::Windowed);
        assert_eq!(result.state, TopKState::Converged);
        assert_eq!(result.hits.len(), 10);
        assert!(result.hits.iter().all(|h| h.score == 1.0));
        assert!(result.fetched < 2000);
    }

    #[test]
    fn test_matches_full_search_scores() {
        let engine = engine(2000, EngineConfig::default());
        let set = ConstraintSet::single([
            range("depth", 150, 160),
            range("age", 990, 2000),
            Constraint::eq("kind", "rock"),
        ]);
        let result = engine.top_k("Sample", &set, 5, &Deadline::none()).unwrap();
        assert_eq!(result.state, TopKState::Converged);
        let scores: Vec<f64> = result.hits.iter().map(|h| h.score).collect();
        let expected = full_scores(&engine, &set, 5);
        assert_eq!(scores.len(), 5);
        for (got, want) in scores.iter().zip(&expected) {
            assert!((got - want).abs() < 1e-12, "{} != {}", got, want);
        }
        assert!(result.hits.iter().all(|h| h.record.get("kind") == Some(&Value::from("rock"))));
    }

    #[test]
    fn test_exhausted_is_sorted_and_flagged() {
        let config = EngineConfig { max_topk_iterations: 0, ..EngineConfig::default() };
        let engine = engine(2000, config);
        let set = ConstraintSet::single([range("depth", 200, 300)]);
        let result = engine.top_k("Sample", &set, 50, &Deadline::none()).unwrap();
        assert_eq!(result.state, TopKState::Exhausted);
        assert!(result.is_approximate());
        assert!(result.hits.len() <= 50);
        let scores: Vec<f64> = result.hits.iter().map(|h| h.score).collect();
        assert!(scores.windows(2).all(|w| w[0] >= w[1]));
    }

    #[test]
    fn test_degenerate_strategies() {
        let engine = engine(200, EngineConfig::default());

        let hard_only = ConstraintSet::single([Constraint::eq("kind", "rock")]);
        let result = engine.top_k("Sample", &hard_only, 3, &Deadline::none()).unwrap();
        assert_eq!(result.strategy, TopKStrategy::KeyOrder);
        assert_eq!(result.ids(), vec![RecordId::Integer(0), RecordId::Integer(3), RecordId::Integer(6)]);

        let soft = ConstraintSet::single([range("depth", 10, 20)]);
        let result = engine.top_k("Sample", &soft, 500, &Deadline::none()).unwrap();
        assert_eq!(result.strategy, TopKStrategy::FullScan);
        assert_eq!(result.hits.len(), 200);

        let result = engine.top_k("Sample", &soft, 0, &Deadline::none()).unwrap();
        assert!(result.hits.is_empty());
    }

    #[test]
    fn test_unseen_bound() {
        let expr = ScoreExpr {
            terms: vec![crate::score::ScoreTerm {
                key: "depth".into(),
                column: "depth".into(),
                lo: Some(40.0),
                hi: Some(60.0),
                spread: Some(10.0),
            }],
        };
        let window = FieldWindow { term: 0, column: "depth".into(), below: Some(30.0), above: None };
        assert!((unseen_bound(&expr, &[window]) - 0.5).abs() < 1e-12);
        let retired = FieldWindow { term: 0, column: "depth".into(), below: None, above: None };
        assert_eq!(unseen_bound(&expr, &[retired]), 0.0);
        assert_eq!(unseen_bound(&expr, &[]), 1.0);
    }
}
