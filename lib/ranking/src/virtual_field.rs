//! Constraints on fields read through a relation
//!
//! The base entity is scanned with its own hard constraints, which selects a
//! superset of the matches. Each candidate's related records are then
//! resolved and the full groups, including constraints on related fields,
//! are evaluated in process. A candidate whose relation points at a record
//! that no longer exists is dropped.

use crate::engine::{MatchEngine, RankedMatches, SearchOptions, CHECK_INTERVAL};
use crate::error::Result;
use crate::explain::{sort_ranked, ScoredRecord};
use crate::resolve::{Relation, ResolvedQuery};
use crate::score::{combine, ScoreExpr};
use ahash::AHashMap;
use siftrank_core::{Expr, Record, RecordId, Value};
use std::collections::BTreeMap;
use tracing::debug;

/// How related records are looked up
enum Lookup {
    /// Whole related table loaded up front
    Prefetched(AHashMap<RecordId, Record>),
    PerRecord,
}

/// Hard filters of one group, split by scope
struct GroupFilter {
    native: Expr,
    related: Vec<(String, Expr)>,
}

/// Related record of a candidate; `None` for a null optional relation
type RelatedRecords = BTreeMap<String, Option<Record>>;

pub struct VirtualFieldProcessor<'a> {
    engine: &'a MatchEngine,
}

impl<'a> VirtualFieldProcessor<'a> {
    pub fn new(engine: &'a MatchEngine) -> Self {
        Self { engine }
    }

    pub fn search(&self, resolved: &ResolvedQuery, options: &SearchOptions) -> Result<RankedMatches> {
        let entity = resolved.entity.as_str();
        let config = self.engine.config();
        let candidates = self.engine.source().scan(entity, &resolved.native_filter())?;
        options.deadline.check()?;
        let fetched = candidates.len();

        let relations = resolved.relations();
        let mut lookups: BTreeMap<&str, Lookup> = BTreeMap::new();
        for (name, relation) in &relations {
            lookups.insert(name.as_str(), self.lookup(entity, relation, fetched)?);
        }
        let filters: Vec<GroupFilter> = resolved
            .groups
            .iter()
            .map(|g| GroupFilter {
                native: g.filter(None),
                related: relations.keys().map(|name| (name.clone(), g.filter(Some(name)))).collect(),
            })
            .collect();
        let placeholders: BTreeMap<&str, Record> = relations
            .iter()
            .map(|(name, r)| (name.as_str(), Record::new(r.target_entity.clone(), 0u64)))
            .collect();

        let mut matched: Vec<(Record, RelatedRecords)> = Vec::new();
        for (i, record) in candidates.into_iter().enumerate() {
            if i % CHECK_INTERVAL == 0 {
                options.deadline.check()?;
            }
            let Some(related) = self.resolve_related(&record, &relations, &lookups) else {
                continue;
            };
            let matches = filters.is_empty()
                || filters.iter().any(|f| {
                    f.native.evaluate(&record)
                        && f.related.iter().all(|(name, expr)| {
                            let target = related
                                .get(name)
                                .and_then(Option::as_ref)
                                .or_else(|| placeholders.get(name.as_str()));
                            target.is_some_and(|t| expr.evaluate(t))
                        })
                });
            if matches {
                matched.push((record, related));
            }
        }

        let hard_match_count = matched.len();
        let soft_skipped = options.skip_soft_above.is_some_and(|limit| hard_match_count > limit);
        let scoring = !soft_skipped && options.threshold < 1.0;
        let model = self.engine.score_model();
        let base_expr = if scoring {
            model.build(entity, &resolved.desiderata(None))
        } else {
            ScoreExpr::empty()
        };
        let base_weight = resolved.soft_weight(None);
        let related_exprs: Vec<(String, ScoreExpr, usize)> = relations
            .iter()
            .map(|(name, relation)| {
                let expr = if scoring {
                    model
                        .build(&relation.target_entity, &resolved.desiderata(Some(name)))
                        .with_key_prefix(&format!("{}.", name))
                } else {
                    ScoreExpr::empty()
                };
                (name.clone(), expr, resolved.soft_weight(Some(name)))
            })
            .collect();

        let floor = options.threshold - config.score_epsilon;
        let mut hits = Vec::new();
        for (i, (record, related)) in matched.into_iter().enumerate() {
            if i % CHECK_INTERVAL == 0 {
                options.deadline.check()?;
            }
            let mut explain = base_expr.explain(Some(&record));
            let (mut weighted, mut weight) = (0.0, 0);
            if !base_expr.is_empty() {
                weighted += base_weight as f64 * combine(&explain);
                weight += base_weight;
            }
            for (name, expr, expr_weight) in &related_exprs {
                if expr.is_empty() {
                    continue;
                }
                let part = expr.explain(related.get(name).and_then(Option::as_ref));
                weighted += *expr_weight as f64 * combine(&part);
                weight += expr_weight;
                explain.extend(part);
            }
            let score = if weight == 0 { 1.0 } else { weighted / weight as f64 };
            if score >= floor {
                hits.push(ScoredRecord::new(record, score, explain));
            }
        }
        sort_ranked(&mut hits, &options.order);

        Ok(RankedMatches {
            hits,
            candidates: fetched,
            hard_match_count,
            soft_skipped,
            diagnostics: resolved.diagnostics.clone(),
        })
    }

    /// Small related tables are loaded whole; larger ones are read per record
    fn lookup(&self, entity: &str, relation: &Relation, owner_rows: usize) -> Result<Lookup> {
        let config = self.engine.config();
        let source = self.engine.source();
        let estimate = self.engine.stats().estimate_cardinality(
            source,
            entity,
            &relation.through,
            owner_rows,
            config.max_enumerable,
            config.max_distinct_scan,
        );
        match estimate {
            Some(n) if n <= config.max_enumerable => {
                let mut table = AHashMap::with_capacity(n);
                for concrete in self.engine.concrete_types(&relation.target_entity)? {
                    for record in source.scan(&concrete, &Expr::True)? {
                        table.insert(record.id.clone(), record);
                    }
                }
                debug!("Prefetched {} {} records for {}", table.len(), relation.target_entity, relation.name());
                Ok(Lookup::Prefetched(table))
            }
            _ => {
                debug!(
                    "{} is too large to enumerate ({:?}); resolving {} per record",
                    relation.target_entity,
                    estimate,
                    relation.name()
                );
                Ok(Lookup::PerRecord)
            }
        }
    }

    /// Related records of a candidate, or `None` when a relation cannot be
    /// resolved and the candidate must be dropped
    fn resolve_related(
        &self,
        record: &Record,
        relations: &BTreeMap<String, Relation>,
        lookups: &BTreeMap<&str, Lookup>,
    ) -> Option<RelatedRecords> {
        let mut related = RelatedRecords::new();
        for (name, relation) in relations {
            let Some(id) = record.get(name).and_then(Value::as_record_id) else {
                if !relation.through.nullable {
                    debug!("{} {} has no {}; dropping it", record.entity, record.id, name);
                    return None;
                }
                related.insert(name.clone(), None);
                continue;
            };
            let target = match lookups.get(name.as_str()) {
                Some(Lookup::Prefetched(table)) => table.get(&id).cloned(),
                _ => self.engine.retrieve_one(&relation.target_entity, &id),
            };
            match target {
                Some(target) => {
                    related.insert(name.clone(), Some(target));
                }
                None => {
                    debug!(
                        "{} {} references missing {} {}; dropping it",
                        record.entity, record.id, relation.target_entity, id
                    );
                    return None;
                }
            }
        }
        Some(related)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::constraint::{Constraint, ConstraintGroup, ConstraintSet};
    use siftrank_core::{EntityDef, FieldMeta, InMemorySchema, RecordStore};
    use std::sync::Arc;

    fn library(max_enumerable: usize) -> MatchEngine {
        let schema = InMemorySchema::new()
            .with_entity(
                EntityDef::new("Author")
                    .with_field(FieldMeta::categorical("country"))
                    .with_field(FieldMeta::ordinal("born")),
            )
            .with_entity(
                EntityDef::new("Book")
                    .with_field(FieldMeta::ordinal("pages"))
                    .with_field(FieldMeta::relational("author", "Author"))
                    .with_field(FieldMeta::virtual_field("author_country", "author", "Author", "country"))
                    .with_field(FieldMeta::virtual_field("author_born", "author", "Author", "born")),
            );
        let store = RecordStore::new();
        let authors = [(1u64, "NZ", 1950.0), (2, "NZ", 1990.0), (3, "FR", 1955.0)];
        for (id, country, born) in authors {
            store
                .upsert(Record::new("Author", id).with_field("country", country).with_field("born", born))
                .unwrap();
        }
        let books = [(10u64, Some(1u64), 300.0), (11, Some(2), 310.0), (12, Some(3), 320.0), (13, Some(99), 300.0), (14, None, 305.0)];
        for (id, author, pages) in books {
            let book = Record::new("Book", id).with_field("pages", pages);
            let book = match author {
                Some(a) => book.with_field("author", Value::Ref(RecordId::Integer(a))),
                None => book.with_field("author", Value::Null),
            };
            store.upsert(book).unwrap();
        }
        let config = EngineConfig { max_enumerable, ..EngineConfig::default() };
        MatchEngine::new(Arc::new(schema), Arc::new(store), config)
    }

    fn ids(engine: &MatchEngine, set: &ConstraintSet, threshold: f64) -> Vec<RecordId> {
        engine
            .search("Book", set, &SearchOptions::new().with_threshold(threshold))
            .unwrap()
            .ids()
    }

    #[test]
    fn test_related_hard_constraint() {
        for max_enumerable in [100, 0] {
            let engine = library(max_enumerable);
            let set = ConstraintSet::single([Constraint::eq("author_country", "NZ")]);
            assert_eq!(ids(&engine, &set, 0.0), vec![RecordId::Integer(10), RecordId::Integer(11)]);
        }
    }

    #[test]
    fn test_dangling_reference_dropped() {
        let engine = library(100);
        // Every book scores 1.0 on pages; book 13's author does not exist
        let set = ConstraintSet::single([
            Constraint::soft_range("pages", Some(Value::Int(0)), Some(Value::Int(1000))),
            Constraint::neq("author_country", "XX"),
        ]);
        let found = ids(&engine, &set, 0.0);
        assert!(!found.contains(&RecordId::Integer(13)));
        // A null optional author reads as a null country, which NEQ admits
        assert!(found.contains(&RecordId::Integer(14)));
        assert_eq!(found.len(), 4);
    }

    #[test]
    fn test_weighted_score() {
        let engine = library(100);
        let set = ConstraintSet::single([
            Constraint::soft_range("pages", Some(Value::Int(300)), Some(Value::Int(305))),
            Constraint::soft_range("author_born", Some(Value::Int(1950)), Some(Value::Int(1960))),
        ]);
        let response = engine.search("Book", &set, &SearchOptions::new()).unwrap();
        let book10 = response.hits.iter().find(|h| h.record.id == RecordId::Integer(10)).unwrap();
        assert_eq!(book10.score, 1.0);
        assert!(book10.explain.contains_key("author.born"));
        assert!(book10.explain.contains_key("pages"));

        // Book 11 misses both ranges; its author's score weighs as much as its own
        let book11 = response.hits.iter().find(|h| h.record.id == RecordId::Integer(11)).unwrap();
        let born = book11.explain["author.born"];
        assert!(born < 1.0);
        assert!((book11.score - (book11.explain["pages"] + born) / 2.0).abs() < 1e-12);
        assert_eq!(response.hits[0].record.id, RecordId::Integer(10));
    }

    #[test]
    fn test_weight_counts_repeated_soft_constraints() {
        let engine = library(100);
        let pages = || Constraint::soft_range("pages", Some(Value::Int(300)), Some(Value::Int(305)));
        let set = ConstraintSet::new()
            .group(ConstraintGroup::new().with(pages()))
            .group(
                ConstraintGroup::new()
                    .with(pages())
                    .with(Constraint::soft_range("author_born", Some(Value::Int(1950)), Some(Value::Int(1960)))),
            );
        let response = engine.search("Book", &set, &SearchOptions::new()).unwrap();
        let book11 = response.hits.iter().find(|h| h.record.id == RecordId::Integer(11)).unwrap();
        let (pages, born) = (book11.explain["pages"], book11.explain["author.born"]);
        assert!(pages < 1.0 && born < 1.0);
        assert!((book11.score - (2.0 * pages + born) / 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_required_relation() {
        let schema = InMemorySchema::new()
            .with_entity(EntityDef::new("Author").with_field(FieldMeta::categorical("country")))
            .with_entity(
                EntityDef::new("Book")
                    .with_field(FieldMeta::relational("author", "Author").required())
                    .with_field(FieldMeta::virtual_field("author_country", "author", "Author", "country")),
            );
        let store = RecordStore::new();
        store.upsert(Record::new("Book", 1u64)).unwrap();
        let engine = MatchEngine::new(Arc::new(schema), Arc::new(store), EngineConfig::default());
        let set = ConstraintSet::single([Constraint::neq("author_country", "XX")]);
        assert!(ids(&engine, &set, 0.0).is_empty());
    }
}
