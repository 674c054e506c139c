//! # siftrank Ranking
//!
//! Soft-constraint search and ranking over a [`DataSource`](siftrank_core::DataSource).
//!
//! Hard constraints filter records; soft (`IN_SOFT`) ranges score them in
//! `[0, 1]` by distance from the range, scaled by the field's estimated
//! spread. Entry points live on [`MatchEngine`]:
//!
//! - [`MatchEngine::search`] - filter, score, threshold and rank
//! - [`MatchEngine::top_k`] - percentile-window top-K retrieval
//! - [`MatchEngine::hard_match_count`] - hard matches only, no scoring
//! - [`MatchEngine::retrieve_by_ids`] - order-preserving batch lookup
//!
//! Constraints on virtual fields (fields read through a relation) are
//! handled by [`VirtualFieldProcessor`], which `search` dispatches to.
//!
//! ## Example
//!
//! ```rust
//! use siftrank_core::{EntityDef, FieldMeta, InMemorySchema, Record, RecordStore, Value};
//! use siftrank_ranking::{Constraint, ConstraintSet, EngineConfig, MatchEngine, SearchOptions};
//! use std::sync::Arc;
//!
//! let schema = InMemorySchema::new()
//!     .with_entity(EntityDef::new("Sample").with_field(FieldMeta::ordinal("depth")));
//! let store = RecordStore::new();
//! for i in 0..100u64 {
//!     store.upsert(Record::new("Sample", i).with_field("depth", i as f64)).unwrap();
//! }
//!
//! let engine = MatchEngine::new(Arc::new(schema), Arc::new(store), EngineConfig::default());
//! let query = ConstraintSet::single([
//!     Constraint::soft_range("depth", Some(Value::Int(40)), Some(Value::Int(60))),
//! ]);
//! let response = engine.search("Sample", &query, &SearchOptions::new()).unwrap();
//! assert_eq!(response.hits[0].score, 1.0);
//! ```

pub mod config;
pub mod constraint;
pub mod engine;
pub mod error;
pub mod explain;
pub mod resolve;
pub mod score;
pub mod topk;
pub mod virtual_field;

pub use config::EngineConfig;
pub use constraint::{Constraint, ConstraintGroup, ConstraintSet, Desiderata, Operand, Operator};
pub use engine::{MatchEngine, RankedMatches, SearchOptions};
pub use error::{Diagnostic, RankingError, Result};
pub use explain::{ScoredRecord, SearchResponse, SearchStats, SortKey};
pub use resolve::{Relation, ResolvedConstraint, ResolvedQuery};
pub use score::{combine, unit_score, ScoreExpr, ScoreModel, ScoreTerm};
pub use topk::{TopKApproximator, TopKResult, TopKState, TopKStrategy};
pub use virtual_field::VirtualFieldProcessor;
