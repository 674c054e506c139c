//! # siftrank
//!
//! A soft-constraint multi-field search and ranking engine.
//!
//! Given field constraints over a collection of records, siftrank filters
//! records by the hard constraints, scores them in `[0, 1]` by how close
//! they come to the soft ranges, and returns them ranked. Constraints can
//! reach through relations to other entity types, and an approximate top-K
//! mode avoids scoring the whole collection.
//!
//! ## Quick Start
//!
//! ### From the command line
//!
//! ```bash
//! siftrank --data samples.json --entity Sample \
//!     --query '{"depth": {"op": "in_soft", "lo": 40, "hi": 60}}' --top-k 10
//! ```
//!
//! ### As a Library
//!
//! ```rust
//! use siftrank::prelude::*;
//! use std::sync::Arc;
//!
//! let schema = InMemorySchema::new()
//!     .with_entity(EntityDef::new("Sample").with_field(FieldMeta::ordinal("depth")));
//! let store = RecordStore::new();
//! for i in 0..1000u64 {
//!     store.upsert(Record::new("Sample", i).with_field("depth", (i % 100) as f64)).unwrap();
//! }
//!
//! let engine = MatchEngine::new(Arc::new(schema), Arc::new(store), EngineConfig::default());
//! let (query, ignored) = ConstraintSet::from_str_json(
//!     r#"{"depth": {"op": "in_soft", "lo": 40, "hi": 60}}"#,
//! ).unwrap();
//! assert!(ignored.is_empty());
//!
//! let top = engine.top_k("Sample", &query, 10, &Deadline::none()).unwrap();
//! assert!(top.hits.iter().all(|hit| hit.score == 1.0));
//! ```
//!
//! ## Crate Structure
//!
//! - [`siftrank-core`](https://docs.rs/siftrank-core) - Records, schema, filter expressions, in-memory record store
//! - [`siftrank-stats`](https://docs.rs/siftrank-stats) - Statistics cache (spreads, percentiles, counts), in-memory and LMDB backends
//! - [`siftrank-ranking`](https://docs.rs/siftrank-ranking) - Constraint sets, scoring, search, virtual fields, top-K

// Re-export core types
pub use siftrank_core::{
    CancellationToken, DataSource, Dataset, Deadline, EntityDef, Expr, FieldKind, FieldMeta,
    InMemorySchema, Record, RecordId, RecordStore, SchemaRegistry, Value,
};

// Re-export statistics
pub use siftrank_stats::{LmdbStatistics, MemoryStatistics, StatisticsStore, StatsConfig};

// Re-export ranking
pub use siftrank_ranking::{
    Constraint, ConstraintGroup, ConstraintSet, Diagnostic, EngineConfig, MatchEngine,
    RankingError, ScoredRecord, SearchOptions, SearchResponse, SortKey, TopKResult, TopKState,
};

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::{
        CancellationToken, Constraint, ConstraintGroup, ConstraintSet, DataSource, Dataset,
        Deadline, Diagnostic, EngineConfig, EntityDef, FieldMeta, InMemorySchema, MatchEngine,
        Record, RecordId, RecordStore, SchemaRegistry, ScoredRecord, SearchOptions,
        SearchResponse, SortKey, StatisticsStore, TopKResult, TopKState, Value,
    };
}
