//! # siftrank Stats
//!
//! Cached statistical estimates feeding the siftrank scoring model.
//!
//! - [`StatisticsStore`] - TTL cache with per-key recomputation locks
//! - [`StatisticPersistence`] - Storage contract, with [`MemoryStatistics`]
//!   and the LMDB-backed [`LmdbStatistics`]
//! - Percentile lookups ([`StatisticsStore::next_percentile`],
//!   [`StatisticsStore::segment_bounds`]) used to place top-K scan windows
//! - Cardinality estimation for enumerable fields
//!
//! ```rust
//! use siftrank_stats::{StatisticKind, StatisticsStore, StatsConfig};
//!
//! let stats = StatisticsStore::in_memory(StatsConfig::default());
//! let spread = stats.get_or_compute("Sample", "depth", StatisticKind::Stddev, || Some(28.9));
//! assert_eq!(spread, Some(28.9));
//! ```

pub mod error;
pub mod lmdb_storage;
pub mod persistence;
pub mod statistic;
pub mod store;

pub use error::{Result, StatsError};
pub use lmdb_storage::LmdbStatistics;
pub use persistence::{MemoryStatistics, StatisticPersistence};
pub use statistic::{Direction, FieldStatistic, StatKey, StatisticKind};
pub use store::{StatisticsStore, StatsConfig, ENTITY_FIELD};
