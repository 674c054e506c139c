//! # siftrank Core
//!
//! Core library for the siftrank search and ranking engine.
//!
//! This crate provides the data model the ranking engine works on:
//!
//! - [`Value`] - A typed field value (numeric, time, text, reference)
//! - [`Record`] - A row of one entity type with a [`RecordId`] primary key
//! - [`SchemaRegistry`] - Field metadata and the entity type hierarchy
//! - [`RecordStore`] - In-memory implementation of the [`DataSource`] contract
//! - [`Expr`] - Boolean filter expressions used for hard constraints
//! - [`Deadline`] - Wall-clock limits and cooperative cancellation
//!
//! ## Example
//!
//! ```rust
//! use siftrank_core::{DataSource, EntityDef, Expr, FieldMeta, InMemorySchema, Record, RecordStore};
//!
//! let schema = InMemorySchema::new()
//!     .with_entity(EntityDef::new("Sample").with_field(FieldMeta::ordinal("depth")));
//!
//! let store = RecordStore::new();
//! store.upsert(Record::new("Sample", 1u64).with_field("depth", 42.0)).unwrap();
//!
//! let hits = store.scan("Sample", &Expr::between("depth", Some(40.0), Some(60.0))).unwrap();
//! assert_eq!(hits.len(), 1);
//! ```

pub mod cancel;
pub mod collection;
pub mod dataset;
pub mod error;
pub mod filter;
pub mod record;
pub mod schema;
pub mod value;

pub use cancel::{CancellationToken, Deadline};
pub use collection::{Aggregate, DataSource, RecordStore};
pub use dataset::{coerce_value, Dataset, RawRecord};
pub use error::{Error, Result};
pub use filter::{Expr, Filter};
pub use record::{Record, RecordId};
pub use schema::{EntityDef, FieldKind, FieldMeta, InMemorySchema, SchemaRegistry};
pub use value::Value;
