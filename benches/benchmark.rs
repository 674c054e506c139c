// Benchmarks: full ranked search versus windowed top-K
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use rand::prelude::*;
use siftrank_core::{Deadline, EntityDef, FieldMeta, InMemorySchema, Record, RecordStore, Value};
use siftrank_ranking::{Constraint, ConstraintSet, EngineConfig, MatchEngine, SearchOptions};
use std::sync::Arc;

fn schema() -> InMemorySchema {
    InMemorySchema::new().with_entity(
        EntityDef::new("Sample")
            .with_field(FieldMeta::ordinal("depth"))
            .with_field(FieldMeta::ordinal("grain"))
            .with_field(FieldMeta::categorical("kind")),
    )
}

fn generate_records(n: usize) -> Vec<Record> {
    let mut rng = rand::rng();
    let kinds = ["rock", "sand", "silt", "clay"];
    (0..n)
        .map(|i| {
            Record::new("Sample", i as u64)
                .with_field("depth", rng.random_range(0.0..100.0))
                .with_field("grain", rng.random_range(0.0..500.0))
                .with_field("kind", *kinds.choose(&mut rng).unwrap())
        })
        .collect()
}

fn engine(n: usize) -> MatchEngine {
    let store = RecordStore::new();
    store.batch_upsert(generate_records(n)).unwrap();
    MatchEngine::new(Arc::new(schema()), Arc::new(store), EngineConfig::default())
}

fn query() -> ConstraintSet {
    ConstraintSet::single([
        Constraint::soft_range("depth", Some(Value::Int(40)), Some(Value::Int(60))),
        Constraint::soft_range("grain", Some(Value::Int(100)), Some(Value::Int(120))),
        Constraint::neq("kind", "silt"),
    ])
}

fn benchmark_load(c: &mut Criterion) {
    let mut group = c.benchmark_group("load");

    for size in [100, 1000, 10000].iter() {
        group.bench_with_input(BenchmarkId::new("batch_upsert", size), size, |b, &size| {
            let records = generate_records(size);
            b.iter(|| {
                let store = RecordStore::new();
                store.batch_upsert(black_box(records.clone())).unwrap();
            });
        });
    }

    group.finish();
}

fn benchmark_search(c: &mut Criterion) {
    let mut group = c.benchmark_group("search");
    let engine = engine(10_000);
    let query = query();

    group.bench_function("full_ranked", |b| {
        b.iter(|| {
            let options = SearchOptions::new().with_page(0, Some(10));
            black_box(engine.search("Sample", black_box(&query), &options).unwrap());
        });
    });

    group.bench_function("hard_only", |b| {
        b.iter(|| {
            let options = SearchOptions::new().with_threshold(1.0).with_page(0, Some(10));
            black_box(engine.search("Sample", black_box(&query), &options).unwrap());
        });
    });

    for k in [10, 100].iter() {
        group.bench_with_input(BenchmarkId::new("top_k", k), k, |b, &k| {
            b.iter(|| {
                black_box(engine.top_k("Sample", black_box(&query), k, &Deadline::none()).unwrap());
            });
        });
    }

    group.finish();
}

fn benchmark_concurrent_queries(c: &mut Criterion) {
    let mut group = c.benchmark_group("concurrent_queries");
    let engine = Arc::new(engine(1000));
    let query = Arc::new(query());

    group.bench_function("ten_threads", |b| {
        b.iter(|| {
            use std::thread;
            let handles: Vec<_> = (0..10)
                .map(|_| {
                    let engine = engine.clone();
                    let query = query.clone();
                    thread::spawn(move || engine.top_k("Sample", &query, 10, &Deadline::none()).map(|r| r.hits.len()))
                })
                .collect();

            for handle in handles {
                black_box(handle.join().unwrap().unwrap());
            }
        });
    });

    group.finish();
}

criterion_group!(benches, benchmark_load, benchmark_search, benchmark_concurrent_queries);
criterion_main!(benches);
