//! Performance benchmarks for tether-engine

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use serde_json::{json, Value};
use tether_engine::{
    reconcile::{settle, Submission},
    Collection, CollectionDecl, CollectionSnapshot, Record, ResponsePolicy, Timestamp,
};

fn todos() -> Collection {
    let spec = CollectionDecl::new("todos", "id", "timestamp", "r", "c")
        .validate()
        .unwrap();
    Collection::new(spec)
}

fn pulled(count: usize) -> Vec<Value> {
    (0..count)
        .map(|i| {
            json!({
                "id": format!("todo_{i}"),
                "title": "Test todo",
                "done": i % 2 == 0,
                "timestamp": "2024-01-01T00:00:00.000Z",
            })
        })
        .collect()
}

fn bench_merge(c: &mut Criterion) {
    let mut group = c.benchmark_group("merge");
    let now = Timestamp::epoch();

    for size in [100, 500, 1000].iter() {
        group.bench_with_input(BenchmarkId::new("into_empty", size), size, |b, &size| {
            let values = pulled(size);
            b.iter(|| {
                let mut collection = todos();
                collection.merge_pulled(black_box(values.clone()), now)
            })
        });

        group.bench_with_input(BenchmarkId::new("overwrite_all", size), size, |b, &size| {
            let values = pulled(size);
            let mut collection = todos();
            collection.merge_pulled(values.clone(), now);
            b.iter(|| collection.merge_pulled(black_box(values.clone()), now))
        });
    }

    group.finish();
}

fn bench_settle(c: &mut Criterion) {
    let mut group = c.benchmark_group("settle");
    let policy = ResponsePolicy::default();
    let spec = todos().spec().clone();
    let statuses = [200u16, 500, 404, 0];

    for size in [10, 100, 500].iter() {
        group.bench_with_input(BenchmarkId::new("mixed_statuses", size), size, |b, &size| {
            let submissions: Vec<Submission> = pulled(size)
                .into_iter()
                .enumerate()
                .map(|(i, value)| Submission {
                    record: Record::pending_create(value),
                    status: statuses[i % statuses.len()],
                })
                .collect();
            b.iter(|| settle(&policy, &spec, black_box(submissions.clone()), Timestamp::epoch()))
        });
    }

    group.finish();
}

fn bench_snapshot(c: &mut Criterion) {
    let mut group = c.benchmark_group("snapshot");

    for size in [100, 500, 1000].iter() {
        let mut collection = todos();
        collection.merge_pulled(pulled(*size), Timestamp::epoch());
        let snapshot = CollectionSnapshot::capture(&collection, 1, Timestamp::epoch());
        let json = snapshot.to_json().unwrap();

        group.bench_with_input(BenchmarkId::new("to_json", size), &snapshot, |b, snapshot| {
            b.iter(|| snapshot.to_json())
        });
        group.bench_with_input(BenchmarkId::new("from_json", size), &json, |b, json| {
            b.iter(|| CollectionSnapshot::from_json(black_box(json)))
        });
    }

    group.finish();
}

criterion_group!(benches, bench_merge, bench_settle, bench_snapshot);
criterion_main!(benches);
