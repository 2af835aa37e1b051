//! Performance benchmarks for dispatch, getter propagation and snapshots.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use fluxer::{Action, Application, FileStorage, Immutable, StoreDefinition, AppConfig};
use serde_json::json;
use std::sync::Arc;
use tempfile::TempDir;

fn counter_app(stores: usize) -> Application {
    let app = Application::new();
    let batch: Vec<_> = (0..stores)
        .map(|i| {
            let store = app
                .create_store(
                    StoreDefinition::new()
                        .initial_state(|| json!({"count": 0}))
                        .on("increment", |_, state, _| {
                            let count = state
                                .get("count")
                                .and_then(|c| c.as_value().as_i64())
                                .unwrap_or(0);
                            Ok(Some(state.set("count", count + 1)))
                        }),
                )
                .unwrap();
            (format!("Counter{}", i), store)
        })
        .collect();
    app.register_stores(batch).unwrap();
    app
}

/// Benchmark one dispatch across a growing number of stores
fn bench_dispatch(c: &mut Criterion) {
    let mut group = c.benchmark_group("dispatch");

    for stores in [1, 10, 100] {
        group.bench_with_input(BenchmarkId::new("stores", stores), &stores, |b, &n| {
            let app = counter_app(n);
            b.iter(|| {
                app.dispatch(black_box(Action::bare("increment"))).unwrap();
            });
        });
    }

    group.finish();
}

/// Benchmark propagation through a chain of getters
fn bench_getter_chain(c: &mut Criterion) {
    let mut group = c.benchmark_group("getter_chain");

    for depth in [1, 10, 50] {
        group.bench_with_input(BenchmarkId::new("depth", depth), &depth, |b, &depth| {
            let app = counter_app(1);
            let mut upstream = "Counter0".to_string();
            for i in 0..depth {
                let id = format!("g{}", i);
                app.create_getter(&id, &[upstream.as_str()], |deps| deps.first().cloned())
                    .unwrap();
                upstream = id;
            }
            let last = app.getter(&upstream).unwrap();

            b.iter(|| {
                app.dispatch(Action::bare("increment")).unwrap();
                black_box(last.get_state().unwrap());
            });
        });
    }

    group.finish();
}

/// Benchmark a wide fan-in getter
fn bench_getter_fan_in(c: &mut Criterion) {
    let app = counter_app(100);
    let ids = app.store_ids();
    let deps: Vec<&str> = ids.iter().map(String::as_str).collect();
    let total = app
        .create_getter("total", &deps, |values: &[Immutable]| {
            let sum: i64 = values
                .iter()
                .filter_map(|v| v.get("count").and_then(|c| c.as_value().as_i64()))
                .sum();
            Some(json!(sum).into())
        })
        .unwrap();

    c.bench_function("getter_fan_in_100", |b| {
        b.iter(|| {
            app.dispatch(Action::bare("increment")).unwrap();
            black_box(total.get_state().unwrap());
        });
    });
}

/// Benchmark snapshot and rollback against file storage
fn bench_snapshot_rollback(c: &mut Criterion) {
    let mut group = c.benchmark_group("snapshot_rollback");

    for items in [10, 1000] {
        group.bench_with_input(BenchmarkId::new("items", items), &items, |b, &items| {
            let dir = TempDir::new().unwrap();
            let storage = Arc::new(FileStorage::new(dir.path()).unwrap());
            let app = Application::with_storage(AppConfig::default(), storage);
            let store = app
                .create_store(
                    StoreDefinition::new()
                        .initial_state(move || json!((0..items).collect::<Vec<_>>()))
                        .on("push", |_, state, data| Ok(Some(state.push(data.clone())))),
                )
                .unwrap();
            app.register_stores([("Items", store)]).unwrap();

            b.iter(|| {
                app.take_snapshot(&[]).unwrap();
                app.dispatch(Action::new("push", json!(-1))).unwrap();
                app.rollback().unwrap();
            });
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_dispatch,
    bench_getter_chain,
    bench_getter_fan_in,
    bench_snapshot_rollback,
);
criterion_main!(benches);
