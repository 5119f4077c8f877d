//! Adapter and client-layer benchmarks
//!
//! Runs without a server:
//! 1. Query rendering (filters, orders, cursors into a `StructuredQuery`)
//! 2. Value conversion (serde types to and from `MapValue`)
//! 3. CRUD through the `FirestoreClient` trait over the in-memory fake,
//!    at several concurrency levels
//!
//! ## Running Benchmarks
//! ```bash
//! cargo bench --bench adapter_bench
//!
//! # Specific benchmark
//! cargo bench --bench adapter_bench -- mock_crud/set_get/32
//! ```

use std::time::Duration;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use firestore_adapters::adapters::FirestoreClient;
use firestore_adapters::firestore::value::{from_map_value, map_value, to_map_value};
use firestore_adapters::firestore::{Client, Direction, Operator, SetOptions, Settings};
use firestore_adapters::mock::MockFirestoreClient;
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use tokio::runtime::Runtime;

/// Concurrency levels to test
const CONCURRENCY_LEVELS: &[usize] = &[1, 4, 16, 64, 256];

#[derive(Debug, Serialize, Deserialize)]
struct Order {
    id: String,
    total: f64,
    items: Vec<String>,
    paid: bool,
}

fn runtime() -> Runtime {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .expect("Failed to create runtime")
}

fn bench_query_rendering(c: &mut Criterion) {
    let client = Client::detached(&Settings::new("bench-project"));
    let query = client
        .collection("orders")
        .where_("status", Operator::Equal, "paid")
        .where_("total", Operator::GreaterThan, 100i64)
        .order_by("total", Direction::Descending)
        .start_after(vec![500i64.into()])
        .limit(50);

    c.bench_function("query/to_structured_query", |b| {
        b.iter(|| black_box(query.to_structured_query().expect("render failed")))
    });

    let last = query.limit_to_last(10);
    c.bench_function("query/to_structured_query_limit_to_last", |b| {
        b.iter(|| black_box(last.to_structured_query().expect("render failed")))
    });
}

fn bench_value_conversion(c: &mut Criterion) {
    let order = Order {
        id: "o-1".to_string(),
        total: 123.45,
        items: (0..20).map(|i| format!("item-{}", i)).collect(),
        paid: true,
    };
    let encoded = to_map_value(&order).expect("encode failed");

    let mut group = c.benchmark_group("value");
    group.bench_function("to_map_value", |b| {
        b.iter(|| black_box(to_map_value(&order).expect("encode failed")))
    });
    group.bench_function("from_map_value", |b| {
        b.iter(|| black_box(from_map_value::<Order>(&encoded).expect("decode failed")))
    });
    group.finish();
}

fn bench_mock_crud(c: &mut Criterion) {
    let rt = runtime();
    let db = MockFirestoreClient::new();

    let mut group = c.benchmark_group("mock_crud");
    group.measurement_time(Duration::from_secs(10));

    for &concurrency in CONCURRENCY_LEVELS {
        group.throughput(Throughput::Elements(concurrency as u64));
        group.bench_with_input(
            BenchmarkId::new("set_get", concurrency),
            &concurrency,
            |b, &concurrency| {
                b.to_async(&rt).iter(|| async {
                    let futures: Vec<_> = (0..concurrency)
                        .map(|i| {
                            let db: &dyn FirestoreClient = &db;
                            async move {
                                let doc = db.collection("bench").doc(&format!("doc-{}", i));
                                doc.set(map_value([("n", (i as i64).into())]), SetOptions::Overwrite)
                                    .await
                                    .expect("set failed");
                                black_box(doc.get().await.expect("get failed").exists())
                            }
                        })
                        .collect();

                    join_all(futures).await
                });
            },
        );
    }

    group.finish();
}

criterion_group!(benches, bench_query_rendering, bench_value_conversion, bench_mock_crud);
criterion_main!(benches);
