//! Native vs streaming backend against the mock server
//!
//! Measures connection setup and a small query round trip per backend.
//! No external database is needed.
//!
//! Run with: cargo bench --bench backend_comparison

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use mysql_harness::config::ConnectionOverrides;
use mysql_harness::{create_connection, BackendConfig, BackendKind, MockResponder, MockServer};
use std::sync::Arc;
use tokio::runtime::Runtime;
use tokio::sync::Mutex;

const BACKENDS: [BackendKind; 2] = [BackendKind::Native, BackendKind::Streaming];

fn runtime() -> Runtime {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .expect("runtime")
}

fn connect_benchmarks(c: &mut Criterion) {
    let rt = runtime();
    let server = rt
        .block_on(MockServer::start_with_responder(MockResponder::new()))
        .expect("mock server");

    let mut group = c.benchmark_group("connect");
    for backend in BACKENDS {
        let config = server.config(&BackendConfig::default().with_backend(backend));
        group.bench_with_input(BenchmarkId::from_parameter(backend), &config, |b, config| {
            b.to_async(&rt).iter(|| async move {
                let mut conn = create_connection(config, ConnectionOverrides::new());
                conn.connect().await.expect("connect");
                conn.close().await.expect("close");
            });
        });
    }
    group.finish();
}

fn query_benchmarks(c: &mut Criterion) {
    let rt = runtime();
    let server = rt
        .block_on(MockServer::start_with_responder(MockResponder::new()))
        .expect("mock server");

    let mut group = c.benchmark_group("query_round_trip");
    for backend in BACKENDS {
        let config = server.config(&BackendConfig::default().with_backend(backend));
        let conn = Arc::new(Mutex::new(create_connection(&config, ConnectionOverrides::new())));

        group.bench_with_input(BenchmarkId::new("select_literals", backend), &conn, |b, conn| {
            b.to_async(&rt).iter(|| async move {
                let mut conn = conn.lock().await;
                let result = conn.query("SELECT 1 AS one, 'x' AS letter").await.expect("query");
                black_box(result);
            });
        });

        group.bench_with_input(BenchmarkId::new("prepared", backend), &conn, |b, conn| {
            b.to_async(&rt).iter(|| async move {
                let mut conn = conn.lock().await;
                let result = conn.execute("SELECT 1 AS one").await.expect("execute");
                black_box(result);
            });
        });
    }
    group.finish();
}

criterion_group!(benches, connect_benchmarks, query_benchmarks);
criterion_main!(benches);
