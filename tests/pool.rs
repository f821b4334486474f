//! Pool checkout limits and connection reuse

mod common;

use mysql_harness::config::ConnectionOverrides;
use mysql_harness::{create_pool, BackendKind, Error, QueryOptions};
use serde_json::json;
use std::time::Duration;

#[tokio::test]
async fn test_limit_caps_open_connections() {
    let server = common::responder_server().await;
    // The streaming selection is ignored for pools
    let config = common::config_for(&server, BackendKind::Streaming);
    let pool = create_pool(&config, ConnectionOverrides::new().connection_limit(2));

    let mut tasks = Vec::new();
    for _ in 0..6 {
        let pool = pool.clone();
        tasks.push(tokio::spawn(async move {
            pool.query("SELECT sleep(0.05) as a").await
        }));
    }
    for task in tasks {
        let result = task.await.unwrap().unwrap();
        assert_eq!(result.rows(), &[json!({"a": 0})]);
    }

    assert!(server.stats().max_active() <= 2);
    assert!(pool.idle_count() <= 2);
    pool.end().await.unwrap();
    assert_eq!(pool.idle_count(), 0);
}

#[tokio::test]
async fn test_connections_are_reused() {
    let server = common::responder_server().await;
    let pool = create_pool(
        &common::config_for(&server, BackendKind::Native),
        ConnectionOverrides::new().connection_limit(1),
    );

    for _ in 0..3 {
        let result = pool.execute("SELECT 1 AS one").await.unwrap();
        assert_eq!(result.rows(), &[json!({"one": 1})]);
    }
    assert_eq!(server.stats().accepted(), 1);
    assert_eq!(pool.idle_count(), 1);
}

#[tokio::test]
async fn test_timed_out_connection_is_discarded() {
    let server = common::responder_server().await;
    let pool = create_pool(
        &common::config_for(&server, BackendKind::Native),
        ConnectionOverrides::new().connection_limit(1),
    );

    let err = pool
        .query(QueryOptions::new("SELECT sleep(1) as a").timeout(Duration::from_millis(100)))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::QueryTimeout));
    assert_eq!(pool.idle_count(), 0);
    assert_eq!(pool.available(), 1);

    let result = pool.query("SELECT 1 AS one").await.unwrap();
    assert_eq!(result.rows(), &[json!({"one": 1})]);
    assert_eq!(server.stats().accepted(), 2);
}

#[tokio::test]
async fn test_checkout_waits_for_release() {
    let server = common::responder_server().await;
    let pool = create_pool(
        &common::config_for(&server, BackendKind::Native),
        ConnectionOverrides::new().connection_limit(1),
    );

    let held = pool.get_connection().await.unwrap();
    assert_eq!(pool.available(), 0);

    let waiter = {
        let pool = pool.clone();
        tokio::spawn(async move { pool.query("SELECT 1 AS one").await })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(!waiter.is_finished());

    drop(held);
    let result = waiter.await.unwrap().unwrap();
    assert_eq!(result.rows(), &[json!({"one": 1})]);
}
