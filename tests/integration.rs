//! Integration tests against a real MySQL server
//!
//! These tests require a running MySQL reachable through the `MYSQL_*`
//! environment variables.

mod common;

use mysql_harness::config::ConnectionOverrides;
use mysql_harness::{create_connection, create_pool, BackendConfig, Error, QueryOptions, ReadinessProber};
use serde_json::json;
use std::time::Duration;

fn config() -> BackendConfig {
    common::init_tracing();
    BackendConfig::from_env().expect("backend config")
}

#[tokio::test]
#[ignore] // Requires MySQL running
async fn test_wait_then_query() {
    let config = config();
    ReadinessProber::new(config.clone())
        .wait_until_ready()
        .await
        .expect("backend ready");

    for backend in common::BACKENDS {
        let mut conn = create_connection(&config.with_backend(backend), ConnectionOverrides::new());
        let result = conn.query("SELECT 1 AS one").await.expect("query");
        assert_eq!(result.rows(), &[json!({"one": 1})]);
        conn.close().await.expect("close");
    }
}

#[tokio::test]
#[ignore] // Requires MySQL running
async fn test_timeout_then_recover() {
    let config = config();

    for backend in common::BACKENDS {
        let mut conn = create_connection(&config.with_backend(backend), ConnectionOverrides::new());

        let err = conn
            .query(QueryOptions::new("SELECT sleep(3) as a").timeout(Duration::from_millis(500)))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::QueryTimeout));

        let result = conn
            .query(QueryOptions::new("SELECT sleep(1) as a").timeout(Duration::from_millis(5000)))
            .await
            .expect("second query");
        assert_eq!(result.rows(), &[json!({"a": 0})]);

        let err = conn
            .execute(QueryOptions::new("SELECT sleep(3) as a").timeout(Duration::from_millis(500)))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::QueryTimeout));

        let result = conn
            .execute(QueryOptions::new("SELECT sleep(1) as a").timeout(Duration::from_millis(5000)))
            .await
            .expect("second execute");
        assert_eq!(result.rows(), &[json!({"a": 0})]);

        conn.close().await.expect("close");
    }
}

#[tokio::test]
#[ignore] // Requires MySQL running
async fn test_prepared_with_values() {
    let config = config();
    let mut conn = create_connection(&config, ConnectionOverrides::new());

    let result = conn
        .execute(QueryOptions::new("SELECT ? + 1 AS n").values(vec![json!(41)]))
        .await
        .expect("execute");
    assert_eq!(result.rows(), &[json!({"n": 42})]);

    let err = conn
        .execute(QueryOptions::new("SELECT ? AS n"))
        .await
        .unwrap_err();
    assert_eq!(err.code(), "ERR_INVALID_CONFIG");
}

#[tokio::test]
#[ignore] // Requires MySQL running
async fn test_pool() {
    let config = config();
    let pool = create_pool(&config, ConnectionOverrides::new().connection_limit(3));

    let results = futures::future::join_all((0..10).map(|_| pool.query("SELECT 1 AS one"))).await;
    for result in results {
        assert_eq!(result.expect("pooled query").rows(), &[json!({"one": 1})]);
    }
    pool.end().await.expect("end");
}
