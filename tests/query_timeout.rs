//! Per-command inactivity timeouts against the mock server
//!
//! A timed-out command leaves its response on the wire. The next command on
//! the same connection drains it first; the next deadline starts after that.

mod common;

use mysql_harness::config::ConnectionOverrides;
use mysql_harness::{create_connection, BackendConfig, Error, QueryOptions};
use serde_json::json;
use std::time::{Duration, Instant};

#[tokio::test]
async fn test_query_timeout_then_recover() {
    let server = common::responder_server().await;

    for backend in common::BACKENDS {
        let config = common::config_for(&server, backend);
        let mut conn = create_connection(&config, ConnectionOverrides::new());
        conn.connect().await.unwrap();

        let started = Instant::now();
        let err = conn
            .query(QueryOptions::new("SELECT sleep(3) as a").timeout(Duration::from_millis(500)))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::QueryTimeout), "{backend:?}: {err:?}");
        assert_eq!(err.code(), "PROTOCOL_SEQUENCE_TIMEOUT");
        assert!(started.elapsed() < Duration::from_millis(1500));

        let result = conn
            .query(QueryOptions::new("SELECT sleep(1) as a").timeout(Duration::from_millis(5000)))
            .await
            .unwrap();
        assert_eq!(result.rows(), &[json!({"a": 0})]);

        conn.close().await.unwrap();
    }
}

#[tokio::test]
async fn test_execute_timeout_then_recover() {
    let server = common::responder_server().await;

    for backend in common::BACKENDS {
        let config = common::config_for(&server, backend);
        let mut conn = create_connection(&config, ConnectionOverrides::new());

        let err = conn
            .execute(QueryOptions::new("SELECT sleep(3) as a").timeout(Duration::from_millis(500)))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::QueryTimeout), "{backend:?}: {err:?}");

        let result = conn
            .execute(QueryOptions::new("SELECT sleep(1) as a").timeout(Duration::from_millis(5000)))
            .await
            .unwrap();
        assert_eq!(result.rows(), &[json!({"a": 0})]);

        conn.close().await.unwrap();
    }
}

#[tokio::test]
async fn test_drain_is_not_charged_to_next_deadline() {
    let server = common::responder_server().await;

    for backend in common::BACKENDS {
        let config = common::config_for(&server, backend);
        let mut conn = create_connection(&config, ConnectionOverrides::new());

        let err = conn
            .query(QueryOptions::new("SELECT sleep(3) as a").timeout(Duration::from_millis(500)))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::QueryTimeout), "{backend:?}: {err:?}");

        // About 2.5s of the abandoned response is still outstanding; the
        // 2000ms budget only covers the one second this statement takes
        let started = Instant::now();
        let result = conn
            .query(QueryOptions::new("SELECT sleep(1) as a").timeout(Duration::from_millis(2000)))
            .await
            .unwrap();
        assert_eq!(result.rows(), &[json!({"a": 0})], "{backend:?}");
        assert!(started.elapsed() >= Duration::from_millis(3000), "{backend:?}");

        let result = conn
            .query(QueryOptions::new("SELECT 1 AS one").timeout(Duration::from_millis(300)))
            .await
            .unwrap();
        assert_eq!(result.rows(), &[json!({"one": 1})], "{backend:?}");
    }
}

#[tokio::test]
async fn test_no_timeout_waits() {
    let server = common::responder_server().await;
    let config = common::config_for(&server, mysql_harness::BackendKind::Native);
    let mut conn = create_connection(&config, ConnectionOverrides::new());

    let result = conn.query("SELECT sleep(0.2) as a").await.unwrap();
    assert_eq!(result.rows(), &[json!({"a": 0})]);
}

#[tokio::test]
async fn test_connect_timeout_wins_over_query_timeout() {
    common::init_tracing();
    let (_listener, port) = common::silent_listener().await;

    for backend in common::BACKENDS {
        let config = BackendConfig::default()
            .with_backend(backend)
            .with_address("127.0.0.1", port);
        let mut conn = create_connection(
            &config,
            ConnectionOverrides::new().connect_timeout(Duration::from_millis(100)),
        );

        let started = Instant::now();
        let err = conn
            .query(QueryOptions::new("SELECT 1").timeout(Duration::from_millis(50)))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::ConnectTimeout), "{backend:?}: {err:?}");
        assert_eq!(err.code(), "ETIMEDOUT");
        assert!(started.elapsed() >= Duration::from_millis(100));
    }
}

#[tokio::test]
#[ignore] // Needs a network that silently drops packets to 10.255.255.1
async fn test_connect_timeout_unroutable() {
    let config = BackendConfig::default().with_address("10.255.255.1", 3306);
    let mut conn = create_connection(
        &config,
        ConnectionOverrides::new().connect_timeout(Duration::from_millis(100)),
    );
    let err = conn
        .query(QueryOptions::new("SELECT 1").timeout(Duration::from_millis(50)))
        .await
        .unwrap_err();
    assert_eq!(err.code(), "ETIMEDOUT");
}
