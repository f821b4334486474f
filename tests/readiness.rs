//! Readiness prober against a mock server that starts refusing logins

mod common;

use mysql_harness::config::ConnectionOverrides;
use mysql_harness::probe::{ProbeOutcome, DEFAULT_BACKOFF};
use mysql_harness::{BackendKind, MockResponder, MockServer, ReadinessProber};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// Drops the first `failures` logins after reading the handshake response
async fn flaky_server(failures: usize) -> MockServer {
    common::init_tracing();
    let seen = Arc::new(AtomicUsize::new(0));
    let responder = Arc::new(MockResponder::new());

    MockServer::start_with_handler(move |mut conn| {
        let seen = seen.clone();
        let responder = responder.clone();
        async move {
            if seen.fetch_add(1, Ordering::SeqCst) < failures {
                conn.read_handshake_response().await?;
                return Ok(());
            }
            responder.serve(conn).await
        }
    })
    .await
    .unwrap()
}

#[tokio::test]
async fn test_retries_until_ready() {
    let server = flaky_server(2).await;
    let backoff = Duration::from_millis(100);

    for backend in common::BACKENDS {
        let prober = ReadinessProber::new(common::config_for(&server, backend)).with_backoff(backoff);
        let report = prober.wait_until_ready().await.unwrap();
        if backend == BackendKind::Native {
            assert_eq!(report.attempts, 3);
            assert!(report.elapsed >= backoff * 2);
        } else {
            assert_eq!(report.attempts, 1);
        }

        while server.stats().active() > 0 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    // Probes never overlap
    assert_eq!(server.stats().max_active(), 1);
}

#[tokio::test]
async fn test_default_backoff_spaces_attempts() {
    common::init_tracing();
    let seen = Arc::new(AtomicUsize::new(0));
    let timeline = Arc::new(Mutex::new(Vec::new()));
    let responder = Arc::new(MockResponder::new());

    let server = {
        let timeline = timeline.clone();
        MockServer::start_with_handler(move |mut conn| {
            let seen = seen.clone();
            let timeline = timeline.clone();
            let responder = responder.clone();
            async move {
                let opened = Instant::now();
                if seen.fetch_add(1, Ordering::SeqCst) == 0 {
                    conn.read_handshake_response().await?;
                    drop(conn);
                    timeline.lock().unwrap().push((opened, Instant::now()));
                    return Ok(());
                }
                timeline.lock().unwrap().push((opened, Instant::now()));
                responder.serve(conn).await
            }
        })
        .await
        .unwrap()
    };

    let prober = ReadinessProber::new(common::config_for(&server, BackendKind::Native));
    assert_eq!(prober.backoff(), DEFAULT_BACKOFF);
    let report = prober.wait_until_ready().await.unwrap();
    assert_eq!(report.attempts, 2);
    assert!(report.elapsed >= DEFAULT_BACKOFF);

    let events = timeline.lock().unwrap();
    let (_, first_closed) = events[0];
    let (second_opened, _) = events[1];
    assert!(second_opened.duration_since(first_closed) >= DEFAULT_BACKOFF);
}

#[tokio::test]
async fn test_probe_once_classifies() {
    let server = flaky_server(1).await;
    let prober = ReadinessProber::new(common::config_for(&server, BackendKind::Native));

    let first = prober.probe_once().await;
    assert!(matches!(first.outcome, ProbeOutcome::RetryLater(ref e) if e.code() == "PROTOCOL_CONNECTION_LOST"));

    let second = prober.probe_once().await;
    assert!(matches!(second.outcome, ProbeOutcome::Ready));
    assert!(second.started_at > first.started_at);
}

#[tokio::test]
async fn test_access_denied_is_fatal() {
    common::init_tracing();
    let server = MockServer::start_with_responder(MockResponder::new().require_password("secret"))
        .await
        .unwrap();

    let prober = ReadinessProber::new(common::config_for(&server, BackendKind::Native))
        .with_backoff(Duration::from_millis(10));
    let err = prober.wait_until_ready().await.unwrap_err();
    assert_eq!(err.code(), "ER_ACCESS_DENIED_ERROR");

    let prober = prober.with_overrides(ConnectionOverrides::new().password("secret"));
    let report = prober.wait_until_ready().await.unwrap();
    assert_eq!(report.attempts, 1);
}

#[tokio::test]
async fn test_callback_form() {
    let server = common::responder_server().await;
    let prober = ReadinessProber::new(common::config_for(&server, BackendKind::Streaming));

    let attempts = prober
        .wait_until_ready_then(|report| report.attempts)
        .await
        .unwrap();
    assert_eq!(attempts, 1);
}
