//! Shared helpers for integration tests

#![allow(dead_code)]

use mysql_harness::{BackendConfig, BackendKind, MockResponder, MockServer};
use std::sync::Once;
use tokio::net::TcpListener;

static TRACING_INIT: Once = Once::new();

/// Install a test subscriber controlled by `RUST_LOG`
pub fn init_tracing() {
    TRACING_INIT.call_once(|| {
        tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init()
            .ok();
    });
}

/// Mock server answering with the default responder
pub async fn responder_server() -> MockServer {
    init_tracing();
    MockServer::start_with_responder(MockResponder::new())
        .await
        .expect("start mock server")
}

/// Defaults pointed at `server` using `backend`
pub fn config_for(server: &MockServer, backend: BackendKind) -> BackendConfig {
    server.config(&BackendConfig::default().with_backend(backend))
}

/// Listener that completes TCP handshakes but never sends a greeting.
/// Keep the returned listener alive for the duration of the test.
pub async fn silent_listener() -> (TcpListener, u16) {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let port = listener.local_addr().expect("local addr").port();
    (listener, port)
}

pub const BACKENDS: [BackendKind; 2] = [BackendKind::Native, BackendKind::Streaming];
