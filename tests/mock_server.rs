//! Mock server greeting and connection handling

mod common;

use bytes::{Buf, BytesMut};
use mysql_harness::config::ConnectionOverrides;
use mysql_harness::protocol::constants::{auth_plugin, capability, SCRAMBLE_LEN};
use mysql_harness::protocol::decode::parse_handshake;
use mysql_harness::protocol::{decode_packet, HandshakePayload};
use mysql_harness::server::{
    server_capabilities, ServerConnection, ServerConnectionState, CHARACTER_SET, CONNECTION_ID, SERVER_VERSION,
    STATUS_FLAGS,
};
use mysql_harness::{create_connection, BackendKind, Error, MockServer};
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tokio::net::TcpStream;
use tokio::sync::mpsc;

async fn read_greeting(port: u16) -> (TcpStream, HandshakePayload) {
    let mut stream = TcpStream::connect(("127.0.0.1", port)).await.unwrap();
    let mut buf = BytesMut::new();
    loop {
        if let Ok((packet, consumed)) = decode_packet(&buf) {
            buf.advance(consumed);
            assert_eq!(packet.sequence_id, 0);
            return (stream, parse_handshake(&packet.payload).unwrap());
        }
        let n = stream.read_buf(&mut buf).await.unwrap();
        assert!(n > 0, "server closed before greeting");
    }
}

async fn wait_for(mut check: impl FnMut() -> bool) {
    for _ in 0..100 {
        if check() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not reached");
}

#[tokio::test]
async fn test_greeting_fields() {
    common::init_tracing();
    let server = MockServer::start().await.unwrap();

    let (_stream, greeting) = read_greeting(server.port()).await;
    assert_eq!(greeting.protocol_version, 10);
    assert_eq!(greeting.server_version, SERVER_VERSION);
    assert_eq!(greeting.connection_id, CONNECTION_ID);
    assert_eq!(greeting.connection_id, 1234);
    assert_eq!(greeting.status_flags, STATUS_FLAGS);
    assert_eq!(greeting.character_set, CHARACTER_SET);
    assert_eq!(greeting.scramble.len(), SCRAMBLE_LEN);
    assert_eq!(greeting.auth_plugin_name, auth_plugin::NATIVE_PASSWORD);

    assert_eq!(greeting.capabilities, server_capabilities());
    assert!(!greeting.capabilities.contains(capability::COMPRESS));
    assert_eq!(
        greeting.capabilities.bits() | capability::COMPRESS,
        capability::ALL_MODELED
    );

    wait_for(|| server.stats().handshakes_sent() == 1).await;
    assert_eq!(server.stats().accepted(), 1);
}

#[tokio::test]
async fn test_one_greeting_per_connection() {
    let server = MockServer::start().await.unwrap();

    let (a, first) = read_greeting(server.port()).await;
    let (b, second) = read_greeting(server.port()).await;
    assert_ne!(first.scramble, second.scramble);

    wait_for(|| server.stats().handshakes_sent() == 2).await;
    assert_eq!(server.stats().max_active(), 2);

    drop(a);
    drop(b);
    wait_for(|| server.stats().active() == 0).await;
}

#[tokio::test]
async fn test_greeting_sent_before_handler() {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let server = MockServer::start_with_handler(move |conn| {
        let tx = tx.clone();
        async move {
            let _ = tx.send(conn.state());
            // Hold the connection open until the peer leaves
            let mut conn = conn;
            while conn.read_packet().await?.is_some() {}
            Ok::<_, Error>(())
        }
    })
    .await
    .unwrap();

    let (_stream, greeting) = read_greeting(server.port()).await;
    assert_eq!(greeting.server_version, SERVER_VERSION);
    assert_eq!(rx.recv().await, Some(ServerConnectionState::HandlerInvoked));
}

#[tokio::test]
async fn test_client_never_requests_compression() {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let server = MockServer::start_with_handler(move |mut conn| {
        let tx = tx.clone();
        async move {
            if let Some(response) = conn.read_handshake_response().await? {
                let _ = tx.send(response);
            }
            conn.write_ok(&Default::default()).await?;
            while conn.read_packet().await?.is_some() {}
            Ok::<_, Error>(())
        }
    })
    .await
    .unwrap();

    let config = server.config(&Default::default());
    let mut handle = create_connection(&config, ConnectionOverrides::new().compress(true));
    handle.connect().await.unwrap();

    let response = rx.recv().await.unwrap();
    assert!(!response.capabilities.contains(capability::COMPRESS));
    assert!(response.capabilities.contains(capability::PROTOCOL_41));
    assert!(!response.capabilities.contains(capability::DEPRECATE_EOF));
    assert_eq!(response.username, "root");
    assert_eq!(response.database.as_deref(), Some("test"));

    handle.close().await.unwrap();
}

#[tokio::test]
async fn test_close_after_login_is_connection_lost() {
    let server = MockServer::start_with_handler(|mut conn| async move {
        conn.read_handshake_response().await?;
        conn.close().await
    })
    .await
    .unwrap();

    for backend in common::BACKENDS {
        let config = common::config_for(&server, backend);
        let mut handle = create_connection(&config, ConnectionOverrides::new());
        let err = handle.connect().await.unwrap_err();
        assert!(matches!(err, Error::ConnectionLost), "{backend:?}: {err:?}");
        assert_eq!(err.code(), "PROTOCOL_CONNECTION_LOST");
        assert!(err.is_transient_connect());
    }
}

#[tokio::test]
async fn test_unrepresentable_sleep_is_server_error() {
    let server = common::responder_server().await;

    for backend in common::BACKENDS {
        let config = common::config_for(&server, backend);
        let mut handle = create_connection(&config, ConnectionOverrides::new());

        let err = handle.query("SELECT sleep(1e300)").await.unwrap_err();
        assert_eq!(err.code(), "ER_PARSE_ERROR", "{backend:?}");
        assert_eq!(server.stats().active(), 1);

        handle.ping().await.unwrap();
        handle.close().await.unwrap();
        wait_for(|| server.stats().active() == 0).await;
    }
}

async fn failing_handler(mut conn: ServerConnection) -> Result<(), Error> {
    conn.read_handshake_response().await?;
    panic!("handler failed");
}

#[tokio::test]
async fn test_panicking_handler_releases_connection() {
    let server = MockServer::start_with_handler(failing_handler).await.unwrap();

    for backend in common::BACKENDS {
        let config = common::config_for(&server, backend);
        let mut handle = create_connection(&config, ConnectionOverrides::new());
        let err = handle.connect().await.unwrap_err();
        assert!(matches!(err, Error::ConnectionLost), "{backend:?}: {err:?}");
        wait_for(|| server.stats().active() == 0).await;
    }
    assert_eq!(server.stats().accepted(), 2);
}

#[tokio::test]
async fn test_idle_server_hits_connect_timeout() {
    let server = MockServer::start().await.unwrap();
    let config = common::config_for(&server, BackendKind::Native);

    let mut handle = create_connection(
        &config,
        ConnectionOverrides::new().connect_timeout(Duration::from_millis(200)),
    );
    let err = handle.connect().await.unwrap_err();
    assert!(matches!(err, Error::ConnectTimeout));
}

#[tokio::test]
async fn test_close_stops_accepting() {
    let server = MockServer::start().await.unwrap();
    let port = server.port();
    server.close();

    tokio::time::sleep(Duration::from_millis(50)).await;
    let err = TcpStream::connect(("127.0.0.1", port)).await.unwrap_err();
    assert_eq!(err.kind(), std::io::ErrorKind::ConnectionRefused);
}
