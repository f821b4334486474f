//! Mock MySQL server
//!
//! Sends exactly one protocol-10 greeting per accepted connection, then hands
//! the connection to a handler (or idles until the peer disconnects).

use super::portfinder::PortFinder;
use crate::auth::generate_scramble;
use crate::config::BackendConfig;
use crate::protocol::constants::{auth_plugin, capability, status, PROTOCOL_VERSION, SCRAMBLE_LEN};
use crate::protocol::decode::{is_ssl_request, parse_command, parse_handshake_response};
use crate::protocol::encode::{
    encode_binary_row, encode_column_definition, encode_eof, encode_err, encode_handshake,
    encode_ok, encode_stmt_prepare_ok, encode_text_row, put_lenenc_int,
};
use crate::protocol::{
    decode_packet, encode_packet, CapabilityMask, ColumnDefinition, Command, EofPacket, ErrPacket,
    HandshakePayload, HandshakeResponse, OkPacket, Packet, StmtPrepareOk,
};
use crate::{Error, Result};
use bytes::{Buf, BytesMut};
use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::{JoinHandle, JoinSet};

/// Version string in the greeting
pub const SERVER_VERSION: &str = "8.0.0-harness-mock";
/// Connection id in the greeting
pub const CONNECTION_ID: u32 = 1234;
/// Status flags in the greeting (autocommit)
pub const STATUS_FLAGS: u16 = status::AUTOCOMMIT;
/// Character set in the greeting (latin1_swedish_ci)
pub const CHARACTER_SET: u8 = 8;

/// Capabilities the mock advertises: everything except compression
pub const fn server_capabilities() -> CapabilityMask {
    CapabilityMask::all().without(capability::COMPRESS)
}

/// Pause after a failed `accept` (e.g. out of file descriptors)
const ACCEPT_RETRY_DELAY: Duration = Duration::from_millis(100);

type HandlerFuture = Pin<Box<dyn Future<Output = Result<()>> + Send>>;
type BoxedHandler = Arc<dyn Fn(ServerConnection) -> HandlerFuture + Send + Sync>;

/// Per-connection lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerConnectionState {
    Accepted,
    HandshakeSent,
    HandlerInvoked,
    Idle,
    Closed,
}

/// Connection counters
#[derive(Debug, Default)]
pub struct ServerStats {
    accepted: AtomicUsize,
    active: AtomicUsize,
    max_active: AtomicUsize,
    handshakes_sent: AtomicUsize,
}

impl ServerStats {
    pub fn accepted(&self) -> usize {
        self.accepted.load(Ordering::SeqCst)
    }

    pub fn active(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    /// Highest number of simultaneously open connections
    pub fn max_active(&self) -> usize {
        self.max_active.load(Ordering::SeqCst)
    }

    pub fn handshakes_sent(&self) -> usize {
        self.handshakes_sent.load(Ordering::SeqCst)
    }

    fn on_accept(&self) {
        self.accepted.fetch_add(1, Ordering::SeqCst);
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(now, Ordering::SeqCst);
    }

    fn on_close(&self) {
        self.active.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Counts one connection as active until dropped, including when its task
/// panics or is aborted
struct ActiveConnection(Arc<ServerStats>);

impl ActiveConnection {
    fn open(stats: &Arc<ServerStats>) -> Self {
        stats.on_accept();
        Self(stats.clone())
    }
}

impl Drop for ActiveConnection {
    fn drop(&mut self) {
        self.0.on_close();
    }
}

/// Server side of one accepted connection
pub struct ServerConnection {
    stream: TcpStream,
    peer: SocketAddr,
    read_buf: BytesMut,
    write_buf: BytesMut,
    sequence_id: u8,
    scramble: [u8; SCRAMBLE_LEN],
    state: ServerConnectionState,
}

impl std::fmt::Debug for ServerConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerConnection")
            .field("peer", &self.peer)
            .field("state", &self.state)
            .finish()
    }
}

impl ServerConnection {
    fn new(stream: TcpStream, peer: SocketAddr) -> Self {
        Self {
            stream,
            peer,
            read_buf: BytesMut::with_capacity(4096),
            write_buf: BytesMut::with_capacity(4096),
            sequence_id: 0,
            scramble: generate_scramble(),
            state: ServerConnectionState::Accepted,
        }
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.peer
    }

    pub fn state(&self) -> ServerConnectionState {
        self.state
    }

    /// Challenge sent in the greeting
    pub fn scramble(&self) -> &[u8] {
        &self.scramble
    }

    async fn send_greeting(&mut self) -> Result<()> {
        let greeting = HandshakePayload {
            protocol_version: PROTOCOL_VERSION,
            server_version: SERVER_VERSION.to_string(),
            connection_id: CONNECTION_ID,
            scramble: self.scramble.to_vec(),
            capabilities: server_capabilities(),
            character_set: CHARACTER_SET,
            status_flags: STATUS_FLAGS,
            auth_plugin_name: auth_plugin::NATIVE_PASSWORD.to_string(),
        };
        self.sequence_id = 0;
        self.write_packet(&encode_handshake(&greeting)).await?;
        self.state = ServerConnectionState::HandshakeSent;
        Ok(())
    }

    /// Read one packet; `None` once the peer has closed
    pub async fn read_packet(&mut self) -> Result<Option<Packet>> {
        loop {
            match decode_packet(&self.read_buf) {
                Ok((packet, consumed)) => {
                    self.read_buf.advance(consumed);
                    self.sequence_id = packet.sequence_id.wrapping_add(1);
                    return Ok(Some(packet));
                }
                Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => {}
                Err(e) => return Err(Error::Protocol(e.to_string())),
            }

            let n = match self.stream.read_buf(&mut self.read_buf).await {
                Ok(n) => n,
                Err(e) if is_disconnect(&e) => 0,
                Err(e) => return Err(e.into()),
            };
            if n == 0 {
                self.state = ServerConnectionState::Closed;
                return Ok(None);
            }
        }
    }

    /// Read the client's handshake response. TLS requests are refused.
    pub async fn read_handshake_response(&mut self) -> Result<Option<HandshakeResponse>> {
        let Some(packet) = self.read_packet().await? else {
            return Ok(None);
        };
        if is_ssl_request(&packet.payload) {
            return Err(Error::Unsupported("TLS on the mock server".into()));
        }
        parse_handshake_response(&packet.payload)
            .map(Some)
            .map_err(|e| Error::Protocol(e.to_string()))
    }

    /// Read the next command; `None` once the peer has closed
    pub async fn read_command(&mut self) -> Result<Option<Command>> {
        let Some(packet) = self.read_packet().await? else {
            return Ok(None);
        };
        parse_command(&packet.payload)
            .map(Some)
            .map_err(|e| Error::Protocol(e.to_string()))
    }

    fn queue(&mut self, payload: &[u8]) {
        self.sequence_id = encode_packet(&mut self.write_buf, self.sequence_id, payload);
    }

    async fn flush(&mut self) -> Result<()> {
        let out = self.write_buf.split();
        self.stream.write_all(&out).await?;
        self.stream.flush().await?;
        Ok(())
    }

    /// Send one payload with the next sequence id
    pub async fn write_packet(&mut self, payload: &[u8]) -> Result<()> {
        self.queue(payload);
        self.flush().await
    }

    pub async fn write_ok(&mut self, ok: &OkPacket) -> Result<()> {
        self.write_packet(&encode_ok(ok)).await
    }

    pub async fn write_err(&mut self, err: &ErrPacket) -> Result<()> {
        self.write_packet(&encode_err(err)).await
    }

    pub async fn write_eof(&mut self, status_flags: u16) -> Result<()> {
        self.write_packet(&encode_eof(&EofPacket {
            warnings: 0,
            status_flags,
        }))
        .await
    }

    fn queue_columns(&mut self, columns: &[ColumnDefinition]) {
        for column in columns {
            self.queue(&encode_column_definition(column));
        }
        self.queue(&encode_eof(&EofPacket {
            warnings: 0,
            status_flags: STATUS_FLAGS,
        }));
    }

    fn queue_column_count(&mut self, count: usize) {
        let mut buf = BytesMut::with_capacity(9);
        put_lenenc_int(&mut buf, count as u64);
        self.queue(&buf);
    }

    /// Text protocol result set
    pub async fn write_text_result<S: AsRef<str>>(
        &mut self,
        columns: &[ColumnDefinition],
        rows: &[Vec<Option<S>>],
    ) -> Result<()> {
        self.queue_column_count(columns.len());
        self.queue_columns(columns);
        for row in rows {
            self.queue(&encode_text_row(row));
        }
        self.queue(&encode_eof(&EofPacket {
            warnings: 0,
            status_flags: STATUS_FLAGS,
        }));
        self.flush().await
    }

    /// Binary protocol result set (COM_STMT_EXECUTE response)
    pub async fn write_binary_result<S: AsRef<str>>(
        &mut self,
        columns: &[ColumnDefinition],
        rows: &[Vec<Option<S>>],
    ) -> Result<()> {
        self.queue_column_count(columns.len());
        self.queue_columns(columns);
        for row in rows {
            self.queue(&encode_binary_row(columns, row));
        }
        self.queue(&encode_eof(&EofPacket {
            warnings: 0,
            status_flags: STATUS_FLAGS,
        }));
        self.flush().await
    }

    /// COM_STMT_PREPARE response with parameter and column definitions
    pub async fn write_prepare_ok(
        &mut self,
        ok: &StmtPrepareOk,
        params: &[ColumnDefinition],
        columns: &[ColumnDefinition],
    ) -> Result<()> {
        self.queue(&encode_stmt_prepare_ok(ok));
        if !params.is_empty() {
            self.queue_columns(params);
        }
        if !columns.is_empty() {
            self.queue_columns(columns);
        }
        self.flush().await
    }

    /// Read and discard until the peer disconnects
    async fn idle_until_closed(&mut self) {
        self.state = ServerConnectionState::Idle;
        loop {
            self.read_buf.clear();
            match self.stream.read_buf(&mut self.read_buf).await {
                Ok(0) | Err(_) => break,
                Ok(_) => {}
            }
        }
        self.state = ServerConnectionState::Closed;
    }

    /// Shut the socket down
    pub async fn close(mut self) -> Result<()> {
        self.state = ServerConnectionState::Closed;
        match self.stream.shutdown().await {
            Err(e) if !is_disconnect(&e) => Err(e.into()),
            _ => Ok(()),
        }
    }
}

fn is_disconnect(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::BrokenPipe
            | io::ErrorKind::NotConnected
            | io::ErrorKind::UnexpectedEof
    )
}

/// Running mock server. Dropping or closing it stops accepting and aborts
/// open connections.
pub struct MockServer {
    addr: SocketAddr,
    stats: Arc<ServerStats>,
    accept_task: JoinHandle<()>,
}

impl std::fmt::Debug for MockServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockServer")
            .field("addr", &self.addr)
            .field("stats", &self.stats)
            .finish()
    }
}

impl MockServer {
    /// Listen with no handler: connections idle after the greeting
    pub async fn start() -> Result<Self> {
        Self::listen(None).await
    }

    /// Listen, handing each connection to `handler` after the greeting
    pub async fn start_with_handler<H, Fut>(handler: H) -> Result<Self>
    where
        H: Fn(ServerConnection) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        let boxed: BoxedHandler = Arc::new(move |conn| -> HandlerFuture { Box::pin(handler(conn)) });
        Self::listen(Some(boxed)).await
    }

    /// Listen with a scripted responder
    pub async fn start_with_responder(responder: super::MockResponder) -> Result<Self> {
        let responder = Arc::new(responder);
        Self::start_with_handler(move |conn| {
            let responder = responder.clone();
            async move { responder.serve(conn).await }
        })
        .await
    }

    async fn listen(handler: Option<BoxedHandler>) -> Result<Self> {
        let listener = PortFinder::global().bind("127.0.0.1").await?;
        let addr = listener.local_addr()?;
        let stats = Arc::new(ServerStats::default());
        tracing::info!(%addr, "mock server listening");

        let accept_task = tokio::spawn(accept_loop(listener, stats.clone(), handler));
        Ok(Self {
            addr,
            stats,
            accept_task,
        })
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    pub fn stats(&self) -> &ServerStats {
        &self.stats
    }

    /// `base` pointed at this server
    pub fn config(&self, base: &BackendConfig) -> BackendConfig {
        base.with_address(self.addr.ip().to_string(), self.addr.port())
    }

    /// Stop accepting and abort open connections
    pub fn close(self) {
        self.accept_task.abort();
    }
}

impl Drop for MockServer {
    fn drop(&mut self) {
        self.accept_task.abort();
    }
}

async fn accept_loop(listener: TcpListener, stats: Arc<ServerStats>, handler: Option<BoxedHandler>) {
    // Aborting this task drops the set, which aborts every connection task
    let mut connections = JoinSet::new();

    loop {
        tokio::select! {
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    let active = ActiveConnection::open(&stats);
                    connections.spawn(serve_connection(stream, peer, active, handler.clone()));
                }
                Err(e) => {
                    tracing::warn!(error = %e, "mock server accept failed");
                    tokio::time::sleep(ACCEPT_RETRY_DELAY).await;
                }
            },
            Some(joined) = connections.join_next(), if !connections.is_empty() => {
                if let Err(e) = joined {
                    if e.is_panic() {
                        tracing::warn!(error = %e, "mock connection task panicked");
                    }
                }
            }
        }
    }
}

async fn serve_connection(
    stream: TcpStream,
    peer: SocketAddr,
    active: ActiveConnection,
    handler: Option<BoxedHandler>,
) {
    let stats = &active.0;
    let _ = stream.set_nodelay(true);
    let mut conn = ServerConnection::new(stream, peer);

    match conn.send_greeting().await {
        Ok(()) => {
            stats.handshakes_sent.fetch_add(1, Ordering::SeqCst);
            crate::metrics::counters::handshake_sent();

            match handler {
                Some(handler) => {
                    conn.state = ServerConnectionState::HandlerInvoked;
                    if let Err(e) = handler(conn).await {
                        tracing::debug!(%peer, error = %e, "mock connection handler failed");
                    }
                }
                None => conn.idle_until_closed().await,
            }
        }
        Err(e) => tracing::debug!(%peer, error = %e, "peer left before greeting"),
    }
}
