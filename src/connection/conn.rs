//! Core connection type

use super::response::{Completed, PendingResponse, QueryResult, ResponseKind, ResultEvent, Step};
use super::state::ConnectionState;
use super::tls::TlsConfig;
use super::transport::Transport;
use crate::auth::auth_for_plugin;
use crate::config::{ConnectionParameters, TlsMaterial};
use crate::metrics::labels;
use crate::protocol::constants::{auth_plugin, capability, header};
use crate::protocol::decode::{parse_auth_switch, parse_err, parse_handshake, parse_ok};
use crate::protocol::encode::{encode_command, encode_handshake_response, encode_ssl_request};
use crate::protocol::{decode_packet, encode_packet, CapabilityMask, Command, HandshakeResponse, Packet};
use crate::row::RowDecoder;
use crate::{Error, Result};
use bytes::{Buf, BytesMut};
use serde_json::Value;
use std::future::Future;
use std::io;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::Instrument;

/// Largest packet the client advertises
const MAX_PACKET_SIZE: u32 = 16 * 1024 * 1024;

/// Bytes of payload shown per packet when debug tracing is on
const TRACE_BYTES: usize = 64;

/// Per-command options
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryOptions {
    /// SQL text
    pub sql: String,
    /// Inactivity timeout for this command; falls back to the connection's
    pub timeout: Option<Duration>,
    /// Row shape for this command; falls back to the connection's
    pub rows_as_array: Option<bool>,
    /// Placeholder values, bound by `execute` only
    pub values: Vec<Value>,
}

impl QueryOptions {
    pub fn new(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            ..Self::default()
        }
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn rows_as_array(mut self, enabled: bool) -> Self {
        self.rows_as_array = Some(enabled);
        self
    }

    pub fn values(mut self, values: Vec<Value>) -> Self {
        self.values = values;
        self
    }
}

impl From<&str> for QueryOptions {
    fn from(sql: &str) -> Self {
        Self::new(sql)
    }
}

impl From<String> for QueryOptions {
    fn from(sql: String) -> Self {
        Self::new(sql)
    }
}

/// What the server announced in its greeting
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerInfo {
    pub server_version: String,
    pub connection_id: u32,
    /// Capabilities offered by the server
    pub capabilities: CapabilityMask,
    pub character_set: u8,
    pub status_flags: u16,
}

/// Run `fut` against an optional deadline, mapping expiry to a query timeout
async fn within<T, F>(deadline: Option<Instant>, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match deadline {
        Some(deadline) => tokio::time::timeout_at(deadline, fut)
            .await
            .map_err(|_| Error::QueryTimeout)?,
        None => fut.await,
    }
}

fn protocol(e: io::Error) -> Error {
    Error::Protocol(e.to_string())
}

/// MySQL client connection
pub struct Connection {
    transport: Option<Transport>,
    state: ConnectionState,
    read_buf: BytesMut,
    sequence_id: u8,
    params: Arc<ConnectionParameters>,
    decoder: RowDecoder,
    capabilities: CapabilityMask,
    server: Option<ServerInfo>,
    /// Response still on the wire, left behind by a timed-out command
    pending: Option<PendingResponse>,
    /// Prepared statements to deallocate before the next command
    deferred_close: Vec<u32>,
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("transport", &self.transport)
            .field("state", &self.state)
            .field("capabilities", &self.capabilities)
            .field("server", &self.server)
            .field("pending", &self.pending.is_some())
            .finish()
    }
}

impl Connection {
    fn new(transport: Transport, params: Arc<ConnectionParameters>) -> Self {
        let decoder = RowDecoder::new(
            params.decode.clone(),
            params.type_cast.clone(),
            params.rows_as_array,
        );
        Self {
            transport: Some(transport),
            state: ConnectionState::Initial,
            read_buf: BytesMut::with_capacity(8192),
            sequence_id: 0,
            params,
            decoder,
            capabilities: CapabilityMask::empty(),
            server: None,
            pending: None,
            deferred_close: Vec::new(),
        }
    }

    /// Open a connection and complete the handshake.
    ///
    /// TCP connect, greeting, TLS upgrade and authentication together must
    /// finish within `connect_timeout`, otherwise `ETIMEDOUT` is returned.
    pub async fn connect(params: Arc<ConnectionParameters>) -> Result<Self> {
        let connect_timeout = params.connect_timeout;
        let span = tracing::info_span!(
            "connect",
            host = %params.host,
            port = params.port,
            user = %params.user,
            database = %params.database
        );

        let attempt = async {
            let transport = Transport::connect_tcp(&params.host, params.port).await?;
            let mut conn = Connection::new(transport, params.clone());
            conn.handshake().await?;
            Ok::<_, Error>(conn)
        }
        .instrument(span);

        match tokio::time::timeout(connect_timeout, attempt).await {
            Ok(Ok(conn)) => Ok(conn),
            Ok(Err(e)) => {
                crate::metrics::counters::connect_failed(e.code());
                Err(e)
            }
            Err(_) => {
                tracing::debug!(timeout_ms = connect_timeout.as_millis() as u64, "connect timed out");
                crate::metrics::counters::connect_failed("ETIMEDOUT");
                Err(Error::ConnectTimeout)
            }
        }
    }

    /// Get current connection state
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Negotiated capabilities (client request intersected with server offer)
    pub fn capabilities(&self) -> CapabilityMask {
        self.capabilities
    }

    /// Greeting details, available once connected
    pub fn server_info(&self) -> Option<&ServerInfo> {
        self.server.as_ref()
    }

    /// Resolved parameters this connection was opened with
    pub fn params(&self) -> &ConnectionParameters {
        &self.params
    }

    /// Whether a timed-out response is still waiting to be drained
    pub fn has_pending_response(&self) -> bool {
        self.pending.is_some()
    }

    /// Whether the transport is encrypted
    pub fn is_tls(&self) -> bool {
        self.transport.as_ref().is_some_and(Transport::is_tls)
    }

    fn client_capabilities(&self) -> CapabilityMask {
        let p = &self.params;
        CapabilityMask::empty()
            .with(
                capability::LONG_PASSWORD
                    | capability::FOUND_ROWS
                    | capability::LONG_FLAG
                    | capability::PROTOCOL_41
                    | capability::TRANSACTIONS
                    | capability::SECURE_CONNECTION
                    | capability::MULTI_RESULTS
                    | capability::PS_MULTI_RESULTS
                    | capability::PLUGIN_AUTH
                    | capability::PLUGIN_AUTH_LENENC_CLIENT_DATA,
            )
            .with_if(capability::CONNECT_WITH_DB, !p.database.is_empty())
            .with_if(capability::MULTI_STATEMENTS, p.multiple_statements)
            .with_if(capability::COMPRESS, p.compress)
            .with_if(capability::SSL, p.tls.is_some())
    }

    async fn handshake(&mut self) -> Result<()> {
        self.state.transition(ConnectionState::AwaitingHandshake)?;

        let packet = self.receive_packet().await?;
        if packet.is_err() {
            return Err(parse_err(&packet.payload).map_err(protocol)?.into());
        }
        let greeting = parse_handshake(&packet.payload).map_err(protocol)?;
        tracing::debug!(
            server_version = %greeting.server_version,
            connection_id = greeting.connection_id,
            capabilities = ?greeting.capabilities,
            "received greeting"
        );

        let required = capability::PROTOCOL_41 | capability::SECURE_CONNECTION;
        if !greeting.capabilities.contains(required) {
            return Err(Error::Unsupported("server without 4.1 protocol support".into()));
        }

        let caps = self.client_capabilities().intersect(greeting.capabilities);
        if caps.contains(capability::COMPRESS) {
            return Err(Error::Unsupported("compressed protocol".into()));
        }
        self.capabilities = caps;
        let charset = self.params.charset_id()?;

        if let Some(tls) = self.params.tls.clone() {
            if !greeting.capabilities.contains(capability::SSL) {
                return Err(Error::Config("server does not support TLS".into()));
            }
            self.negotiate_tls(&tls, caps, charset).await?;
        }

        self.state.transition(ConnectionState::Authenticating)?;

        let mut plugin = if greeting.auth_plugin_name.is_empty() {
            auth_plugin::NATIVE_PASSWORD.to_string()
        } else {
            greeting.auth_plugin_name.clone()
        };
        let auth_response = match auth_for_plugin(&plugin, &self.params.password, &greeting.scramble) {
            Ok(response) => response,
            Err(_) => {
                // Unknown default plugin; answer with native and let the server switch
                plugin = auth_plugin::NATIVE_PASSWORD.to_string();
                auth_for_plugin(&plugin, &self.params.password, &greeting.scramble)?
            }
        };
        crate::metrics::counters::auth_attempted(&plugin);

        let response = HandshakeResponse {
            capabilities: caps,
            max_packet_size: MAX_PACKET_SIZE,
            character_set: charset,
            username: self.params.user.clone(),
            auth_response,
            database: caps
                .contains(capability::CONNECT_WITH_DB)
                .then(|| self.params.database.clone()),
            auth_plugin_name: Some(plugin),
        };
        self.write_packet(&encode_handshake_response(&response)).await?;

        self.authenticate().await?;

        self.server = Some(ServerInfo {
            server_version: greeting.server_version,
            connection_id: greeting.connection_id,
            capabilities: greeting.capabilities,
            character_set: greeting.character_set,
            status_flags: greeting.status_flags,
        });
        self.state.transition(ConnectionState::Idle)?;
        tracing::info!("connection established");
        Ok(())
    }

    async fn negotiate_tls(
        &mut self,
        tls: &TlsMaterial,
        caps: CapabilityMask,
        charset: u8,
    ) -> Result<()> {
        self.state.transition(ConnectionState::NegotiatingTls)?;

        let request = encode_ssl_request(caps, MAX_PACKET_SIZE, charset);
        self.write_packet(&request).await?;

        let config = TlsConfig::from_material(tls)?;
        let transport = self.transport.take().ok_or(Error::ConnectionClosed)?;
        self.transport = Some(transport.upgrade_to_tls(&config, &self.params.host).await?);
        tracing::debug!("TLS connection established");
        Ok(())
    }

    /// Read auth results until OK, answering switch requests on the way
    async fn authenticate(&mut self) -> Result<()> {
        loop {
            let packet = self.receive_packet().await?;
            let payload = &packet.payload[..];

            match packet.header() {
                Some(header::OK) => {
                    parse_ok(payload).map_err(protocol)?;
                    tracing::debug!("authentication successful");
                    return Ok(());
                }
                Some(header::ERR) => {
                    return Err(parse_err(payload).map_err(protocol)?.into());
                }
                Some(header::AUTH_SWITCH) => {
                    if payload.len() == 1 {
                        return Err(Error::Unsupported("old password authentication".into()));
                    }
                    let request = parse_auth_switch(payload).map_err(protocol)?;
                    tracing::debug!(plugin = %request.plugin_name, "auth switch requested");
                    crate::metrics::counters::auth_attempted(&request.plugin_name);

                    let response = match &self.params.auth_switch_handler {
                        Some(handler) => handler(&request)?,
                        None => auth_for_plugin(
                            &request.plugin_name,
                            &self.params.password,
                            &request.plugin_data,
                        )?,
                    };
                    self.write_packet(&response).await?;
                }
                Some(header::AUTH_MORE_DATA) => match payload.get(1) {
                    // caching_sha2_password fast path succeeded, OK follows
                    Some(0x03) => {}
                    Some(0x04) if self.is_tls() => {
                        let mut clear = self.params.password.as_bytes().to_vec();
                        clear.push(0);
                        self.write_packet(&clear).await?;
                    }
                    Some(0x04) => {
                        return Err(Error::Unsupported(
                            "caching_sha2_password full authentication without TLS".into(),
                        ))
                    }
                    _ => return Err(Error::Protocol("unexpected auth data".into())),
                },
                other => {
                    return Err(Error::Protocol(format!(
                        "unexpected packet during authentication: {:?}",
                        other
                    )))
                }
            }
        }
    }

    /// Run a text query
    pub async fn query(&mut self, options: impl Into<QueryOptions>) -> Result<QueryResult> {
        let options = options.into();
        if !options.values.is_empty() {
            return Err(Error::Unsupported(
                "placeholder values in text queries, use execute".into(),
            ));
        }

        let started = std::time::Instant::now();
        let outcome = self.run_query(&options, None).await;
        Self::record(labels::COMMAND_QUERY, started, &outcome);

        match outcome? {
            Completed::Result(result) => Ok(result),
            other => Err(Error::Protocol(format!("unexpected query completion {:?}", other))),
        }
    }

    /// Run a text query, forwarding fields and rows as they arrive.
    ///
    /// If the receiver goes away the response is still read to completion so
    /// the connection stays usable.
    pub async fn query_events(
        &mut self,
        options: impl Into<QueryOptions>,
        events: &mpsc::Sender<Result<ResultEvent>>,
    ) -> Result<()> {
        let options = options.into();
        let started = std::time::Instant::now();
        let outcome = self.run_query(&options, Some(events)).await;
        Self::record(labels::COMMAND_QUERY, started, &outcome);
        outcome.map(|_| ())
    }

    async fn run_query(
        &mut self,
        options: &QueryOptions,
        events: Option<&mpsc::Sender<Result<ResultEvent>>>,
    ) -> Result<Completed> {
        self.ensure_ready().await?;

        let mut pending = PendingResponse::new(
            ResponseKind::Rows { binary: false },
            self.decoder_for(options),
            labels::COMMAND_QUERY,
        );
        if events.is_some() {
            pending = pending.emitting();
        }
        self.start_command(&Command::Query(options.sql.clone()), pending)
            .await?;

        let deadline = self.deadline(options.timeout);
        within(deadline, self.read_response(events)).await
    }

    /// Run a statement through the binary protocol: prepare, execute, close.
    pub async fn execute(&mut self, options: impl Into<QueryOptions>) -> Result<QueryResult> {
        let options = options.into();
        let started = std::time::Instant::now();
        let outcome = self.run_execute(options).await;
        Self::record(labels::COMMAND_EXECUTE, started, &outcome);
        outcome
    }

    async fn run_execute(&mut self, options: QueryOptions) -> Result<QueryResult> {
        self.ensure_ready().await?;
        let decoder = self.decoder_for(&options);

        let prepare = PendingResponse::new(ResponseKind::Prepare, decoder.clone(), labels::COMMAND_EXECUTE);
        self.start_command(&Command::StmtPrepare(options.sql.clone()), prepare)
            .await?;
        let deadline = self.deadline(options.timeout);
        let statement = match within(deadline, self.read_response(None)).await? {
            Completed::Prepared { ok, .. } => ok,
            other => {
                return Err(Error::Protocol(format!(
                    "unexpected prepare completion {:?}",
                    other
                )))
            }
        };

        if options.values.len() != statement.num_params as usize {
            self.deferred_close.push(statement.statement_id);
            self.flush_deferred_close().await?;
            return Err(Error::Config(format!(
                "statement expects {} values, got {}",
                statement.num_params,
                options.values.len()
            )));
        }

        let execute = PendingResponse::new(
            ResponseKind::Rows { binary: true },
            decoder,
            labels::COMMAND_EXECUTE,
        )
        .close_after(statement.statement_id);
        let command = Command::StmtExecute {
            statement_id: statement.statement_id,
            params: options.values,
        };
        self.start_command(&command, execute).await?;

        let deadline = self.deadline(options.timeout);
        let outcome = within(deadline, self.read_response(None)).await;
        // On timeout the statement is closed once its response has been drained
        self.flush_deferred_close().await?;

        match outcome? {
            Completed::Result(result) => Ok(result),
            other => Err(Error::Protocol(format!(
                "unexpected execute completion {:?}",
                other
            ))),
        }
    }

    /// COM_PING, bounded by the connection's query timeout
    pub async fn ping(&mut self) -> Result<()> {
        let started = std::time::Instant::now();
        let outcome = async {
            self.ensure_ready().await?;
            let pending =
                PendingResponse::new(ResponseKind::Simple, self.decoder.clone(), labels::COMMAND_PING);
            self.start_command(&Command::Ping, pending).await?;
            within(self.deadline(None), self.read_response(None)).await
        }
        .await;
        Self::record(labels::COMMAND_PING, started, &outcome);
        outcome.map(|_| ())
    }

    /// Close the connection
    pub async fn close(mut self) -> Result<()> {
        if self.state == ConnectionState::Closed {
            return Ok(());
        }
        let can_quit = self.state == ConnectionState::Idle && self.pending.is_none();
        self.state.transition(ConnectionState::Closed)?;

        if can_quit {
            self.sequence_id = 0;
            let _ = self.write_packet(&encode_command(&Command::Quit)).await;
        }
        if let Some(transport) = self.transport.as_mut() {
            transport.shutdown().await?;
        }
        Ok(())
    }

    fn deadline(&self, timeout: Option<Duration>) -> Option<Instant> {
        timeout
            .or(self.params.query_timeout)
            .map(|timeout| Instant::now() + timeout)
    }

    fn decoder_for(&self, options: &QueryOptions) -> RowDecoder {
        match options.rows_as_array {
            Some(rows_as_array) => self.decoder.with_rows_as_array(rows_as_array),
            None => self.decoder.clone(),
        }
    }

    fn record<T>(command: &'static str, started: std::time::Instant, outcome: &Result<T>) {
        match outcome {
            Err(Error::QueryTimeout) => crate::metrics::counters::query_timed_out(command),
            Ok(_) | Err(Error::Server { .. }) => {
                crate::metrics::counters::query_completed(command);
                crate::metrics::histograms::query_duration(
                    command,
                    started.elapsed().as_millis() as u64,
                );
            }
            Err(_) => {}
        }
    }

    /// Bring the connection back to idle: drain an abandoned response, then
    /// deallocate statements it left behind.
    ///
    /// The drain is not charged to the next command's timeout; that clock
    /// starts once the next command has been written.
    async fn ensure_ready(&mut self) -> Result<()> {
        if self.state == ConnectionState::Closed || self.transport.is_none() {
            return Err(Error::ConnectionClosed);
        }

        if let Some(pending) = &self.pending {
            tracing::debug!(command = pending.label, "draining abandoned response");
            match self.read_response(None).await {
                Ok(Completed::Prepared { ok, .. }) => self.deferred_close.push(ok.statement_id),
                Ok(_) => {}
                Err(e @ Error::Server { .. }) => {
                    tracing::debug!(error = %e, "abandoned command failed");
                }
                Err(e) => return Err(e),
            }
        }

        self.flush_deferred_close().await?;

        if self.state != ConnectionState::Idle {
            return Err(Error::InvalidState {
                expected: ConnectionState::Idle.to_string(),
                actual: self.state.to_string(),
            });
        }
        Ok(())
    }

    async fn flush_deferred_close(&mut self) -> Result<()> {
        if self.state != ConnectionState::Idle {
            return Ok(());
        }
        while let Some(statement_id) = self.deferred_close.pop() {
            self.state.transition(ConnectionState::QueryInProgress)?;
            self.sequence_id = 0;
            self.write_packet(&encode_command(&Command::StmtClose(statement_id)))
                .await?;
            self.state.transition(ConnectionState::Idle)?;
        }
        Ok(())
    }

    async fn start_command(&mut self, command: &Command, pending: PendingResponse) -> Result<()> {
        self.state.transition(ConnectionState::QueryInProgress)?;
        self.sequence_id = 0;
        self.write_packet(&encode_command(command)).await?;
        self.state.transition(ConnectionState::ReadingResults)?;
        self.pending = Some(pending);
        Ok(())
    }

    /// Read the outstanding response to completion.
    ///
    /// Cancel safe: packets are consumed one at a time into `self.pending`, so
    /// a dropped future resumes where it stopped.
    async fn read_response(
        &mut self,
        mut events: Option<&mpsc::Sender<Result<ResultEvent>>>,
    ) -> Result<Completed> {
        loop {
            let packet = self.receive_packet().await?;
            let Some(pending) = self.pending.as_mut() else {
                return Err(Error::InvalidState {
                    expected: ConnectionState::ReadingResults.to_string(),
                    actual: self.state.to_string(),
                });
            };

            match pending.feed(packet) {
                Ok(Step::Continue) => {}
                Ok(Step::Event(event)) => {
                    if let Some(tx) = events {
                        if tx.send(Ok(event)).await.is_err() {
                            tracing::debug!("event receiver dropped, draining");
                            events = None;
                        }
                    }
                }
                Ok(Step::Done(done)) => {
                    self.complete_pending()?;
                    if let (Completed::Streamed(Some(event)), Some(tx)) = (&done, events) {
                        let _ = tx.send(Ok(event.clone())).await;
                    }
                    return Ok(done);
                }
                Err(e @ Error::Server { .. }) => {
                    self.complete_pending()?;
                    return Err(e);
                }
                Err(e) => {
                    self.mark_broken();
                    return Err(e);
                }
            }
        }
    }

    fn complete_pending(&mut self) -> Result<()> {
        if let Some(pending) = self.pending.take() {
            if let Some(statement_id) = pending.close_after {
                self.deferred_close.push(statement_id);
            }
        }
        self.state.transition(ConnectionState::Idle)
    }

    fn mark_broken(&mut self) {
        self.pending = None;
        self.deferred_close.clear();
        self.state = ConnectionState::Closed;
    }

    /// Frame and send one payload, advancing the sequence id
    async fn write_packet(&mut self, payload: &[u8]) -> Result<()> {
        let mut buf = BytesMut::with_capacity(payload.len() + 4);
        let first_seq = self.sequence_id;
        self.sequence_id = encode_packet(&mut buf, first_seq, payload);

        if self.params.debug {
            tracing::debug!(
                target: "mysql_harness::packet",
                seq = first_seq,
                len = payload.len(),
                "==> {:02x?}",
                &payload[..payload.len().min(TRACE_BYTES)]
            );
        }

        let transport = self.transport.as_mut().ok_or(Error::ConnectionClosed)?;
        let written = async {
            transport.write_all(&buf).await?;
            transport.flush().await
        }
        .await;
        if written.is_err() {
            self.mark_broken();
        }
        written
    }

    /// Receive one (reassembled) packet
    async fn receive_packet(&mut self) -> Result<Packet> {
        loop {
            match decode_packet(&self.read_buf) {
                Ok((packet, consumed)) => {
                    self.read_buf.advance(consumed);
                    self.sequence_id = packet.sequence_id.wrapping_add(1);
                    if self.params.debug {
                        tracing::debug!(
                            target: "mysql_harness::packet",
                            seq = packet.sequence_id,
                            len = packet.payload.len(),
                            "<== {:02x?}",
                            &packet.payload[..packet.payload.len().min(TRACE_BYTES)]
                        );
                    }
                    return Ok(packet);
                }
                Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => {}
                Err(e) => {
                    self.mark_broken();
                    return Err(protocol(e));
                }
            }

            let transport = self.transport.as_mut().ok_or(Error::ConnectionClosed)?;
            let n = match transport.read_buf(&mut self.read_buf).await {
                Ok(n) => n,
                Err(Error::Io(e)) => {
                    self.mark_broken();
                    return Err(Error::from_read(e));
                }
                Err(e) => return Err(e),
            };
            if n == 0 {
                self.mark_broken();
                return Err(Error::ConnectionLost);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_options_builder() {
        let opts = QueryOptions::new("SELECT 1")
            .timeout(Duration::from_millis(500))
            .rows_as_array(true);
        assert_eq!(opts.sql, "SELECT 1");
        assert_eq!(opts.timeout, Some(Duration::from_millis(500)));
        assert_eq!(opts.rows_as_array, Some(true));
        assert!(opts.values.is_empty());

        let from_str: QueryOptions = "SELECT 2".into();
        assert_eq!(from_str.timeout, None);
    }

    #[tokio::test]
    async fn test_within_maps_expiry_to_query_timeout() {
        let deadline = Some(Instant::now() + Duration::from_millis(10));
        let err = within(deadline, async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok::<_, Error>(())
        })
        .await
        .unwrap_err();
        assert_eq!(err.code(), "PROTOCOL_SEQUENCE_TIMEOUT");

        let ok = within(None, async { Ok::<_, Error>(7) }).await.unwrap();
        assert_eq!(ok, 7);
    }

    // Connection futures must be Send to run on the multi-threaded runtime
    #[allow(dead_code)]
    fn assert_send() {
        fn require_send<T: Send>(_: &T) {}
        let params = Arc::new(ConnectionParameters::default());
        require_send(&Connection::connect(params));
    }
}
