//! Connection factory
//!
//! Handles are created without touching the network. The first `connect()`,
//! `query()`, `execute()` or `ping()` opens the connection using the backend
//! selected by the configuration at creation time.

use super::accumulator;
use super::pool::Pool;
use crate::config::{BackendConfig, BackendKind, ConnectionInfo, ConnectionOverrides, ConnectionParameters};
use crate::connection::{Connection, QueryOptions, QueryResult};
use crate::stream::EventClient;
use crate::{Error, Result};
use std::sync::Arc;

enum Backend {
    Native(Connection),
    Streaming(EventClient),
}

enum HandleState {
    Pending,
    Ready(Backend),
    Closed,
}

/// Lazily connected client handle
pub struct ConnectionHandle {
    params: Arc<ConnectionParameters>,
    backend: BackendKind,
    state: HandleState,
}

impl std::fmt::Debug for ConnectionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = match self.state {
            HandleState::Pending => "pending",
            HandleState::Ready(_) => "ready",
            HandleState::Closed => "closed",
        };
        f.debug_struct("ConnectionHandle")
            .field("host", &self.params.host)
            .field("port", &self.params.port)
            .field("backend", &self.backend)
            .field("state", &state)
            .finish()
    }
}

/// Resolve `overrides` against `config` and return an unconnected handle
pub fn create_connection(config: &BackendConfig, overrides: ConnectionOverrides) -> ConnectionHandle {
    let params = ConnectionParameters::resolve(&overrides, config);
    ConnectionHandle::new(params, config.backend)
}

/// Round-trip `config` through its `mysql://` form, then resolve
pub fn create_connection_with_uri(config: &BackendConfig) -> Result<ConnectionHandle> {
    let info = ConnectionInfo::parse(&config.uri())?;
    Ok(create_connection(config, info.into_overrides()))
}

/// Resolve and build a pool. Pools always use the native backend.
pub fn create_pool(config: &BackendConfig, overrides: ConnectionOverrides) -> Pool {
    Pool::new(ConnectionParameters::resolve(&overrides, config))
}

impl ConnectionHandle {
    pub fn new(params: ConnectionParameters, backend: BackendKind) -> Self {
        Self {
            params: Arc::new(params),
            backend,
            state: HandleState::Pending,
        }
    }

    /// Resolved parameters
    pub fn params(&self) -> &ConnectionParameters {
        &self.params
    }

    pub fn backend(&self) -> BackendKind {
        self.backend
    }

    pub fn is_connected(&self) -> bool {
        matches!(self.state, HandleState::Ready(_))
    }

    pub fn is_closed(&self) -> bool {
        matches!(self.state, HandleState::Closed)
    }

    /// Establish the connection if not done yet.
    ///
    /// Errors are returned unchanged; the handle is closed afterwards.
    pub async fn connect(&mut self) -> Result<()> {
        match self.state {
            HandleState::Ready(_) => return Ok(()),
            HandleState::Closed => return Err(Error::ConnectionClosed),
            HandleState::Pending => {}
        }

        let label = self.backend.label();
        crate::metrics::counters::connect_attempted(label);
        let started = std::time::Instant::now();

        let connected = match self.backend {
            BackendKind::Native => Connection::connect(self.params.clone())
                .await
                .map(Backend::Native),
            BackendKind::Streaming => EventClient::connect(self.params.clone())
                .await
                .map(Backend::Streaming),
        };

        match connected {
            Ok(backend) => {
                crate::metrics::histograms::connect_duration(
                    label,
                    started.elapsed().as_millis() as u64,
                );
                self.state = HandleState::Ready(backend);
                Ok(())
            }
            Err(e) => {
                tracing::debug!(backend = label, error = %e, code = e.code(), "connect failed");
                self.state = HandleState::Closed;
                Err(e)
            }
        }
    }

    /// Run a text query, connecting first if needed.
    ///
    /// The timeout clock starts only once the connection is established.
    pub async fn query(&mut self, options: impl Into<QueryOptions>) -> Result<QueryResult> {
        let options = options.into();
        match self.ready().await? {
            Backend::Native(conn) => conn.query(options).await,
            Backend::Streaming(client) => {
                let stream = client.query(options).await?;
                accumulator::collect(stream).await
            }
        }
    }

    /// Run a statement through the prepared-statement protocol
    pub async fn execute(&mut self, options: impl Into<QueryOptions>) -> Result<QueryResult> {
        let options = options.into();
        match self.ready().await? {
            Backend::Native(conn) => conn.execute(options).await,
            Backend::Streaming(client) => client.execute(options).await,
        }
    }

    pub async fn ping(&mut self) -> Result<()> {
        match self.ready().await? {
            Backend::Native(conn) => conn.ping().await,
            Backend::Streaming(client) => client.ping().await,
        }
    }

    /// Close the handle. Closing twice, or closing a handle that never
    /// connected, is not an error.
    pub async fn close(&mut self) -> Result<()> {
        match std::mem::replace(&mut self.state, HandleState::Closed) {
            HandleState::Ready(Backend::Native(conn)) => conn.close().await,
            HandleState::Ready(Backend::Streaming(client)) => client.close().await,
            HandleState::Pending | HandleState::Closed => Ok(()),
        }
    }

    async fn ready(&mut self) -> Result<&mut Backend> {
        self.connect().await?;
        match &mut self.state {
            HandleState::Ready(backend) => Ok(backend),
            _ => Err(Error::ConnectionClosed),
        }
    }
}
