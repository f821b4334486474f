//! mysql-harness: test harness for MySQL wire-protocol clients
//!
//! The crate provides:
//! * Backend defaults from the environment, merged with per-call overrides
//! * A connection factory over two backends (buffered and event-streaming)
//!   plus a pool
//! * Per-command inactivity timeouts that leave the connection usable
//! * A readiness prober that waits for a server to accept logins
//! * A mock server that speaks the greeting and a scripted command phase
//!
//! ```no_run
//! use mysql_harness::{create_connection, BackendConfig, ConnectionOverrides, QueryOptions};
//! use std::time::Duration;
//!
//! # async fn demo() -> mysql_harness::Result<()> {
//! let config = BackendConfig::from_env()?;
//! let mut conn = create_connection(&config, ConnectionOverrides::new());
//! let result = conn
//!     .query(QueryOptions::new("SELECT 1 AS one").timeout(Duration::from_millis(500)))
//!     .await?;
//! println!("{:?}", result.rows());
//! conn.close().await?;
//! # Ok(())
//! # }
//! ```

pub mod auth;
pub mod client;
pub mod config;
pub mod connection;
pub mod error;
pub mod metrics;
pub mod probe;
pub mod protocol;
pub mod row;
pub mod server;
pub mod stream;

pub use client::{create_connection, create_connection_with_uri, create_pool, ConnectionHandle, Pool};
pub use config::{BackendConfig, BackendKind, ConnectionOverrides, ConnectionParameters};
pub use connection::{Connection, QueryOptions, QueryResult, ResultEvent};
pub use error::{Error, Result};
pub use probe::{ProbeError, ReadinessProber, ReadyReport};
pub use server::{MockResponder, MockServer};
pub use stream::EventClient;
