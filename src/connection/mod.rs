//! Connection management
//!
//! This module handles:
//! * Transport (plain TCP, upgraded to TLS on request)
//! * Connection lifecycle (greeting, authentication, commands)
//! * State machine enforcement
//! * Resumable response reading for timed-out commands

mod conn;
mod response;
mod state;
mod tls;
mod transport;

pub use conn::{Connection, QueryOptions, ServerInfo};
pub use response::{QueryResult, ResultEvent, ResultSet};
pub use state::ConnectionState;
pub use tls::{parse_server_name, TlsConfig};
pub use transport::Transport;
