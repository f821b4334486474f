//! Error types
//!
//! Every error carries a driver-style code (see [`Error::code`]) so callers can
//! classify failures the same way a MySQL client library would.

use std::io;
use thiserror::Error;

/// Main error type
#[derive(Debug, Error)]
pub enum Error {
    /// Connection establishment did not finish within the connect timeout
    #[error("connect ETIMEDOUT")]
    ConnectTimeout,

    /// No response arrived within the query inactivity timeout
    #[error("Query inactivity timeout")]
    QueryTimeout,

    /// The server closed the connection mid-exchange
    #[error("Connection lost: The server closed the connection.")]
    ConnectionLost,

    /// I/O error
    #[error("io error: {0}")]
    Io(#[from] io::Error),

    /// Error packet returned by the server
    #[error("{message}")]
    Server {
        /// MySQL error number
        code: u16,
        /// Five character SQLSTATE
        sql_state: String,
        /// Human readable message
        message: String,
    },

    /// Malformed or unexpected packet
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Authentication exchange failed on the client side
    #[error("authentication failed: {0}")]
    Authentication(String),

    /// Invalid configuration
    #[error("invalid configuration: {0}")]
    Config(String),

    /// Operation attempted in the wrong connection state
    #[error("invalid state: expected {expected}, got {actual}")]
    InvalidState {
        /// Expected state description
        expected: String,
        /// Actual state description
        actual: String,
    },

    /// Connection was closed (by `close()` or after a failed connect)
    #[error("Can't add new command when connection is in closed state")]
    ConnectionClosed,

    /// No free port in the scanned range
    #[error("no free port in range {start}..={end}")]
    BindExhausted {
        /// First port tried
        start: u16,
        /// Last port tried
        end: u16,
    },

    /// Feature negotiated by the server that this client cannot speak
    #[error("unsupported: {0}")]
    Unsupported(String),

    /// Row could not be converted into the requested type
    #[error("row conversion failed: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Driver-style error code
    pub fn code(&self) -> &'static str {
        match self {
            Error::ConnectTimeout => "ETIMEDOUT",
            Error::QueryTimeout => "PROTOCOL_SEQUENCE_TIMEOUT",
            Error::ConnectionLost => "PROTOCOL_CONNECTION_LOST",
            Error::Io(e) => io_code(e),
            Error::Server { code, .. } => server_code(*code),
            Error::Protocol(_) => "PROTOCOL_ERROR",
            Error::Authentication(_) => "HANDSHAKE_ERROR",
            Error::Config(_) => "ERR_INVALID_CONFIG",
            Error::InvalidState { .. } => "PROTOCOL_ERROR",
            Error::ConnectionClosed => "PROTOCOL_ENQUEUE_AFTER_QUIT",
            Error::BindExhausted { .. } => "EADDRINUSE",
            Error::Unsupported(_) => "ER_NOT_SUPPORTED_YET",
            Error::Json(_) => "ERR_ROW_CONVERSION",
        }
    }

    /// Whether a connect attempt failing with this error is worth retrying
    /// while waiting for a backend to come up
    pub fn is_transient_connect(&self) -> bool {
        matches!(self.code(), "PROTOCOL_CONNECTION_LOST" | "ETIMEDOUT")
    }

    /// MySQL error number for server errors
    pub fn server_errno(&self) -> Option<u16> {
        match self {
            Error::Server { code, .. } => Some(*code),
            _ => None,
        }
    }

    /// Normalise an I/O error coming off a live connection
    pub(crate) fn from_read(e: io::Error) -> Self {
        match e.kind() {
            io::ErrorKind::UnexpectedEof => Error::ConnectionLost,
            _ => Error::Io(e),
        }
    }
}

fn io_code(e: &io::Error) -> &'static str {
    match e.kind() {
        io::ErrorKind::ConnectionRefused => "ECONNREFUSED",
        io::ErrorKind::ConnectionReset => "ECONNRESET",
        io::ErrorKind::ConnectionAborted => "ECONNABORTED",
        io::ErrorKind::TimedOut => "ETIMEDOUT",
        io::ErrorKind::BrokenPipe => "EPIPE",
        io::ErrorKind::AddrInUse => "EADDRINUSE",
        io::ErrorKind::AddrNotAvailable => "EADDRNOTAVAIL",
        io::ErrorKind::NotFound => "ENOTFOUND",
        io::ErrorKind::PermissionDenied => "EACCES",
        io::ErrorKind::UnexpectedEof => "PROTOCOL_CONNECTION_LOST",
        _ => "EIO",
    }
}

fn server_code(code: u16) -> &'static str {
    use crate::protocol::constants::server_error::*;

    match code {
        ER_CON_COUNT_ERROR => "ER_CON_COUNT_ERROR",
        ER_DBACCESS_DENIED_ERROR => "ER_DBACCESS_DENIED_ERROR",
        ER_ACCESS_DENIED_ERROR => "ER_ACCESS_DENIED_ERROR",
        ER_BAD_DB_ERROR => "ER_BAD_DB_ERROR",
        ER_UNKNOWN_COM_ERROR => "ER_UNKNOWN_COM_ERROR",
        ER_PARSE_ERROR => "ER_PARSE_ERROR",
        ER_NO_SUCH_TABLE => "ER_NO_SUCH_TABLE",
        ER_HOST_NOT_PRIVILEGED => "ER_HOST_NOT_PRIVILEGED",
        ER_SERVER_SHUTDOWN => "ER_SERVER_SHUTDOWN",
        ER_QUERY_INTERRUPTED => "ER_QUERY_INTERRUPTED",
        ER_NOT_SUPPORTED_AUTH_MODE => "ER_NOT_SUPPORTED_AUTH_MODE",
        _ => "ER_UNKNOWN_ERROR",
    }
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;
