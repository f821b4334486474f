//! Protocol message types

use super::capability::CapabilityMask;
use bytes::Bytes;

/// A framed packet: sequence id plus payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    /// Sequence id from the packet header
    pub sequence_id: u8,
    /// Payload without the 4-byte header
    pub payload: Bytes,
}

impl Packet {
    /// First payload byte, if any
    pub fn header(&self) -> Option<u8> {
        self.payload.first().copied()
    }

    /// OK packet (0x00 header, at least 7 bytes)
    pub fn is_ok(&self) -> bool {
        self.header() == Some(super::constants::header::OK) && self.payload.len() >= 7
    }

    /// ERR packet
    pub fn is_err(&self) -> bool {
        self.header() == Some(super::constants::header::ERR)
    }

    /// EOF packet (0xFE header, shorter than 9 bytes)
    pub fn is_eof(&self) -> bool {
        self.header() == Some(super::constants::header::EOF) && self.payload.len() < 9
    }
}

/// Initial handshake sent by the server (HandshakeV10)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandshakePayload {
    /// Always 10
    pub protocol_version: u8,
    /// Human readable server identity
    pub server_version: String,
    /// Server thread id
    pub connection_id: u32,
    /// 20-byte authentication challenge
    pub scramble: Vec<u8>,
    /// Capabilities offered by the server
    pub capabilities: CapabilityMask,
    /// Default collation id
    pub character_set: u8,
    /// Server status flags
    pub status_flags: u16,
    /// Default authentication plugin
    pub auth_plugin_name: String,
}

/// Client reply to the handshake (HandshakeResponse41)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandshakeResponse {
    /// Capabilities requested by the client
    pub capabilities: CapabilityMask,
    /// Max packet size the client accepts
    pub max_packet_size: u32,
    /// Requested collation id
    pub character_set: u8,
    /// Login user
    pub username: String,
    /// Scrambled password
    pub auth_response: Vec<u8>,
    /// Initial schema
    pub database: Option<String>,
    /// Plugin used to compute `auth_response`
    pub auth_plugin_name: Option<String>,
}

/// OK packet
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OkPacket {
    pub affected_rows: u64,
    pub last_insert_id: u64,
    pub status_flags: u16,
    pub warnings: u16,
    pub info: String,
}

/// ERR packet
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrPacket {
    /// MySQL error number
    pub code: u16,
    /// SQLSTATE (HY000 when absent)
    pub sql_state: String,
    /// Error message
    pub message: String,
}

impl ErrPacket {
    /// Create an error packet with the generic SQLSTATE
    pub fn new(code: u16, message: impl Into<String>) -> Self {
        Self {
            code,
            sql_state: "HY000".to_string(),
            message: message.into(),
        }
    }

    /// Access denied for `user`
    pub fn access_denied(user: &str) -> Self {
        Self {
            code: super::constants::server_error::ER_ACCESS_DENIED_ERROR,
            sql_state: "28000".to_string(),
            message: format!("Access denied for user '{}'", user),
        }
    }
}

impl From<ErrPacket> for crate::Error {
    fn from(err: ErrPacket) -> Self {
        crate::Error::Server {
            code: err.code,
            sql_state: err.sql_state,
            message: err.message,
        }
    }
}

/// EOF packet
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EofPacket {
    pub warnings: u16,
    pub status_flags: u16,
}

/// Column definition (ColumnDefinition41)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnDefinition {
    pub schema: String,
    pub table: String,
    pub org_table: String,
    pub name: String,
    pub org_name: String,
    pub character_set: u16,
    pub column_length: u32,
    pub column_type: u8,
    pub flags: u16,
    pub decimals: u8,
}

impl ColumnDefinition {
    /// Column with the given name and type and no table metadata
    pub fn new(name: impl Into<String>, column_type: u8) -> Self {
        let name = name.into();
        Self {
            schema: String::new(),
            table: String::new(),
            org_table: String::new(),
            org_name: name.clone(),
            name,
            character_set: super::constants::charset::UTF8MB4_GENERAL_CI as u16,
            column_length: 255,
            column_type,
            flags: 0,
            decimals: 0,
        }
    }

    /// Whether the UNSIGNED flag is set
    pub fn is_unsigned(&self) -> bool {
        self.flags & super::constants::column_flag::UNSIGNED != 0
    }
}

/// Auth switch request sent by the server during authentication
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthSwitchRequest {
    /// Plugin the server wants the client to use
    pub plugin_name: String,
    /// New challenge data
    pub plugin_data: Vec<u8>,
}

/// COM_STMT_PREPARE OK response header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StmtPrepareOk {
    pub statement_id: u32,
    pub num_columns: u16,
    pub num_params: u16,
    pub warnings: u16,
}

/// Command phase request
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// COM_QUERY
    Query(String),
    /// COM_PING
    Ping,
    /// COM_QUIT
    Quit,
    /// COM_INIT_DB
    InitDb(String),
    /// COM_STMT_PREPARE
    StmtPrepare(String),
    /// COM_STMT_EXECUTE
    StmtExecute {
        statement_id: u32,
        params: Vec<serde_json::Value>,
    },
    /// COM_STMT_CLOSE
    StmtClose(u32),
    /// COM_RESET_CONNECTION
    ResetConnection,
    /// Anything else, kept raw
    Other { command: u8, body: Bytes },
}

impl Command {
    /// Command byte
    pub fn code(&self) -> u8 {
        use super::constants::command::*;

        match self {
            Command::Query(_) => COM_QUERY,
            Command::Ping => COM_PING,
            Command::Quit => COM_QUIT,
            Command::InitDb(_) => COM_INIT_DB,
            Command::StmtPrepare(_) => COM_STMT_PREPARE,
            Command::StmtExecute { .. } => COM_STMT_EXECUTE,
            Command::StmtClose(_) => COM_STMT_CLOSE,
            Command::ResetConnection => COM_RESET_CONNECTION,
            Command::Other { command, .. } => *command,
        }
    }

    /// Whether the server sends no response to this command
    pub fn expects_no_response(&self) -> bool {
        matches!(self, Command::Quit | Command::StmtClose(_))
    }
}
