//! Mock MySQL server
//!
//! This module handles:
//! * Binding free ports from a process-wide cursor
//! * Greeting every accepted connection with one protocol-10 handshake
//! * Scripted answers to queries and prepared statements

mod mock;
mod portfinder;
mod responder;

pub use mock::{
    server_capabilities, MockServer, ServerConnection, ServerConnectionState, ServerStats,
    CHARACTER_SET, CONNECTION_ID, SERVER_VERSION, STATUS_FLAGS,
};
pub use portfinder::{PortFinder, BASE_PORT};
pub use responder::{MockResponder, Reply};
