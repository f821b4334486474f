//! MySQL client/server protocol
//!
//! This module handles:
//! * Packet framing (3-byte length, 1-byte sequence id)
//! * Handshake, OK, ERR, EOF and column definition packets
//! * Command phase requests
//! * Capability negotiation

pub mod capability;
pub mod constants;
pub mod decode;
pub mod encode;
pub mod message;

pub use capability::CapabilityMask;
pub use decode::{decode_packet, PacketReader};
pub use encode::encode_packet;
pub use message::{
    AuthSwitchRequest, ColumnDefinition, Command, EofPacket, ErrPacket, HandshakePayload,
    HandshakeResponse, OkPacket, Packet, StmtPrepareOk,
};
