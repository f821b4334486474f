//! Protocol message decoding

use super::capability::CapabilityMask;
use super::constants::{capability, command, header};
use super::message::{
    AuthSwitchRequest, ColumnDefinition, Command, EofPacket, ErrPacket, HandshakePayload,
    HandshakeResponse, OkPacket, Packet, StmtPrepareOk,
};
use bytes::{Bytes, BytesMut};
use std::io;

/// Largest reassembled payload accepted (64 MiB, the server's default
/// `max_allowed_packet`).
///
/// Anything larger is rejected before allocation.
pub const MAX_MESSAGE_LENGTH: usize = 64 * 1024 * 1024;

/// Decode one logical packet from the front of `data` without consuming it.
///
/// Payloads split across several max-size frames are reassembled.
///
/// # Returns
/// `Ok((packet, consumed))` - Packet and number of bytes to advance
/// `Err(e)` - `UnexpectedEof` if more bytes are needed, `InvalidData` if the
/// length exceeds [`MAX_MESSAGE_LENGTH`]
pub fn decode_packet(data: &BytesMut) -> io::Result<(Packet, usize)> {
    let mut offset = 0;
    let mut payload: Option<BytesMut> = None;
    let mut sequence_id;

    loop {
        if data.len() < offset + 4 {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "incomplete packet header",
            ));
        }

        let len = u32::from_le_bytes([data[offset], data[offset + 1], data[offset + 2], 0]) as usize;
        sequence_id = data[offset + 3];

        let so_far = payload.as_ref().map_or(0, |p| p.len());
        if so_far + len > MAX_MESSAGE_LENGTH {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!(
                    "packet length {} exceeds maximum allowed {}",
                    so_far + len,
                    MAX_MESSAGE_LENGTH
                ),
            ));
        }

        let body_start = offset + 4;
        if data.len() < body_start + len {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "incomplete packet body",
            ));
        }

        let body = &data[body_start..body_start + len];
        offset = body_start + len;

        if len < super::constants::MAX_PAYLOAD_LEN && payload.is_none() {
            let packet = Packet {
                sequence_id,
                payload: Bytes::copy_from_slice(body),
            };
            return Ok((packet, offset));
        }

        payload.get_or_insert_with(BytesMut::new).extend_from_slice(body);

        if len < super::constants::MAX_PAYLOAD_LEN {
            break;
        }
    }

    let packet = Packet {
        sequence_id,
        payload: payload.map(BytesMut::freeze).unwrap_or_default(),
    };
    Ok((packet, offset))
}

fn eof(what: &str) -> io::Error {
    io::Error::new(io::ErrorKind::UnexpectedEof, what.to_string())
}

fn invalid(what: impl Into<String>) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, what.into())
}

/// Cursor over a packet payload
#[derive(Debug)]
pub struct PacketReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> PacketReader<'a> {
    /// Start reading at the beginning of `data`
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    /// Bytes left
    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    /// Whether the cursor reached the end
    pub fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    /// Peek the next byte
    pub fn peek(&self) -> Option<u8> {
        self.data.get(self.pos).copied()
    }

    /// Read exactly `n` bytes
    pub fn bytes(&mut self, n: usize) -> io::Result<&'a [u8]> {
        if self.remaining() < n {
            return Err(eof("packet truncated"));
        }
        let out = &self.data[self.pos..self.pos + n];
        self.pos += n;
        Ok(out)
    }

    /// Skip `n` bytes
    pub fn skip(&mut self, n: usize) -> io::Result<()> {
        self.bytes(n).map(|_| ())
    }

    pub fn u8(&mut self) -> io::Result<u8> {
        Ok(self.bytes(1)?[0])
    }

    pub fn u16(&mut self) -> io::Result<u16> {
        let b = self.bytes(2)?;
        Ok(u16::from_le_bytes([b[0], b[1]]))
    }

    pub fn u24(&mut self) -> io::Result<u32> {
        let b = self.bytes(3)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], 0]))
    }

    pub fn u32(&mut self) -> io::Result<u32> {
        let b = self.bytes(4)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    pub fn u64(&mut self) -> io::Result<u64> {
        let b = self.bytes(8)?;
        let mut arr = [0u8; 8];
        arr.copy_from_slice(b);
        Ok(u64::from_le_bytes(arr))
    }

    /// Length-encoded integer. `None` for the 0xFB NULL marker.
    pub fn lenenc_int(&mut self) -> io::Result<Option<u64>> {
        match self.u8()? {
            0xfb => Ok(None),
            0xfc => Ok(Some(self.u16()? as u64)),
            0xfd => Ok(Some(self.u24()? as u64)),
            0xfe => Ok(Some(self.u64()?)),
            0xff => Err(invalid("invalid length-encoded integer prefix 0xff")),
            n => Ok(Some(n as u64)),
        }
    }

    /// Length-encoded byte string. `None` for NULL.
    pub fn lenenc_bytes(&mut self) -> io::Result<Option<&'a [u8]>> {
        match self.lenenc_int()? {
            None => Ok(None),
            Some(len) => {
                let len = usize::try_from(len).map_err(|_| invalid("length overflow"))?;
                self.bytes(len).map(Some)
            }
        }
    }

    /// Length-encoded string, NULL read as empty
    pub fn lenenc_string(&mut self) -> io::Result<String> {
        Ok(self
            .lenenc_bytes()?
            .map(|b| String::from_utf8_lossy(b).into_owned())
            .unwrap_or_default())
    }

    /// NUL-terminated string (the terminator is consumed; a missing terminator
    /// reads to the end)
    pub fn null_str(&mut self) -> io::Result<String> {
        let rest = &self.data[self.pos..];
        match rest.iter().position(|&b| b == 0) {
            Some(end) => {
                let s = String::from_utf8_lossy(&rest[..end]).into_owned();
                self.pos += end + 1;
                Ok(s)
            }
            None => Ok(self.rest_str()),
        }
    }

    /// Everything left
    pub fn rest(&mut self) -> &'a [u8] {
        let out = &self.data[self.pos..];
        self.pos = self.data.len();
        out
    }

    /// Everything left, as a lossy string
    pub fn rest_str(&mut self) -> String {
        String::from_utf8_lossy(self.rest()).into_owned()
    }
}

/// Parse a HandshakeV10 greeting
pub fn parse_handshake(payload: &[u8]) -> io::Result<HandshakePayload> {
    let mut r = PacketReader::new(payload);

    let protocol_version = r.u8()?;
    if protocol_version == header::ERR {
        return Err(invalid("server sent an error instead of a greeting"));
    }
    if protocol_version != super::constants::PROTOCOL_VERSION {
        return Err(invalid(format!(
            "unsupported handshake protocol version {}",
            protocol_version
        )));
    }

    let server_version = r.null_str()?;
    let connection_id = r.u32()?;
    let mut scramble = r.bytes(8)?.to_vec();
    r.skip(1)?;

    let lower = r.u16()?;
    let mut capabilities = CapabilityMask::from_halves(lower, 0);
    let mut character_set = 0;
    let mut status_flags = 0;
    let mut auth_plugin_name = String::new();

    if !r.is_empty() {
        character_set = r.u8()?;
        status_flags = r.u16()?;
        let upper = r.u16()?;
        capabilities = CapabilityMask::from_halves(lower, upper);

        let auth_data_len = r.u8()?;
        r.skip(10)?;

        if capabilities.contains(capability::SECURE_CONNECTION) {
            let part2_len = (auth_data_len as usize).saturating_sub(9).max(12);
            let part2 = r.bytes(part2_len.min(r.remaining()))?;
            scramble.extend_from_slice(part2);
            // Trailing NUL of the scramble
            if r.peek() == Some(0) {
                r.skip(1)?;
            }
        }

        if capabilities.contains(capability::PLUGIN_AUTH) {
            auth_plugin_name = r.null_str()?;
        }
    }

    // Drop any trailing NUL kept in the scramble
    while scramble.len() > super::constants::SCRAMBLE_LEN && scramble.last() == Some(&0) {
        scramble.pop();
    }

    Ok(HandshakePayload {
        protocol_version,
        server_version,
        connection_id,
        scramble,
        capabilities,
        character_set,
        status_flags,
        auth_plugin_name,
    })
}

/// Whether a handshake response payload is only an SSL request
pub fn is_ssl_request(payload: &[u8]) -> bool {
    payload.len() == 32
        && CapabilityMask::from_bits(u32::from_le_bytes([
            payload[0], payload[1], payload[2], payload[3],
        ]))
        .contains(capability::SSL)
}

/// Parse a HandshakeResponse41
pub fn parse_handshake_response(payload: &[u8]) -> io::Result<HandshakeResponse> {
    let mut r = PacketReader::new(payload);
    let capabilities = CapabilityMask::from_bits(r.u32()?);
    if !capabilities.contains(capability::PROTOCOL_41) {
        return Err(invalid("client does not speak protocol 4.1"));
    }
    let max_packet_size = r.u32()?;
    let character_set = r.u8()?;
    r.skip(23)?;

    let username = r.null_str()?;

    let auth_response = if capabilities.contains(capability::PLUGIN_AUTH_LENENC_CLIENT_DATA) {
        r.lenenc_bytes()?.unwrap_or_default().to_vec()
    } else if capabilities.contains(capability::SECURE_CONNECTION) {
        let len = r.u8()? as usize;
        r.bytes(len)?.to_vec()
    } else {
        r.null_str()?.into_bytes()
    };

    let database = if capabilities.contains(capability::CONNECT_WITH_DB) && !r.is_empty() {
        Some(r.null_str()?)
    } else {
        None
    };

    let auth_plugin_name = if capabilities.contains(capability::PLUGIN_AUTH) && !r.is_empty() {
        Some(r.null_str()?)
    } else {
        None
    };

    Ok(HandshakeResponse {
        capabilities,
        max_packet_size,
        character_set,
        username,
        auth_response,
        database,
        auth_plugin_name,
    })
}

/// Parse an OK packet (also accepts the 0xFE form used with DEPRECATE_EOF)
pub fn parse_ok(payload: &[u8]) -> io::Result<OkPacket> {
    let mut r = PacketReader::new(payload);
    let head = r.u8()?;
    if head != header::OK && head != header::EOF {
        return Err(invalid(format!("expected OK packet, got 0x{:02X}", head)));
    }
    let affected_rows = r.lenenc_int()?.unwrap_or(0);
    let last_insert_id = r.lenenc_int()?.unwrap_or(0);
    let status_flags = if r.remaining() >= 2 { r.u16()? } else { 0 };
    let warnings = if r.remaining() >= 2 { r.u16()? } else { 0 };
    let info = r.rest_str();

    Ok(OkPacket {
        affected_rows,
        last_insert_id,
        status_flags,
        warnings,
        info,
    })
}

/// Parse an ERR packet
pub fn parse_err(payload: &[u8]) -> io::Result<ErrPacket> {
    let mut r = PacketReader::new(payload);
    let head = r.u8()?;
    if head != header::ERR {
        return Err(invalid(format!("expected ERR packet, got 0x{:02X}", head)));
    }
    let code = r.u16()?;
    let sql_state = if r.peek() == Some(b'#') {
        r.skip(1)?;
        String::from_utf8_lossy(r.bytes(5usize.min(r.remaining()))?).into_owned()
    } else {
        "HY000".to_string()
    };
    let message = r.rest_str();

    Ok(ErrPacket {
        code,
        sql_state,
        message,
    })
}

/// Parse an EOF packet
pub fn parse_eof(payload: &[u8]) -> io::Result<EofPacket> {
    let mut r = PacketReader::new(payload);
    if r.u8()? != header::EOF {
        return Err(invalid("expected EOF packet"));
    }
    let warnings = if r.remaining() >= 2 { r.u16()? } else { 0 };
    let status_flags = if r.remaining() >= 2 { r.u16()? } else { 0 };
    Ok(EofPacket {
        warnings,
        status_flags,
    })
}

/// Parse a ColumnDefinition41 packet
pub fn parse_column_definition(payload: &[u8]) -> io::Result<ColumnDefinition> {
    let mut r = PacketReader::new(payload);
    let _catalog = r.lenenc_string()?;
    let schema = r.lenenc_string()?;
    let table = r.lenenc_string()?;
    let org_table = r.lenenc_string()?;
    let name = r.lenenc_string()?;
    let org_name = r.lenenc_string()?;
    let _fixed_len = r.lenenc_int()?;
    let character_set = r.u16()?;
    let column_length = r.u32()?;
    let column_type = r.u8()?;
    let flags = r.u16()?;
    let decimals = r.u8()?;

    Ok(ColumnDefinition {
        schema,
        table,
        org_table,
        name,
        org_name,
        character_set,
        column_length,
        column_type,
        flags,
        decimals,
    })
}

/// Parse an auth switch request (0xFE during authentication)
pub fn parse_auth_switch(payload: &[u8]) -> io::Result<AuthSwitchRequest> {
    let mut r = PacketReader::new(payload);
    if r.u8()? != header::AUTH_SWITCH {
        return Err(invalid("expected auth switch request"));
    }
    let plugin_name = r.null_str()?;
    let mut plugin_data = r.rest().to_vec();
    if plugin_data.last() == Some(&0) {
        plugin_data.pop();
    }
    Ok(AuthSwitchRequest {
        plugin_name,
        plugin_data,
    })
}

/// Parse the COM_STMT_PREPARE OK header
pub fn parse_stmt_prepare_ok(payload: &[u8]) -> io::Result<StmtPrepareOk> {
    let mut r = PacketReader::new(payload);
    if r.u8()? != header::OK {
        return Err(invalid("expected prepare OK"));
    }
    let statement_id = r.u32()?;
    let num_columns = r.u16()?;
    let num_params = r.u16()?;
    r.skip(1)?;
    let warnings = if r.remaining() >= 2 { r.u16()? } else { 0 };
    Ok(StmtPrepareOk {
        statement_id,
        num_columns,
        num_params,
        warnings,
    })
}

/// Parse a command phase request (server side).
///
/// For COM_STMT_EXECUTE only the statement id is decoded; parameter values
/// are left unread.
pub fn parse_command(payload: &[u8]) -> io::Result<Command> {
    let mut r = PacketReader::new(payload);
    let code = r.u8()?;
    let cmd = match code {
        command::COM_QUERY => Command::Query(r.rest_str()),
        command::COM_PING => Command::Ping,
        command::COM_QUIT => Command::Quit,
        command::COM_INIT_DB => Command::InitDb(r.rest_str()),
        command::COM_STMT_PREPARE => Command::StmtPrepare(r.rest_str()),
        command::COM_STMT_EXECUTE => Command::StmtExecute {
            statement_id: r.u32()?,
            params: Vec::new(),
        },
        command::COM_STMT_CLOSE => Command::StmtClose(r.u32()?),
        command::COM_RESET_CONNECTION => Command::ResetConnection,
        other => Command::Other {
            command: other,
            body: Bytes::copy_from_slice(r.rest()),
        },
    };
    Ok(cmd)
}
