//! Protocol message encoding

use super::capability::CapabilityMask;
use super::constants::{capability, column_type, header, MAX_PAYLOAD_LEN};
use super::message::{
    ColumnDefinition, Command, EofPacket, ErrPacket, HandshakePayload, HandshakeResponse,
    OkPacket, StmtPrepareOk,
};
use bytes::{BufMut, BytesMut};
use serde_json::Value;

/// Frame `payload` into `buf`, splitting at the maximum payload size.
///
/// Returns the sequence id to use for the next packet.
pub fn encode_packet(buf: &mut BytesMut, mut sequence_id: u8, payload: &[u8]) -> u8 {
    let mut chunks = payload.chunks(MAX_PAYLOAD_LEN).peekable();
    if chunks.peek().is_none() {
        put_header(buf, 0, sequence_id);
        return sequence_id.wrapping_add(1);
    }

    let mut last_len = 0;
    for chunk in chunks {
        put_header(buf, chunk.len(), sequence_id);
        buf.put_slice(chunk);
        sequence_id = sequence_id.wrapping_add(1);
        last_len = chunk.len();
    }

    // A payload that is an exact multiple of the max size needs an empty terminator
    if last_len == MAX_PAYLOAD_LEN {
        put_header(buf, 0, sequence_id);
        sequence_id = sequence_id.wrapping_add(1);
    }

    sequence_id
}

fn put_header(buf: &mut BytesMut, len: usize, sequence_id: u8) {
    buf.put_uint_le(len as u64, 3);
    buf.put_u8(sequence_id);
}

/// Write a length-encoded integer
pub fn put_lenenc_int(buf: &mut BytesMut, value: u64) {
    match value {
        0..=250 => buf.put_u8(value as u8),
        251..=0xFFFF => {
            buf.put_u8(0xfc);
            buf.put_u16_le(value as u16);
        }
        0x1_0000..=0xFF_FFFF => {
            buf.put_u8(0xfd);
            buf.put_uint_le(value, 3);
        }
        _ => {
            buf.put_u8(0xfe);
            buf.put_u64_le(value);
        }
    }
}

/// Write a length-encoded byte string
pub fn put_lenenc_bytes(buf: &mut BytesMut, value: &[u8]) {
    put_lenenc_int(buf, value.len() as u64);
    buf.put_slice(value);
}

/// Write a NUL-terminated string
pub fn put_null_str(buf: &mut BytesMut, value: &str) {
    buf.put_slice(value.as_bytes());
    buf.put_u8(0);
}

/// Encode a HandshakeV10 payload
pub fn encode_handshake(hs: &HandshakePayload) -> BytesMut {
    let mut buf = BytesMut::with_capacity(96);
    buf.put_u8(hs.protocol_version);
    put_null_str(&mut buf, &hs.server_version);
    buf.put_u32_le(hs.connection_id);

    let (part1, part2) = hs.scramble.split_at(hs.scramble.len().min(8));
    buf.put_slice(part1);
    buf.put_bytes(0, 8 - part1.len());
    buf.put_u8(0);

    buf.put_u16_le(hs.capabilities.lower());
    buf.put_u8(hs.character_set);
    buf.put_u16_le(hs.status_flags);
    buf.put_u16_le(hs.capabilities.upper());

    if hs.capabilities.contains(capability::PLUGIN_AUTH) {
        buf.put_u8((hs.scramble.len() + 1) as u8);
    } else {
        buf.put_u8(0);
    }
    buf.put_bytes(0, 10);

    if hs.capabilities.contains(capability::SECURE_CONNECTION) {
        buf.put_slice(part2);
        // Part 2 is at least 12 bytes plus the terminator
        buf.put_bytes(0, 12usize.saturating_sub(part2.len()));
        buf.put_u8(0);
    }

    if hs.capabilities.contains(capability::PLUGIN_AUTH) {
        put_null_str(&mut buf, &hs.auth_plugin_name);
    }

    buf
}

/// Encode a HandshakeResponse41 payload
pub fn encode_handshake_response(resp: &HandshakeResponse) -> BytesMut {
    let mut buf = encode_ssl_request(resp.capabilities, resp.max_packet_size, resp.character_set);
    put_null_str(&mut buf, &resp.username);

    if resp
        .capabilities
        .contains(capability::PLUGIN_AUTH_LENENC_CLIENT_DATA)
    {
        put_lenenc_bytes(&mut buf, &resp.auth_response);
    } else {
        buf.put_u8(resp.auth_response.len() as u8);
        buf.put_slice(&resp.auth_response);
    }

    if resp.capabilities.contains(capability::CONNECT_WITH_DB) {
        put_null_str(&mut buf, resp.database.as_deref().unwrap_or(""));
    }

    if resp.capabilities.contains(capability::PLUGIN_AUTH) {
        put_null_str(&mut buf, resp.auth_plugin_name.as_deref().unwrap_or(""));
    }

    buf
}

/// Encode the fixed 32-byte prefix of a handshake response (also the SSL request)
pub fn encode_ssl_request(
    capabilities: CapabilityMask,
    max_packet_size: u32,
    character_set: u8,
) -> BytesMut {
    let mut buf = BytesMut::with_capacity(128);
    buf.put_u32_le(capabilities.bits());
    buf.put_u32_le(max_packet_size);
    buf.put_u8(character_set);
    buf.put_bytes(0, 23);
    buf
}

/// Encode an OK packet
pub fn encode_ok(ok: &OkPacket) -> BytesMut {
    let mut buf = BytesMut::with_capacity(16 + ok.info.len());
    buf.put_u8(header::OK);
    put_lenenc_int(&mut buf, ok.affected_rows);
    put_lenenc_int(&mut buf, ok.last_insert_id);
    buf.put_u16_le(ok.status_flags);
    buf.put_u16_le(ok.warnings);
    buf.put_slice(ok.info.as_bytes());
    buf
}

/// Encode an ERR packet
pub fn encode_err(err: &ErrPacket) -> BytesMut {
    let mut buf = BytesMut::with_capacity(16 + err.message.len());
    buf.put_u8(header::ERR);
    buf.put_u16_le(err.code);
    buf.put_u8(b'#');
    let state = err.sql_state.as_bytes();
    buf.put_slice(&state[..state.len().min(5)]);
    buf.put_bytes(b'0', 5usize.saturating_sub(state.len()));
    buf.put_slice(err.message.as_bytes());
    buf
}

/// Encode an EOF packet
pub fn encode_eof(eof: &EofPacket) -> BytesMut {
    let mut buf = BytesMut::with_capacity(5);
    buf.put_u8(header::EOF);
    buf.put_u16_le(eof.warnings);
    buf.put_u16_le(eof.status_flags);
    buf
}

/// Encode a ColumnDefinition41 packet
pub fn encode_column_definition(col: &ColumnDefinition) -> BytesMut {
    let mut buf = BytesMut::with_capacity(64);
    put_lenenc_bytes(&mut buf, b"def");
    put_lenenc_bytes(&mut buf, col.schema.as_bytes());
    put_lenenc_bytes(&mut buf, col.table.as_bytes());
    put_lenenc_bytes(&mut buf, col.org_table.as_bytes());
    put_lenenc_bytes(&mut buf, col.name.as_bytes());
    put_lenenc_bytes(&mut buf, col.org_name.as_bytes());
    put_lenenc_int(&mut buf, 0x0c);
    buf.put_u16_le(col.character_set);
    buf.put_u32_le(col.column_length);
    buf.put_u8(col.column_type);
    buf.put_u16_le(col.flags);
    buf.put_u8(col.decimals);
    buf.put_u16(0);
    buf
}

/// Encode a text protocol row (NULL is 0xFB)
pub fn encode_text_row<S: AsRef<str>>(values: &[Option<S>]) -> BytesMut {
    let mut buf = BytesMut::new();
    for value in values {
        match value {
            Some(v) => put_lenenc_bytes(&mut buf, v.as_ref().as_bytes()),
            None => buf.put_u8(0xfb),
        }
    }
    buf
}

/// Encode a binary protocol row.
///
/// Values are given in text form and converted according to each column's type.
pub fn encode_binary_row<S: AsRef<str>>(columns: &[ColumnDefinition], values: &[Option<S>]) -> BytesMut {
    let mut buf = BytesMut::new();
    buf.put_u8(header::OK);

    let mut bitmap = vec![0u8; (columns.len() + 7 + 2) / 8];
    for (i, value) in values.iter().enumerate() {
        if value.is_none() {
            let bit = i + 2;
            bitmap[bit / 8] |= 1 << (bit % 8);
        }
    }
    buf.put_slice(&bitmap);

    for (col, value) in columns.iter().zip(values) {
        if let Some(v) = value {
            put_binary_value(&mut buf, col.column_type, v.as_ref());
        }
    }
    buf
}

fn put_binary_value(buf: &mut BytesMut, ty: u8, text: &str) {
    match ty {
        column_type::TINY => buf.put_i8(text.parse().unwrap_or_default()),
        column_type::SHORT | column_type::YEAR => buf.put_i16_le(text.parse().unwrap_or_default()),
        column_type::LONG | column_type::INT24 => buf.put_i32_le(text.parse().unwrap_or_default()),
        column_type::LONGLONG => buf.put_i64_le(text.parse().unwrap_or_default()),
        column_type::FLOAT => buf.put_f32_le(text.parse().unwrap_or_default()),
        column_type::DOUBLE => buf.put_f64_le(text.parse().unwrap_or_default()),
        _ => put_lenenc_bytes(buf, text.as_bytes()),
    }
}

/// Encode a COM_STMT_PREPARE OK header
pub fn encode_stmt_prepare_ok(ok: &StmtPrepareOk) -> BytesMut {
    let mut buf = BytesMut::with_capacity(12);
    buf.put_u8(header::OK);
    buf.put_u32_le(ok.statement_id);
    buf.put_u16_le(ok.num_columns);
    buf.put_u16_le(ok.num_params);
    buf.put_u8(0);
    buf.put_u16_le(ok.warnings);
    buf
}

/// Encode a command phase request
pub fn encode_command(cmd: &Command) -> BytesMut {
    let mut buf = BytesMut::new();
    buf.put_u8(cmd.code());

    match cmd {
        Command::Query(sql) | Command::StmtPrepare(sql) | Command::InitDb(sql) => {
            buf.put_slice(sql.as_bytes());
        }
        Command::Ping | Command::Quit | Command::ResetConnection => {}
        Command::StmtClose(id) => buf.put_u32_le(*id),
        Command::StmtExecute {
            statement_id,
            params,
        } => encode_stmt_execute(&mut buf, *statement_id, params),
        Command::Other { body, .. } => buf.put_slice(body),
    }

    buf
}

fn encode_stmt_execute(buf: &mut BytesMut, statement_id: u32, params: &[Value]) {
    buf.put_u32_le(statement_id);
    // CURSOR_TYPE_NO_CURSOR, iteration count 1
    buf.put_u8(0);
    buf.put_u32_le(1);

    if params.is_empty() {
        return;
    }

    let mut bitmap = vec![0u8; (params.len() + 7) / 8];
    for (i, p) in params.iter().enumerate() {
        if p.is_null() {
            bitmap[i / 8] |= 1 << (i % 8);
        }
    }
    buf.put_slice(&bitmap);

    // new-params-bound flag, then types
    buf.put_u8(1);
    for p in params {
        let (ty, unsigned) = param_type(p);
        buf.put_u8(ty);
        buf.put_u8(if unsigned { 0x80 } else { 0 });
    }

    for p in params {
        match p {
            Value::Null => {}
            Value::Bool(b) => buf.put_i8(*b as i8),
            Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    buf.put_i64_le(i);
                } else if let Some(u) = n.as_u64() {
                    buf.put_u64_le(u);
                } else {
                    buf.put_f64_le(n.as_f64().unwrap_or_default());
                }
            }
            Value::String(s) => put_lenenc_bytes(buf, s.as_bytes()),
            other => put_lenenc_bytes(buf, other.to_string().as_bytes()),
        }
    }
}

fn param_type(p: &Value) -> (u8, bool) {
    match p {
        Value::Null => (column_type::NULL, false),
        Value::Bool(_) => (column_type::TINY, false),
        Value::Number(n) if n.is_i64() => (column_type::LONGLONG, false),
        Value::Number(n) if n.is_u64() => (column_type::LONGLONG, true),
        Value::Number(_) => (column_type::DOUBLE, false),
        _ => (column_type::VAR_STRING, false),
    }
}
