//! Row decoding
//!
//! Text and binary protocol rows are decoded into `serde_json::Value`.
//! Binary values are first rendered in their text form so both protocols share
//! one conversion path.

use crate::config::{DecodeOptions, TypeCastHook};
use crate::protocol::constants::{charset, column_type};
use crate::protocol::decode::PacketReader;
use crate::protocol::message::ColumnDefinition;
use serde_json::{Map, Number, Value};
use std::io;

/// Largest integer a double represents exactly
const MAX_SAFE_INTEGER: i128 = (1 << 53) - 1;

/// Converts raw column values into JSON rows
#[derive(Debug, Clone, Default)]
pub struct RowDecoder {
    options: DecodeOptions,
    type_cast: Option<TypeCastHook>,
    rows_as_array: bool,
}

impl RowDecoder {
    pub fn new(options: DecodeOptions, type_cast: Option<TypeCastHook>, rows_as_array: bool) -> Self {
        Self {
            options,
            type_cast,
            rows_as_array,
        }
    }

    /// Copy with a different row shape
    #[must_use]
    pub fn with_rows_as_array(&self, rows_as_array: bool) -> Self {
        Self {
            rows_as_array,
            ..self.clone()
        }
    }

    /// Decode a text protocol row
    pub fn decode_text_row(&self, columns: &[ColumnDefinition], payload: &[u8]) -> io::Result<Value> {
        let mut r = PacketReader::new(payload);
        let mut values = Vec::with_capacity(columns.len());
        for col in columns {
            let raw = r.lenenc_bytes()?;
            values.push(self.convert(col, raw));
        }
        Ok(self.shape(columns, values))
    }

    /// Decode a binary protocol row
    pub fn decode_binary_row(&self, columns: &[ColumnDefinition], payload: &[u8]) -> io::Result<Value> {
        let mut r = PacketReader::new(payload);
        r.skip(1)?;
        let bitmap = r.bytes((columns.len() + 7 + 2) / 8)?;

        let mut values = Vec::with_capacity(columns.len());
        for (i, col) in columns.iter().enumerate() {
            let bit = i + 2;
            if bitmap[bit / 8] & (1 << (bit % 8)) != 0 {
                values.push(self.convert(col, None));
                continue;
            }
            let text = binary_to_text(col, &mut r)?;
            values.push(self.convert(col, Some(&text)));
        }
        Ok(self.shape(columns, values))
    }

    fn shape(&self, columns: &[ColumnDefinition], values: Vec<Value>) -> Value {
        if self.rows_as_array {
            return Value::Array(values);
        }
        let mut map = Map::with_capacity(columns.len());
        for (col, value) in columns.iter().zip(values) {
            map.insert(col.name.clone(), value);
        }
        Value::Object(map)
    }

    /// Convert one column value in text form
    pub fn convert(&self, col: &ColumnDefinition, raw: Option<&[u8]>) -> Value {
        if let Some(hook) = &self.type_cast {
            if let Some(v) = hook(col, raw) {
                return v;
            }
        }

        let Some(raw) = raw else {
            return Value::Null;
        };
        let text = String::from_utf8_lossy(raw);

        match col.column_type {
            column_type::TINY
            | column_type::SHORT
            | column_type::LONG
            | column_type::INT24
            | column_type::YEAR => integer(&text, false, &self.options),
            column_type::LONGLONG => integer(&text, true, &self.options),
            column_type::DECIMAL | column_type::NEWDECIMAL => {
                if self.options.decimal_numbers {
                    float(&text)
                } else {
                    Value::String(text.into_owned())
                }
            }
            column_type::FLOAT | column_type::DOUBLE => float(&text),
            column_type::DATE
            | column_type::NEWDATE
            | column_type::DATETIME
            | column_type::TIMESTAMP => self.date(&text),
            column_type::JSON => {
                serde_json::from_str(&text).unwrap_or_else(|_| Value::String(text.into_owned()))
            }
            column_type::BIT => Value::Array(raw.iter().map(|b| Value::from(*b)).collect()),
            column_type::TINY_BLOB
            | column_type::MEDIUM_BLOB
            | column_type::LONG_BLOB
            | column_type::BLOB
            | column_type::VAR_STRING
            | column_type::STRING
            | column_type::GEOMETRY
                if col.character_set == charset::BINARY as u16 =>
            {
                Value::Array(raw.iter().map(|b| Value::from(*b)).collect())
            }
            _ => Value::String(text.into_owned()),
        }
    }

    fn date(&self, text: &str) -> Value {
        if self.options.date_strings {
            return Value::String(text.to_string());
        }
        if text.starts_with("0000-00-00") {
            return Value::Null;
        }
        match iso_datetime(text, &self.options.timezone) {
            Some(iso) => Value::String(iso),
            None => Value::String(text.to_string()),
        }
    }
}

fn integer(text: &str, big: bool, opts: &DecodeOptions) -> Value {
    let Ok(n) = text.parse::<i128>() else {
        return Value::String(text.to_string());
    };

    if big && opts.support_big_numbers && (opts.big_number_strings || n.abs() > MAX_SAFE_INTEGER) {
        return Value::String(text.to_string());
    }

    if let Ok(i) = i64::try_from(n) {
        Value::Number(i.into())
    } else if let Ok(u) = u64::try_from(n) {
        Value::Number(u.into())
    } else {
        Value::String(text.to_string())
    }
}

fn float(text: &str) -> Value {
    text.parse::<f64>()
        .ok()
        .and_then(Number::from_f64)
        .map(Value::Number)
        .unwrap_or_else(|| Value::String(text.to_string()))
}

/// `YYYY-MM-DD[ HH:MM:SS[.ffffff]]` to `YYYY-MM-DDTHH:MM:SS.mmm` plus the zone suffix
fn iso_datetime(text: &str, timezone: &str) -> Option<String> {
    let (date, time) = text.split_once(' ').unwrap_or((text, "00:00:00"));
    if date.len() != 10 || date.as_bytes()[4] != b'-' || date.as_bytes()[7] != b'-' {
        return None;
    }

    let (hms, frac) = time.split_once('.').unwrap_or((time, ""));
    if hms.len() != 8 {
        return None;
    }
    let millis: String = frac.chars().chain(std::iter::repeat('0')).take(3).collect();

    let suffix = match timezone {
        "local" | "" => "",
        tz => tz,
    };

    Some(format!("{}T{}.{}{}", date, hms, millis, suffix))
}

/// Render one binary protocol value in its text protocol form
fn binary_to_text(col: &ColumnDefinition, r: &mut PacketReader<'_>) -> io::Result<Vec<u8>> {
    let unsigned = col.is_unsigned();
    let text = match col.column_type {
        column_type::TINY => {
            let v = r.u8()?;
            if unsigned {
                v.to_string()
            } else {
                (v as i8).to_string()
            }
        }
        column_type::SHORT | column_type::YEAR => {
            let v = r.u16()?;
            if unsigned || col.column_type == column_type::YEAR {
                v.to_string()
            } else {
                (v as i16).to_string()
            }
        }
        column_type::LONG | column_type::INT24 => {
            let v = r.u32()?;
            if unsigned {
                v.to_string()
            } else {
                (v as i32).to_string()
            }
        }
        column_type::LONGLONG => {
            let v = r.u64()?;
            if unsigned {
                v.to_string()
            } else {
                (v as i64).to_string()
            }
        }
        column_type::FLOAT => f32::from_bits(r.u32()?).to_string(),
        column_type::DOUBLE => f64::from_bits(r.u64()?).to_string(),
        column_type::DATE
        | column_type::NEWDATE
        | column_type::DATETIME
        | column_type::TIMESTAMP => binary_datetime(col.column_type, r)?,
        column_type::TIME => binary_time(r)?,
        column_type::NULL => String::new(),
        _ => return Ok(r.lenenc_bytes()?.unwrap_or_default().to_vec()),
    };
    Ok(text.into_bytes())
}

fn binary_datetime(ty: u8, r: &mut PacketReader<'_>) -> io::Result<String> {
    let len = r.u8()?;
    let (mut year, mut month, mut day) = (0u16, 0u8, 0u8);
    let (mut hour, mut minute, mut second, mut micros) = (0u8, 0u8, 0u8, 0u32);

    if len >= 4 {
        year = r.u16()?;
        month = r.u8()?;
        day = r.u8()?;
    }
    if len >= 7 {
        hour = r.u8()?;
        minute = r.u8()?;
        second = r.u8()?;
    }
    if len >= 11 {
        micros = r.u32()?;
    }

    let date = format!("{:04}-{:02}-{:02}", year, month, day);
    if ty == column_type::DATE || ty == column_type::NEWDATE {
        return Ok(date);
    }

    let mut out = format!("{} {:02}:{:02}:{:02}", date, hour, minute, second);
    if micros > 0 {
        out.push_str(&format!(".{:06}", micros));
    }
    Ok(out)
}

fn binary_time(r: &mut PacketReader<'_>) -> io::Result<String> {
    let len = r.u8()?;
    if len == 0 {
        return Ok("00:00:00".to_string());
    }
    let negative = r.u8()? == 1;
    let days = r.u32()?;
    let hour = r.u8()?;
    let minute = r.u8()?;
    let second = r.u8()?;
    let micros = if len >= 12 { r.u32()? } else { 0 };

    let hours = u64::from(days) * 24 + u64::from(hour);
    let mut out = format!(
        "{}{:02}:{:02}:{:02}",
        if negative { "-" } else { "" },
        hours,
        minute,
        second
    );
    if micros > 0 {
        out.push_str(&format!(".{:06}", micros));
    }
    Ok(out)
}
