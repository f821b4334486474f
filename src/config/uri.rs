//! Connection URI parsing
//!
//! Supports:
//! * mysql://[user[:password]@]host[:port][/database][?options]
//!
//! User, password and database are percent-decoded. Recognised options:
//! `connectTimeout` (ms), `compress`, `multipleStatements`, `rowsAsArray`,
//! `debug`, `charset`, `supportBigNumbers`, `bigNumberStrings`,
//! `decimalNumbers`, `dateStrings`, `timezone`.

use super::ConnectionOverrides;
use crate::{Error, Result};
use std::time::Duration;

/// Parsed connection URI
#[derive(Debug, Clone, PartialEq)]
pub struct ConnectionInfo {
    pub user: String,
    pub password: String,
    pub host: String,
    pub port: u16,
    pub database: String,
    /// Options from the query string, plus anything set by the caller
    pub options: ConnectionOverrides,
}

/// Split a query string into decoded key/value pairs
fn query_pairs(query_string: &str) -> Result<Vec<(String, String)>> {
    let query = query_string.trim_start_matches('?');
    if query.is_empty() {
        return Ok(Vec::new());
    }

    query
        .split('&')
        .filter(|pair| !pair.is_empty())
        .map(|pair| {
            let (key, value) = pair.split_once('=').unwrap_or((pair, "true"));
            Ok((percent_decode(key)?, percent_decode(value)?))
        })
        .collect()
}

fn parse_bool(key: &str, value: &str) -> Result<bool> {
    match value.to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" => Ok(true),
        "false" | "0" | "no" => Ok(false),
        _ => Err(Error::Config(format!(
            "invalid boolean '{}' for option {}",
            value, key
        ))),
    }
}

fn percent_decode(s: &str) -> Result<String> {
    let bytes = s.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'%' => {
                let hex = bytes
                    .get(i + 1..i + 3)
                    .and_then(|h| std::str::from_utf8(h).ok())
                    .and_then(|h| u8::from_str_radix(h, 16).ok())
                    .ok_or_else(|| Error::Config(format!("invalid percent-encoding in '{}'", s)))?;
                out.push(hex);
                i += 3;
            }
            b => {
                out.push(b);
                i += 1;
            }
        }
    }
    String::from_utf8(out).map_err(|_| Error::Config(format!("invalid UTF-8 in '{}'", s)))
}

fn percent_encode(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for b in s.bytes() {
        if b.is_ascii_alphanumeric() || matches!(b, b'-' | b'.' | b'_' | b'~') {
            out.push(b as char);
        } else {
            out.push_str(&format!("%{:02X}", b));
        }
    }
    out
}

impl ConnectionInfo {
    /// Parse a `mysql://` URI
    pub fn parse(s: &str) -> Result<Self> {
        let rest = s
            .strip_prefix("mysql://")
            .ok_or_else(|| Error::Config("connection URI must start with mysql://".into()))?;

        let (rest, query_string) = rest.split_once('?').unwrap_or((rest, ""));

        // The last '@' separates credentials from the host
        let (auth, rest) = match rest.rfind('@') {
            Some(pos) => (Some(&rest[..pos]), &rest[pos + 1..]),
            None => (None, rest),
        };

        let (user, password) = match auth {
            Some(auth) => match auth.split_once(':') {
                Some((user, pass)) => (percent_decode(user)?, percent_decode(pass)?),
                None => (percent_decode(auth)?, String::new()),
            },
            None => (String::new(), String::new()),
        };

        let (host_port, database) = match rest.split_once('/') {
            Some((hp, db)) => (hp, percent_decode(db)?),
            None => (rest, String::new()),
        };

        let (host, port) = match host_port.rsplit_once(':') {
            Some((host, port)) => {
                let port = port
                    .parse()
                    .map_err(|_| Error::Config(format!("invalid port '{}'", port)))?;
                (host.to_string(), port)
            }
            None => (host_port.to_string(), super::DEFAULT_PORT),
        };

        if host.is_empty() {
            return Err(Error::Config("connection URI has no host".into()));
        }

        let mut options = ConnectionOverrides::default();
        for (key, value) in query_pairs(query_string)? {
            match key.as_str() {
                "connectTimeout" => {
                    let ms: u64 = value.parse().map_err(|_| {
                        Error::Config(format!("invalid connectTimeout '{}'", value))
                    })?;
                    options.connect_timeout = Some(Duration::from_millis(ms));
                }
                "compress" => options.compress = Some(parse_bool(&key, &value)?),
                "multipleStatements" => {
                    options.multiple_statements = Some(parse_bool(&key, &value)?)
                }
                "rowsAsArray" => options.rows_as_array = Some(parse_bool(&key, &value)?),
                "debug" => options.debug = Some(parse_bool(&key, &value)?),
                "charset" => options.charset = Some(value),
                "supportBigNumbers" => {
                    options.support_big_numbers = Some(parse_bool(&key, &value)?)
                }
                "bigNumberStrings" => options.big_number_strings = Some(parse_bool(&key, &value)?),
                "decimalNumbers" => options.decimal_numbers = Some(parse_bool(&key, &value)?),
                "dateStrings" => options.date_strings = Some(parse_bool(&key, &value)?),
                "timezone" => options.timezone = Some(value),
                other => tracing::warn!(option = other, "ignoring unknown URI option"),
            }
        }

        Ok(Self {
            user,
            password,
            host,
            port,
            database,
            options,
        })
    }

    /// Format back into a URI. Only options that are set are written.
    pub fn to_uri(&self) -> String {
        let mut uri = format!(
            "mysql://{}:{}@{}:{}/{}",
            percent_encode(&self.user),
            percent_encode(&self.password),
            self.host,
            self.port,
            percent_encode(&self.database)
        );

        let o = &self.options;
        let mut params: Vec<(&str, String)> = Vec::new();
        if let Some(t) = o.connect_timeout {
            params.push(("connectTimeout", t.as_millis().to_string()));
        }
        let flags = [
            ("compress", o.compress),
            ("multipleStatements", o.multiple_statements),
            ("rowsAsArray", o.rows_as_array),
            ("debug", o.debug),
            ("supportBigNumbers", o.support_big_numbers),
            ("bigNumberStrings", o.big_number_strings),
            ("decimalNumbers", o.decimal_numbers),
            ("dateStrings", o.date_strings),
        ];
        for (key, value) in flags {
            if let Some(v) = value {
                params.push((key, v.to_string()));
            }
        }
        if let Some(c) = &o.charset {
            params.push(("charset", percent_encode(c)));
        }
        if let Some(tz) = &o.timezone {
            params.push(("timezone", percent_encode(tz)));
        }

        if !params.is_empty() {
            uri.push('?');
            let joined: Vec<String> = params.iter().map(|(k, v)| format!("{}={}", k, v)).collect();
            uri.push_str(&joined.join("&"));
        }

        uri
    }

    /// Turn the parsed URI into overrides. Address, credentials and database are
    /// always present.
    pub fn into_overrides(self) -> ConnectionOverrides {
        ConnectionOverrides {
            host: Some(self.host),
            port: Some(self.port),
            user: Some(self.user),
            password: Some(self.password),
            database: Some(self.database),
            ..self.options
        }
    }
}
