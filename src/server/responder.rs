//! Scripted command handling for the mock server

use super::mock::ServerConnection;
use crate::auth::verify_native_password;
use crate::protocol::constants::{column_type, server_error, status};
use crate::protocol::{ColumnDefinition, Command, ErrPacket, OkPacket, StmtPrepareOk};
use crate::Result;
use std::collections::HashMap;
use std::time::Duration;

/// What the mock answers to a statement
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    /// Result set; column types are inferred from the values
    Rows {
        columns: Vec<String>,
        rows: Vec<Vec<Option<String>>>,
    },
    Ok(OkPacket),
    Error(ErrPacket),
    /// Wait, then send the inner reply
    Delayed(Duration, Box<Reply>),
    /// Drop the connection without answering
    Hangup,
}

impl Reply {
    /// Single-row result set
    pub fn row<C, V>(columns: C, values: V) -> Self
    where
        C: IntoIterator,
        C::Item: Into<String>,
        V: IntoIterator,
        V::Item: Into<String>,
    {
        Reply::Rows {
            columns: columns.into_iter().map(Into::into).collect(),
            rows: vec![values.into_iter().map(|v| Some(v.into())).collect()],
        }
    }

    /// `self` after `delay`
    pub fn after(self, delay: Duration) -> Self {
        Reply::Delayed(delay, Box::new(self))
    }

    fn column_definitions(&self) -> Vec<ColumnDefinition> {
        match self {
            Reply::Rows { columns, rows } => columns
                .iter()
                .enumerate()
                .map(|(i, name)| {
                    let numeric = !rows.is_empty()
                        && rows.iter().all(|row| {
                            row.get(i)
                                .and_then(|v| v.as_deref())
                                .map_or(true, |v| v.parse::<i64>().is_ok())
                        });
                    let ty = if numeric {
                        column_type::LONGLONG
                    } else {
                        column_type::VAR_STRING
                    };
                    ColumnDefinition::new(name.clone(), ty)
                })
                .collect(),
            Reply::Delayed(_, inner) => inner.column_definitions(),
            _ => Vec::new(),
        }
    }
}

/// Answers commands on mock connections.
///
/// Registered statements take precedence; otherwise `SELECT sleep(N)` and
/// `SELECT` lists of integer or quoted literals are understood.
#[derive(Debug, Clone, Default)]
pub struct MockResponder {
    rules: Vec<(String, Reply)>,
    password: Option<String>,
}

fn normalize(sql: &str) -> String {
    sql.trim().trim_end_matches(';').trim().to_ascii_lowercase()
}

impl MockResponder {
    /// Accepts any credentials
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer `sql` (case-insensitive, surrounding whitespace ignored) with `reply`
    #[must_use]
    pub fn on_query(mut self, sql: &str, reply: Reply) -> Self {
        self.rules.push((normalize(sql), reply));
        self
    }

    /// Reject logins whose native-password scramble does not match
    #[must_use]
    pub fn require_password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    /// Reply for one statement
    pub fn reply_for(&self, sql: &str) -> Reply {
        let normalized = normalize(sql);
        if let Some((_, reply)) = self.rules.iter().find(|(s, _)| *s == normalized) {
            return reply.clone();
        }
        if let Some(reply) = parse_sleep(&normalized) {
            return reply;
        }
        if let Some(reply) = parse_literal_select(sql.trim().trim_end_matches(';')) {
            return reply;
        }
        Reply::Error(ErrPacket::new(
            server_error::ER_PARSE_ERROR,
            format!("You have an error in your SQL syntax near '{}'", sql.trim()),
        ))
    }

    /// Authenticate and answer commands until the peer quits
    pub async fn serve(&self, mut conn: ServerConnection) -> Result<()> {
        let Some(login) = conn.read_handshake_response().await? else {
            return Ok(());
        };

        if let Some(password) = &self.password {
            if !verify_native_password(password, conn.scramble(), &login.auth_response) {
                tracing::debug!(user = %login.username, "mock rejected login");
                return conn.write_err(&ErrPacket::access_denied(&login.username)).await;
            }
        }
        conn.write_ok(&idle_ok()).await?;

        let mut statements: HashMap<u32, String> = HashMap::new();
        let mut next_statement = 1u32;

        while let Some(command) = conn.read_command().await? {
            match command {
                Command::Quit => break,
                Command::Ping | Command::ResetConnection | Command::InitDb(_) => {
                    conn.write_ok(&idle_ok()).await?
                }
                Command::Query(sql) => {
                    if !self.answer(&mut conn, &sql, false).await? {
                        return Ok(());
                    }
                }
                Command::StmtPrepare(sql) => {
                    let statement_id = next_statement;
                    next_statement += 1;

                    let params: Vec<ColumnDefinition> = (0..sql.matches('?').count())
                        .map(|_| ColumnDefinition::new("?", column_type::VAR_STRING))
                        .collect();
                    let columns = self.reply_for(&sql).column_definitions();
                    let ok = StmtPrepareOk {
                        statement_id,
                        num_columns: columns.len() as u16,
                        num_params: params.len() as u16,
                        warnings: 0,
                    };
                    statements.insert(statement_id, sql);
                    conn.write_prepare_ok(&ok, &params, &columns).await?;
                }
                Command::StmtExecute { statement_id, .. } => {
                    let Some(sql) = statements.get(&statement_id).cloned() else {
                        conn.write_err(&ErrPacket::new(
                            1243,
                            format!("Unknown prepared statement handler ({statement_id}) given to mysqld_stmt_execute"),
                        ))
                        .await?;
                        continue;
                    };
                    if !self.answer(&mut conn, &sql, true).await? {
                        return Ok(());
                    }
                }
                Command::StmtClose(statement_id) => {
                    statements.remove(&statement_id);
                }
                Command::Other { command, .. } => {
                    conn.write_err(&ErrPacket::new(
                        server_error::ER_UNKNOWN_COM_ERROR,
                        format!("Unknown command 0x{command:02x}"),
                    ))
                    .await?
                }
            }
        }

        Ok(())
    }

    /// Send the reply for `sql`. Returns false when the connection should drop.
    async fn answer(&self, conn: &mut ServerConnection, sql: &str, binary: bool) -> Result<bool> {
        let mut reply = self.reply_for(sql);
        loop {
            match reply {
                Reply::Delayed(delay, inner) => {
                    tokio::time::sleep(delay).await;
                    reply = *inner;
                }
                Reply::Rows { ref rows, .. } => {
                    let columns = reply.column_definitions();
                    if binary {
                        conn.write_binary_result(&columns, rows).await?;
                    } else {
                        conn.write_text_result(&columns, rows).await?;
                    }
                    return Ok(true);
                }
                Reply::Ok(ok) => {
                    conn.write_ok(&ok).await?;
                    return Ok(true);
                }
                Reply::Error(err) => {
                    conn.write_err(&err).await?;
                    return Ok(true);
                }
                Reply::Hangup => return Ok(false),
            }
        }
    }
}

fn idle_ok() -> OkPacket {
    OkPacket {
        status_flags: status::AUTOCOMMIT,
        ..OkPacket::default()
    }
}

/// `select sleep(N) [as alias]`, already lowercased
fn parse_sleep(sql: &str) -> Option<Reply> {
    let rest = sql.strip_prefix("select")?.trim_start();
    let rest = rest.strip_prefix("sleep")?.trim_start();
    let rest = rest.strip_prefix('(')?;
    let close = rest.find(')')?;
    let seconds: f64 = rest[..close].trim().parse().ok()?;
    let delay = Duration::try_from_secs_f64(seconds).ok()?;

    let tail = rest[close + 1..].trim();
    let name = match tail {
        "" => format!("sleep({})", rest[..close].trim()),
        _ => parse_alias(tail)?.to_string(),
    };

    Some(Reply::row([name], ["0"]).after(delay))
}

fn parse_alias(tail: &str) -> Option<&str> {
    let alias = match tail.get(..3) {
        Some(kw) if kw.eq_ignore_ascii_case("as ") => &tail[3..],
        _ => tail,
    };
    let alias = alias.trim().trim_matches('`');
    let valid = !alias.is_empty() && alias.chars().all(|c| c.is_alphanumeric() || c == '_');
    valid.then_some(alias)
}

/// `SELECT 1`, `SELECT 1 AS a, 'x' AS b`
fn parse_literal_select(sql: &str) -> Option<Reply> {
    let keyword = sql.get(..6)?;
    let list = &sql[6..];
    if !keyword.eq_ignore_ascii_case("select") || !list.starts_with(char::is_whitespace) {
        return None;
    }

    let mut columns = Vec::new();
    let mut values = Vec::new();
    for item in list.split(',') {
        let item = item.trim();
        let (expr, alias) = match item.find(char::is_whitespace) {
            Some(split) => (&item[..split], Some(parse_alias(item[split..].trim())?)),
            None => (item, None),
        };

        let value = if expr.parse::<i64>().is_ok() {
            expr.to_string()
        } else if expr.len() >= 2 && expr.starts_with('\'') && expr.ends_with('\'') {
            expr[1..expr.len() - 1].to_string()
        } else {
            return None;
        };
        columns.push(alias.unwrap_or(expr).to_string());
        values.push(value);
    }

    Some(Reply::row(columns, values))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sleep_parsing() {
        let reply = MockResponder::new().reply_for("SELECT sleep(3) as result");
        match reply {
            Reply::Delayed(delay, inner) => {
                assert_eq!(delay, Duration::from_secs(3));
                assert_eq!(*inner, Reply::row(["result"], ["0"]));
            }
            other => panic!("unexpected reply {other:?}"),
        }

        let reply = MockResponder::new().reply_for("select SLEEP(0.5)");
        assert!(matches!(reply, Reply::Delayed(d, _) if d == Duration::from_millis(500)));
    }

    #[test]
    fn test_literal_select() {
        let reply = MockResponder::new().reply_for("SELECT 1 AS one, 'x' AS letter");
        assert_eq!(reply, Reply::row(["one", "letter"], ["1", "x"]));

        let cols = reply.column_definitions();
        assert_eq!(cols[0].column_type, column_type::LONGLONG);
        assert_eq!(cols[1].column_type, column_type::VAR_STRING);

        let reply = MockResponder::new().reply_for("SELECT 1");
        assert_eq!(reply, Reply::row(["1"], ["1"]));
    }

    #[test]
    fn test_unrepresentable_sleep_is_parse_error() {
        for sql in ["SELECT sleep(1e300)", "SELECT sleep(-1)", "SELECT sleep(inf)", "SELECT sleep(NaN)"] {
            let reply = MockResponder::new().reply_for(sql);
            assert!(
                matches!(reply, Reply::Error(ref e) if e.code == server_error::ER_PARSE_ERROR),
                "{sql}: {reply:?}"
            );
        }
    }

    #[test]
    fn test_rules_take_precedence() {
        let responder = MockResponder::new().on_query("SELECT 1", Reply::Hangup);
        assert_eq!(responder.reply_for("  select 1; "), Reply::Hangup);
    }

    #[test]
    fn test_unknown_statement_is_parse_error() {
        let reply = MockResponder::new().reply_for("SELECT * FROM users");
        assert!(matches!(reply, Reply::Error(e) if e.code == server_error::ER_PARSE_ERROR));
    }
}
