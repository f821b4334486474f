//! Command responses
//!
//! A response spans several packets. [`PendingResponse`] consumes them one at a
//! time so a read interrupted by a timeout can be resumed (and discarded) by
//! the next command on the same connection.

use crate::protocol::constants::status;
use crate::protocol::decode::{
    parse_column_definition, parse_eof, parse_err, parse_ok, parse_stmt_prepare_ok, PacketReader,
};
use crate::protocol::message::{ColumnDefinition, OkPacket, Packet, StmtPrepareOk};
use crate::row::RowDecoder;
use crate::{Error, Result};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::Arc;

/// Rows of one result set
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResultSet {
    pub columns: Vec<ColumnDefinition>,
    pub rows: Vec<Value>,
}

/// Outcome of a query or execute
#[derive(Debug, Clone, PartialEq)]
pub enum QueryResult {
    /// A result set
    Rows(ResultSet),
    /// A statement without a result set
    Ok(OkPacket),
    /// One entry per statement of a multi-statement query
    Multiple(Vec<QueryResult>),
}

impl QueryResult {
    /// Rows of the first result set (empty when there is none)
    pub fn rows(&self) -> &[Value] {
        match self {
            QueryResult::Rows(set) => &set.rows,
            QueryResult::Ok(_) => &[],
            QueryResult::Multiple(all) => all
                .iter()
                .find(|r| matches!(r, QueryResult::Rows(_)))
                .map_or(&[], |r| r.rows()),
        }
    }

    /// Columns of the first result set
    pub fn columns(&self) -> &[ColumnDefinition] {
        match self {
            QueryResult::Rows(set) => &set.columns,
            QueryResult::Ok(_) => &[],
            QueryResult::Multiple(all) => all
                .iter()
                .find(|r| matches!(r, QueryResult::Rows(_)))
                .map_or(&[], |r| r.columns()),
        }
    }

    /// Take the rows of the first result set
    pub fn into_rows(self) -> Vec<Value> {
        match self {
            QueryResult::Rows(set) => set.rows,
            QueryResult::Ok(_) => Vec::new(),
            QueryResult::Multiple(all) => all
                .into_iter()
                .find(|r| matches!(r, QueryResult::Rows(_)))
                .map(QueryResult::into_rows)
                .unwrap_or_default(),
        }
    }

    /// Deserialize the rows of the first result set
    pub fn rows_as<T: DeserializeOwned>(&self) -> Result<Vec<T>> {
        self.rows()
            .iter()
            .map(|row| serde_json::from_value(row.clone()).map_err(Error::from))
            .collect()
    }

    /// OK packet, for statements without a result set
    pub fn ok_packet(&self) -> Option<&OkPacket> {
        match self {
            QueryResult::Ok(ok) => Some(ok),
            _ => None,
        }
    }
}

/// Incremental result events, used by the event-based backend
#[derive(Debug, Clone, PartialEq)]
pub enum ResultEvent {
    /// Column metadata of the next result set
    Fields(Arc<[ColumnDefinition]>),
    /// One row, in arrival order
    Row(Value),
    /// A statement completed without a result set
    Ok(OkPacket),
}

/// What a completed response produced
#[derive(Debug)]
pub(crate) enum Completed {
    Result(QueryResult),
    Prepared {
        ok: StmtPrepareOk,
        columns: Vec<ColumnDefinition>,
    },
    /// Emit mode: rows were handed out as events. Carries the final OK, if any.
    Streamed(Option<ResultEvent>),
}

/// Result of feeding one packet
#[derive(Debug)]
pub(crate) enum Step {
    Continue,
    Event(ResultEvent),
    Done(Completed),
}

/// Expected response shape
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ResponseKind {
    /// OK or ERR only (ping, init db)
    Simple,
    /// Text or binary result sets
    Rows { binary: bool },
    /// COM_STMT_PREPARE response
    Prepare,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ReadState {
    Header,
    Columns { remaining: u64 },
    ColumnsEof,
    Rows,
    PrepareParams { remaining: u16 },
    PrepareParamsEof,
    PrepareColumns { remaining: u16 },
    PrepareColumnsEof,
}

/// In-flight response reader
#[derive(Debug)]
pub(crate) struct PendingResponse {
    kind: ResponseKind,
    state: ReadState,
    decoder: RowDecoder,
    emit: bool,
    columns: Vec<ColumnDefinition>,
    rows: Vec<Value>,
    results: Vec<QueryResult>,
    prepared: Option<StmtPrepareOk>,
    /// Statement to deallocate once this response is complete
    pub(crate) close_after: Option<u32>,
    /// Command label for metrics
    pub(crate) label: &'static str,
}

fn protocol(e: std::io::Error) -> Error {
    Error::Protocol(e.to_string())
}

impl PendingResponse {
    pub(crate) fn new(kind: ResponseKind, decoder: RowDecoder, label: &'static str) -> Self {
        Self {
            kind,
            state: ReadState::Header,
            decoder,
            emit: false,
            columns: Vec::new(),
            rows: Vec::new(),
            results: Vec::new(),
            prepared: None,
            close_after: None,
            label,
        }
    }

    /// Hand rows out as events instead of buffering them
    pub(crate) fn emitting(mut self) -> Self {
        self.emit = true;
        self
    }

    pub(crate) fn close_after(mut self, statement_id: u32) -> Self {
        self.close_after = Some(statement_id);
        self
    }

    /// Consume one packet. A server error ends the response.
    pub(crate) fn feed(&mut self, packet: Packet) -> Result<Step> {
        let payload = &packet.payload[..];

        match self.state {
            ReadState::Header => self.on_header(&packet),
            ReadState::Columns { remaining } => {
                self.columns
                    .push(parse_column_definition(payload).map_err(protocol)?);
                self.state = if remaining > 1 {
                    ReadState::Columns {
                        remaining: remaining - 1,
                    }
                } else {
                    ReadState::ColumnsEof
                };
                Ok(Step::Continue)
            }
            ReadState::ColumnsEof => {
                if !packet.is_eof() {
                    return Err(Error::Protocol("expected EOF after column definitions".into()));
                }
                self.state = ReadState::Rows;
                if self.emit {
                    let fields: Arc<[ColumnDefinition]> = self.columns.clone().into();
                    return Ok(Step::Event(ResultEvent::Fields(fields)));
                }
                Ok(Step::Continue)
            }
            ReadState::Rows => {
                if packet.is_err() {
                    return Err(parse_err(payload).map_err(protocol)?.into());
                }
                if packet.is_eof() {
                    let eof = parse_eof(payload).map_err(protocol)?;
                    let set = ResultSet {
                        columns: std::mem::take(&mut self.columns),
                        rows: std::mem::take(&mut self.rows),
                    };
                    if !self.emit {
                        self.results.push(QueryResult::Rows(set));
                    }
                    return Ok(self.after_result(eof.status_flags, None));
                }
                let row = match self.kind {
                    ResponseKind::Rows { binary: true } => {
                        self.decoder.decode_binary_row(&self.columns, payload)
                    }
                    _ => self.decoder.decode_text_row(&self.columns, payload),
                }
                .map_err(protocol)?;
                if self.emit {
                    return Ok(Step::Event(ResultEvent::Row(row)));
                }
                self.rows.push(row);
                Ok(Step::Continue)
            }
            ReadState::PrepareParams { remaining } => {
                // Parameter definitions carry no information we use
                self.state = if remaining > 1 {
                    ReadState::PrepareParams {
                        remaining: remaining - 1,
                    }
                } else {
                    ReadState::PrepareParamsEof
                };
                Ok(Step::Continue)
            }
            ReadState::PrepareParamsEof => {
                if !packet.is_eof() {
                    return Err(Error::Protocol("expected EOF after parameter definitions".into()));
                }
                Ok(self.after_prepare_params())
            }
            ReadState::PrepareColumns { remaining } => {
                self.columns
                    .push(parse_column_definition(payload).map_err(protocol)?);
                self.state = if remaining > 1 {
                    ReadState::PrepareColumns {
                        remaining: remaining - 1,
                    }
                } else {
                    ReadState::PrepareColumnsEof
                };
                Ok(Step::Continue)
            }
            ReadState::PrepareColumnsEof => {
                if !packet.is_eof() {
                    return Err(Error::Protocol("expected EOF after prepared columns".into()));
                }
                Ok(self.finish_prepare())
            }
        }
    }

    fn on_header(&mut self, packet: &Packet) -> Result<Step> {
        let payload = &packet.payload[..];
        if packet.is_err() {
            return Err(parse_err(payload).map_err(protocol)?.into());
        }

        match self.kind {
            ResponseKind::Simple => {
                let ok = parse_ok(payload).map_err(protocol)?;
                Ok(Step::Done(Completed::Result(QueryResult::Ok(ok))))
            }
            ResponseKind::Prepare => {
                let ok = parse_stmt_prepare_ok(payload).map_err(protocol)?;
                self.prepared = Some(ok);
                if ok.num_params > 0 {
                    self.state = ReadState::PrepareParams {
                        remaining: ok.num_params,
                    };
                    return Ok(Step::Continue);
                }
                Ok(self.after_prepare_params())
            }
            ResponseKind::Rows { .. } => {
                if packet.header() == Some(crate::protocol::constants::header::OK) {
                    let ok = parse_ok(payload).map_err(protocol)?;
                    let status = ok.status_flags;
                    return Ok(self.after_result(status, Some(ok)));
                }
                if packet.header() == Some(crate::protocol::constants::header::LOCAL_INFILE) {
                    return Err(Error::Unsupported("LOCAL INFILE requests".into()));
                }
                let count = PacketReader::new(payload)
                    .lenenc_int()
                    .map_err(protocol)?
                    .ok_or_else(|| Error::Protocol("NULL column count".into()))?;
                if count == 0 {
                    return Err(Error::Protocol("zero column count".into()));
                }
                self.columns = Vec::with_capacity(count.min(4096) as usize);
                self.state = ReadState::Columns { remaining: count };
                Ok(Step::Continue)
            }
        }
    }

    fn after_result(&mut self, status_flags: u16, ok: Option<OkPacket>) -> Step {
        let event = match ok {
            Some(ok) if self.emit => Some(ResultEvent::Ok(ok)),
            Some(ok) => {
                self.results.push(QueryResult::Ok(ok));
                None
            }
            None => None,
        };

        if status_flags & status::MORE_RESULTS_EXISTS != 0 {
            self.state = ReadState::Header;
            return event.map_or(Step::Continue, Step::Event);
        }

        if self.emit {
            return Step::Done(Completed::Streamed(event));
        }

        let mut results = std::mem::take(&mut self.results);
        let result = if results.len() == 1 {
            results.remove(0)
        } else {
            QueryResult::Multiple(results)
        };
        Step::Done(Completed::Result(result))
    }

    fn after_prepare_params(&mut self) -> Step {
        match self.prepared {
            Some(ok) if ok.num_columns > 0 => {
                self.state = ReadState::PrepareColumns {
                    remaining: ok.num_columns,
                };
                Step::Continue
            }
            _ => self.finish_prepare(),
        }
    }

    fn finish_prepare(&mut self) -> Step {
        match self.prepared {
            Some(ok) => Step::Done(Completed::Prepared {
                ok,
                columns: std::mem::take(&mut self.columns),
            }),
            None => Step::Continue,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::constants::column_type;
    use crate::protocol::encode;
    use crate::protocol::message::{EofPacket, ErrPacket};
    use bytes::{BufMut, BytesMut};
    use serde_json::json;

    fn pkt(payload: BytesMut) -> Packet {
        Packet {
            sequence_id: 1,
            payload: payload.freeze(),
        }
    }

    fn column_count(n: u64) -> Packet {
        let mut buf = BytesMut::new();
        encode::put_lenenc_int(&mut buf, n);
        pkt(buf)
    }

    fn eof(status: u16) -> Packet {
        pkt(encode::encode_eof(&EofPacket {
            warnings: 0,
            status_flags: status,
        }))
    }

    fn feed_all(reader: &mut PendingResponse, packets: Vec<Packet>) -> Vec<Step> {
        packets
            .into_iter()
            .map(|p| reader.feed(p).expect("feed"))
            .collect()
    }

    fn text_result(value: &str) -> Vec<Packet> {
        vec![
            column_count(1),
            pkt(encode::encode_column_definition(&ColumnDefinition::new(
                "a",
                column_type::LONGLONG,
            ))),
            eof(2),
            pkt(encode::encode_text_row(&[Some(value)])),
            eof(2),
        ]
    }

    #[test]
    fn test_text_result_set() {
        let mut reader = PendingResponse::new(
            ResponseKind::Rows { binary: false },
            RowDecoder::default(),
            "query",
        );
        let steps = feed_all(&mut reader, text_result("0"));
        match steps.last() {
            Some(Step::Done(Completed::Result(result))) => {
                assert_eq!(result.rows(), &[json!({"a": 0})]);
                assert_eq!(result.columns()[0].name, "a");
            }
            other => panic!("unexpected {:?}", other),
        }
        assert!(steps[..4].iter().all(|s| matches!(s, Step::Continue)));
    }

    #[test]
    fn test_ok_response() {
        let mut reader = PendingResponse::new(
            ResponseKind::Rows { binary: false },
            RowDecoder::default(),
            "query",
        );
        let ok = OkPacket {
            affected_rows: 3,
            ..OkPacket::default()
        };
        match reader.feed(pkt(encode::encode_ok(&ok))).unwrap() {
            Step::Done(Completed::Result(QueryResult::Ok(got))) => assert_eq!(got.affected_rows, 3),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_server_error_ends_response() {
        let mut reader = PendingResponse::new(ResponseKind::Simple, RowDecoder::default(), "ping");
        let err = reader
            .feed(pkt(encode::encode_err(&ErrPacket::new(1064, "bad"))))
            .unwrap_err();
        assert_eq!(err.server_errno(), Some(1064));
    }

    #[test]
    fn test_multiple_results() {
        let mut reader = PendingResponse::new(
            ResponseKind::Rows { binary: false },
            RowDecoder::default(),
            "query",
        );
        let mut packets = text_result("1");
        packets[4] = eof(status::MORE_RESULTS_EXISTS);
        packets.push(pkt(encode::encode_ok(&OkPacket::default())));

        let steps = feed_all(&mut reader, packets);
        match steps.last() {
            Some(Step::Done(Completed::Result(QueryResult::Multiple(all)))) => {
                assert_eq!(all.len(), 2);
                assert_eq!(all[0].rows(), &[json!({"a": 1})]);
                assert!(all[1].ok_packet().is_some());
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_emit_mode_yields_events_in_order() {
        let mut reader = PendingResponse::new(
            ResponseKind::Rows { binary: false },
            RowDecoder::default(),
            "query",
        )
        .emitting();
        let mut packets = text_result("1");
        packets.insert(4, pkt(encode::encode_text_row(&[Some("2")])));

        let steps = feed_all(&mut reader, packets);
        let rows: Vec<&Value> = steps
            .iter()
            .filter_map(|s| match s {
                Step::Event(ResultEvent::Row(v)) => Some(v),
                _ => None,
            })
            .collect();
        assert_eq!(rows, vec![&json!({"a": 1}), &json!({"a": 2})]);
        assert!(matches!(steps[2], Step::Event(ResultEvent::Fields(_))));
        assert!(matches!(steps.last(), Some(Step::Done(Completed::Streamed(None)))));
    }

    #[test]
    fn test_prepare_response() {
        let mut reader = PendingResponse::new(ResponseKind::Prepare, RowDecoder::default(), "execute");
        let ok = StmtPrepareOk {
            statement_id: 9,
            num_columns: 1,
            num_params: 1,
            warnings: 0,
        };
        let param = ColumnDefinition::new("?", column_type::VAR_STRING);
        let packets = vec![
            pkt(encode::encode_stmt_prepare_ok(&ok)),
            pkt(encode::encode_column_definition(&param)),
            eof(2),
            pkt(encode::encode_column_definition(&ColumnDefinition::new(
                "a",
                column_type::LONGLONG,
            ))),
            eof(2),
        ];
        let steps = feed_all(&mut reader, packets);
        match steps.last() {
            Some(Step::Done(Completed::Prepared { ok: got, columns })) => {
                assert_eq!(got.statement_id, 9);
                assert_eq!(columns.len(), 1);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_missing_eof_is_protocol_error() {
        let mut reader = PendingResponse::new(
            ResponseKind::Rows { binary: false },
            RowDecoder::default(),
            "query",
        );
        reader.feed(column_count(1)).unwrap();
        reader
            .feed(pkt(encode::encode_column_definition(&ColumnDefinition::new(
                "a",
                column_type::LONG,
            ))))
            .unwrap();
        let mut not_eof = BytesMut::new();
        not_eof.put_u8(1);
        let err = reader.feed(pkt(not_eof)).unwrap_err();
        assert!(matches!(err, Error::Protocol(_)));
    }

    #[test]
    fn test_rows_as_struct() {
        #[derive(serde::Deserialize, Debug, PartialEq)]
        struct Row {
            a: i64,
        }
        let result = QueryResult::Rows(ResultSet {
            columns: vec![],
            rows: vec![json!({"a": 0})],
        });
        assert_eq!(result.rows_as::<Row>().unwrap(), vec![Row { a: 0 }]);
    }
}
