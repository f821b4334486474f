//! Buffering result events into one query result
//!
//! One accumulator per query. It moves `Open -> Accumulating -> Finalized` and
//! refuses events once finalized.

use crate::connection::{QueryResult, ResultEvent, ResultSet};
use crate::protocol::{ColumnDefinition, OkPacket};
use crate::stream::QueryStream;
use crate::{Error, Result};
use futures::StreamExt;

/// Accumulator lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccumulatorState {
    /// Nothing received yet
    Open,
    /// At least one event received
    Accumulating,
    /// End seen; the result has been handed out
    Finalized,
}

impl std::fmt::Display for AccumulatorState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Open => write!(f, "open"),
            Self::Accumulating => write!(f, "accumulating"),
            Self::Finalized => write!(f, "finalized"),
        }
    }
}

/// Per-query row buffer
#[derive(Debug)]
pub struct RowAccumulator {
    state: AccumulatorState,
    current: Option<ResultSet>,
    results: Vec<QueryResult>,
    rows_seen: usize,
}

impl Default for RowAccumulator {
    fn default() -> Self {
        Self::new()
    }
}

impl RowAccumulator {
    pub fn new() -> Self {
        Self {
            state: AccumulatorState::Open,
            current: None,
            results: Vec::new(),
            rows_seen: 0,
        }
    }

    pub fn state(&self) -> AccumulatorState {
        self.state
    }

    /// Rows buffered so far, across result sets
    pub fn rows_seen(&self) -> usize {
        self.rows_seen
    }

    /// Take one event in arrival order
    pub fn push(&mut self, event: ResultEvent) -> Result<()> {
        if self.state == AccumulatorState::Finalized {
            return Err(Error::InvalidState {
                expected: AccumulatorState::Accumulating.to_string(),
                actual: self.state.to_string(),
            });
        }
        self.state = AccumulatorState::Accumulating;

        match event {
            ResultEvent::Fields(fields) => {
                self.flush_current();
                let columns: Vec<ColumnDefinition> = fields.iter().cloned().collect();
                self.current = Some(ResultSet {
                    columns,
                    rows: Vec::new(),
                });
            }
            ResultEvent::Row(row) => {
                let set = self
                    .current
                    .as_mut()
                    .ok_or_else(|| Error::Protocol("row event before fields".into()))?;
                set.rows.push(row);
                self.rows_seen += 1;
            }
            ResultEvent::Ok(ok) => {
                self.flush_current();
                self.results.push(QueryResult::Ok(ok));
            }
        }
        Ok(())
    }

    fn flush_current(&mut self) {
        if let Some(set) = self.current.take() {
            self.results.push(QueryResult::Rows(set));
        }
    }

    /// End of stream: produce the aggregate result exactly once
    pub fn finish(&mut self) -> Result<QueryResult> {
        if self.state == AccumulatorState::Finalized {
            return Err(Error::InvalidState {
                expected: AccumulatorState::Accumulating.to_string(),
                actual: self.state.to_string(),
            });
        }
        self.flush_current();
        self.state = AccumulatorState::Finalized;

        let mut results = std::mem::take(&mut self.results);
        Ok(match results.len() {
            0 => QueryResult::Ok(OkPacket::default()),
            1 => results.remove(0),
            _ => QueryResult::Multiple(results),
        })
    }
}

/// Drain a query stream into one result. The first error ends collection.
pub async fn collect(mut stream: QueryStream) -> Result<QueryResult> {
    let mut acc = RowAccumulator::new();
    while let Some(event) = stream.next().await {
        acc.push(event?)?;
    }
    acc.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::constants::column_type;
    use serde_json::json;
    use std::sync::Arc;

    fn fields(name: &str) -> ResultEvent {
        let cols: Arc<[ColumnDefinition]> =
            vec![ColumnDefinition::new(name, column_type::LONGLONG)].into();
        ResultEvent::Fields(cols)
    }

    #[test]
    fn test_lifecycle() {
        let mut acc = RowAccumulator::new();
        assert_eq!(acc.state(), AccumulatorState::Open);
        acc.push(fields("a")).unwrap();
        assert_eq!(acc.state(), AccumulatorState::Accumulating);
        acc.push(ResultEvent::Row(json!({"a": 1}))).unwrap();
        acc.push(ResultEvent::Row(json!({"a": 2}))).unwrap();

        let result = acc.finish().unwrap();
        assert_eq!(acc.state(), AccumulatorState::Finalized);
        assert_eq!(result.rows(), &[json!({"a": 1}), json!({"a": 2})]);
        assert_eq!(acc.rows_seen(), 2);
    }

    #[test]
    fn test_finalized_rejects_events() {
        let mut acc = RowAccumulator::new();
        acc.finish().unwrap();
        assert!(acc.push(ResultEvent::Row(json!({}))).is_err());
        assert!(acc.finish().is_err());
    }

    #[test]
    fn test_row_before_fields() {
        let mut acc = RowAccumulator::new();
        let err = acc.push(ResultEvent::Row(json!({"a": 1}))).unwrap_err();
        assert!(matches!(err, Error::Protocol(_)));
    }

    #[test]
    fn test_multiple_result_sets() {
        let mut acc = RowAccumulator::new();
        acc.push(fields("a")).unwrap();
        acc.push(ResultEvent::Row(json!({"a": 1}))).unwrap();
        acc.push(fields("b")).unwrap();
        acc.push(ResultEvent::Row(json!({"b": 2}))).unwrap();
        acc.push(ResultEvent::Ok(OkPacket::default())).unwrap();

        match acc.finish().unwrap() {
            QueryResult::Multiple(all) => {
                assert_eq!(all.len(), 3);
                assert_eq!(all[1].rows(), &[json!({"b": 2})]);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_collect_under_backpressure() {
        // Channel of one slot: the producer waits on every event
        let (tx, rx) = tokio::sync::mpsc::channel(1);
        let stream = QueryStream::from_receiver(rx);
        let producer = tokio::spawn(async move {
            tx.send(Ok(fields("n"))).await.unwrap();
            for i in 0..500 {
                tx.send(Ok(ResultEvent::Row(json!({ "n": i })))).await.unwrap();
            }
        });

        let result = collect(stream).await.unwrap();
        producer.await.unwrap();

        let got: Vec<i64> = result
            .rows()
            .iter()
            .map(|r| r["n"].as_i64().unwrap())
            .collect();
        assert_eq!(got, (0..500).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn test_collect_surfaces_error() {
        let (tx, rx) = tokio::sync::mpsc::channel(4);
        tx.send(Ok(fields("a"))).await.unwrap();
        tx.send(Err(Error::QueryTimeout)).await.unwrap();
        drop(tx);

        let err = collect(QueryStream::from_receiver(rx)).await.unwrap_err();
        assert_eq!(err.code(), "PROTOCOL_SEQUENCE_TIMEOUT");
    }
}
