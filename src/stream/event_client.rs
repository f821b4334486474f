//! Event-based client
//!
//! A background task owns the connection and serves requests one at a time.
//! Each query gets its own bounded channel of result events, exposed as a
//! [`futures::Stream`]. The task awaits channel capacity, so a slow consumer
//! slows the producer instead of losing events.

use crate::config::ConnectionParameters;
use crate::connection::{Connection, QueryOptions, QueryResult, ResultEvent};
use crate::{Error, Result};
use futures::Stream;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::sync::{mpsc, oneshot};

/// Events buffered per query before the producer waits
pub const DEFAULT_EVENT_BUFFER: usize = 256;

enum Request {
    Query {
        options: QueryOptions,
        events: mpsc::Sender<Result<ResultEvent>>,
    },
    Execute {
        options: QueryOptions,
        reply: oneshot::Sender<Result<QueryResult>>,
    },
    Ping {
        reply: oneshot::Sender<Result<()>>,
    },
    Close {
        reply: oneshot::Sender<Result<()>>,
    },
}

/// Result events of one query. Ends after the last event or an error.
pub struct QueryStream {
    rx: mpsc::Receiver<Result<ResultEvent>>,
}

impl QueryStream {
    /// Wrap a receiver fed by some other producer
    pub fn from_receiver(rx: mpsc::Receiver<Result<ResultEvent>>) -> Self {
        Self { rx }
    }
}

impl Stream for QueryStream {
    type Item = Result<ResultEvent>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}

/// Handle to a connection driven by a background task
#[derive(Debug, Clone)]
pub struct EventClient {
    requests: mpsc::Sender<Request>,
    buffer: usize,
}

impl EventClient {
    /// Connect and spawn the driver task
    pub async fn connect(params: Arc<ConnectionParameters>) -> Result<Self> {
        Self::connect_with_buffer(params, DEFAULT_EVENT_BUFFER).await
    }

    /// Connect with a custom per-query event buffer
    pub async fn connect_with_buffer(params: Arc<ConnectionParameters>, buffer: usize) -> Result<Self> {
        let conn = Connection::connect(params).await?;
        let (requests, rx) = mpsc::channel(16);
        tokio::spawn(drive(conn, rx));
        Ok(Self {
            requests,
            buffer: buffer.max(1),
        })
    }

    /// Start a query; events arrive on the returned stream in wire order
    pub async fn query(&self, options: impl Into<QueryOptions>) -> Result<QueryStream> {
        let (events, rx) = mpsc::channel(self.buffer);
        self.requests
            .send(Request::Query {
                options: options.into(),
                events,
            })
            .await
            .map_err(|_| Error::ConnectionClosed)?;
        Ok(QueryStream { rx })
    }

    /// Prepared statement round trip, buffered
    pub async fn execute(&self, options: impl Into<QueryOptions>) -> Result<QueryResult> {
        let (reply, rx) = oneshot::channel();
        self.requests
            .send(Request::Execute {
                options: options.into(),
                reply,
            })
            .await
            .map_err(|_| Error::ConnectionClosed)?;
        rx.await.map_err(|_| Error::ConnectionClosed)?
    }

    pub async fn ping(&self) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        self.requests
            .send(Request::Ping { reply })
            .await
            .map_err(|_| Error::ConnectionClosed)?;
        rx.await.map_err(|_| Error::ConnectionClosed)?
    }

    /// Close the connection after queued requests have been served
    pub async fn close(self) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        if self.requests.send(Request::Close { reply }).await.is_err() {
            return Ok(());
        }
        rx.await.unwrap_or(Ok(()))
    }
}

async fn drive(mut conn: Connection, mut requests: mpsc::Receiver<Request>) {
    while let Some(request) = requests.recv().await {
        match request {
            Request::Query { options, events } => {
                if let Err(e) = conn.query_events(options, &events).await {
                    tracing::debug!(error = %e, "event query failed");
                    let _ = events.send(Err(e)).await;
                }
            }
            Request::Execute { options, reply } => {
                let _ = reply.send(conn.execute(options).await);
            }
            Request::Ping { reply } => {
                let _ = reply.send(conn.ping().await);
            }
            Request::Close { reply } => {
                let _ = reply.send(conn.close().await);
                return;
            }
        }
    }

    // Every handle dropped
    if let Err(e) = conn.close().await {
        tracing::debug!(error = %e, "close after last handle dropped failed");
    }
}
