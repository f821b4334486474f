//! Connection pool
//!
//! At most `connection_limit` connections are checked out at once. Returned
//! connections go back to an idle list when they are still idle.

use crate::config::ConnectionParameters;
use crate::connection::{Connection, ConnectionState, QueryOptions, QueryResult};
use crate::{Error, Result};
use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

struct PoolInner {
    params: Arc<ConnectionParameters>,
    permits: Arc<Semaphore>,
    idle: Mutex<Vec<Connection>>,
    closed: AtomicBool,
}

impl PoolInner {
    fn idle(&self) -> MutexGuard<'_, Vec<Connection>> {
        self.idle.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Pool of native connections
#[derive(Clone)]
pub struct Pool {
    inner: Arc<PoolInner>,
}

impl std::fmt::Debug for Pool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pool")
            .field("host", &self.inner.params.host)
            .field("limit", &self.inner.params.connection_limit)
            .field("idle", &self.idle_count())
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl Pool {
    pub fn new(params: ConnectionParameters) -> Self {
        let limit = params.connection_limit.max(1);
        Self {
            inner: Arc::new(PoolInner {
                params: Arc::new(params),
                permits: Arc::new(Semaphore::new(limit)),
                idle: Mutex::new(Vec::new()),
                closed: AtomicBool::new(false),
            }),
        }
    }

    pub fn params(&self) -> &ConnectionParameters {
        &self.inner.params
    }

    /// Connections waiting to be reused
    pub fn idle_count(&self) -> usize {
        self.inner.idle().len()
    }

    /// Connections that can be checked out without waiting
    pub fn available(&self) -> usize {
        self.inner.permits.available_permits()
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }

    /// Check out a connection, waiting while the pool is at its limit
    pub async fn get_connection(&self) -> Result<PooledConnection> {
        if self.is_closed() {
            return Err(Error::ConnectionClosed);
        }
        let permit = self
            .inner
            .permits
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| Error::ConnectionClosed)?;

        let reused = self.inner.idle().pop();
        let conn = match reused {
            Some(conn) => conn,
            None => {
                tracing::debug!(host = %self.inner.params.host, "pool opening connection");
                Connection::connect(self.inner.params.clone()).await?
            }
        };

        Ok(PooledConnection {
            conn: Some(conn),
            pool: self.inner.clone(),
            _permit: permit,
        })
    }

    /// Borrow a connection for one text query
    pub async fn query(&self, options: impl Into<QueryOptions>) -> Result<QueryResult> {
        let mut conn = self.get_connection().await?;
        conn.query(options).await
    }

    /// Borrow a connection for one prepared statement
    pub async fn execute(&self, options: impl Into<QueryOptions>) -> Result<QueryResult> {
        let mut conn = self.get_connection().await?;
        conn.execute(options).await
    }

    /// Close idle connections and refuse further checkouts.
    ///
    /// Checked-out connections are closed when they are dropped.
    pub async fn end(&self) -> Result<()> {
        self.inner.closed.store(true, Ordering::Release);
        self.inner.permits.close();

        let idle: Vec<Connection> = std::mem::take(&mut *self.inner.idle());
        for conn in idle {
            if let Err(e) = conn.close().await {
                tracing::debug!(error = %e, "closing pooled connection failed");
            }
        }
        Ok(())
    }
}

/// Connection checked out of a [`Pool`]
pub struct PooledConnection {
    conn: Option<Connection>,
    pool: Arc<PoolInner>,
    _permit: OwnedSemaphorePermit,
}

impl PooledConnection {
    /// Take the connection out of the pool for good
    pub fn detach(mut self) -> Option<Connection> {
        self.conn.take()
    }
}

impl std::fmt::Debug for PooledConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PooledConnection").finish_non_exhaustive()
    }
}

impl Deref for PooledConnection {
    type Target = Connection;

    fn deref(&self) -> &Connection {
        // Only `detach` and `drop` take the connection, both consume self
        self.conn.as_ref().unwrap_or_else(|| unreachable!())
    }
}

impl DerefMut for PooledConnection {
    fn deref_mut(&mut self) -> &mut Connection {
        self.conn.as_mut().unwrap_or_else(|| unreachable!())
    }
}

impl Drop for PooledConnection {
    fn drop(&mut self) {
        let Some(conn) = self.conn.take() else {
            return;
        };
        let reusable = conn.state() == ConnectionState::Idle && !conn.has_pending_response();
        if reusable && !self.pool.closed.load(Ordering::Acquire) {
            self.pool.idle().push(conn);
        } else {
            tracing::debug!(state = %conn.state(), "discarding pooled connection");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_end_rejects_checkout() {
        let pool = Pool::new(ConnectionParameters::default());
        assert!(!pool.is_closed());
        pool.end().await.unwrap();
        assert!(pool.is_closed());
        assert!(matches!(
            pool.get_connection().await.unwrap_err(),
            Error::ConnectionClosed
        ));
    }

    #[test]
    fn test_limit_is_at_least_one() {
        let params = ConnectionParameters {
            connection_limit: 0,
            ..ConnectionParameters::default()
        };
        let pool = Pool::new(params);
        assert_eq!(pool.available(), 1);
        assert_eq!(pool.idle_count(), 0);
    }
}
