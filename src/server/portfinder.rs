//! Free-port discovery for mock servers
//!
//! Ports are handed out from a cursor shared by the whole process, so servers
//! started in parallel tests do not race for the same port.

use crate::{Error, Result};
use std::io;
use std::sync::atomic::{AtomicU16, Ordering};
use tokio::net::TcpListener;

/// First port tried by the shared finder
pub const BASE_PORT: u16 = 8000;

static GLOBAL: PortFinder = PortFinder::new(BASE_PORT, u16::MAX);

/// Scans a port range with a wrapping cursor
#[derive(Debug)]
pub struct PortFinder {
    start: u16,
    end: u16,
    next: AtomicU16,
}

impl PortFinder {
    /// Finder over `start..=end`
    pub const fn new(start: u16, end: u16) -> Self {
        Self {
            start,
            end,
            next: AtomicU16::new(start),
        }
    }

    /// Process-wide finder starting at [`BASE_PORT`]
    pub fn global() -> &'static PortFinder {
        &GLOBAL
    }

    fn advance(&self) -> u16 {
        let (start, end) = (self.start, self.end);
        let prev = self
            .next
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |p| {
                Some(if p >= end || p < start { start } else { p + 1 })
            })
            .unwrap_or(start);
        prev.clamp(start, end)
    }

    /// Bind the next free port on `host`.
    ///
    /// Ports in use are skipped. Every port in the range is tried at most once.
    pub async fn bind(&self, host: &str) -> Result<TcpListener> {
        let span = u32::from(self.end - self.start) + 1;

        for _ in 0..span {
            let port = self.advance();
            match TcpListener::bind((host, port)).await {
                Ok(listener) => {
                    tracing::debug!(port, "mock server port bound");
                    return Ok(listener);
                }
                Err(e) if e.kind() == io::ErrorKind::AddrInUse => {
                    tracing::trace!(port, "port in use");
                }
                Err(e) => return Err(e.into()),
            }
        }

        Err(Error::BindExhausted {
            start: self.start,
            end: self.end,
        })
    }
}
