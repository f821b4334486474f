//! Readiness probing
//!
//! Polls a backend until it accepts a full handshake. Only failures that mean
//! "the server is still starting" are retried; anything else is fatal.

use crate::client::create_connection;
use crate::config::{BackendConfig, ConnectionOverrides};
use crate::metrics::labels;
use crate::Error;
use std::time::{Duration, Instant};

/// Pause between attempts
pub const DEFAULT_BACKOFF: Duration = Duration::from_millis(1000);

/// Outcome of one attempt
#[derive(Debug)]
pub enum ProbeOutcome {
    /// Handshake completed
    Ready,
    /// Connection lost or timed out; worth another attempt
    RetryLater(Error),
    /// Any other failure
    Fatal(Error),
}

/// One connect attempt
#[derive(Debug)]
pub struct ProbeAttempt {
    pub started_at: Instant,
    pub outcome: ProbeOutcome,
}

/// Successful wait
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadyReport {
    /// Attempts made, including the successful one
    pub attempts: u32,
    /// Time from the first attempt to readiness
    pub elapsed: Duration,
}

/// Failed wait
#[derive(Debug, thiserror::Error)]
pub enum ProbeError {
    /// A non-transient error ended the wait
    #[error("backend not reachable: {0}")]
    Fatal(#[source] Error),
}

impl ProbeError {
    /// Driver-style code of the underlying error
    pub fn code(&self) -> &'static str {
        match self {
            ProbeError::Fatal(e) => e.code(),
        }
    }
}

/// Waits for a backend to come up
#[derive(Debug, Clone)]
pub struct ReadinessProber {
    config: BackendConfig,
    overrides: ConnectionOverrides,
    backoff: Duration,
}

impl ReadinessProber {
    pub fn new(config: BackendConfig) -> Self {
        Self {
            config,
            overrides: ConnectionOverrides::default(),
            backoff: DEFAULT_BACKOFF,
        }
    }

    /// Overrides applied to every probe connection
    #[must_use]
    pub fn with_overrides(mut self, overrides: ConnectionOverrides) -> Self {
        self.overrides = overrides;
        self
    }

    /// Pause between attempts
    #[must_use]
    pub fn with_backoff(mut self, backoff: Duration) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn backoff(&self) -> Duration {
        self.backoff
    }

    /// Make one attempt. The handle is closed before this returns.
    pub async fn probe_once(&self) -> ProbeAttempt {
        let started_at = Instant::now();
        let mut handle = create_connection(&self.config, self.overrides.clone());

        let outcome = match handle.connect().await {
            Ok(()) => ProbeOutcome::Ready,
            Err(e) if e.is_transient_connect() => ProbeOutcome::RetryLater(e),
            Err(e) => ProbeOutcome::Fatal(e),
        };

        if let Err(e) = handle.close().await {
            tracing::debug!(error = %e, "closing probe connection failed");
        }

        ProbeAttempt {
            started_at,
            outcome,
        }
    }

    /// Retry until the backend is ready or a fatal error occurs
    pub async fn wait_until_ready(&self) -> Result<ReadyReport, ProbeError> {
        let start = Instant::now();
        let mut attempts = 0u32;

        loop {
            attempts += 1;
            let attempt = self.probe_once().await;

            match attempt.outcome {
                ProbeOutcome::Ready => {
                    let elapsed = start.elapsed();
                    crate::metrics::counters::probe_attempt(labels::PROBE_READY);
                    crate::metrics::histograms::probe_wait_duration(elapsed.as_millis() as u64);
                    tracing::info!(attempts, "ready after {}ms!", elapsed.as_millis());
                    return Ok(ReadyReport { attempts, elapsed });
                }
                ProbeOutcome::RetryLater(e) => {
                    crate::metrics::counters::probe_attempt(labels::PROBE_RETRY);
                    tracing::info!(
                        attempt = attempts,
                        code = e.code(),
                        "not ready, retrying in {}ms",
                        self.backoff.as_millis()
                    );
                    tokio::time::sleep(self.backoff).await;
                }
                ProbeOutcome::Fatal(e) => {
                    crate::metrics::counters::probe_attempt(labels::PROBE_FATAL);
                    tracing::error!(attempt = attempts, code = e.code(), error = %e, "backend probe failed");
                    return Err(ProbeError::Fatal(e));
                }
            }
        }
    }

    /// Callback form: run `on_ready` once the backend is ready
    pub async fn wait_until_ready_then<F, T>(&self, on_ready: F) -> Result<T, ProbeError>
    where
        F: FnOnce(ReadyReport) -> T,
    {
        self.wait_until_ready().await.map(on_ready)
    }
}
