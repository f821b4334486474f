//! Block until the configured MySQL backend accepts logins.
//!
//! Reads `MYSQL_*` variables, probes once per second and exits 0 when ready.
//! A non-transient failure exits with status -1.

use mysql_harness::{BackendConfig, ReadinessProber};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = match BackendConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            tracing::error!(code = e.code(), error = %e, "invalid backend configuration");
            std::process::exit(-1);
        }
    };

    tracing::info!(host = %config.host, port = config.port, backend = ?config.backend, "waiting for backend");

    if let Err(e) = ReadinessProber::new(config).wait_until_ready().await {
        tracing::error!(code = e.code(), error = %e, "giving up");
        std::process::exit(-1);
    }
}
