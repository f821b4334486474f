//! Histogram metrics

/// Time to establish and authenticate a connection
pub fn connect_duration(backend: &'static str, ms: u64) {
    metrics::histogram!("mysql_harness_connect_duration_ms", "backend" => backend)
        .record(ms as f64);
}

/// Time from sending a command to its complete response
pub fn query_duration(command: &'static str, ms: u64) {
    metrics::histogram!("mysql_harness_query_duration_ms", "command" => command)
        .record(ms as f64);
}

/// Total time spent waiting for a backend to become ready
pub fn probe_wait_duration(ms: u64) {
    metrics::histogram!("mysql_harness_probe_wait_ms").record(ms as f64);
}
