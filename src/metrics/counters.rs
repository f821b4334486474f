//! Counter metrics

/// A connection attempt started
pub fn connect_attempted(backend: &'static str) {
    metrics::counter!("mysql_harness_connect_attempts_total", "backend" => backend).increment(1);
}

/// A connection attempt failed with the given error code
pub fn connect_failed(code: &'static str) {
    metrics::counter!("mysql_harness_connect_failures_total", "code" => code).increment(1);
}

/// Authentication was attempted with the given plugin
pub fn auth_attempted(plugin: &str) {
    metrics::counter!("mysql_harness_auth_attempts_total", "plugin" => plugin.to_string())
        .increment(1);
}

/// A command completed
pub fn query_completed(command: &'static str) {
    metrics::counter!("mysql_harness_queries_total", "command" => command).increment(1);
}

/// A command hit its inactivity timeout
pub fn query_timed_out(command: &'static str) {
    metrics::counter!("mysql_harness_query_timeouts_total", "command" => command).increment(1);
}

/// A readiness probe finished with the given outcome
pub fn probe_attempt(outcome: &'static str) {
    metrics::counter!("mysql_harness_probe_attempts_total", "outcome" => outcome).increment(1);
}

/// The mock server sent a greeting
pub fn handshake_sent() {
    metrics::counter!("mysql_harness_mock_handshakes_total").increment(1);
}
