//! Label values shared by counters and histograms

pub const BACKEND_NATIVE: &str = "native";
pub const BACKEND_STREAMING: &str = "streaming";

pub const COMMAND_QUERY: &str = "query";
pub const COMMAND_EXECUTE: &str = "execute";
pub const COMMAND_PING: &str = "ping";

pub const PROBE_READY: &str = "ready";
pub const PROBE_RETRY: &str = "retry";
pub const PROBE_FATAL: &str = "fatal";
