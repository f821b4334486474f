//! Metrics
//!
//! Thin wrappers over the `metrics` facade. Nothing is recorded unless the
//! embedding process installs a recorder.

pub mod counters;
pub mod histograms;
pub mod labels;
