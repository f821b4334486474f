//! Event-based backend
//!
//! Results are delivered as a stream of field/row events rather than one
//! buffered value per call.

mod event_client;

pub use event_client::{EventClient, QueryStream, DEFAULT_EVENT_BUFFER};
