//! Client-facing factory
//!
//! This module handles:
//! * Lazily connected handles over either backend
//! * Buffering event-based results into one aggregate result
//! * Pooling native connections

mod accumulator;
mod factory;
mod pool;

pub use accumulator::{collect, AccumulatorState, RowAccumulator};
pub use factory::{create_connection, create_connection_with_uri, create_pool, ConnectionHandle};
pub use pool::{Pool, PooledConnection};
