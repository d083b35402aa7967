//! Ring buffer module
//!
//! The rolling recording window:
//! - state: the buffer state machine, configuration, and counters
//! - manager: the worker task that owns the active sink and serializes
//!   ingestion, rotation, eviction, and control operations

pub mod manager;
pub mod state;

pub use manager::{BufferError, BufferEvent, BufferResult, RingBuffer};
pub use state::{BufferConfig, BufferState, BufferStats};
