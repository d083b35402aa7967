//! Segment sink module
//!
//! Defines the sink boundary the ring buffer writes through:
//! - SegmentSink / SinkFactory traits for pluggable encoders
//! - FileSink reference implementation for tests and headless use

pub mod file;
pub mod traits;

pub use file::{FileSink, FileSinkFactory};
pub use traits::{Sample, SegmentSink, SinkError, SinkFactory, Track};
