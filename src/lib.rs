//! Hindsight - A segmented ring buffer for always-on media capture.
//!
//! Timestamped samples stream into fixed-duration segment files on disk,
//! with the oldest segments evicted once the retention cap is reached.
//! At any moment the trailing window can be frozen into an immutable
//! snapshot directory described by a manifest, after which the buffer
//! carries on recording into fresh segments.

pub mod buffer;
pub mod segment;
pub mod sink;
pub mod snapshot;

pub use buffer::{BufferConfig, BufferError, BufferEvent, BufferState, BufferStats, RingBuffer};
pub use segment::Segment;
pub use sink::{FileSinkFactory, Sample, SegmentSink, SinkError, SinkFactory, Track};
pub use snapshot::{Manifest, Snapshot, SnapshotError, SnapshotStore};
