//! Segment sink trait definitions
//!
//! The boundary between the ring buffer and whatever encodes/muxes media.
//! The buffer treats a sink as an opaque capability: feed it samples while
//! it is ready, tell it to finalize, get a finished file.

use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// Media track a sample belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Track {
    /// Screen video
    Video,
    /// System audio
    Audio,
    /// Microphone audio
    Mic,
}

impl Track {
    /// Stable label used in logs and stats
    pub fn label(&self) -> &'static str {
        match self {
            Track::Video => "video",
            Track::Audio => "audio",
            Track::Mic => "mic",
        }
    }
}

/// A single timestamped media sample
///
/// `pts` is the presentation timestamp on the clock domain shared by all
/// capture sources. The payload is reference-counted so samples are cheap
/// to clone across channels.
#[derive(Debug, Clone)]
pub struct Sample {
    /// Presentation timestamp
    pub pts: Duration,

    /// Encoded payload
    pub data: Bytes,
}

impl Sample {
    /// Create a new sample
    pub fn new(pts: Duration, data: Bytes) -> Self {
        Self { pts, data }
    }
}

/// Sink-related errors
#[derive(Error, Debug)]
pub enum SinkError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("sink is not ready for {0} samples")]
    NotReady(&'static str),

    #[error("sink already finalized")]
    Closed,
}

/// An open segment's encoder/muxer
///
/// Accepts samples for exactly one media file and produces the finished
/// file when told to finalize. The ring buffer owns at most one open sink
/// at a time and only ever touches it from its worker task, so
/// implementations do not need internal locking.
#[async_trait]
pub trait SegmentSink: Send {
    /// Whether the sink can accept a sample for the given track right now
    ///
    /// A `false` here is the back-pressure signal: the buffer drops the
    /// sample rather than queueing it.
    fn is_ready(&self, track: Track) -> bool;

    /// Append a sample to the segment
    async fn append(&mut self, track: Track, sample: &Sample) -> Result<(), SinkError>;

    /// Finish the segment and flush everything to disk
    ///
    /// Blocks until the media file is complete. There is no cancellation
    /// and no timeout; a finalize always runs to completion.
    async fn finalize(&mut self) -> Result<(), SinkError>;
}

/// Factory for opening segment sinks
///
/// The ring buffer calls this once per segment, including segments opened
/// mid-rotation.
#[async_trait]
pub trait SinkFactory: Send + Sync {
    /// Open a sink writing to the given media path
    async fn open(&self, path: &Path) -> Result<Box<dyn SegmentSink>, SinkError>;
}
