//! Buffer state, configuration, and counters
//!
//! Defines the ring buffer state machine, its tunable configuration, and
//! the drop/finalize counters it maintains.

use crate::sink::Track;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Current state of the ring buffer
///
/// Recording is binary: there is no paused state. A stopped buffer can be
/// started again, which begins a fresh session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BufferState {
    /// No recording session
    Idle,
    /// Actively buffering samples into segments
    Writing,
    /// Session ended
    Stopped,
}

impl Default for BufferState {
    fn default() -> Self {
        Self::Idle
    }
}

/// Configuration for the ring buffer
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BufferConfig {
    /// Directory holding the live segment files
    pub buffer_dir: PathBuf,

    /// Target length of each segment in milliseconds
    pub segment_duration_ms: f64,

    /// Maximum number of persisted segments before eviction
    pub max_segments: usize,

    /// Consecutive dropped video samples before the sink is declared
    /// unhealthy and the segment force-rotated
    pub max_consecutive_drops: u64,
}

impl BufferConfig {
    /// Default segment length: 5 minutes
    pub const DEFAULT_SEGMENT_DURATION_MS: f64 = 300_000.0;

    /// Default retention cap: 24 segments (2 hours at 5-minute segments)
    pub const DEFAULT_MAX_SEGMENTS: usize = 24;

    /// Default drop bound: ~10 seconds of video at 30 fps
    pub const DEFAULT_MAX_CONSECUTIVE_DROPS: u64 = 300;

    /// Create a configuration with defaults for the given directory
    pub fn new(buffer_dir: impl Into<PathBuf>) -> Self {
        Self {
            buffer_dir: buffer_dir.into(),
            segment_duration_ms: Self::DEFAULT_SEGMENT_DURATION_MS,
            max_segments: Self::DEFAULT_MAX_SEGMENTS,
            max_consecutive_drops: Self::DEFAULT_MAX_CONSECUTIVE_DROPS,
        }
    }

    /// Override the segment duration
    pub fn with_segment_duration(mut self, duration: Duration) -> Self {
        self.segment_duration_ms = duration.as_secs_f64() * 1000.0;
        self
    }

    /// Override the retention cap
    pub fn with_max_segments(mut self, max_segments: usize) -> Self {
        self.max_segments = max_segments;
        self
    }

    /// Override the consecutive-drop bound
    pub fn with_max_consecutive_drops(mut self, max_drops: u64) -> Self {
        self.max_consecutive_drops = max_drops;
        self
    }

    /// Segment duration as a std Duration; out-of-range values clamp
    ///
    /// A deserialized config is not trusted to hold a convertible float.
    pub fn segment_duration(&self) -> Duration {
        Duration::try_from_secs_f64(self.segment_duration_ms.max(0.0) / 1000.0)
            .unwrap_or(Duration::MAX)
    }
}

/// Monotonic counters maintained by the ring buffer worker
///
/// Per-sample failures are absorbed into these counters instead of being
/// surfaced per occurrence.
#[derive(Debug, Default)]
pub struct BufferStats {
    /// Segments successfully finalized
    pub segments_completed: AtomicU64,

    /// Segments deleted by eviction
    pub segments_pruned: AtomicU64,

    /// Dropped video samples
    pub video_dropped: AtomicU64,

    /// Dropped system audio samples
    pub audio_dropped: AtomicU64,

    /// Dropped microphone samples
    pub mic_dropped: AtomicU64,

    /// Metadata events recorded
    pub events_recorded: AtomicU64,
}

impl BufferStats {
    /// Count one dropped sample for a track
    pub fn record_drop(&self, track: Track) {
        self.drop_counter(track).fetch_add(1, Ordering::Relaxed);
    }

    /// Dropped-sample count for a track
    pub fn dropped(&self, track: Track) -> u64 {
        self.drop_counter(track).load(Ordering::Relaxed)
    }

    /// Dropped-sample count across all tracks
    pub fn total_dropped(&self) -> u64 {
        self.dropped(Track::Video) + self.dropped(Track::Audio) + self.dropped(Track::Mic)
    }

    fn drop_counter(&self, track: Track) -> &AtomicU64 {
        match track {
            Track::Video => &self.video_dropped,
            Track::Audio => &self.audio_dropped,
            Track::Mic => &self.mic_dropped,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults() {
        let config = BufferConfig::new("/tmp/buffer");
        assert_eq!(config.segment_duration(), Duration::from_secs(300));
        assert_eq!(config.max_segments, 24);
        assert_eq!(config.max_consecutive_drops, 300);
    }

    #[test]
    fn test_config_overrides() {
        let config = BufferConfig::new("/tmp/buffer")
            .with_segment_duration(Duration::from_secs(60))
            .with_max_segments(4)
            .with_max_consecutive_drops(10);
        assert_eq!(config.segment_duration(), Duration::from_secs(60));
        assert_eq!(config.max_segments, 4);
        assert_eq!(config.max_consecutive_drops, 10);
    }

    #[test]
    fn test_out_of_range_duration_values_clamp() {
        let mut config = BufferConfig::new("/tmp/buffer");
        config.segment_duration_ms = -500.0;
        assert_eq!(config.segment_duration(), Duration::ZERO);
        config.segment_duration_ms = 1e300;
        assert_eq!(config.segment_duration(), Duration::MAX);
    }

    #[test]
    fn test_stats_per_track_counters() {
        let stats = BufferStats::default();
        stats.record_drop(Track::Video);
        stats.record_drop(Track::Video);
        stats.record_drop(Track::Mic);

        assert_eq!(stats.dropped(Track::Video), 2);
        assert_eq!(stats.dropped(Track::Audio), 0);
        assert_eq!(stats.dropped(Track::Mic), 1);
        assert_eq!(stats.total_dropped(), 3);
    }
}
