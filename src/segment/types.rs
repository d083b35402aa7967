//! Segment data model
//!
//! A segment is one fixed-duration chunk of recorded media, persisted as a
//! media file + sidecar pair sharing a file stem of the form
//! `seg-{seq:06}-{uuid}`.

use chrono::{DateTime, Utc};
use std::path::PathBuf;
use std::time::Duration;
use uuid::Uuid;

/// File extension for segment media files
pub const MEDIA_EXTENSION: &str = "mp4";

/// File extension for segment sidecar files
pub const SIDECAR_EXTENSION: &str = "json";

/// One persisted buffer segment
#[derive(Debug, Clone, PartialEq)]
pub struct Segment {
    /// Unique segment ID
    pub id: Uuid,

    /// Monotonic sequence number within the recording session
    pub seq: u64,

    /// Path to the media file
    pub media_path: PathBuf,

    /// Path to the sidecar file (may not exist on disk)
    pub sidecar_path: PathBuf,

    /// Wall-clock time the segment started
    pub start_time: DateTime<Utc>,

    /// Recorded duration; zero means the segment never received video
    pub duration: Duration,
}

impl Segment {
    /// Shared file stem for a segment's media + sidecar pair
    pub fn file_stem(seq: u64, id: Uuid) -> String {
        format!("seg-{:06}-{}", seq, id)
    }

    /// Media file name for a segment
    pub fn media_file_name(seq: u64, id: Uuid) -> String {
        format!("{}.{}", Self::file_stem(seq, id), MEDIA_EXTENSION)
    }

    /// Sidecar file name for a segment
    pub fn sidecar_file_name(seq: u64, id: Uuid) -> String {
        format!("{}.{}", Self::file_stem(seq, id), SIDECAR_EXTENSION)
    }

    /// Parse a `seg-{seq}-{uuid}` stem back into its parts
    pub fn parse_stem(stem: &str) -> Option<(u64, Uuid)> {
        let rest = stem.strip_prefix("seg-")?;
        let (seq_part, id_part) = rest.split_once('-')?;
        let seq = seq_part.parse().ok()?;
        let id = id_part.parse().ok()?;
        Some((seq, id))
    }

    /// Whether the segment holds any recorded content
    pub fn is_empty(&self) -> bool {
        self.duration.is_zero()
    }

    /// Duration in milliseconds, the unit used in persisted JSON
    pub fn duration_ms(&self) -> f64 {
        self.duration.as_secs_f64() * 1000.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stem_round_trip() {
        let id = Uuid::new_v4();
        let stem = Segment::file_stem(42, id);
        assert!(stem.starts_with("seg-000042-"));

        let (seq, parsed) = Segment::parse_stem(&stem).unwrap();
        assert_eq!(seq, 42);
        assert_eq!(parsed, id);
    }

    #[test]
    fn test_parse_stem_rejects_foreign_names() {
        assert!(Segment::parse_stem("manifest").is_none());
        assert!(Segment::parse_stem("seg-abc-def").is_none());
        assert!(Segment::parse_stem("seg-000001-not-a-uuid").is_none());
        assert!(Segment::parse_stem("recording-000001").is_none());
    }
}
