//! Snapshot manifest read/write
//!
//! The manifest is the durable descriptor of a snapshot: identity,
//! creation time, ordered segment list, derived total duration. It is
//! written exactly once, as the commit point of snapshot creation, and is
//! the sole source of truth when reloading snapshots after a restart.

use super::SnapshotError;
use crate::segment::types::Segment;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;
use uuid::Uuid;

/// Manifest file name inside a snapshot directory
pub const MANIFEST_FILE: &str = "manifest.json";

/// One segment entry in a manifest
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManifestSegment {
    /// Segment ID
    pub segment_id: Uuid,

    /// Sequence number from the originating session
    pub seq: u64,

    /// Media file name within the snapshot directory
    pub file_name: String,

    /// Sidecar file name within the snapshot directory
    pub sidecar_name: String,

    /// Wall-clock time the segment started
    pub started_at: DateTime<Utc>,

    /// Segment duration in milliseconds
    pub duration_ms: f64,
}

impl ManifestSegment {
    /// Build an entry from a buffer segment
    pub fn from_segment(segment: &Segment) -> Self {
        Self {
            segment_id: segment.id,
            seq: segment.seq,
            file_name: Segment::media_file_name(segment.seq, segment.id),
            sidecar_name: Segment::sidecar_file_name(segment.seq, segment.id),
            started_at: segment.start_time,
            duration_ms: segment.duration_ms(),
        }
    }

    /// Entry duration as a std Duration; out-of-range values clamp
    pub fn duration(&self) -> Duration {
        Duration::try_from_secs_f64(self.duration_ms.max(0.0) / 1000.0)
            .unwrap_or(Duration::MAX)
    }
}

/// Durable descriptor of a snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Manifest {
    /// Snapshot ID
    pub snapshot_id: Uuid,

    /// Creation time
    pub created_at: DateTime<Utc>,

    /// Segments in chronological order
    pub segments: Vec<ManifestSegment>,

    /// Sum of segment durations in milliseconds
    pub total_duration_ms: f64,
}

impl Manifest {
    /// Build a manifest for segments already in chronological order
    pub fn new(segments: &[Segment]) -> Self {
        let entries: Vec<ManifestSegment> =
            segments.iter().map(ManifestSegment::from_segment).collect();
        let total_duration_ms = entries.iter().map(|e| e.duration_ms).sum();
        Self {
            snapshot_id: Uuid::new_v4(),
            created_at: Utc::now(),
            segments: entries,
            total_duration_ms,
        }
    }

    /// Total duration as a std Duration; out-of-range values clamp
    pub fn total_duration(&self) -> Duration {
        Duration::try_from_secs_f64(self.total_duration_ms.max(0.0) / 1000.0)
            .unwrap_or(Duration::MAX)
    }
}

/// Read a manifest from a snapshot directory
pub fn read_manifest(snapshot_dir: &Path) -> Result<Manifest, SnapshotError> {
    let content = fs::read_to_string(snapshot_dir.join(MANIFEST_FILE))?;
    let manifest: Manifest = serde_json::from_str(&content)?;
    Ok(manifest)
}

/// Write a manifest into a snapshot directory
pub fn write_manifest(manifest: &Manifest, snapshot_dir: &Path) -> Result<(), SnapshotError> {
    let content = serde_json::to_string_pretty(manifest)?;
    fs::write(snapshot_dir.join(MANIFEST_FILE), content)?;

    tracing::debug!(
        "Wrote manifest for snapshot {} ({} segments) to {:?}",
        manifest.snapshot_id,
        manifest.segments.len(),
        snapshot_dir
    );

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn segment(seq: u64, secs: u64) -> Segment {
        let id = Uuid::new_v4();
        Segment {
            id,
            seq,
            media_path: format!("/buf/{}", Segment::media_file_name(seq, id)).into(),
            sidecar_path: format!("/buf/{}", Segment::sidecar_file_name(seq, id)).into(),
            start_time: Utc::now() + chrono::Duration::seconds(seq as i64 * secs as i64),
            duration: Duration::from_secs(secs),
        }
    }

    #[test]
    fn test_round_trip_preserves_order_and_total() {
        let dir = tempdir().unwrap();
        let segments = vec![segment(0, 300), segment(1, 300), segment(2, 120)];

        let manifest = Manifest::new(&segments);
        assert_eq!(manifest.total_duration(), Duration::from_secs(720));

        write_manifest(&manifest, dir.path()).unwrap();
        let loaded = read_manifest(dir.path()).unwrap();

        assert_eq!(loaded, manifest);
        assert_eq!(
            loaded.segments.iter().map(|e| e.seq).collect::<Vec<_>>(),
            vec![0, 1, 2]
        );
        assert_eq!(loaded.total_duration_ms, manifest.total_duration_ms);
    }

    #[test]
    fn test_entry_names_match_segment_scheme() {
        let seg = segment(7, 60);
        let entry = ManifestSegment::from_segment(&seg);

        assert_eq!(entry.file_name, Segment::media_file_name(7, seg.id));
        assert_eq!(entry.sidecar_name, Segment::sidecar_file_name(7, seg.id));
        assert_eq!(entry.duration(), Duration::from_secs(60));
    }

    #[test]
    fn test_read_missing_manifest_fails() {
        let dir = tempdir().unwrap();
        assert!(matches!(
            read_manifest(dir.path()),
            Err(SnapshotError::Io(_))
        ));
    }

    #[test]
    fn test_oversized_durations_clamp_instead_of_panicking() {
        let dir = tempdir().unwrap();
        // 1e300 ms is parseable f64 but far beyond what Duration can hold
        let content = format!(
            r#"{{
  "snapshotId": "{}",
  "createdAt": "2026-01-01T00:00:00Z",
  "segments": [
    {{
      "segmentId": "{}",
      "seq": 0,
      "fileName": "a.mp4",
      "sidecarName": "a.json",
      "startedAt": "2026-01-01T00:00:00Z",
      "durationMs": 1e300
    }}
  ],
  "totalDurationMs": 1e300
}}"#,
            Uuid::new_v4(),
            Uuid::new_v4()
        );
        fs::write(dir.path().join(MANIFEST_FILE), content).unwrap();

        let manifest = read_manifest(dir.path()).unwrap();
        assert_eq!(manifest.total_duration(), Duration::MAX);
        assert_eq!(manifest.segments[0].duration(), Duration::MAX);
    }
}
