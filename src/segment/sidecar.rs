//! Sidecar metadata read/write operations
//!
//! Every segment carries a small JSON sidecar next to its media file:
//! `{segmentId, seq, startedAt, endedAt, events}`. The sidecar is written
//! exactly once, at finalize time, and is the authoritative record of the
//! segment's time bounds.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

/// Maximum characters kept per metadata event
pub const MAX_EVENT_TEXT_CHARS: usize = 1000;

/// Sidecar-related errors
#[derive(Error, Debug)]
pub enum SidecarError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),
}

/// A discrete timestamped text event attached to a segment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetadataEvent {
    /// Unique event ID
    pub id: Uuid,

    /// Wall-clock time the event was recorded
    pub timestamp: DateTime<Utc>,

    /// Event text, capped at `MAX_EVENT_TEXT_CHARS`
    pub text: String,
}

impl MetadataEvent {
    /// Create a new event stamped now, truncating oversized text
    pub fn new(text: impl Into<String>) -> Self {
        let mut text = text.into();
        if let Some((idx, _)) = text.char_indices().nth(MAX_EVENT_TEXT_CHARS) {
            text.truncate(idx);
        }
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            text,
        }
    }
}

/// Per-segment metadata record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SidecarMetadata {
    /// ID of the segment this sidecar describes
    pub segment_id: Uuid,

    /// Segment sequence number within the session
    pub seq: u64,

    /// Wall-clock time the segment started
    pub started_at: DateTime<Utc>,

    /// Wall-clock time the segment was finalized
    pub ended_at: DateTime<Utc>,

    /// Events in insertion (chronological) order
    pub events: Vec<MetadataEvent>,
}

impl SidecarMetadata {
    /// Create a sidecar for a segment opening now
    pub fn new(segment_id: Uuid, seq: u64) -> Self {
        let now = Utc::now();
        Self {
            segment_id,
            seq,
            started_at: now,
            ended_at: now,
            events: Vec::new(),
        }
    }

    /// Append an event, preserving insertion order
    pub fn push_event(&mut self, event: MetadataEvent) {
        self.events.push(event);
    }

    /// Derived segment duration; negative clock skew clamps to zero
    pub fn duration(&self) -> Duration {
        (self.ended_at - self.started_at).to_std().unwrap_or_default()
    }
}

/// Read a sidecar from disk
pub fn read_sidecar(path: &Path) -> Result<SidecarMetadata, SidecarError> {
    let content = fs::read_to_string(path)?;
    let sidecar: SidecarMetadata = serde_json::from_str(&content)?;
    Ok(sidecar)
}

/// Write a sidecar to disk
pub fn write_sidecar(sidecar: &SidecarMetadata, path: &Path) -> Result<(), SidecarError> {
    let content = serde_json::to_string_pretty(sidecar)?;
    fs::write(path, content)?;

    tracing::debug!(
        "Wrote sidecar for segment {} ({} events) to {:?}",
        sidecar.segment_id,
        sidecar.events.len(),
        path
    );

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_write_and_read_round_trip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("seg.json");

        let mut sidecar = SidecarMetadata::new(Uuid::new_v4(), 3);
        sidecar.push_event(MetadataEvent::new("copied: hello"));
        sidecar.push_event(MetadataEvent::new("copied: world"));
        sidecar.ended_at = sidecar.started_at + chrono::Duration::seconds(300);

        write_sidecar(&sidecar, &path).unwrap();
        let loaded = read_sidecar(&path).unwrap();

        assert_eq!(loaded, sidecar);
        assert_eq!(loaded.duration(), Duration::from_secs(300));
        assert_eq!(loaded.events.len(), 2);
    }

    #[test]
    fn test_event_text_truncated_to_cap() {
        let long = "x".repeat(MAX_EVENT_TEXT_CHARS + 500);
        let event = MetadataEvent::new(long);
        assert_eq!(event.text.chars().count(), MAX_EVENT_TEXT_CHARS);

        let short = MetadataEvent::new("short");
        assert_eq!(short.text, "short");
    }

    #[test]
    fn test_truncation_respects_char_boundaries() {
        // Multibyte chars must not be split mid-encoding
        let long = "é".repeat(MAX_EVENT_TEXT_CHARS + 10);
        let event = MetadataEvent::new(long);
        assert_eq!(event.text.chars().count(), MAX_EVENT_TEXT_CHARS);
        assert!(event.text.chars().all(|c| c == 'é'));
    }

    #[test]
    fn test_read_corrupt_sidecar_fails() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("seg.json");
        fs::write(&path, "{not json").unwrap();

        assert!(matches!(read_sidecar(&path), Err(SidecarError::Json(_))));
    }

    #[test]
    fn test_negative_span_clamps_to_zero() {
        let mut sidecar = SidecarMetadata::new(Uuid::new_v4(), 0);
        sidecar.ended_at = sidecar.started_at - chrono::Duration::seconds(5);
        assert_eq!(sidecar.duration(), Duration::ZERO);
    }
}
