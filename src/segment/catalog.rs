//! Segment catalog
//!
//! Enumerates persisted segments from a buffer directory, pairing each
//! media file with its sidecar by shared file stem. Tolerant of missing or
//! corrupt sidecars: extraction can race a crash or a partial write, and a
//! listing must still succeed.

use super::sidecar::read_sidecar;
use super::types::{Segment, MEDIA_EXTENSION, SIDECAR_EXTENSION};
use chrono::{DateTime, Utc};
use std::fs;
use std::io;
use std::path::Path;
use std::time::Duration;

/// List all segments in a directory, ordered by start time
///
/// Sidecar-recorded start times are the authoritative ordering key; a
/// segment whose sidecar is missing or unreadable is still listed, with
/// zero duration and a start time taken from filesystem metadata as a
/// last resort.
pub fn enumerate(dir: &Path) -> io::Result<Vec<Segment>> {
    if !dir.is_dir() {
        return Ok(Vec::new());
    }

    let mut segments = Vec::new();

    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let media_path = entry.path();

        if media_path.extension().and_then(|e| e.to_str()) != Some(MEDIA_EXTENSION) {
            continue;
        }

        let stem = match media_path.file_stem().and_then(|s| s.to_str()) {
            Some(s) => s,
            None => continue,
        };
        let (seq, id) = match Segment::parse_stem(stem) {
            Some(parts) => parts,
            None => continue,
        };

        let sidecar_path = media_path.with_extension(SIDECAR_EXTENSION);

        let (start_time, duration) = match read_sidecar(&sidecar_path) {
            Ok(sidecar) => (sidecar.started_at, sidecar.duration()),
            Err(e) => {
                tracing::warn!(
                    "No readable sidecar for segment {} ({}); listing with zero duration",
                    id,
                    e
                );
                (fs_start_time(&media_path), Duration::ZERO)
            }
        };

        segments.push(Segment {
            id,
            seq,
            media_path,
            sidecar_path,
            start_time,
            duration,
        });
    }

    segments.sort_by_key(|s| (s.start_time, s.seq));

    Ok(segments)
}

/// Last-resort ordering key for segments without a sidecar start time
fn fs_start_time(path: &Path) -> DateTime<Utc> {
    fs::metadata(path)
        .and_then(|m| m.created().or_else(|_| m.modified()))
        .map(DateTime::<Utc>::from)
        .unwrap_or_else(|_| Utc::now())
}
