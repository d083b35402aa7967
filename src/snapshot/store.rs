//! Snapshot store
//!
//! Extracts trailing windows of the ring buffer into immutable snapshot
//! directories (one per snapshot, named by its ID) and maintains the
//! in-memory snapshot index, newest first.

use super::clone::clone_or_copy;
use super::manifest::{self, Manifest};
use super::SnapshotError;
use crate::buffer::{BufferState, RingBuffer};
use crate::segment::types::Segment;
use chrono::{DateTime, Utc};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use uuid::Uuid;

/// A committed, immutable snapshot
#[derive(Debug, Clone)]
pub struct Snapshot {
    /// Snapshot ID
    pub id: Uuid,

    /// Creation time
    pub created_at: DateTime<Utc>,

    /// Directory holding the copied segments and manifest
    pub dir: PathBuf,

    /// The durable descriptor
    pub manifest: Manifest,
}

impl Snapshot {
    /// Verify that every file the manifest references is present
    ///
    /// A manifest entry whose media or sidecar file is gone is an
    /// integrity error the consumer must see, not silently skip.
    pub fn verify(&self) -> Result<(), SnapshotError> {
        for entry in &self.manifest.segments {
            let media = self.dir.join(&entry.file_name);
            if !media.exists() {
                return Err(SnapshotError::MissingFile(media));
            }
            let sidecar = self.dir.join(&entry.sidecar_name);
            if !sidecar.exists() {
                return Err(SnapshotError::MissingFile(sidecar));
            }
        }
        Ok(())
    }

    /// Total duration of the snapshot
    pub fn total_duration(&self) -> Duration {
        self.manifest.total_duration()
    }
}

/// Manages the snapshot root directory and index
pub struct SnapshotStore {
    root: PathBuf,
    snapshots: Vec<Snapshot>,
}

impl SnapshotStore {
    /// Open a store over the given root, loading existing snapshots
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, SnapshotError> {
        let root = root.into();
        fs::create_dir_all(&root)?;

        let mut store = Self {
            root,
            snapshots: Vec::new(),
        };
        store.reload()?;
        Ok(store)
    }

    /// Re-enumerate the root directory and rebuild the index
    ///
    /// Any directory without a readable, well-formed manifest is skipped.
    pub fn reload(&mut self) -> Result<(), SnapshotError> {
        let mut snapshots = Vec::new();

        for entry in fs::read_dir(&self.root)? {
            let entry = entry?;
            let dir = entry.path();
            if !dir.is_dir() {
                continue;
            }
            match manifest::read_manifest(&dir) {
                Ok(manifest) => {
                    snapshots.push(Snapshot {
                        id: manifest.snapshot_id,
                        created_at: manifest.created_at,
                        dir,
                        manifest,
                    });
                }
                Err(e) => {
                    tracing::warn!("Skipping {:?}: no readable manifest ({})", dir, e);
                }
            }
        }

        snapshots.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        self.snapshots = snapshots;

        tracing::info!(
            "Loaded {} snapshots from {:?}",
            self.snapshots.len(),
            self.root
        );
        Ok(())
    }

    /// Snapshots, newest first
    pub fn snapshots(&self) -> &[Snapshot] {
        &self.snapshots
    }

    /// Look up a snapshot by ID
    pub fn get(&self, id: Uuid) -> Option<&Snapshot> {
        self.snapshots.iter().find(|s| s.id == id)
    }

    /// Freeze the trailing `max_duration` of the buffer into a snapshot
    ///
    /// Flushes the buffer, selects the most recent non-empty segments
    /// until their summed durations reach `max_duration` (the segment
    /// crossing the threshold is included in full), copies them into a
    /// fresh snapshot directory, and writes the manifest as the commit
    /// point. Only after commit are all observed segments, selected or
    /// not, purged from the buffer; if recording is active a fresh
    /// segment is then opened.
    ///
    /// Fails with `NoContent` when nothing non-empty is buffered, and
    /// with `Copy` when materialization fails; in both cases the buffer
    /// keeps every observed segment and no snapshot directory remains.
    pub async fn create_snapshot(
        &mut self,
        buffer: &RingBuffer,
        max_duration: Duration,
    ) -> Result<Snapshot, SnapshotError> {
        let observed = buffer.flush_and_list().await?;

        let mut newest_first: Vec<&Segment> =
            observed.iter().filter(|s| !s.is_empty()).collect();
        if newest_first.is_empty() {
            tracing::info!("Snapshot requested but buffer holds no content");
            return Err(SnapshotError::NoContent);
        }
        newest_first.sort_by(|a, b| {
            b.start_time
                .cmp(&a.start_time)
                .then_with(|| b.seq.cmp(&a.seq))
        });

        let mut selected: Vec<Segment> = Vec::new();
        let mut total = Duration::ZERO;
        for segment in newest_first {
            selected.push(segment.clone());
            total += segment.duration;
            if total >= max_duration {
                break;
            }
        }
        // Back into chronological order
        selected.reverse();

        let manifest = Manifest::new(&selected);
        let snapshot_dir = self.root.join(manifest.snapshot_id.to_string());

        tracing::info!(
            "Creating snapshot {}: {} of {} segments, {:.1}s",
            manifest.snapshot_id,
            selected.len(),
            observed.len(),
            total.as_secs_f64()
        );

        if let Err(e) = materialize(&snapshot_dir, &selected, &manifest) {
            // All-or-nothing: drop the partial directory, leave the
            // buffer exactly as observed
            let _ = fs::remove_dir_all(&snapshot_dir);
            return Err(e);
        }

        let snapshot = Snapshot {
            id: manifest.snapshot_id,
            created_at: manifest.created_at,
            dir: snapshot_dir,
            manifest,
        };
        self.snapshots.insert(0, snapshot.clone());

        // Everything observed is purged, selected or not: a segment older
        // than the window must not resurface in a future snapshot
        buffer.purge(observed.iter().map(|s| s.id).collect()).await?;

        if buffer.state() == BufferState::Writing {
            buffer.reopen_segment().await?;
        }

        tracing::info!("Snapshot {} committed", snapshot.id);
        Ok(snapshot)
    }

    /// Delete a snapshot's directory wholesale
    ///
    /// Has no effect on the live buffer or on other snapshots.
    pub fn delete_snapshot(&mut self, id: Uuid) -> Result<(), SnapshotError> {
        let index = self
            .snapshots
            .iter()
            .position(|s| s.id == id)
            .ok_or(SnapshotError::NotFound(id))?;

        fs::remove_dir_all(&self.snapshots[index].dir)?;
        self.snapshots.remove(index);

        tracing::info!("Deleted snapshot {}", id);
        Ok(())
    }
}

/// Copy the selected segments and write the manifest
fn materialize(
    snapshot_dir: &Path,
    segments: &[Segment],
    manifest: &Manifest,
) -> Result<(), SnapshotError> {
    fs::create_dir_all(snapshot_dir).map_err(SnapshotError::Copy)?;

    for segment in segments {
        let media_dst = snapshot_dir.join(Segment::media_file_name(segment.seq, segment.id));
        clone_or_copy(&segment.media_path, &media_dst).map_err(SnapshotError::Copy)?;

        // Selection only admits segments whose sidecar was readable, so
        // the manifest may reference it unconditionally
        let sidecar_dst = snapshot_dir.join(Segment::sidecar_file_name(segment.seq, segment.id));
        clone_or_copy(&segment.sidecar_path, &sidecar_dst).map_err(SnapshotError::Copy)?;
    }

    manifest::write_manifest(manifest, snapshot_dir)?;
    Ok(())
}
