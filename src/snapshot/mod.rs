//! Snapshot extraction and retention
//!
//! Freezes a trailing window of the ring buffer into an immutable,
//! independently-retained copy:
//! - manifest: the durable snapshot descriptor
//! - clone: copy-on-write file cloning with full-copy fallback
//! - store: the snapshot index and the extraction flow

pub mod clone;
pub mod manifest;
pub mod store;

use crate::buffer::BufferError;
use std::path::PathBuf;
use thiserror::Error;
use uuid::Uuid;

/// Snapshot-related errors
#[derive(Error, Debug)]
pub enum SnapshotError {
    #[error("buffer holds no non-empty segments")]
    NoContent,

    #[error("failed to copy segment into snapshot: {0}")]
    Copy(#[source] std::io::Error),

    #[error("snapshot {0} not found")]
    NotFound(Uuid),

    #[error("manifest references missing file: {0:?}")]
    MissingFile(PathBuf),

    #[error("buffer error: {0}")]
    Buffer(#[from] BufferError),

    #[error("manifest error: {0}")]
    Manifest(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub use clone::clone_or_copy;
pub use manifest::{Manifest, ManifestSegment, MANIFEST_FILE};
pub use store::{Snapshot, SnapshotStore};
