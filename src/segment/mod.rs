//! Segment model and persistence
//!
//! One segment = one media file + one JSON sidecar, paired by file stem:
//! - types: the Segment descriptor and filename scheme
//! - sidecar: per-segment metadata record, written once at finalize
//! - catalog: tolerant enumeration of a buffer directory

pub mod catalog;
pub mod sidecar;
pub mod types;

pub use sidecar::{MetadataEvent, SidecarError, SidecarMetadata, MAX_EVENT_TEXT_CHARS};
pub use types::{Segment, MEDIA_EXTENSION, SIDECAR_EXTENSION};
