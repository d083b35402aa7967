//! Ring buffer manager
//!
//! Orchestrates the rolling recording window: owns the active segment
//! sink, serializes all sample ingestion and control operations through a
//! single worker task, rotates segments at the configured duration, and
//! evicts the oldest segments to bound retention.
//!
//! Producers are non-blocking: `append_*` submit to the worker and return
//! immediately. Control operations (`start`, `stop`, `flush_and_list`)
//! are submit-and-wait: the caller suspends until the worker has fully
//! executed the operation, including any synchronous sink finalize.

use super::state::{BufferConfig, BufferState, BufferStats};
use crate::segment::catalog;
use crate::segment::sidecar::{self, MetadataEvent, SidecarMetadata};
use crate::segment::types::Segment;
use crate::sink::{Sample, SegmentSink, SinkError, SinkFactory, Track};
use chrono::Utc;
use parking_lot::RwLock;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{broadcast, mpsc, oneshot};
use uuid::Uuid;

/// Buffer-related errors
#[derive(Error, Debug)]
pub enum BufferError {
    #[error("failed to open segment sink: {0}")]
    SinkInit(#[source] SinkError),

    #[error("failed to finalize segment: {0}")]
    Finalize(#[source] SinkError),

    #[error("recording already in progress")]
    AlreadyRecording,

    #[error("no recording in progress")]
    NotRecording,

    #[error("buffer worker is gone")]
    WorkerGone,

    #[error("sidecar error: {0}")]
    Sidecar(#[from] crate::segment::SidecarError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for buffer operations
pub type BufferResult<T> = Result<T, BufferError>;

/// Events emitted by the ring buffer
#[derive(Debug, Clone)]
pub enum BufferEvent {
    /// Recording session started
    Started,
    /// Recording session stopped
    Stopped,
    /// A segment was finalized and persisted
    SegmentCompleted { segment: Segment },
    /// A segment was evicted to enforce the retention cap
    SegmentPruned { segment_id: Uuid },
    /// A run of consecutive drops on one track ended
    SamplesDropped { track: Track, count: u64 },
    /// Error occurred
    Error(String),
}

/// Operations submitted to the worker task
enum Command {
    Start {
        reply: oneshot::Sender<BufferResult<()>>,
    },
    Append {
        track: Track,
        sample: Sample,
    },
    AddEvent {
        text: String,
    },
    Stop {
        reply: oneshot::Sender<BufferResult<()>>,
    },
    FlushAndList {
        reply: oneshot::Sender<BufferResult<Vec<Segment>>>,
    },
    Purge {
        segment_ids: Vec<Uuid>,
        reply: oneshot::Sender<BufferResult<()>>,
    },
    ReopenSegment {
        reply: oneshot::Sender<BufferResult<()>>,
    },
}

/// Handle to the ring buffer worker
///
/// Cloneable; every clone talks to the same worker task. Dropping the last
/// clone shuts the worker down without finalizing an open segment; call
/// `stop()` first for a clean shutdown.
#[derive(Clone)]
pub struct RingBuffer {
    tx: mpsc::UnboundedSender<Command>,
    config: BufferConfig,
    state: Arc<RwLock<BufferState>>,
    stats: Arc<BufferStats>,
    event_tx: broadcast::Sender<BufferEvent>,
}

impl RingBuffer {
    /// Spawn the worker task and return a handle to it
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn(config: BufferConfig, factory: Arc<dyn SinkFactory>) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let (event_tx, _) = broadcast::channel(100);
        let state = Arc::new(RwLock::new(BufferState::Idle));
        let stats = Arc::new(BufferStats::default());

        let worker = BufferWorker {
            config: config.clone(),
            factory,
            state: state.clone(),
            stats: stats.clone(),
            event_tx: event_tx.clone(),
            active: None,
            next_seq: 0,
            streaks: DropStreaks::default(),
        };
        tokio::spawn(worker.run(rx));

        Self {
            tx,
            config,
            state,
            stats,
            event_tx,
        }
    }

    /// Get the buffer configuration
    pub fn config(&self) -> &BufferConfig {
        &self.config
    }

    /// Get the current buffer state
    pub fn state(&self) -> BufferState {
        *self.state.read()
    }

    /// Get the buffer counters
    pub fn stats(&self) -> &BufferStats {
        &self.stats
    }

    /// Subscribe to buffer events
    pub fn subscribe(&self) -> broadcast::Receiver<BufferEvent> {
        self.event_tx.subscribe()
    }

    /// Start a recording session
    ///
    /// Clears any residual segments from a previous session and opens
    /// segment #1. Fails with `SinkInit` if the sink cannot be opened.
    pub async fn start(&self) -> BufferResult<()> {
        self.request(|reply| Command::Start { reply }).await
    }

    /// Stop the recording session
    ///
    /// Finalizes the active segment and blocks until the sink reports
    /// completion. The state transitions to Stopped even if the finalize
    /// fails; the error is still returned.
    pub async fn stop(&self) -> BufferResult<()> {
        self.request(|reply| Command::Stop { reply }).await
    }

    /// Finalize the in-progress segment and list everything persisted
    ///
    /// Same drain as `stop` but the Writing/Stopped state is preserved.
    /// While Writing, samples arriving between this call and
    /// `reopen_segment` are dropped and counted.
    pub async fn flush_and_list(&self) -> BufferResult<Vec<Segment>> {
        self.request(|reply| Command::FlushAndList { reply }).await
    }

    /// Delete the named segments' file pairs from the buffer directory
    ///
    /// The active segment, if any, is never deleted. Fails if any named
    /// segment's files could not be removed; the rest are still attempted.
    pub async fn purge(&self, segment_ids: Vec<Uuid>) -> BufferResult<()> {
        self.request(|reply| Command::Purge { segment_ids, reply })
            .await
    }

    /// Open a fresh segment if recording is active and none is open
    ///
    /// No-op in any other state. Used after snapshot extraction.
    pub async fn reopen_segment(&self) -> BufferResult<()> {
        self.request(|reply| Command::ReopenSegment { reply }).await
    }

    /// Enqueue a video sample (non-blocking)
    pub fn append_video(&self, sample: Sample) {
        self.send_sample(Track::Video, sample);
    }

    /// Enqueue a system audio sample (non-blocking)
    pub fn append_audio(&self, sample: Sample) {
        self.send_sample(Track::Audio, sample);
    }

    /// Enqueue a microphone sample (non-blocking)
    pub fn append_mic(&self, sample: Sample) {
        self.send_sample(Track::Mic, sample);
    }

    /// Enqueue a metadata event for the active segment (non-blocking)
    ///
    /// Text longer than 1000 characters is truncated. Dropped if no
    /// segment is open when the worker processes it.
    pub fn add_metadata_event(&self, text: impl Into<String>) {
        let text = text.into();
        if self.tx.send(Command::AddEvent { text }).is_err() {
            tracing::warn!("Metadata event dropped; buffer worker is gone");
        }
    }

    fn send_sample(&self, track: Track, sample: Sample) {
        if self.tx.send(Command::Append { track, sample }).is_err() {
            self.stats.record_drop(track);
        }
    }

    async fn request<T>(
        &self,
        make: impl FnOnce(oneshot::Sender<BufferResult<T>>) -> Command,
    ) -> BufferResult<T> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(make(reply_tx))
            .map_err(|_| BufferError::WorkerGone)?;
        reply_rx.await.map_err(|_| BufferError::WorkerGone)?
    }
}

/// The segment currently receiving samples
struct ActiveSegment {
    id: Uuid,
    seq: u64,
    media_path: PathBuf,
    sidecar_path: PathBuf,
    sink: Box<dyn SegmentSink>,
    sidecar: SidecarMetadata,
    /// Presentation timestamp of the first video sample, t=0 for this
    /// segment's timeline. None until video arrives.
    anchor: Option<Duration>,
}

/// Consecutive-drop runs per track
#[derive(Default)]
struct DropStreaks {
    video: u64,
    audio: u64,
    mic: u64,
}

impl DropStreaks {
    fn bump(&mut self, track: Track) -> u64 {
        let counter = self.counter(track);
        *counter += 1;
        *counter
    }

    fn take(&mut self, track: Track) -> u64 {
        std::mem::take(self.counter(track))
    }

    fn counter(&mut self, track: Track) -> &mut u64 {
        match track {
            Track::Video => &mut self.video,
            Track::Audio => &mut self.audio,
            Track::Mic => &mut self.mic,
        }
    }
}

/// Worker task owning all mutable buffer state
struct BufferWorker {
    config: BufferConfig,
    factory: Arc<dyn SinkFactory>,
    state: Arc<RwLock<BufferState>>,
    stats: Arc<BufferStats>,
    event_tx: broadcast::Sender<BufferEvent>,
    active: Option<ActiveSegment>,
    next_seq: u64,
    streaks: DropStreaks,
}

impl BufferWorker {
    /// Process commands strictly in submission order until all handles drop
    async fn run(mut self, mut rx: mpsc::UnboundedReceiver<Command>) {
        while let Some(command) = rx.recv().await {
            match command {
                Command::Start { reply } => {
                    let _ = reply.send(self.handle_start().await);
                }
                Command::Append { track, sample } => {
                    self.handle_append(track, sample).await;
                }
                Command::AddEvent { text } => {
                    self.handle_add_event(text);
                }
                Command::Stop { reply } => {
                    let _ = reply.send(self.handle_stop().await);
                }
                Command::FlushAndList { reply } => {
                    let _ = reply.send(self.handle_flush_and_list().await);
                }
                Command::Purge { segment_ids, reply } => {
                    let _ = reply.send(self.handle_purge(&segment_ids));
                }
                Command::ReopenSegment { reply } => {
                    let _ = reply.send(self.handle_reopen().await);
                }
            }
        }

        if let Some(active) = &self.active {
            tracing::warn!(
                "Buffer worker exiting with segment {} still open; media file left unfinalized",
                active.id
            );
        }
        tracing::debug!("Buffer worker exiting");
    }

    async fn handle_start(&mut self) -> BufferResult<()> {
        if *self.state.read() == BufferState::Writing {
            return Err(BufferError::AlreadyRecording);
        }

        tracing::info!("Starting ring buffer in {:?}", self.config.buffer_dir);

        // A fresh session never inherits stale segments
        match fs::remove_dir_all(&self.config.buffer_dir) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(BufferError::Io(e)),
        }
        fs::create_dir_all(&self.config.buffer_dir)?;

        self.next_seq = 0;
        self.open_segment().await?;

        *self.state.write() = BufferState::Writing;
        let _ = self.event_tx.send(BufferEvent::Started);

        tracing::info!("Ring buffer started");
        Ok(())
    }

    async fn handle_stop(&mut self) -> BufferResult<()> {
        if *self.state.read() != BufferState::Writing {
            return Err(BufferError::NotRecording);
        }

        tracing::info!("Stopping ring buffer");

        let result = self.finalize_active().await;
        if result.is_ok() {
            self.prune();
        }

        *self.state.write() = BufferState::Stopped;
        let _ = self.event_tx.send(BufferEvent::Stopped);

        tracing::info!(
            "Ring buffer stopped ({} segments completed, {} samples dropped)",
            self.stats.segments_completed.load(Ordering::Relaxed),
            self.stats.total_dropped()
        );

        result.map(|_| ())
    }

    async fn handle_flush_and_list(&mut self) -> BufferResult<Vec<Segment>> {
        self.finalize_active().await?;
        self.prune();

        let segments = catalog::enumerate(&self.config.buffer_dir)?;
        tracing::debug!("Flushed buffer; {} segments persisted", segments.len());
        Ok(segments)
    }

    fn handle_purge(&mut self, segment_ids: &[Uuid]) -> BufferResult<()> {
        let segments = catalog::enumerate(&self.config.buffer_dir)?;
        let active_id = self.active.as_ref().map(|a| a.id);

        let mut removed = 0usize;
        let mut first_failure: Option<std::io::Error> = None;
        for segment in segments {
            if !segment_ids.contains(&segment.id) || Some(segment.id) == active_id {
                continue;
            }
            match self.remove_segment_files(&segment) {
                Ok(()) => removed += 1,
                Err(e) => {
                    tracing::warn!("Failed to purge segment {}: {}", segment.id, e);
                    first_failure.get_or_insert(e);
                }
            }
        }

        tracing::info!("Purged {} segments from buffer", removed);
        // A segment that survived the purge would resurface in the next
        // extraction; the caller must hear about it
        match first_failure {
            Some(e) => Err(BufferError::Io(e)),
            None => Ok(()),
        }
    }

    async fn handle_reopen(&mut self) -> BufferResult<()> {
        if *self.state.read() != BufferState::Writing || self.active.is_some() {
            return Ok(());
        }

        match self.open_segment().await {
            Ok(()) => Ok(()),
            Err(e) => {
                self.fail_session(&e);
                Err(e)
            }
        }
    }

    fn handle_add_event(&mut self, text: String) {
        match self.active.as_mut() {
            Some(active) => {
                active.sidecar.push_event(MetadataEvent::new(text));
                self.stats.events_recorded.fetch_add(1, Ordering::Relaxed);
            }
            None => {
                tracing::trace!("Metadata event dropped; no open segment");
            }
        }
    }

    async fn handle_append(&mut self, track: Track, sample: Sample) {
        let needs_rotation = match (&self.active, track) {
            (Some(active), Track::Video) => match active.anchor {
                Some(anchor) => sample
                    .pts
                    .checked_sub(anchor)
                    .map(|elapsed| elapsed >= self.config.segment_duration())
                    .unwrap_or(false),
                None => false,
            },
            _ => false,
        };

        if needs_rotation {
            if let Err(e) = self.rotate().await {
                tracing::error!("Rotation failed: {}", e);
                self.stats.record_drop(track);
                self.fail_session(&e);
                return;
            }
        }

        let unhealthy = self.try_append(track, sample).await;

        if unhealthy {
            let _ = self.event_tx.send(BufferEvent::Error(format!(
                "sink unhealthy after {} consecutive dropped video samples",
                self.config.max_consecutive_drops
            )));
            if let Err(e) = self.rotate().await {
                tracing::error!("Forced rotation failed: {}", e);
                self.fail_session(&e);
            }
        }
    }

    /// Append one sample to the active segment
    ///
    /// Returns true when the consecutive video drop bound was crossed and
    /// the sink must be declared unhealthy.
    async fn try_append(&mut self, track: Track, sample: Sample) -> bool {
        let active = match self.active.as_mut() {
            Some(a) => a,
            None => {
                // Stopped, mid-extraction, or after a failed rotation
                self.stats.record_drop(track);
                tracing::trace!("Dropped {} sample with no open segment", track.label());
                return false;
            }
        };

        // The first video sample after open defines t=0 for the segment
        if active.anchor.is_none() {
            if track == Track::Video {
                active.anchor = Some(sample.pts);
                tracing::debug!("Segment {} anchored at {:?}", active.id, sample.pts);
            } else {
                // No timeline to place audio on yet
                self.stats.record_drop(track);
                tracing::trace!("Dropped {} sample before video anchor", track.label());
                return false;
            }
        }

        if !active.sink.is_ready(track) {
            self.stats.record_drop(track);
            let streak = self.streaks.bump(track);
            tracing::trace!("Sink not ready; dropped {} sample", track.label());
            if track == Track::Video && streak >= self.config.max_consecutive_drops {
                tracing::warn!("{} consecutive video samples dropped; sink unhealthy", streak);
                return true;
            }
            return false;
        }

        match active.sink.append(track, &sample).await {
            Ok(()) => {
                let ended = self.streaks.take(track);
                if ended > 0 {
                    let _ = self
                        .event_tx
                        .send(BufferEvent::SamplesDropped { track, count: ended });
                }
                false
            }
            Err(e) => {
                self.stats.record_drop(track);
                tracing::warn!(
                    "Failed to append {} sample to segment {}: {}",
                    track.label(),
                    active.id,
                    e
                );
                let streak = self.streaks.bump(track);
                track == Track::Video && streak >= self.config.max_consecutive_drops
            }
        }
    }

    /// Finalize the active segment, prune, and open the next one
    ///
    /// The caller re-anchors the new segment with the next video sample.
    async fn rotate(&mut self) -> BufferResult<()> {
        self.finalize_active().await?;
        self.prune();
        self.open_segment().await?;
        Ok(())
    }

    async fn open_segment(&mut self) -> BufferResult<()> {
        let id = Uuid::new_v4();
        let seq = self.next_seq;
        let media_path = self
            .config
            .buffer_dir
            .join(Segment::media_file_name(seq, id));
        let sidecar_path = self
            .config
            .buffer_dir
            .join(Segment::sidecar_file_name(seq, id));

        let sink = self
            .factory
            .open(&media_path)
            .await
            .map_err(BufferError::SinkInit)?;
        self.next_seq += 1;
        self.streaks = DropStreaks::default();

        tracing::info!("Opened segment {} (seq {})", id, seq);

        self.active = Some(ActiveSegment {
            id,
            seq,
            media_path,
            sidecar_path,
            sink,
            sidecar: SidecarMetadata::new(id, seq),
            anchor: None,
        });

        Ok(())
    }

    /// Finalize and persist the active segment, if any
    ///
    /// Drains the sink to completion, records the elapsed wall time as the
    /// segment's end bound, and writes the sidecar. A segment that never
    /// received a video sample keeps its zero duration.
    async fn finalize_active(&mut self) -> BufferResult<Option<Segment>> {
        let mut active = match self.active.take() {
            Some(a) => a,
            None => return Ok(None),
        };

        if let Err(e) = active.sink.finalize().await {
            // The media file is unusable; remove the remnant rather than
            // leave an unreadable segment in the buffer.
            let _ = fs::remove_file(&active.media_path);
            return Err(BufferError::Finalize(e));
        }

        if active.anchor.is_some() {
            active.sidecar.ended_at = Utc::now();
        }
        sidecar::write_sidecar(&active.sidecar, &active.sidecar_path)?;

        let segment = Segment {
            id: active.id,
            seq: active.seq,
            media_path: active.media_path,
            sidecar_path: active.sidecar_path,
            start_time: active.sidecar.started_at,
            duration: active.sidecar.duration(),
        };

        self.stats.segments_completed.fetch_add(1, Ordering::Relaxed);
        tracing::info!(
            "Finalized segment {} (seq {}, {:.1}s, {} events)",
            segment.id,
            segment.seq,
            segment.duration.as_secs_f64(),
            active.sidecar.events.len()
        );
        let _ = self.event_tx.send(BufferEvent::SegmentCompleted {
            segment: segment.clone(),
        });

        Ok(Some(segment))
    }

    /// Evict oldest segments beyond the retention cap
    ///
    /// Runs between finalize and the next open, so no active segment
    /// exists while it scans. Eviction failures are logged, never fatal.
    fn prune(&mut self) {
        let segments = match catalog::enumerate(&self.config.buffer_dir) {
            Ok(s) => s,
            Err(e) => {
                tracing::warn!("Eviction scan failed: {}", e);
                return;
            }
        };

        if segments.len() <= self.config.max_segments {
            return;
        }

        let excess = segments.len() - self.config.max_segments;
        for segment in segments.into_iter().take(excess) {
            if let Err(e) = self.remove_segment_files(&segment) {
                tracing::warn!("Failed to evict segment {}: {}", segment.id, e);
                continue;
            }
            self.stats.segments_pruned.fetch_add(1, Ordering::Relaxed);
            tracing::info!("Evicted segment {} (seq {})", segment.id, segment.seq);
            let _ = self.event_tx.send(BufferEvent::SegmentPruned {
                segment_id: segment.id,
            });
        }
    }

    /// Delete a segment's file pair
    ///
    /// A file already gone counts as removed; any other failure is
    /// returned to the caller.
    fn remove_segment_files(&self, segment: &Segment) -> std::io::Result<()> {
        remove_existing(&segment.media_path)?;
        remove_existing(&segment.sidecar_path)
    }

    /// Declare the recording session dead after a structural failure
    fn fail_session(&mut self, error: &BufferError) {
        tracing::error!("Recording session failed: {}", error);
        *self.state.write() = BufferState::Stopped;
        let _ = self.event_tx.send(BufferEvent::Error(error.to_string()));
        let _ = self.event_tx.send(BufferEvent::Stopped);
    }
}

fn remove_existing(path: &Path) -> std::io::Result<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    }
}
