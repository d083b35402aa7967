//! File-backed reference sink
//!
//! A minimal `SegmentSink` that writes samples as length-prefixed records
//! straight to disk. It exists so the ring buffer is fully exercisable
//! without a hardware encoder; production callers plug a real encoder/muxer
//! in behind the same trait.
//!
//! Record layout:
//! ```text
//! +---------+------------+---------+---------+
//! | Track(1)| PtsUs(8 BE)| Len(4 BE)| Data(N)|
//! +---------+------------+---------+---------+
//! ```

use super::traits::{Sample, SegmentSink, SinkError, SinkFactory, Track};
use async_trait::async_trait;
use std::path::Path;
use tokio::fs::File;
use tokio::io::{AsyncWriteExt, BufWriter};

/// Track tag byte written ahead of each record
fn track_tag(track: Track) -> u8 {
    match track {
        Track::Video => 0x01,
        Track::Audio => 0x02,
        Track::Mic => 0x03,
    }
}

/// Length prefix for a record payload
///
/// A payload that does not fit the u32 prefix is rejected; truncating it
/// would corrupt every record after it in the stream.
fn record_len(len: usize) -> Result<u32, SinkError> {
    u32::try_from(len).map_err(|_| {
        SinkError::Io(std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            "sample payload exceeds the u32 record length",
        ))
    })
}

/// Sink writing raw sample records to a single file
pub struct FileSink {
    writer: Option<BufWriter<File>>,
}

impl FileSink {
    /// Open a sink writing to `path`, truncating any existing file
    pub async fn create(path: &Path) -> Result<Self, SinkError> {
        let file = File::create(path).await?;
        Ok(Self {
            writer: Some(BufWriter::new(file)),
        })
    }
}

#[async_trait]
impl SegmentSink for FileSink {
    fn is_ready(&self, _track: Track) -> bool {
        // A buffered file write never saturates; real encoders report
        // their queue state here.
        self.writer.is_some()
    }

    async fn append(&mut self, track: Track, sample: &Sample) -> Result<(), SinkError> {
        let len = record_len(sample.data.len())?;
        let writer = self.writer.as_mut().ok_or(SinkError::Closed)?;

        writer.write_u8(track_tag(track)).await?;
        writer.write_u64(sample.pts.as_micros() as u64).await?;
        writer.write_u32(len).await?;
        writer.write_all(&sample.data).await?;

        Ok(())
    }

    async fn finalize(&mut self) -> Result<(), SinkError> {
        let mut writer = self.writer.take().ok_or(SinkError::Closed)?;

        writer.flush().await?;
        writer.into_inner().sync_all().await?;

        Ok(())
    }
}

/// Factory producing `FileSink`s
#[derive(Debug, Clone, Default)]
pub struct FileSinkFactory;

#[async_trait]
impl SinkFactory for FileSinkFactory {
    async fn open(&self, path: &Path) -> Result<Box<dyn SegmentSink>, SinkError> {
        let sink = FileSink::create(path).await?;
        tracing::debug!("Opened file sink at {:?}", path);
        Ok(Box::new(sink))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use std::time::Duration;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_append_and_finalize() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("segment.mp4");

        let mut sink = FileSink::create(&path).await.unwrap();
        assert!(sink.is_ready(Track::Video));

        let sample = Sample::new(Duration::from_millis(33), Bytes::from_static(b"framedata"));
        sink.append(Track::Video, &sample).await.unwrap();
        sink.finalize().await.unwrap();

        let written = std::fs::read(&path).unwrap();
        // 1 tag + 8 pts + 4 len + 9 payload
        assert_eq!(written.len(), 22);
        assert_eq!(written[0], 0x01);
        assert_eq!(&written[13..], b"framedata");
    }

    #[tokio::test]
    async fn test_append_after_finalize_fails() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("segment.mp4");

        let mut sink = FileSink::create(&path).await.unwrap();
        sink.finalize().await.unwrap();

        assert!(!sink.is_ready(Track::Video));
        let sample = Sample::new(Duration::ZERO, Bytes::from_static(b"x"));
        let err = sink.append(Track::Video, &sample).await.unwrap_err();
        assert!(matches!(err, SinkError::Closed));
    }

    #[test]
    fn test_record_len_rejects_payload_beyond_prefix() {
        assert_eq!(record_len(0).unwrap(), 0);
        assert_eq!(record_len(u32::MAX as usize).unwrap(), u32::MAX);
        assert!(matches!(
            record_len(u32::MAX as usize + 1),
            Err(SinkError::Io(_))
        ));
    }

    #[tokio::test]
    async fn test_factory_open_fails_on_missing_dir() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nope").join("segment.mp4");

        let factory = FileSinkFactory;
        assert!(factory.open(&path).await.is_err());
    }
}
