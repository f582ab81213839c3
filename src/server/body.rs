//! Streaming archive bodies
//!
//! The tar and gzip writers are synchronous, so the archive is produced on
//! the blocking pool and handed to the response body through a bounded
//! channel. A slow client applies backpressure all the way to disk reads.

use crate::archive::{write_archive, ArchivePolicy};
use axum::body::{Body, Bytes};
use std::io::{self, BufWriter, Write};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, error};

/// Chunks buffered between the archiver and the socket
const CHANNEL_CAPACITY: usize = 16;

/// Bytes collected before a chunk is sent
const CHUNK_SIZE: usize = 32 * 1024;

type Chunk = io::Result<Bytes>;

/// `Write` adapter that forwards each write as a body chunk
///
/// Must only be used off the async runtime: sends block until the body
/// has room.
pub struct ChannelWriter {
    tx: mpsc::Sender<Chunk>,
}

impl ChannelWriter {
    pub fn new(tx: mpsc::Sender<Chunk>) -> Self {
        Self { tx }
    }
}

impl Write for ChannelWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        self.tx
            .blocking_send(Ok(Bytes::copy_from_slice(buf)))
            .map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "client went away"))?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Response body that streams the archive of `dir`
///
/// If archiving fails part way, the error is logged and the body ends with
/// an error so the connection is cut instead of looking complete.
pub fn archive_body(dir: PathBuf, policy: Arc<ArchivePolicy>) -> Body {
    let (tx, rx) = mpsc::channel::<Chunk>(CHANNEL_CAPACITY);

    tokio::task::spawn_blocking(move || {
        let sink = BufWriter::with_capacity(CHUNK_SIZE, ChannelWriter::new(tx.clone()));
        match write_archive(sink, &dir, &policy) {
            Ok(_) => debug!("finished streaming {}", dir.display()),
            Err(e) => {
                error!("Error generating tar of {}: {}", dir.display(), e);
                // Fails only if the client is already gone.
                let _ = tx.blocking_send(Err(io::Error::other(e.to_string())));
            }
        }
    });

    Body::from_stream(ReceiverStream::new(rx))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[tokio::test]
    async fn streams_complete_archive() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join("main.go"), b"package main\n").unwrap();

        let body = archive_body(temp.path().to_path_buf(), Arc::new(ArchivePolicy::default()));
        let bytes = axum::body::to_bytes(body, usize::MAX).await.unwrap();

        let expected = write_archive(Vec::new(), temp.path(), &ArchivePolicy::default()).unwrap();
        assert_eq!(bytes.as_ref(), expected.as_slice());
    }

    #[tokio::test]
    async fn failure_ends_body_with_error() {
        let temp = TempDir::new().unwrap();
        let missing = temp.path().join("absent");

        let body = archive_body(missing, Arc::new(ArchivePolicy::default()));

        assert!(axum::body::to_bytes(body, usize::MAX).await.is_err());
    }

    #[test]
    fn writer_reports_closed_channel() {
        let (tx, rx) = mpsc::channel(1);
        drop(rx);
        let mut writer = ChannelWriter::new(tx);

        let err = writer.write(b"data").unwrap_err();

        assert_eq!(err.kind(), io::ErrorKind::BrokenPipe);
    }
}
