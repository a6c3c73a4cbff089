//! Byte-level progress reporting.
//!
//! Upload bodies are wrapped so that every chunk handed to the transport
//! also sends an incremental `(path, delta)` message to the progress
//! channel. A read failure mid-body sends a single negative rollback so
//! the displayed counter returns to where this body started.

use std::future::Future;
use std::io;
use std::path::PathBuf;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use bytes::Bytes;
use futures::Stream;
use skylift_storage::BodyStream;
use tokio::task::JoinHandle;

/// Incremental uploaded-bytes message. Positive on read progress;
/// negative once when a reader aborts mid-body.
#[derive(Debug, Clone)]
pub(crate) struct ProgressMsg {
    pub path: PathBuf,
    pub delta: i64,
}

/// Bytes handed to the transport per stream item.
const CHUNK_SIZE: u64 = 256 * 1024;

/// A section of a shared file handle, streamed with progress reporting.
///
/// Reads are positional, so any number of bodies can share one handle
/// without fighting over a seek cursor.
pub(crate) struct ProgressBody {
    file: Arc<std::fs::File>,
    path: PathBuf,
    offset: u64,
    remaining: u64,
    reported: i64,
    progress: flume::Sender<ProgressMsg>,
    inflight: Option<JoinHandle<io::Result<Bytes>>>,
    failed: bool,
}

impl ProgressBody {
    pub fn new(
        file: Arc<std::fs::File>,
        path: PathBuf,
        offset: u64,
        len: u64,
        progress: flume::Sender<ProgressMsg>,
    ) -> Self {
        Self {
            file,
            path,
            offset,
            remaining: len,
            reported: 0,
            progress,
            inflight: None,
            failed: false,
        }
    }

    /// Boxes the body for the object-store trait.
    pub fn into_stream(self) -> BodyStream {
        Box::pin(self)
    }

    fn send_progress(&self, delta: i64) {
        let _ = self.progress.send(ProgressMsg {
            path: self.path.clone(),
            delta,
        });
    }
}

impl Stream for ProgressBody {
    type Item = io::Result<Bytes>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        loop {
            if this.failed {
                return Poll::Ready(None);
            }
            if let Some(handle) = this.inflight.as_mut() {
                let joined = match Pin::new(handle).poll(cx) {
                    Poll::Pending => return Poll::Pending,
                    Poll::Ready(joined) => joined,
                };
                this.inflight = None;
                let read = match joined {
                    Ok(read) => read,
                    Err(join_err) => Err(io::Error::other(join_err)),
                };
                match read {
                    Ok(chunk) => {
                        let n = chunk.len() as u64;
                        this.offset += n;
                        this.remaining -= n;
                        this.reported += n as i64;
                        this.send_progress(n as i64);
                        return Poll::Ready(Some(Ok(chunk)));
                    }
                    Err(err) => {
                        this.send_progress(-this.reported);
                        this.reported = 0;
                        this.failed = true;
                        return Poll::Ready(Some(Err(err)));
                    }
                }
            }
            if this.remaining == 0 {
                return Poll::Ready(None);
            }
            let len = this.remaining.min(CHUNK_SIZE) as usize;
            let file = Arc::clone(&this.file);
            let offset = this.offset;
            this.inflight = Some(tokio::task::spawn_blocking(move || {
                read_chunk_at(&file, offset, len)
            }));
        }
    }
}

/// Reads exactly `len` bytes at `offset` without moving the shared
/// handle's cursor.
fn read_chunk_at(file: &std::fs::File, offset: u64, len: usize) -> io::Result<Bytes> {
    let mut buf = vec![0u8; len];
    let mut filled = 0;
    while filled < len {
        match read_at(file, &mut buf[filled..], offset + filled as u64) {
            Ok(0) => {
                return Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "file shrank while uploading",
                ));
            }
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    Ok(Bytes::from(buf))
}

#[cfg(unix)]
fn read_at(file: &std::fs::File, buf: &mut [u8], offset: u64) -> io::Result<usize> {
    std::os::unix::fs::FileExt::read_at(file, buf, offset)
}

#[cfg(windows)]
fn read_at(file: &std::fs::File, buf: &mut [u8], offset: u64) -> io::Result<usize> {
    std::os::windows::fs::FileExt::seek_read(file, buf, offset)
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;

    fn write_file(dir: &std::path::Path, data: &[u8]) -> Arc<std::fs::File> {
        let path = dir.join("body.bin");
        std::fs::write(&path, data).unwrap();
        Arc::new(std::fs::File::open(&path).unwrap())
    }

    #[tokio::test]
    async fn streams_section_and_reports_progress() {
        let dir = tempfile::tempdir().unwrap();
        let file = write_file(dir.path(), b"0123456789");
        let (tx, rx) = flume::unbounded();

        let body = ProgressBody::new(file, PathBuf::from("/f"), 2, 6, tx);
        let chunks: Vec<Bytes> = body.map(|c| c.unwrap()).collect().await;
        let joined: Vec<u8> = chunks.concat();
        assert_eq!(&joined, b"234567");

        let reported: i64 = rx.try_iter().map(|m| m.delta).sum();
        assert_eq!(reported, 6);
    }

    #[tokio::test]
    async fn zero_length_body_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let file = write_file(dir.path(), b"");
        let (tx, rx) = flume::unbounded();

        let mut body = ProgressBody::new(file, PathBuf::from("/f"), 0, 0, tx);
        assert!(body.next().await.is_none());
        assert_eq!(rx.try_iter().count(), 0);
    }

    #[tokio::test]
    async fn read_error_rolls_back_reported_progress() {
        let dir = tempfile::tempdir().unwrap();
        // Claim more bytes than the file holds so the tail read hits EOF.
        let data = vec![7u8; (CHUNK_SIZE + 10) as usize];
        let file = write_file(dir.path(), &data);
        let (tx, rx) = flume::unbounded();

        let mut body = ProgressBody::new(
            file,
            PathBuf::from("/f"),
            0,
            CHUNK_SIZE + 1024,
            tx,
        );
        let first = body.next().await.unwrap().unwrap();
        assert_eq!(first.len() as u64, CHUNK_SIZE);
        let second = body.next().await.unwrap();
        assert!(second.is_err());
        assert!(body.next().await.is_none());

        let deltas: Vec<i64> = rx.try_iter().map(|m| m.delta).collect();
        assert_eq!(deltas, vec![CHUNK_SIZE as i64, -(CHUNK_SIZE as i64)]);
        assert_eq!(deltas.iter().sum::<i64>(), 0);
    }
}
