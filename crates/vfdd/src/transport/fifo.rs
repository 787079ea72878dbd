//! Named pipe transport.
//!
//! Requesters write request lines into the daemon's request pipe and wait on
//! a reply pipe of their own, named in each request.

use super::channel::{ChannelSource, RequestSender};
use super::{ReplySink, RequestSource};
use crate::error::{VfdError, VfdResult};
use crate::request::{Reply, Request};
use async_trait::async_trait;
use nix::errno::Errno;
use nix::sys::stat::Mode;
use nix::unistd::mkfifo;
use std::fs;
use std::io;
use std::os::unix::fs::FileTypeExt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::unix::pipe;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant};
use tracing::{debug, info, warn};

/// Requests read from a named pipe.
///
/// The pipe is created if missing and held open for writing as well as
/// reading, so the source does not see end-of-file between requesters.
#[derive(Debug)]
pub struct FifoSource {
    path: PathBuf,
    inner: ChannelSource,
    reader: Option<JoinHandle<()>>,
}

impl FifoSource {
    /// Opens (creating if needed) the request pipe at `path`. Must be called
    /// from within a tokio runtime.
    pub fn open(path: impl Into<PathBuf>, depth: usize) -> VfdResult<Self> {
        let path = path.into();
        ensure_fifo(&path)?;

        let receiver = pipe::OpenOptions::new()
            .read_write(true)
            .open_receiver(&path)?;
        let (tx, inner) = ChannelSource::new(depth);
        let reader = tokio::spawn(read_requests(receiver, tx, path.clone()));

        info!(path = %path.display(), "listening for requests");
        Ok(Self {
            path,
            inner,
            reader: Some(reader),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for FifoSource {
    fn drop(&mut self) {
        if let Some(reader) = self.reader.take() {
            reader.abort();
        }
    }
}

#[async_trait]
impl RequestSource for FifoSource {
    async fn recv(&mut self) -> Option<Request> {
        self.inner.recv().await
    }

    fn try_recv(&mut self) -> Option<Request> {
        self.inner.try_recv()
    }

    fn close(&mut self) {
        if let Some(reader) = self.reader.take() {
            reader.abort();
        }
        self.inner.close();
        if let Err(e) = fs::remove_file(&self.path) {
            debug!(path = %self.path.display(), error = %e, "request pipe not removed");
        }
    }
}

fn ensure_fifo(path: &Path) -> VfdResult<()> {
    match fs::metadata(path) {
        Ok(meta) if meta.file_type().is_fifo() => Ok(()),
        Ok(_) => Err(VfdError::config(
            path.display().to_string(),
            "exists and is not a named pipe",
        )),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            mkfifo(path, Mode::from_bits_truncate(0o660)).map_err(io::Error::from)?;
            debug!(path = %path.display(), "created request pipe");
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}

async fn read_requests(receiver: pipe::Receiver, tx: RequestSender, path: PathBuf) {
    let mut lines = BufReader::new(receiver).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                if line.trim().is_empty() {
                    continue;
                }
                match Request::decode(&line) {
                    Ok(request) => {
                        debug!(kind = %request.kind, reply_to = %request.reply_to, "request received");
                        if tx.send(request).await.is_err() {
                            break;
                        }
                    }
                    Err(e) => warn!(error = %e, "dropping unreadable request"),
                }
            }
            Ok(None) => break,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "request pipe read failed");
                break;
            }
        }
    }
    debug!(path = %path.display(), "request reader stopped");
}

/// Writes each reply to the requester's named pipe.
#[derive(Debug, Clone)]
pub struct FifoReplySink {
    timeout: Duration,
}

impl FifoReplySink {
    /// Creates a new sink that gives up on a reply pipe after `timeout`.
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

#[async_trait]
impl ReplySink for FifoReplySink {
    async fn deliver(&self, reply_to: &str, reply: &Reply) -> VfdResult<()> {
        let mut line = reply.encode()?;
        line.push('\n');

        // Opening for write fails with ENXIO until the requester opens its end.
        let deadline = Instant::now() + self.timeout;
        let mut sender = loop {
            match pipe::OpenOptions::new().open_sender(reply_to) {
                Ok(sender) => break sender,
                Err(e) if e.raw_os_error() == Some(Errno::ENXIO as i32) => {
                    if Instant::now() >= deadline {
                        return Err(VfdError::Io(io::Error::new(
                            io::ErrorKind::TimedOut,
                            format!("no reader on reply pipe {}", reply_to),
                        )));
                    }
                    time::sleep(Duration::from_millis(20)).await;
                }
                Err(e) => return Err(e.into()),
            }
        };

        time::timeout_at(deadline, sender.write_all(line.as_bytes()))
            .await
            .map_err(|_| {
                VfdError::Io(io::Error::new(
                    io::ErrorKind::TimedOut,
                    format!("reply pipe {} stalled", reply_to),
                ))
            })??;
        Ok(())
    }
}
