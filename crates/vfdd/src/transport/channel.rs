//! In-process transport.

use super::{ReplySink, RequestSource};
use crate::error::{VfdError, VfdResult};
use crate::request::{Reply, Request};
use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::mpsc;

/// Sending half paired with a [`ChannelSource`].
#[derive(Debug, Clone)]
pub struct RequestSender {
    tx: mpsc::Sender<Request>,
}

impl RequestSender {
    /// Queues a request, waiting for room if the queue is full.
    pub async fn send(&self, request: Request) -> VfdResult<()> {
        self.tx
            .send(request)
            .await
            .map_err(|_| VfdError::validation("request source is closed"))
    }

    /// Queues a request if there is room.
    pub fn try_send(&self, request: Request) -> VfdResult<()> {
        self.tx
            .try_send(request)
            .map_err(|e| VfdError::validation(format!("cannot queue request: {}", e)))
    }
}

/// Requests fed through a bounded tokio channel.
#[derive(Debug)]
pub struct ChannelSource {
    rx: mpsc::Receiver<Request>,
}

impl ChannelSource {
    /// Creates a new source holding up to `depth` pending requests.
    pub fn new(depth: usize) -> (RequestSender, Self) {
        let (tx, rx) = mpsc::channel(depth.max(1));
        (RequestSender { tx }, Self { rx })
    }
}

#[async_trait]
impl RequestSource for ChannelSource {
    async fn recv(&mut self) -> Option<Request> {
        self.rx.recv().await
    }

    fn try_recv(&mut self) -> Option<Request> {
        self.rx.try_recv().ok()
    }

    fn close(&mut self) {
        self.rx.close();
    }
}

/// Keeps every delivered reply in memory, in delivery order.
#[derive(Debug, Default)]
pub struct MemoryReplySink {
    replies: Mutex<Vec<(String, Reply)>>,
}

impl MemoryReplySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Removes and returns the replies delivered so far.
    pub fn take(&self) -> Vec<(String, Reply)> {
        std::mem::take(&mut *self.replies.lock())
    }

    pub fn len(&self) -> usize {
        self.replies.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.replies.lock().is_empty()
    }
}

#[async_trait]
impl ReplySink for MemoryReplySink {
    async fn deliver(&self, reply_to: &str, reply: &Reply) -> VfdResult<()> {
        self.replies
            .lock()
            .push((reply_to.to_string(), reply.clone()));
        Ok(())
    }
}
