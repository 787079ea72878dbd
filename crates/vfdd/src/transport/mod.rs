//! Request transport.
//!
//! The request server reads requests from a [`RequestSource`] and delivers
//! replies through a [`ReplySink`]. Requests are drained in arrival order;
//! a source must hand back everything already queued through
//! [`RequestSource::try_recv`] without waiting.

mod channel;
mod fifo;

pub use channel::{ChannelSource, MemoryReplySink, RequestSender};
pub use fifo::{FifoReplySink, FifoSource};

use crate::error::VfdResult;
use crate::request::{Reply, Request};
use async_trait::async_trait;

/// Where requests come from.
#[async_trait]
pub trait RequestSource: Send {
    /// Waits for the next request. Returns None once the source is closed
    /// and empty.
    async fn recv(&mut self) -> Option<Request>;

    /// Returns a request that is already pending, without waiting.
    fn try_recv(&mut self) -> Option<Request>;

    /// Stops accepting requests.
    fn close(&mut self);
}

/// Where replies go.
#[async_trait]
pub trait ReplySink: Send + Sync {
    /// Delivers `reply` to the destination named `reply_to`.
    async fn deliver(&self, reply_to: &str, reply: &Reply) -> VfdResult<()>;
}
