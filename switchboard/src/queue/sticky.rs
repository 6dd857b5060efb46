//! Session-pinned queueing.
//!
//! A sticky session routes its first request like any other, but remembers
//! which host accepted it and sends every later request of the session to
//! that host only. The queue in front is the ordinary [`QueuedChannel`]; only
//! the delegate underneath it changes.

use super::QueuedChannel;
use crate::{
    channel::{Channel, LimitedChannel, ResponseFuture},
    endpoint::Endpoint,
    node_selection::NodeSelectionChannel,
    request::Request,
};
use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};

/// Sentinel meaning "no host pinned yet".
const UNPINNED: usize = usize::MAX;

/// A [`QueuedChannel`] whose delegate pins the session to the first host
/// that accepts a dispatch.
#[derive(Debug)]
pub struct StickyQueueChannel {
    router: Arc<StickyRouter>,
    queue: QueuedChannel,
}

impl StickyQueueChannel {
    /// Create a fresh session over the client's node selection.
    pub fn new(
        selection: Arc<NodeSelectionChannel>,
        channel_name: Arc<str>,
        max_queue_size: usize,
    ) -> Self {
        let router = Arc::new(StickyRouter {
            selection,
            pinned: AtomicUsize::new(UNPINNED),
        });
        let queue = QueuedChannel::new(
            Arc::clone(&router) as Arc<dyn LimitedChannel>,
            channel_name,
            max_queue_size,
        );

        Self { router, queue }
    }

    /// Host this session is pinned to, once one has accepted a dispatch.
    pub fn pinned_host(&self) -> Option<usize> {
        match self.router.pinned.load(Ordering::Acquire) {
            UNPINNED => None,
            index => Some(index),
        }
    }

    /// The session-pinned view itself, for paths that bypass the queue.
    pub(crate) fn router(&self) -> Arc<dyn LimitedChannel> {
        Arc::clone(&self.router) as Arc<dyn LimitedChannel>
    }

    /// Number of requests currently parked in this session's queue.
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    /// Whether this session's queue is empty.
    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}

impl Channel for StickyQueueChannel {
    fn execute(&self, endpoint: &Endpoint, request: &Request) -> ResponseFuture {
        self.queue.execute(endpoint, request)
    }
}

/// Session-pinned view over the node selection.
///
/// Until a dispatch is accepted it defers to the configured strategy; the
/// first acceptance records the host (first writer wins under concurrency)
/// and later dispatches go to that host alone.
#[derive(Debug)]
struct StickyRouter {
    selection: Arc<NodeSelectionChannel>,
    pinned: AtomicUsize,
}

impl LimitedChannel for StickyRouter {
    fn maybe_execute(&self, endpoint: &Endpoint, request: &Request) -> Option<ResponseFuture> {
        let pinned = self.pinned.load(Ordering::Acquire);

        if pinned != UNPINNED {
            return self.selection.host(pinned)?.maybe_execute(endpoint, request);
        }

        let (index, future) = self.selection.maybe_execute_indexed(endpoint, request)?;

        if self
            .pinned
            .compare_exchange(UNPINNED, index, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
        {
            tracing::debug!(host = index, "pinned session to host");
        }

        Some(future)
    }
}
