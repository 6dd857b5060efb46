//! The assembled pipeline.

mod builder;
pub mod config;

pub use self::{
    builder::{ClientBuilder, Host},
    config::ClientQos,
};

use crate::{
    channel::{Channel, ResponseFuture},
    endpoint::Endpoint,
    metrics,
    node_selection::NodeSelectionChannel,
    queue::StickyQueueChannel,
    request::Request,
    retry::{DirectChannel, RetryPolicy, RetryingChannel},
};
use std::{sync::Arc, time::Instant};

/// A configured client pipeline.
///
/// Requests submitted through [`execute`] flow retry -> queue -> node
/// selection -> per-host concurrency gate -> transport. The client wraps its
/// state in an [`Arc`], so it can be cloned and passed between tasks cheaply.
///
/// [`execute`]: Self::execute
#[derive(Clone, Debug)]
pub struct Client {
    pub(super) state: Arc<State>,
}

#[derive(Debug)]
pub(super) struct State {
    pub(super) channel: RetryingChannel,
    pub(super) selection: Arc<NodeSelectionChannel>,
    pub(super) host_uris: Arc<[String]>,
    pub(super) channel_name: Arc<str>,
    pub(super) client_name: Option<Arc<str>>,
    pub(super) max_queue_size: usize,
    pub(super) retry: RetryPolicy,
}

impl Client {
    /// Create a builder to assemble a client.
    pub fn builder() -> ClientBuilder {
        ClientBuilder::new()
    }

    /// Name tagged onto every metric and log line of this pipeline.
    pub fn channel_name(&self) -> &str {
        &self.state.channel_name
    }

    /// Name of the logical client this pipeline belongs to, if one was set.
    pub fn client_name(&self) -> Option<&str> {
        self.state.client_name.as_deref()
    }

    /// Submit a request through the full pipeline.
    ///
    /// The returned future resolves to the final outcome after any retries;
    /// dropping it cancels the request wherever it currently is. Must be
    /// called from within a tokio runtime.
    pub fn execute(&self, endpoint: &Endpoint, request: &Request) -> ResponseFuture {
        observe(
            Arc::clone(&self.state.channel_name),
            self.state.channel.execute(endpoint, request),
            endpoint,
        )
    }

    /// Mint a session whose requests all land on one host.
    ///
    /// The session shares the client's hosts, limiters and policies but owns
    /// its queue. The first dispatch picks the host per the configured
    /// strategy; everything after sticks to it.
    pub fn sticky_session(&self) -> StickySession {
        let queue = Arc::new(StickyQueueChannel::new(
            Arc::clone(&self.state.selection),
            Arc::clone(&self.state.channel_name),
            self.state.max_queue_size,
        ));
        let direct = Arc::new(DirectChannel::new(queue.router())) as Arc<dyn Channel>;
        let channel = RetryingChannel::new(
            Arc::clone(&queue) as Arc<dyn Channel>,
            direct,
            Arc::clone(&self.state.host_uris),
            self.state.retry,
            Arc::clone(&self.state.channel_name),
        );

        StickySession {
            channel,
            queue,
            channel_name: Arc::clone(&self.state.channel_name),
        }
    }
}

impl Channel for Client {
    fn execute(&self, endpoint: &Endpoint, request: &Request) -> ResponseFuture {
        Client::execute(self, endpoint, request)
    }
}

/// A session pinned to whichever host accepts its first dispatch.
///
/// Minted by [`Client::sticky_session`].
#[derive(Debug)]
pub struct StickySession {
    channel: RetryingChannel,
    queue: Arc<StickyQueueChannel>,
    channel_name: Arc<str>,
}

impl StickySession {
    /// Submit a request through this session's pipeline.
    pub fn execute(&self, endpoint: &Endpoint, request: &Request) -> ResponseFuture {
        observe(
            Arc::clone(&self.channel_name),
            self.channel.execute(endpoint, request),
            endpoint,
        )
    }

    /// Host this session is pinned to, once one has accepted a dispatch.
    pub fn pinned_host(&self) -> Option<usize> {
        self.queue.pinned_host()
    }
}

impl Channel for StickySession {
    fn execute(&self, endpoint: &Endpoint, request: &Request) -> ResponseFuture {
        StickySession::execute(self, endpoint, request)
    }
}

/// Time the full call and mark the terminal response metric.
fn observe(channel_name: Arc<str>, future: ResponseFuture, endpoint: &Endpoint) -> ResponseFuture {
    let endpoint = endpoint.clone();

    Box::pin(async move {
        let start = Instant::now();
        let result = future.await;
        let success = result
            .as_ref()
            .map_or(false, |response| response.status().is_success());
        metrics::observe_response(
            &channel_name,
            endpoint.service(),
            endpoint.name(),
            success,
            start.elapsed(),
        );

        result
    })
}
