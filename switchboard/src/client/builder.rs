//! Assembling a [`Client`] pipeline.

use super::{Client, ClientQos, State};
use crate::{
    channel::{Channel, LimitedChannel},
    limited::{ConcurrencyLimitedChannel, UngatedChannel},
    node_selection::{NodeSelectionChannel, NodeSelectionStrategy},
    queue::{QueuedChannel, DEFAULT_MAX_QUEUE_SIZE},
    retry::{DirectChannel, RetryOnTimeout, RetryPolicy, RetryingChannel, ServerQos},
};
use std::{sync::Arc, time::Duration};
use switchboard_limiting::{ConcurrencyLimiter, LimitBehavior};

/// One upstream host: where it lives and how to reach it.
#[derive(Debug)]
pub struct Host {
    uri: String,
    channel: Arc<dyn Channel>,
}

impl Host {
    /// Pair a base URI with the transport channel that speaks to it.
    ///
    /// The URI's authority is what `Location` headers of permanent redirects
    /// are matched against.
    pub fn new(uri: impl Into<String>, channel: Arc<dyn Channel>) -> Self {
        Self {
            uri: uri.into(),
            channel,
        }
    }
}

/// Builder for a [`Client`].
///
/// ```no_run
/// use std::sync::Arc;
/// use switchboard::{Client, Host, NodeSelectionStrategy};
/// # fn transport() -> Arc<dyn switchboard::Channel> { unimplemented!() }
///
/// let client = Client::builder()
///     .channel_name("registry")
///     .host(Host::new("https://east.example.com/api", transport()))
///     .host(Host::new("https://west.example.com/api", transport()))
///     .node_selection_strategy(NodeSelectionStrategy::Balanced)
///     .build();
/// ```
#[derive(Debug)]
pub struct ClientBuilder {
    channel_name: String,
    client_name: Option<String>,
    hosts: Vec<Host>,
    max_queue_size: usize,
    node_selection_strategy: NodeSelectionStrategy,
    client_qos: ClientQos,
    retry: RetryPolicy,
}

impl ClientBuilder {
    /// Create a builder with every policy at its default.
    pub fn new() -> Self {
        Self {
            channel_name: String::from("switchboard"),
            client_name: None,
            hosts: Vec::new(),
            max_queue_size: DEFAULT_MAX_QUEUE_SIZE,
            node_selection_strategy: NodeSelectionStrategy::default(),
            client_qos: ClientQos::default(),
            retry: RetryPolicy::default(),
        }
    }

    /// Name tagged onto every metric and log line of this pipeline.
    pub fn channel_name(mut self, channel_name: impl Into<String>) -> Self {
        self.channel_name = channel_name.into();

        self
    }

    /// Name of the logical client this pipeline belongs to.
    pub fn client_name(mut self, client_name: impl Into<String>) -> Self {
        self.client_name = Some(client_name.into());

        self
    }

    /// Add one upstream host.
    pub fn host(mut self, host: Host) -> Self {
        self.hosts.push(host);

        self
    }

    /// Replace the host list.
    pub fn hosts(mut self, hosts: Vec<Host>) -> Self {
        self.hosts = hosts;

        self
    }

    /// Bound on the number of requests parked while every host is limited.
    pub fn max_queue_size(mut self, max_queue_size: usize) -> Self {
        self.max_queue_size = max_queue_size;

        self
    }

    /// Strategy used to pick a host per dispatch.
    pub fn node_selection_strategy(mut self, strategy: NodeSelectionStrategy) -> Self {
        self.node_selection_strategy = strategy;

        self
    }

    /// Enable or disable sympathetic client-side concurrency limiting.
    pub fn client_qos(mut self, client_qos: ClientQos) -> Self {
        self.client_qos = client_qos;

        self
    }

    /// Retry budget per request.
    pub fn max_num_retries(mut self, max_num_retries: u32) -> Self {
        self.retry.max_num_retries = max_num_retries;

        self
    }

    /// Base slot of the exponential retry backoff.
    pub fn backoff_slot_size(mut self, backoff_slot_size: Duration) -> Self {
        self.retry.backoff_slot_size = backoff_slot_size;

        self
    }

    /// Handling of explicit server backpressure.
    pub fn server_qos(mut self, server_qos: ServerQos) -> Self {
        self.retry.server_qos = server_qos;

        self
    }

    /// Handling of timed-out attempts.
    pub fn retry_on_timeout(mut self, retry_on_timeout: RetryOnTimeout) -> Self {
        self.retry.retry_on_timeout = retry_on_timeout;

        self
    }

    /// Compose the pipeline.
    pub fn build(self) -> Client {
        let channel_name: Arc<str> = self.channel_name.into();
        let client_name: Option<Arc<str>> = self.client_name.map(Into::into);
        let host_uris: Arc<[String]> = self
            .hosts
            .iter()
            .map(|host| host.uri.clone())
            .collect::<Vec<_>>()
            .into();

        let gated: Vec<Arc<dyn LimitedChannel>> = self
            .hosts
            .iter()
            .enumerate()
            .map(|(index, host)| match self.client_qos {
                ClientQos::Enabled => Arc::new(ConcurrencyLimitedChannel::new(
                    Arc::clone(&host.channel),
                    ConcurrencyLimiter::new(LimitBehavior::Host),
                    index,
                    Arc::clone(&channel_name),
                )) as Arc<dyn LimitedChannel>,
                ClientQos::DangerousDisableSympatheticClientQos => {
                    Arc::new(UngatedChannel::new(Arc::clone(&host.channel)))
                        as Arc<dyn LimitedChannel>
                }
            })
            .collect();

        let selection = Arc::new(NodeSelectionChannel::new(
            self.node_selection_strategy,
            gated,
            Arc::clone(&channel_name),
        ));
        let queued = QueuedChannel::new(
            Arc::clone(&selection) as Arc<dyn LimitedChannel>,
            Arc::clone(&channel_name),
            self.max_queue_size,
        );
        let direct = Arc::new(DirectChannel::new(
            Arc::clone(&selection) as Arc<dyn LimitedChannel>,
        )) as Arc<dyn Channel>;
        let channel = RetryingChannel::new(
            Arc::new(queued) as Arc<dyn Channel>,
            direct,
            Arc::clone(&host_uris),
            self.retry,
            Arc::clone(&channel_name),
        );

        tracing::debug!(
            channel = %channel_name,
            client = ?client_name,
            hosts = host_uris.len(),
            "built client pipeline"
        );

        Client {
            state: Arc::new(State {
                channel,
                selection,
                host_uris,
                channel_name,
                client_name,
                max_queue_size: self.max_queue_size,
                retry: self.retry,
            }),
        }
    }
}

impl Default for ClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}
