//! Choosing a host for each dispatch.
//!
//! A [`NodeSelectionChannel`] owns one [`LimitedChannel`] per host and asks
//! them in strategy order until one accepts. It declines only when every host
//! declines. The accepting host's index is reported internally so session
//! pinning can remember where a request landed.

mod balanced;
mod pin_until_error;
mod round_robin;

use self::{balanced::Balanced, pin_until_error::PinUntilError, round_robin::RoundRobin};
use crate::{
    channel::{LimitedChannel, ResponseFuture},
    endpoint::Endpoint,
    metrics,
    request::Request,
};
use std::sync::Arc;

/// How a [`NodeSelectionChannel`] orders its hosts.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
#[non_exhaustive]
pub enum NodeSelectionStrategy {
    /// Stay on one host until it misbehaves, then move on. Host order is
    /// shuffled per client and reshuffled periodically so fleets of clients
    /// do not herd onto the same upstream.
    #[default]
    PinUntilError,
    /// [`PinUntilError`] without the periodic reshuffle.
    ///
    /// [`PinUntilError`]: Self::PinUntilError
    PinUntilErrorWithoutReshuffle,
    /// Rotate the starting host on every dispatch.
    RoundRobin,
    /// Prefer the host with the least in-flight work and the cleanest recent
    /// history.
    Balanced,
}

impl NodeSelectionStrategy {
    pub(crate) const fn name(self) -> &'static str {
        match self {
            Self::PinUntilError => "PIN_UNTIL_ERROR",
            Self::PinUntilErrorWithoutReshuffle => "PIN_UNTIL_ERROR_WITHOUT_RESHUFFLE",
            Self::RoundRobin => "ROUND_ROBIN",
            Self::Balanced => "BALANCED",
        }
    }
}

/// One host as the strategies see it: its original index plus its gated
/// channel. The index survives shuffling and sorting.
#[derive(Clone, Debug)]
struct HostEntry {
    index: usize,
    channel: Arc<dyn LimitedChannel>,
}

/// Dispatches across the hosts of one client per the configured strategy.
#[derive(Debug)]
pub struct NodeSelectionChannel {
    /// Hosts in their original order, for preferred-host routing.
    hosts: Vec<Arc<dyn LimitedChannel>>,
    selection: Selection,
    channel_name: Arc<str>,
}

#[derive(Debug)]
enum Selection {
    /// No hosts configured; every dispatch is declined.
    Empty,
    PinUntilError(Arc<PinUntilError>),
    RoundRobin(RoundRobin),
    Balanced(Balanced),
}

impl NodeSelectionChannel {
    /// Create a selection channel over `hosts` in the given strategy.
    pub fn new(
        strategy: NodeSelectionStrategy,
        hosts: Vec<Arc<dyn LimitedChannel>>,
        channel_name: Arc<str>,
    ) -> Self {
        metrics::mark_strategy(&channel_name, strategy.name());
        tracing::debug!(
            channel = %channel_name,
            strategy = strategy.name(),
            hosts = hosts.len(),
            "configured node selection"
        );

        let entries: Vec<HostEntry> = hosts
            .iter()
            .enumerate()
            .map(|(index, channel)| HostEntry {
                index,
                channel: Arc::clone(channel),
            })
            .collect();

        let selection = if entries.is_empty() {
            Selection::Empty
        } else {
            match strategy {
                NodeSelectionStrategy::PinUntilError => Selection::PinUntilError(Arc::new(
                    PinUntilError::new(entries, true, Arc::clone(&channel_name)),
                )),
                NodeSelectionStrategy::PinUntilErrorWithoutReshuffle => Selection::PinUntilError(
                    Arc::new(PinUntilError::new(entries, false, Arc::clone(&channel_name))),
                ),
                NodeSelectionStrategy::RoundRobin => {
                    Selection::RoundRobin(RoundRobin::new(entries))
                }
                NodeSelectionStrategy::Balanced => {
                    Selection::Balanced(Balanced::new(entries, Arc::clone(&channel_name)))
                }
            }
        };

        Self {
            hosts,
            selection,
            channel_name,
        }
    }

    /// The gated channel of one host, by original index.
    pub(crate) fn host(&self, index: usize) -> Option<&Arc<dyn LimitedChannel>> {
        self.hosts.get(index)
    }

    /// Like [`LimitedChannel::maybe_execute`], also reporting which host
    /// accepted the dispatch.
    pub(crate) fn maybe_execute_indexed(
        &self,
        endpoint: &Endpoint,
        request: &Request,
    ) -> Option<(usize, ResponseFuture)> {
        // A redirect pinned this request to one specific host; the strategy
        // does not get a vote.
        if let Some(preferred) = request.preferred_host {
            let host = self.hosts.get(preferred)?;

            return host
                .maybe_execute(endpoint, request)
                .map(|future| (preferred, future));
        }

        match &self.selection {
            Selection::Empty => {
                tracing::debug!(channel = %self.channel_name, "no hosts configured");

                None
            }
            Selection::PinUntilError(pin) => pin.maybe_execute(endpoint, request),
            Selection::RoundRobin(round_robin) => round_robin.maybe_execute(endpoint, request),
            Selection::Balanced(balanced) => balanced.maybe_execute(endpoint, request),
        }
    }
}

impl LimitedChannel for NodeSelectionChannel {
    fn maybe_execute(&self, endpoint: &Endpoint, request: &Request) -> Option<ResponseFuture> {
        self.maybe_execute_indexed(endpoint, request)
            .map(|(_, future)| future)
    }
}
