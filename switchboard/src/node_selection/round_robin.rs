//! Rotate the starting host on every dispatch.

use super::HostEntry;
use crate::{
    channel::{LimitedChannel, ResponseFuture},
    endpoint::Endpoint,
    request::Request,
};
use std::sync::atomic::{AtomicUsize, Ordering};

/// Spreads dispatches evenly: each call starts one host past where the
/// previous call started and walks forward past refusals. Declines only
/// after a full revolution of refusals.
#[derive(Debug)]
pub(super) struct RoundRobin {
    hosts: Vec<HostEntry>,
    offset: AtomicUsize,
}

impl RoundRobin {
    pub(super) fn new(hosts: Vec<HostEntry>) -> Self {
        Self {
            hosts,
            offset: AtomicUsize::new(0),
        }
    }

    pub(super) fn maybe_execute(
        &self,
        endpoint: &Endpoint,
        request: &Request,
    ) -> Option<(usize, ResponseFuture)> {
        let len = self.hosts.len();
        let start = self.offset.fetch_add(1, Ordering::Relaxed);

        for offset in 0..len {
            let entry = &self.hosts[(start + offset) % len];

            if let Some(future) = entry.channel.maybe_execute(endpoint, request) {
                return Some((entry.index, future));
            }
        }

        None
    }
}
