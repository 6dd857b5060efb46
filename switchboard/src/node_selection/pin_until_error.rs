//! Pin to one host until it gives a reason to leave.

use super::HostEntry;
use crate::{
    channel::{LimitedChannel, Observed, Observer, ResponseFuture},
    endpoint::Endpoint,
    error::Error,
    metrics,
    request::Request,
    response::Response,
};
use rand::{seq::SliceRandom, Rng};
use std::{
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex,
    },
    time::{Duration, Instant},
};

/// Base interval between host-order reshuffles.
const RESHUFFLE_INTERVAL: Duration = Duration::from_secs(600);

/// Sticks with the host at `current` until a completed attempt reports
/// overload or failure, then moves the pin forward.
///
/// The host order is shuffled per instance so a fleet of clients with the
/// same configuration does not pile onto the same upstream, and (unless
/// disabled) reshuffled periodically so an unlucky ordering does not persist
/// forever.
#[derive(Debug)]
pub(super) struct PinUntilError {
    /// Hosts in this instance's shuffled order.
    hosts: Mutex<Vec<HostEntry>>,
    /// Position of the pinned host within the shuffled order.
    current: AtomicUsize,
    /// Next reshuffle deadline; `None` disables reshuffling.
    reshuffle_at: Option<Mutex<Instant>>,
    channel_name: Arc<str>,
}

impl PinUntilError {
    pub(super) fn new(mut hosts: Vec<HostEntry>, reshuffle: bool, channel_name: Arc<str>) -> Self {
        hosts.shuffle(&mut rand::thread_rng());

        Self {
            hosts: Mutex::new(hosts),
            current: AtomicUsize::new(0),
            reshuffle_at: reshuffle.then(|| Mutex::new(Instant::now() + jittered_interval())),
            channel_name,
        }
    }

    pub(super) fn maybe_execute(
        self: &Arc<Self>,
        endpoint: &Endpoint,
        request: &Request,
    ) -> Option<(usize, ResponseFuture)> {
        self.maybe_reshuffle();

        let hosts = self.hosts.lock().expect("host order poisoned").clone();
        let len = hosts.len();
        let pinned = self.current.load(Ordering::Acquire) % len;

        for offset in 0..len {
            let position = (pinned + offset) % len;
            let entry = &hosts[position];

            let Some(future) = entry.channel.maybe_execute(endpoint, request) else {
                continue;
            };

            if position != pinned {
                // We walked past at least one host that declined.
                self.advance(pinned, position, "limited");
            }

            let future = Observed::wrap(
                future,
                PinObserver {
                    pin: Arc::clone(self),
                    position,
                    host_index: entry.index,
                },
            );

            return Some((entry.index, future));
        }

        None
    }

    /// Move the pin from `from` to `to`. Lost races are fine: some other
    /// attempt already moved it.
    fn advance(&self, from: usize, to: usize, reason: &'static str) {
        if self
            .current
            .compare_exchange(from, to, Ordering::AcqRel, Ordering::Relaxed)
            .is_ok()
        {
            metrics::mark_next_node(&self.channel_name, reason);
            tracing::debug!(
                channel = %self.channel_name,
                from,
                to,
                reason,
                "moving pinned host"
            );
        }
    }

    fn maybe_reshuffle(&self) {
        let Some(reshuffle_at) = &self.reshuffle_at else {
            return;
        };

        let now = Instant::now();

        {
            let mut deadline = reshuffle_at.lock().expect("reshuffle clock poisoned");

            if now < *deadline {
                return;
            }

            *deadline = now + jittered_interval();
        }

        self.hosts
            .lock()
            .expect("host order poisoned")
            .shuffle(&mut rand::thread_rng());
        self.current.store(0, Ordering::Release);
        metrics::mark_reshuffle(&self.channel_name);
        tracing::debug!(channel = %self.channel_name, "reshuffled host order");
    }

    fn len(&self) -> usize {
        self.hosts.lock().expect("host order poisoned").len()
    }
}

/// Interval with enough jitter that clients started together drift apart.
fn jittered_interval() -> Duration {
    RESHUFFLE_INTERVAL + rand::thread_rng().gen_range(Duration::ZERO..RESHUFFLE_INTERVAL / 4)
}

/// Watches one dispatched attempt and moves the pin if the host misbehaved.
struct PinObserver {
    pin: Arc<PinUntilError>,
    position: usize,
    host_index: usize,
}

impl Observer for PinObserver {
    fn complete(self, result: &Result<Response, Error>) {
        let next = (self.position + 1) % self.pin.len();

        match result {
            Ok(response) => {
                let status = response.status().as_u16();

                if matches!(status, 308 | 429 | 503) || (500..=599).contains(&status) {
                    self.pin.advance(self.position, next, "responseCode");
                } else {
                    metrics::mark_pin_success(&self.pin.channel_name, self.host_index);
                }
            }
            Err(_) => {
                self.pin.advance(self.position, next, "throwable");
            }
        }
    }

    fn cancel(self) {}
}
