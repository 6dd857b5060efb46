//! Prefer the host with the least work and the cleanest recent history.

use super::HostEntry;
use crate::{
    channel::{LimitedChannel, Observed, Observer, ResponseFuture},
    endpoint::Endpoint,
    error::Error,
    metrics,
    request::Request,
    response::Response,
};
use rand::Rng;
use std::{
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex,
    },
    time::{Duration, Instant},
};

/// Wall-clock half-life of the success and failure reservoirs.
const HALF_LIFE: Duration = Duration::from_secs(30);

/// Weight of an explicit backpressure answer. Large enough to push a host to
/// the back of the order for a while; the reservoir decay bounds the while.
const QOS_FAILURE_WEIGHT: f64 = 10.0;

/// Weight of other failures.
const FAILURE_WEIGHT: f64 = 1.0;

/// Upper bound of the per-dispatch tie-break noise.
const TIE_BREAK_NOISE: f64 = 0.01;

/// Scores every host per dispatch and tries them in ascending score order.
///
/// The score is `in_flight + failures - successes`, clamped at zero, where
/// the failure and success reservoirs decay with a 30 second half-life. An
/// idle host with a clean history scores 0.
#[derive(Debug)]
pub(super) struct Balanced {
    hosts: Vec<BalancedHost>,
    channel_name: Arc<str>,
}

#[derive(Debug)]
struct BalancedHost {
    index: usize,
    channel: Arc<dyn LimitedChannel>,
    tracker: Arc<ScoreTracker>,
}

impl Balanced {
    pub(super) fn new(hosts: Vec<HostEntry>, channel_name: Arc<str>) -> Self {
        let now = Instant::now();

        Self {
            hosts: hosts
                .into_iter()
                .map(|entry| BalancedHost {
                    index: entry.index,
                    channel: entry.channel,
                    tracker: Arc::new(ScoreTracker::new(now)),
                })
                .collect(),
            channel_name,
        }
    }

    pub(super) fn maybe_execute(
        &self,
        endpoint: &Endpoint,
        request: &Request,
    ) -> Option<(usize, ResponseFuture)> {
        let now = Instant::now();
        let mut rng = rand::thread_rng();

        let mut ranked: Vec<(f64, usize)> = self
            .hosts
            .iter()
            .enumerate()
            .map(|(position, host)| {
                let score = host.tracker.score(now) + rng.gen_range(0.0..TIE_BREAK_NOISE);
                metrics::record_balanced_score(&self.channel_name, host.index, score);

                (score, position)
            })
            .collect();
        ranked.sort_by(|left, right| left.0.total_cmp(&right.0));

        for (_, position) in ranked {
            let host = &self.hosts[position];

            if let Some(future) = host.channel.maybe_execute(endpoint, request) {
                host.tracker.in_flight.fetch_add(1, Ordering::Relaxed);

                let future = Observed::wrap(
                    future,
                    BalancedObserver {
                        tracker: Arc::clone(&host.tracker),
                    },
                );

                return Some((host.index, future));
            }
        }

        None
    }
}

/// Per-host signal the score is computed from.
#[derive(Debug)]
struct ScoreTracker {
    in_flight: AtomicUsize,
    failures: Mutex<DecayingReservoir>,
    successes: Mutex<DecayingReservoir>,
}

impl ScoreTracker {
    fn new(now: Instant) -> Self {
        Self {
            in_flight: AtomicUsize::new(0),
            failures: Mutex::new(DecayingReservoir::new(now)),
            successes: Mutex::new(DecayingReservoir::new(now)),
        }
    }

    fn score(&self, now: Instant) -> f64 {
        let failures = self.failures.lock().expect("reservoir poisoned").value(now);
        let successes = self
            .successes
            .lock()
            .expect("reservoir poisoned")
            .value(now);

        #[allow(clippy::cast_precision_loss)]
        let in_flight = self.in_flight.load(Ordering::Relaxed) as f64;

        (in_flight + failures - successes).max(0.0)
    }

    fn record_success(&self, now: Instant) {
        self.successes
            .lock()
            .expect("reservoir poisoned")
            .add(1.0, now);
    }

    fn record_failure(&self, weight: f64, now: Instant) {
        self.failures
            .lock()
            .expect("reservoir poisoned")
            .add(weight, now);
    }
}

/// A value that halves every [`HALF_LIFE`] of wall-clock time.
#[derive(Debug)]
struct DecayingReservoir {
    value: f64,
    updated_at: Instant,
}

impl DecayingReservoir {
    const fn new(now: Instant) -> Self {
        Self {
            value: 0.0,
            updated_at: now,
        }
    }

    fn value(&self, now: Instant) -> f64 {
        let elapsed = now.saturating_duration_since(self.updated_at);

        if elapsed.is_zero() {
            return self.value;
        }

        self.value * 0.5_f64.powf(elapsed.as_secs_f64() / HALF_LIFE.as_secs_f64())
    }

    fn add(&mut self, amount: f64, now: Instant) {
        self.value = self.value(now) + amount;
        self.updated_at = now;
    }
}

/// Feeds the outcome of one dispatched attempt back into its host's tracker.
struct BalancedObserver {
    tracker: Arc<ScoreTracker>,
}

impl Observer for BalancedObserver {
    fn complete(self, result: &Result<Response, Error>) {
        self.tracker.in_flight.fetch_sub(1, Ordering::Relaxed);
        let now = Instant::now();

        match result {
            Ok(response) => match response.status().as_u16() {
                429 | 503 => self.tracker.record_failure(QOS_FAILURE_WEIGHT, now),
                500..=599 => self.tracker.record_failure(FAILURE_WEIGHT, now),
                _ => self.tracker.record_success(now),
            },
            Err(_) => self.tracker.record_failure(FAILURE_WEIGHT, now),
        }
    }

    fn cancel(self) {
        self.tracker.in_flight.fetch_sub(1, Ordering::Relaxed);
    }
}
