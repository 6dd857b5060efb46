#![deny(
    clippy::all,
    clippy::missing_const_for_fn,
    clippy::pedantic,
    future_incompatible,
    nonstandard_style,
    rust_2018_idioms,
    rustdoc::broken_intra_doc_links,
    unsafe_code
)]
#![doc = include_str!("../README.md")]
#![allow(clippy::module_name_repetitions, clippy::must_use_candidate)]

pub mod permit;

pub use self::permit::{Outcome, Permit};

use http::StatusCode;
use std::sync::{Arc, Mutex};

/// Concurrency ceiling granted to a host that has not proven anything yet.
const INITIAL_LIMIT: f64 = 20.0;

/// Floor the limit may collapse to under sustained overload.
const MIN_LIMIT: f64 = 1.0;

/// Ceiling the limit may grow to, no matter how healthy the host looks.
const MAX_LIMIT: f64 = 1000.0;

/// Multiplicative decrease applied when a request observes overload.
const BACKOFF: f64 = 0.9;

/// What a limiter is protecting.
///
/// The variant decides how completed requests feed back into the limit. Both
/// variants currently share their constants and classification; the variant
/// is the seam where per-endpoint accounting diverges from per-host
/// accounting.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[non_exhaustive]
pub enum LimitBehavior {
    /// Bound the total concurrency against one upstream host.
    Host,
    /// Bound the concurrency of a single endpoint.
    Endpoint,
}

impl LimitBehavior {
    /// Limit assigned to a freshly created limiter.
    pub const fn initial_limit(self) -> f64 {
        INITIAL_LIMIT
    }

    /// Lowest value the limit may take.
    pub const fn min_limit(self) -> f64 {
        MIN_LIMIT
    }

    /// Highest value the limit may take.
    pub const fn max_limit(self) -> f64 {
        MAX_LIMIT
    }

    /// Classify a response status into the outcome fed back on release.
    ///
    /// Explicit backpressure (429, 503) and permanent redirects (308, the
    /// server shedding the request to a peer) count as drops. Other server
    /// errors say nothing about capacity and are ignored. Everything else,
    /// including client errors, proves the host had room to answer.
    pub fn classify_status(self, status: StatusCode) -> Outcome {
        match status.as_u16() {
            308 | 429 | 503 => Outcome::Dropped,
            500..=599 => Outcome::Ignored,
            _ => Outcome::Success,
        }
    }
}

/// Per-host adaptive admission gate.
///
/// [`acquire`] admits a request while the number of outstanding permits sits
/// below the current limit, and declines otherwise; it never blocks. The
/// limit moves only when permits are released: additive increase of
/// `1 / limit` per success, multiplicative backoff of `0.9` per drop.
///
/// Cloning is cheap and clones share state.
///
/// [`acquire`]: Self::acquire
#[derive(Clone, Debug)]
pub struct ConcurrencyLimiter {
    shared: Arc<Shared>,
}

impl ConcurrencyLimiter {
    /// Create a limiter with the initial limit of the given behavior.
    pub fn new(behavior: LimitBehavior) -> Self {
        Self {
            shared: Arc::new(Shared {
                behavior,
                state: Mutex::new(LimitState {
                    limit: behavior.initial_limit(),
                    in_flight: 0,
                }),
            }),
        }
    }

    /// Try to admit one request.
    ///
    /// Returns a [`Permit`] that must be released with the outcome of the
    /// request, or `None` if the host is already at its limit.
    pub fn acquire(&self) -> Option<Permit> {
        let mut state = self.shared.state.lock().expect("limiter state poisoned");

        // The floor of a limit in (0, 1] still admits one request.
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let ceiling = (state.limit.floor() as usize).max(1);

        if state.in_flight < ceiling {
            state.in_flight += 1;
            drop(state);

            Some(Permit::new(Arc::clone(&self.shared)))
        } else {
            None
        }
    }

    /// The behavior this limiter was created with.
    pub fn behavior(&self) -> LimitBehavior {
        self.shared.behavior
    }

    /// Current concurrency ceiling.
    pub fn limit(&self) -> f64 {
        self.shared.state.lock().expect("limiter state poisoned").limit
    }

    /// Number of outstanding permits.
    pub fn in_flight(&self) -> usize {
        self.shared
            .state
            .lock()
            .expect("limiter state poisoned")
            .in_flight
    }
}

/// State shared between a limiter and its outstanding permits.
#[derive(Debug)]
pub(crate) struct Shared {
    behavior: LimitBehavior,
    state: Mutex<LimitState>,
}

impl Shared {
    /// Apply one release. Called exactly once per permit.
    pub(crate) fn release(&self, outcome: Outcome) {
        let mut state = self.state.lock().expect("limiter state poisoned");

        match outcome {
            Outcome::Success => {
                state.limit = (state.limit + state.limit.recip()).min(self.behavior.max_limit());
            }
            Outcome::Dropped => {
                state.limit = (state.limit * BACKOFF).max(self.behavior.min_limit());
            }
            Outcome::Ignored => {}
        }

        state.in_flight -= 1;
    }
}

#[derive(Debug)]
struct LimitState {
    limit: f64,
    in_flight: usize,
}
