//! Permits for outstanding requests.
//!
//! A [`Permit`] is the token a [`ConcurrencyLimiter`] hands out for one
//! admitted request. It rides along with the in-flight request and comes back
//! exactly once, through [`release`], carrying the [`Outcome`] of the
//! request. The outcome is the only input the limit ever reacts to.
//!
//! Dropping a permit without releasing it is a bug in the calling code: the
//! limiter still recovers the slot (as if the outcome were
//! [`Outcome::Ignored`]) and emits the
//! `switchboard.concurrencylimiter.leak` counter.
//!
//! [`ConcurrencyLimiter`]: super::ConcurrencyLimiter
//! [`release`]: Permit::release

use super::Shared;
use std::sync::Arc;

/// How an admitted request ended, from the limiter's point of view.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Outcome {
    /// The host answered; it demonstrably had capacity for the request.
    Success,
    /// The host shed the request under load.
    Dropped,
    /// The request says nothing about the host's capacity.
    Ignored,
}

/// Token for one outstanding request against one host.
///
/// Consuming [`release`] makes double release unrepresentable; releasing is
/// infallible and never blocks beyond the limiter's internal mutex.
///
/// [`release`]: Self::release
#[derive(Debug)]
pub struct Permit {
    shared: Option<Arc<Shared>>,
}

impl Permit {
    pub(crate) fn new(shared: Arc<Shared>) -> Self {
        Self {
            shared: Some(shared),
        }
    }

    /// Return the permit with the outcome of the request it covered.
    pub fn release(mut self, outcome: Outcome) {
        if let Some(shared) = self.shared.take() {
            shared.release(outcome);
        }
    }
}

impl Drop for Permit {
    fn drop(&mut self) {
        if let Some(shared) = self.shared.take() {
            shared.release(Outcome::Ignored);
            metrics::counter!("switchboard.concurrencylimiter.leak", 1);
            tracing::warn!("permit dropped without release, treating outcome as ignored");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{Outcome, Permit};
    use crate::{ConcurrencyLimiter, LimitBehavior};
    use static_assertions::assert_impl_all;
    use std::fmt::Debug;

    assert_impl_all!(Permit: Debug, Send, Sync);
    assert_impl_all!(Outcome: Clone, Copy, Debug, Eq, Send, Sync);

    #[test]
    fn leaked_permit_recovers_the_slot_without_moving_the_limit() {
        let limiter = ConcurrencyLimiter::new(LimitBehavior::Host);
        let permit = limiter.acquire().expect("empty limiter");
        assert_eq!(1, limiter.in_flight());

        drop(permit);

        assert_eq!(0, limiter.in_flight());
        assert!((limiter.limit() - 20.0).abs() < 1e-9);
    }
}
