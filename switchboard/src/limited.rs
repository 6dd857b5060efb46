//! Per-host concurrency gating.

use crate::{
    channel::{Channel, LimitedChannel, Observed, Observer, ResponseFuture},
    endpoint::Endpoint,
    error::{Error, ErrorType},
    metrics,
    request::Request,
    response::Response,
};
use std::sync::Arc;
use switchboard_limiting::{ConcurrencyLimiter, Outcome, Permit};

/// Reason tag recorded when this channel declines a request.
const LIMITED_REASON: &str = "ConcurrencyLimitedChannel";

/// Gates one host's [`Channel`] behind an adaptive concurrency limiter.
///
/// A request is only started once a [`Permit`] is acquired. The permit is
/// owned by the returned future and released exactly once: with the
/// classified outcome when the response completes, or with
/// [`Outcome::Ignored`] when the caller drops the future mid-flight. Failures
/// are ordinary `Err` values, so there is no path on which the permit
/// escapes.
#[derive(Debug)]
pub struct ConcurrencyLimitedChannel {
    inner: Arc<dyn Channel>,
    limiter: ConcurrencyLimiter,
    host_index: usize,
    channel_name: Arc<str>,
}

impl ConcurrencyLimitedChannel {
    /// Wrap a host channel with a limiter.
    pub fn new(
        inner: Arc<dyn Channel>,
        limiter: ConcurrencyLimiter,
        host_index: usize,
        channel_name: Arc<str>,
    ) -> Self {
        Self {
            inner,
            limiter,
            host_index,
            channel_name,
        }
    }

    /// The limiter gating this host. Exposed for gauge scraping and tests.
    pub const fn limiter(&self) -> &ConcurrencyLimiter {
        &self.limiter
    }

    fn record_gauges(&self) {
        metrics::record_limiter(
            &self.channel_name,
            self.host_index,
            self.limiter.limit(),
            self.limiter.in_flight(),
        );
    }
}

impl LimitedChannel for ConcurrencyLimitedChannel {
    fn maybe_execute(&self, endpoint: &Endpoint, request: &Request) -> Option<ResponseFuture> {
        let Some(permit) = self.limiter.acquire() else {
            metrics::mark_limited(&self.channel_name, LIMITED_REASON);
            tracing::debug!(
                channel = %self.channel_name,
                host = self.host_index,
                endpoint = endpoint.name(),
                "declining request, host is at its concurrency limit"
            );

            return None;
        };

        self.record_gauges();

        let inner = self.inner.execute(endpoint, request);

        Some(Observed::wrap(
            inner,
            PermitObserver {
                permit,
                limiter: self.limiter.clone(),
                host_index: self.host_index,
                channel_name: Arc::clone(&self.channel_name),
            },
        ))
    }
}

/// Releases the permit on whichever exit path the request takes.
struct PermitObserver {
    permit: Permit,
    limiter: ConcurrencyLimiter,
    host_index: usize,
    channel_name: Arc<str>,
}

impl PermitObserver {
    fn release(self, outcome: Outcome) {
        self.permit.release(outcome);
        metrics::record_limiter(
            &self.channel_name,
            self.host_index,
            self.limiter.limit(),
            self.limiter.in_flight(),
        );
    }
}

impl Observer for PermitObserver {
    fn complete(self, result: &Result<Response, Error>) {
        let outcome = match result {
            Ok(response) => self.limiter.behavior().classify_status(response.status()),
            Err(error) => classify_error(error.kind()),
        };

        self.release(outcome);
    }

    fn cancel(self) {
        self.release(Outcome::Ignored);
    }
}

/// Transport failures count as drops; everything else says nothing about the
/// host's capacity.
fn classify_error(kind: &ErrorType) -> Outcome {
    match kind {
        ErrorType::ConnectionReset | ErrorType::Io | ErrorType::RequestTimedOut => Outcome::Dropped,
        _ => Outcome::Ignored,
    }
}

/// Admits everything.
///
/// Stands in for [`ConcurrencyLimitedChannel`] when sympathetic client-side
/// limiting has been explicitly disabled.
#[derive(Debug)]
pub struct UngatedChannel {
    inner: Arc<dyn Channel>,
}

impl UngatedChannel {
    /// Wrap a host channel without any admission gate.
    pub fn new(inner: Arc<dyn Channel>) -> Self {
        Self { inner }
    }
}

impl LimitedChannel for UngatedChannel {
    fn maybe_execute(&self, endpoint: &Endpoint, request: &Request) -> Option<ResponseFuture> {
        Some(self.inner.execute(endpoint, request))
    }
}
