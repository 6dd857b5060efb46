//! Retrying completed requests per policy.

use crate::{
    channel::{Channel, LimitedChannel, ResponseFuture},
    endpoint::Endpoint,
    error::{Error, ErrorType},
    metrics,
    request::Request,
    response::Response,
};
use http::{header, StatusCode, Uri};
use rand::Rng;
use std::{sync::Arc, time::Duration};

const REASON_429: &str = "STATUS_429";
const REASON_503: &str = "STATUS_503";
const REASON_308: &str = "STATUS_308";
const REASON_5XX: &str = "STATUS_5XX";
const REASON_IO: &str = "IO_EXCEPTION";
const REASON_TIMEOUT: &str = "TIMEOUT";
const REASON_LIMITED: &str = "LIMITED";

/// Whether explicit server backpressure is retried or handed to the caller.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
#[non_exhaustive]
pub enum ServerQos {
    /// Absorb 429 and 503 answers by waiting and retrying.
    #[default]
    AutomaticRetry,
    /// Surface 429 and 503 answers to the caller untouched.
    Propagate429And503ToCaller,
}

/// Whether timed-out attempts are retried.
///
/// Retrying timeouts is only safe when the request is known not to have
/// reached the server, which the engine cannot prove; hence off by default.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
#[non_exhaustive]
pub enum RetryOnTimeout {
    /// Surface timeouts to the caller.
    #[default]
    Disabled,
    /// Treat timeouts like transport failures and retry them.
    Enabled,
}

/// Everything the retry layer needs to know, in one value.
#[derive(Clone, Copy, Debug)]
pub struct RetryPolicy {
    /// Retry budget per request. Redirects do not consume it.
    pub max_num_retries: u32,
    /// Base slot of the exponential backoff.
    pub backoff_slot_size: Duration,
    /// Handling of explicit server backpressure.
    pub server_qos: ServerQos,
    /// Handling of timed-out attempts.
    pub retry_on_timeout: RetryOnTimeout,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_num_retries: 4,
            backoff_slot_size: Duration::from_millis(250),
            server_qos: ServerQos::default(),
            retry_on_timeout: RetryOnTimeout::default(),
        }
    }
}

/// Observes completed attempts and re-drives them per [`RetryPolicy`].
///
/// First attempts flow through the queued pipeline; retries bypass the queue
/// and go straight to node selection. A 308 with a `Location` naming a
/// configured host is replayed immediately against that host and does not
/// consume the retry budget. The caller only ever observes the final
/// outcome; superseded responses are closed here.
#[derive(Clone, Debug)]
pub struct RetryingChannel {
    /// Queued pipeline carrying first attempts.
    inner: Arc<dyn Channel>,
    /// Queue-bypassing path carrying retries.
    direct: Arc<dyn Channel>,
    /// Base URI per host, for resolving redirect targets.
    host_uris: Arc<[String]>,
    policy: RetryPolicy,
    channel_name: Arc<str>,
}

impl RetryingChannel {
    /// Create a retry layer over the queued pipeline and its direct twin.
    pub fn new(
        inner: Arc<dyn Channel>,
        direct: Arc<dyn Channel>,
        host_uris: Arc<[String]>,
        policy: RetryPolicy,
        channel_name: Arc<str>,
    ) -> Self {
        Self {
            inner,
            direct,
            host_uris,
            policy,
            channel_name,
        }
    }

    async fn run(self, endpoint: Endpoint, mut request: Request) -> Result<Response, Error> {
        let mut attempt: u32 = 0;
        let mut first_attempt = true;

        loop {
            let result = if first_attempt {
                self.inner.execute(&endpoint, &request).await
            } else {
                self.direct.execute(&endpoint, &request).await
            };
            first_attempt = false;

            match self.plan(&endpoint, result, attempt) {
                Plan::Done(result) => return result,
                Plan::Retry { reason, backoff } => {
                    attempt += 1;
                    metrics::mark_retry(&self.channel_name, reason);
                    tracing::debug!(
                        channel = %self.channel_name,
                        endpoint = endpoint.name(),
                        reason,
                        attempt,
                        backoff = ?backoff,
                        "retrying request"
                    );

                    if !backoff.is_zero() {
                        tokio::time::sleep(backoff).await;
                    }
                }
                Plan::Redirect { host } => {
                    metrics::mark_retry(&self.channel_name, REASON_308);
                    tracing::debug!(
                        channel = %self.channel_name,
                        endpoint = endpoint.name(),
                        host,
                        "following permanent redirect"
                    );
                    request = request.with_preferred_host(host);
                }
            }
        }
    }

    /// Decide what happens after one completed attempt.
    ///
    /// Every path that retries closes the superseded response first.
    fn plan(&self, endpoint: &Endpoint, result: Result<Response, Error>, attempt: u32) -> Plan {
        let budget_left = attempt < self.policy.max_num_retries;

        match result {
            Ok(response) => {
                let status = response.status();

                if status == StatusCode::TOO_MANY_REQUESTS
                    || status == StatusCode::SERVICE_UNAVAILABLE
                {
                    if self.policy.server_qos == ServerQos::Propagate429And503ToCaller
                        || !budget_left
                    {
                        return Plan::Done(Ok(response));
                    }

                    let backoff = retry_after(&response).unwrap_or_else(|| self.backoff(attempt));
                    let reason = if status == StatusCode::TOO_MANY_REQUESTS {
                        REASON_429
                    } else {
                        REASON_503
                    };
                    response.close();

                    return Plan::Retry { reason, backoff };
                }

                if status == StatusCode::PERMANENT_REDIRECT {
                    if let Some(host) = resolve_redirect(&self.host_uris, &response) {
                        response.close();

                        return Plan::Redirect { host };
                    }

                    // A redirect we cannot map to a host is the caller's
                    // problem to interpret.
                    return Plan::Done(Ok(response));
                }

                if status.is_server_error() && endpoint.is_idempotent() && budget_left {
                    let backoff = self.backoff(attempt);
                    response.close();

                    return Plan::Retry {
                        reason: REASON_5XX,
                        backoff,
                    };
                }

                Plan::Done(Ok(response))
            }
            Err(error) => {
                let reason = match error.kind() {
                    ErrorType::ConnectionReset | ErrorType::Io => Some(REASON_IO),
                    ErrorType::Limited => Some(REASON_LIMITED),
                    ErrorType::RequestTimedOut
                        if self.policy.retry_on_timeout == RetryOnTimeout::Enabled =>
                    {
                        Some(REASON_TIMEOUT)
                    }
                    _ => None,
                };

                match reason {
                    Some(reason) if budget_left => Plan::Retry {
                        reason,
                        backoff: self.backoff(attempt),
                    },
                    _ => Plan::Done(Err(error)),
                }
            }
        }
    }

    /// Uniform draw from `[0, 2^attempt * slot)`.
    fn backoff(&self, attempt: u32) -> Duration {
        let upper = self
            .policy
            .backoff_slot_size
            .saturating_mul(2_u32.saturating_pow(attempt));
        let upper_nanos = u64::try_from(upper.as_nanos()).unwrap_or(u64::MAX);

        if upper_nanos == 0 {
            return Duration::ZERO;
        }

        Duration::from_nanos(rand::thread_rng().gen_range(0..upper_nanos))
    }
}

impl Channel for RetryingChannel {
    fn execute(&self, endpoint: &Endpoint, request: &Request) -> ResponseFuture {
        let this = self.clone();
        let endpoint = endpoint.clone();
        let request = request.clone();

        Box::pin(this.run(endpoint, request))
    }
}

enum Plan {
    Done(Result<Response, Error>),
    Retry {
        reason: &'static str,
        backoff: Duration,
    },
    Redirect {
        host: usize,
    },
}

/// Server-specified wait before the next attempt, if any.
fn retry_after(response: &Response) -> Option<Duration> {
    let value = response.headers().get(header::RETRY_AFTER)?;
    let seconds = value.to_str().ok()?.trim().parse::<u64>().ok()?;

    Some(Duration::from_secs(seconds))
}

/// Map a redirect's `Location` to the configured host with that authority.
fn resolve_redirect(host_uris: &[String], response: &Response) -> Option<usize> {
    let location = response.headers().get(header::LOCATION)?.to_str().ok()?;
    let target = location.parse::<Uri>().ok()?;
    let authority = target.authority()?.clone();

    host_uris.iter().position(|uri| {
        uri.parse::<Uri>()
            .ok()
            .and_then(|uri| uri.authority().cloned())
            .map_or(false, |candidate| candidate == authority)
    })
}

/// Hands retries straight to node selection, skipping the queue.
///
/// Finding every host limited on this path is a failure, not a reason to
/// queue: the retry layer treats it as a drop and backs off, so retry bursts
/// cannot sidestep backpressure.
#[derive(Debug)]
pub(crate) struct DirectChannel {
    inner: Arc<dyn LimitedChannel>,
}

impl DirectChannel {
    pub(crate) fn new(inner: Arc<dyn LimitedChannel>) -> Self {
        Self { inner }
    }
}

impl Channel for DirectChannel {
    fn execute(&self, endpoint: &Endpoint, request: &Request) -> ResponseFuture {
        match self.inner.maybe_execute(endpoint, request) {
            Some(future) => future,
            None => Box::pin(std::future::ready(Err(Error::limited()))),
        }
    }
}
