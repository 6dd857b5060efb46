//! Metric catalog and emission helpers.
//!
//! Everything the engine observes about itself goes through the `metrics`
//! facade; installing a recorder is the embedder's business. Names and tags
//! are stable:
//!
//! | Name | Type | Tags |
//! |---|---|---|
//! | `switchboard.client.response` | histogram (seconds) | `channel-name`, `service-name`, `endpoint`, `status` (`success`\|`failure`) |
//! | `switchboard.client.response.leak` | counter | |
//! | `switchboard.client.requests.queued` | gauge | `channel-name` |
//! | `switchboard.client.request.queued.duration` | histogram (seconds) | `channel-name` |
//! | `switchboard.client.request.retry` | counter | `channel-name`, `reason` |
//! | `switchboard.client.limited` | counter | `channel-name`, `reason` |
//! | `switchboard.concurrencylimiter.max` | gauge | `channel-name`, `hostIndex` |
//! | `switchboard.concurrencylimiter.in_flight` | gauge | `channel-name`, `hostIndex` |
//! | `switchboard.concurrencylimiter.leak` | counter | |
//! | `switchboard.client.pinuntilerror.success` | counter | `channel-name`, `hostIndex` |
//! | `switchboard.client.pinuntilerror.next_node` | counter | `channel-name`, `reason` (`limited`\|`responseCode`\|`throwable`) |
//! | `switchboard.client.pinuntilerror.reshuffle` | counter | `channel-name` |
//! | `switchboard.client.balanced.score` | gauge | `channel-name`, `hostIndex` |
//! | `switchboard.client.nodeselection.strategy` | counter | `channel-name`, `strategy` |
//!
//! Retry reasons are `STATUS_429`, `STATUS_503`, `STATUS_308`, `STATUS_5XX`,
//! `IO_EXCEPTION`, `TIMEOUT` and `LIMITED`.

use ::metrics::{counter, decrement_gauge, gauge, histogram, increment_gauge};
use std::time::Duration;

/// Time to terminal outcome per request, as seen by the caller.
pub const CLIENT_RESPONSE: &str = "switchboard.client.response";

/// Responses dropped without being consumed or closed.
pub const RESPONSE_LEAK: &str = "switchboard.client.response.leak";

/// Requests currently parked in a channel's queue.
pub const REQUESTS_QUEUED: &str = "switchboard.client.requests.queued";

/// Time spent parked before the first downstream dispatch.
pub const QUEUED_DURATION: &str = "switchboard.client.request.queued.duration";

/// Attempts re-driven by the retry layer.
pub const REQUEST_RETRY: &str = "switchboard.client.request.retry";

/// Requests declined by a limited channel.
pub const LIMITED: &str = "switchboard.client.limited";

/// Current per-host concurrency ceiling.
pub const LIMITER_MAX: &str = "switchboard.concurrencylimiter.max";

/// Current per-host outstanding permits.
pub const LIMITER_IN_FLIGHT: &str = "switchboard.concurrencylimiter.in_flight";

/// Dispatches that stayed on the pinned host.
pub const PIN_SUCCESS: &str = "switchboard.client.pinuntilerror.success";

/// Pin movements, tagged with why the pin moved.
pub const PIN_NEXT_NODE: &str = "switchboard.client.pinuntilerror.next_node";

/// Host-order reshuffles.
pub const PIN_RESHUFFLE: &str = "switchboard.client.pinuntilerror.reshuffle";

/// Latest balanced score per host.
pub const BALANCED_SCORE: &str = "switchboard.client.balanced.score";

/// Node-selection strategy choices.
pub const STRATEGY: &str = "switchboard.client.nodeselection.strategy";

pub(crate) fn observe_response(
    channel_name: &str,
    service: &str,
    endpoint: &str,
    success: bool,
    elapsed: Duration,
) {
    histogram!(
        CLIENT_RESPONSE,
        elapsed.as_secs_f64(),
        "channel-name" => channel_name.to_owned(),
        "service-name" => service.to_owned(),
        "endpoint" => endpoint.to_owned(),
        "status" => if success { "success" } else { "failure" }
    );
}

pub(crate) fn mark_response_leaked() {
    counter!(RESPONSE_LEAK, 1);
}

pub(crate) fn mark_queued(channel_name: &str) {
    increment_gauge!(REQUESTS_QUEUED, 1.0, "channel-name" => channel_name.to_owned());
}

pub(crate) fn mark_dequeued(channel_name: &str) {
    decrement_gauge!(REQUESTS_QUEUED, 1.0, "channel-name" => channel_name.to_owned());
}

pub(crate) fn observe_queue_time(channel_name: &str, elapsed: Duration) {
    histogram!(
        QUEUED_DURATION,
        elapsed.as_secs_f64(),
        "channel-name" => channel_name.to_owned()
    );
}

pub(crate) fn mark_retry(channel_name: &str, reason: &'static str) {
    counter!(
        REQUEST_RETRY,
        1,
        "channel-name" => channel_name.to_owned(),
        "reason" => reason
    );
}

pub(crate) fn mark_limited(channel_name: &str, reason: &'static str) {
    counter!(
        LIMITED,
        1,
        "channel-name" => channel_name.to_owned(),
        "reason" => reason
    );
}

pub(crate) fn record_limiter(channel_name: &str, host_index: usize, limit: f64, in_flight: usize) {
    gauge!(
        LIMITER_MAX,
        limit,
        "channel-name" => channel_name.to_owned(),
        "hostIndex" => host_index.to_string()
    );

    #[allow(clippy::cast_precision_loss)]
    gauge!(
        LIMITER_IN_FLIGHT,
        in_flight as f64,
        "channel-name" => channel_name.to_owned(),
        "hostIndex" => host_index.to_string()
    );
}

pub(crate) fn mark_pin_success(channel_name: &str, host_index: usize) {
    counter!(
        PIN_SUCCESS,
        1,
        "channel-name" => channel_name.to_owned(),
        "hostIndex" => host_index.to_string()
    );
}

pub(crate) fn mark_next_node(channel_name: &str, reason: &'static str) {
    counter!(
        PIN_NEXT_NODE,
        1,
        "channel-name" => channel_name.to_owned(),
        "reason" => reason
    );
}

pub(crate) fn mark_reshuffle(channel_name: &str) {
    counter!(PIN_RESHUFFLE, 1, "channel-name" => channel_name.to_owned());
}

pub(crate) fn record_balanced_score(channel_name: &str, host_index: usize, score: f64) {
    gauge!(
        BALANCED_SCORE,
        score,
        "channel-name" => channel_name.to_owned(),
        "hostIndex" => host_index.to_string()
    );
}

pub(crate) fn mark_strategy(channel_name: &str, strategy: &'static str) {
    counter!(
        STRATEGY,
        1,
        "channel-name" => channel_name.to_owned(),
        "strategy" => strategy
    );
}
