//! Bounded request queue absorbing "limited" responses.
//!
//! [`QueuedChannel`] turns a [`LimitedChannel`] back into a [`Channel`]: a
//! request the delegate declines is parked as a deferred call and re-driven
//! by [`schedule`] every time a dispatched request completes. Ordering is
//! FIFO subject to the delegate's readiness; a refused head goes back to the
//! front of the queue and draining stops until the next completion.
//!
//! [`schedule`]: QueueState::schedule

pub mod sticky;

pub use self::sticky::StickyQueueChannel;

use crate::{
    channel::{Channel, LimitedChannel, ResponseFuture},
    endpoint::Endpoint,
    error::Error,
    metrics,
    request::Request,
    response::Response,
};
use std::{
    collections::VecDeque,
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Arc, Mutex,
    },
    time::{Duration, Instant},
};
use tokio::sync::oneshot;

/// Queue bound applied when the embedder does not pick one.
pub const DEFAULT_MAX_QUEUE_SIZE: usize = 100_000;

/// Bounded FIFO in front of a [`LimitedChannel`].
///
/// Dispatched requests are driven by spawned tasks, so the channel must be
/// used from within a tokio runtime. Cloning is cheap and clones share the
/// queue.
#[derive(Clone, Debug)]
pub struct QueuedChannel {
    state: Arc<QueueState>,
}

impl QueuedChannel {
    /// Create a queue with the given bound in front of `delegate`.
    pub fn new(
        delegate: Arc<dyn LimitedChannel>,
        channel_name: Arc<str>,
        max_queue_size: usize,
    ) -> Self {
        Self {
            state: Arc::new(QueueState {
                delegate,
                deque: Mutex::new(VecDeque::new()),
                size_estimate: AtomicUsize::new(0),
                max_queue_size,
                record_queue_metrics: AtomicBool::new(false),
                channel_name,
            }),
        }
    }

    /// Number of requests currently parked in the queue.
    pub fn len(&self) -> usize {
        self.state.size_estimate.load(Ordering::Relaxed)
    }

    /// Whether the queue is currently empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Channel for QueuedChannel {
    fn execute(&self, endpoint: &Endpoint, request: &Request) -> ResponseFuture {
        self.state.execute(endpoint, request)
    }
}

/// One parked request.
#[derive(Debug)]
struct DeferredCall {
    endpoint: Endpoint,
    request: Request,
    promise: oneshot::Sender<Result<Response, Error>>,
    enqueued_at: Instant,
    span: tracing::Span,
}

#[derive(Debug)]
struct QueueState {
    delegate: Arc<dyn LimitedChannel>,
    deque: Mutex<VecDeque<DeferredCall>>,
    size_estimate: AtomicUsize,
    max_queue_size: usize,
    /// Flipped true on the first enqueue so endpoints that never queue do not
    /// report a stream of zero timings. Read without synchronization on the
    /// fast path; the race may skip or extra-record a single observation.
    record_queue_metrics: AtomicBool,
    channel_name: Arc<str>,
}

impl QueueState {
    fn execute(self: &Arc<Self>, endpoint: &Endpoint, request: &Request) -> ResponseFuture {
        // Optimistic path: nothing is parked, ask the delegate directly.
        if self.size_estimate.load(Ordering::Relaxed) == 0 {
            if let Some(future) = self.delegate.maybe_execute(endpoint, request) {
                if self.record_queue_metrics.load(Ordering::Relaxed) {
                    metrics::observe_queue_time(&self.channel_name, Duration::ZERO);
                }

                return self.attach(future);
            }
        }

        // The size may have grown past the bound while we were optimistic.
        if self.size_estimate.load(Ordering::Relaxed) >= self.max_queue_size {
            tracing::debug!(
                channel = %self.channel_name,
                endpoint = endpoint.name(),
                "rejecting request, queue is full"
            );

            return Box::pin(std::future::ready(Err(Error::queue_full())));
        }

        self.record_queue_metrics.store(true, Ordering::Relaxed);

        let (promise, receiver) = oneshot::channel();
        let span = tracing::debug_span!(
            "switchboard.queued",
            channel = %self.channel_name,
            endpoint = endpoint.name(),
        );
        let call = DeferredCall {
            endpoint: endpoint.clone(),
            request: request.clone(),
            promise,
            enqueued_at: Instant::now(),
            span,
        };

        self.deque.lock().expect("queue poisoned").push_back(call);
        self.size_estimate.fetch_add(1, Ordering::Relaxed);
        metrics::mark_queued(&self.channel_name);

        self.schedule();

        Box::pin(async move {
            match receiver.await {
                Ok(result) => result,
                Err(_) => Err(Error::internal("queued request dropped without a result")),
            }
        })
    }

    /// Drain as many parked calls as the delegate will take.
    ///
    /// Runs on caller tasks and on completion tasks concurrently; every queue
    /// operation and every `maybe_execute` is individually atomic, so
    /// interleaved drains are safe. Stops at the first refusal, putting the
    /// refused head back at the front.
    fn schedule(self: &Arc<Self>) {
        loop {
            let call = self.deque.lock().expect("queue poisoned").pop_front();
            let Some(call) = call else {
                return;
            };

            if call.promise.is_closed() {
                // Cancelled while parked; account for it and move on.
                self.finish_dequeue(&call);
                continue;
            }

            match self.delegate.maybe_execute(&call.endpoint, &call.request) {
                Some(future) => {
                    self.finish_dequeue(&call);
                    self.spawn_forward(future, call.promise);
                }
                None => {
                    self.deque.lock().expect("queue poisoned").push_front(call);

                    return;
                }
            }
        }
    }

    /// Bookkeeping for a call leaving the queue, dispatched or cancelled.
    fn finish_dequeue(&self, call: &DeferredCall) {
        self.size_estimate.fetch_sub(1, Ordering::Relaxed);
        metrics::mark_dequeued(&self.channel_name);
        metrics::observe_queue_time(&self.channel_name, call.enqueued_at.elapsed());
        call.span.in_scope(|| {
            tracing::debug!(
                queued_for = ?call.enqueued_at.elapsed(),
                cancelled = call.promise.is_closed(),
                "request left the queue"
            );
        });
    }

    /// Hand a dispatched future to the caller through a fresh promise.
    fn attach(self: &Arc<Self>, future: ResponseFuture) -> ResponseFuture {
        let (promise, receiver) = oneshot::channel();
        self.spawn_forward(future, promise);

        Box::pin(async move {
            match receiver.await {
                Ok(result) => result,
                Err(_) => Err(Error::internal("dispatched request dropped its result")),
            }
        })
    }

    /// Drive a dispatched future to completion and re-drive the queue.
    ///
    /// The spawned task is the completion listener: it forwards the result,
    /// closes the body if the promise is already gone, propagates
    /// cancellation by dropping the downstream future, and always finishes
    /// with exactly one `schedule` pass.
    fn spawn_forward(
        self: &Arc<Self>,
        future: ResponseFuture,
        promise: oneshot::Sender<Result<Response, Error>>,
    ) {
        let state = Arc::clone(self);

        tokio::spawn(async move {
            state.forward(future, promise).await;
            state.schedule();
        });
    }

    async fn forward(
        &self,
        mut future: ResponseFuture,
        mut promise: oneshot::Sender<Result<Response, Error>>,
    ) {
        let result = tokio::select! {
            result = &mut future => Some(result),
            () = promise.closed() => None,
        };

        // A `None` means the caller went away first; dropping `future` is
        // what cancels the downstream request.
        let Some(result) = result else {
            return;
        };

        if let Err(rejected) = promise.send(result) {
            if let Ok(response) = rejected {
                response.close();
            }
        }
    }
}
