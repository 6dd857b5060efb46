//! The channel capabilities every pipeline stage speaks.
//!
//! A [`Channel`] always starts the request and owes the caller a completed
//! future. A [`LimitedChannel`] may instead decline with `None`, meaning
//! "limited, try elsewhere or queue". Every stage of the pipeline implements
//! one of the two and wraps the next.

use crate::{endpoint::Endpoint, error::Error, request::Request, response::Response};
use std::{
    fmt::Debug,
    future::Future,
    pin::Pin,
    sync::Arc,
    task::{Context, Poll},
};

/// Future resolving to the terminal result of one request attempt.
pub type ResponseFuture = Pin<Box<dyn Future<Output = Result<Response, Error>> + Send + 'static>>;

/// Execute a request and produce an eventual response.
///
/// Implementations must complete the returned future; a pending-forever
/// future wedges every layer above it.
pub trait Channel: Debug + Send + Sync {
    /// Start the request and return its completion.
    fn execute(&self, endpoint: &Endpoint, request: &Request) -> ResponseFuture;
}

/// Execute a request, or decline it.
///
/// `None` is a synchronous, cheap answer: nothing was started and the caller
/// should route the request elsewhere or queue it.
pub trait LimitedChannel: Debug + Send + Sync {
    /// Start the request if this channel is willing to take it right now.
    fn maybe_execute(&self, endpoint: &Endpoint, request: &Request) -> Option<ResponseFuture>;
}

impl<T: Channel + ?Sized> Channel for Arc<T> {
    fn execute(&self, endpoint: &Endpoint, request: &Request) -> ResponseFuture {
        (**self).execute(endpoint, request)
    }
}

impl<T: LimitedChannel + ?Sized> LimitedChannel for Arc<T> {
    fn maybe_execute(&self, endpoint: &Endpoint, request: &Request) -> Option<ResponseFuture> {
        (**self).maybe_execute(endpoint, request)
    }
}

/// Hook into the terminal state of a dispatched request.
///
/// Exactly one of the two methods runs, exactly once: [`complete`] when the
/// future resolves, [`cancel`] when it is dropped first. Wrappers use this to
/// release permits and feed outcome trackers on every exit path.
///
/// [`cancel`]: Self::cancel
/// [`complete`]: Self::complete
pub(crate) trait Observer: Send + 'static {
    /// The dispatched request resolved.
    fn complete(self, result: &Result<Response, Error>);

    /// The dispatched request was dropped before resolving.
    fn cancel(self);
}

/// A dispatched response future with an [`Observer`] attached.
pub(crate) struct Observed<O: Observer> {
    inner: ResponseFuture,
    observer: Option<O>,
}

impl<O: Observer + Unpin> Observed<O> {
    pub(crate) fn wrap(inner: ResponseFuture, observer: O) -> ResponseFuture {
        Box::pin(Self {
            inner,
            observer: Some(observer),
        })
    }
}

impl<O: Observer + Unpin> Future for Observed<O> {
    type Output = Result<Response, Error>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();

        match Pin::new(&mut this.inner).poll(cx) {
            Poll::Ready(result) => {
                if let Some(observer) = this.observer.take() {
                    observer.complete(&result);
                }

                Poll::Ready(result)
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

impl<O: Observer> Drop for Observed<O> {
    fn drop(&mut self) {
        if let Some(observer) = self.observer.take() {
            observer.cancel();
        }
    }
}
