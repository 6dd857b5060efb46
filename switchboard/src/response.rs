//! Response values and their close-once body.

use crate::metrics;
use bytes::Bytes;
use http::{HeaderMap, StatusCode};

/// A response whose body must be released exactly once.
///
/// [`into_body`] and [`close`] both consume the response, so releasing twice
/// is unrepresentable. A response dropped without either is a leak: the body
/// is still released, but the `switchboard.client.response.leak` counter is
/// marked so the omission is visible.
///
/// [`close`]: Self::close
/// [`into_body`]: Self::into_body
#[derive(Debug)]
pub struct Response {
    status: StatusCode,
    headers: HeaderMap,
    body: Option<Bytes>,
}

impl Response {
    /// Assemble a response. Transports call this once per completed request.
    pub fn new(status: StatusCode, headers: HeaderMap, body: Bytes) -> Self {
        Self {
            status,
            headers,
            body: Some(body),
        }
    }

    /// Status code of the response.
    pub const fn status(&self) -> StatusCode {
        self.status
    }

    /// Header multi-map of the response.
    pub const fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Consume the response, taking ownership of the body.
    pub fn into_body(mut self) -> Bytes {
        self.body.take().unwrap_or_default()
    }

    /// Release the response without reading the body.
    pub fn close(mut self) {
        self.body.take();
    }
}

impl Drop for Response {
    fn drop(&mut self) {
        if self.body.take().is_some() {
            metrics::mark_response_leaked();
            tracing::debug!(status = %self.status, "response dropped without being consumed");
        }
    }
}
