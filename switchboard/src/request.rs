//! Outgoing request values.

use bytes::Bytes;
use http::HeaderMap;

/// An outgoing request as the engine sees it.
///
/// The engine treats requests as immutable values: it clones them into queue
/// entries and retry attempts but never mutates the caller's copy. Cloning is
/// cheap; the body is reference counted.
#[derive(Clone, Debug, Default)]
pub struct Request {
    /// Header multi-map sent with the request.
    pub headers: HeaderMap,
    /// Values substituted into the endpoint's path template, in order.
    pub path_params: Vec<(String, String)>,
    /// Query string parameters, in order.
    pub query_params: Vec<(String, String)>,
    /// Request body.
    pub body: Bytes,
    /// Host the routing layer must use, set by the redirect retry path.
    pub(crate) preferred_host: Option<usize>,
}

impl Request {
    /// Create an empty request.
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of this request routed at a specific host.
    pub(crate) fn with_preferred_host(&self, host: usize) -> Self {
        let mut request = self.clone();
        request.preferred_host = Some(host);

        request
    }
}
