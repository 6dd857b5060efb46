#![allow(dead_code)]

use bytes::Bytes;
use http::{HeaderMap, HeaderName, HeaderValue, StatusCode};
use std::{
    collections::VecDeque,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex,
    },
};
use switchboard::{Channel, Endpoint, Error, LimitedChannel, Request, Response, ResponseFuture};
use tokio::sync::oneshot;

/// An idempotent endpoint for tests.
pub fn get_endpoint() -> Endpoint {
    Endpoint::new("registry", "getThing", http::Method::GET, "/things/{id}")
}

/// A non-idempotent endpoint for tests.
pub fn post_endpoint() -> Endpoint {
    Endpoint::new("registry", "createThing", http::Method::POST, "/things")
}

pub fn request() -> Request {
    Request::new()
}

pub fn response(status: u16) -> Response {
    Response::new(
        StatusCode::from_u16(status).expect("test status"),
        HeaderMap::new(),
        Bytes::new(),
    )
}

/// What one scripted attempt answers.
#[derive(Debug)]
pub enum Reply {
    Status(u16),
    StatusWithHeader(u16, &'static str, String),
    Io,
    Timeout,
}

impl Reply {
    fn produce(self) -> Result<Response, Error> {
        match self {
            Self::Status(status) => Ok(response(status)),
            Self::StatusWithHeader(status, name, value) => {
                let mut headers = HeaderMap::new();
                headers.insert(
                    name.parse::<HeaderName>().expect("test header name"),
                    HeaderValue::from_str(&value).expect("test header value"),
                );

                Ok(Response::new(
                    StatusCode::from_u16(status).expect("test status"),
                    headers,
                    Bytes::new(),
                ))
            }
            Self::Io => Err(Error::io(std::io::Error::new(
                std::io::ErrorKind::ConnectionRefused,
                "connection refused",
            ))),
            Self::Timeout => Err(Error::timed_out()),
        }
    }
}

/// Transport stub that answers each call from a script, defaulting to 200
/// once the script runs out.
#[derive(Debug, Default)]
pub struct ScriptedChannel {
    script: Mutex<VecDeque<Reply>>,
    hits: AtomicUsize,
}

impl ScriptedChannel {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn with_script(replies: impl IntoIterator<Item = Reply>) -> Arc<Self> {
        let channel = Self::new();

        for reply in replies {
            channel.push(reply);
        }

        channel
    }

    pub fn push(&self, reply: Reply) {
        self.script.lock().unwrap().push_back(reply);
    }

    pub fn hits(&self) -> usize {
        self.hits.load(Ordering::SeqCst)
    }
}

impl Channel for ScriptedChannel {
    fn execute(&self, _: &Endpoint, _: &Request) -> ResponseFuture {
        self.hits.fetch_add(1, Ordering::SeqCst);
        let reply = self
            .script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Reply::Status(200));

        Box::pin(std::future::ready(reply.produce()))
    }
}

/// Transport stub whose responses complete only on command.
#[derive(Debug, Default)]
pub struct ControlledChannel {
    pending: Mutex<Vec<oneshot::Sender<Result<Response, Error>>>>,
    hits: AtomicUsize,
}

impl ControlledChannel {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Number of requests currently waiting on [`complete_next`].
    ///
    /// [`complete_next`]: Self::complete_next
    pub fn pending(&self) -> usize {
        self.pending.lock().unwrap().len()
    }

    pub fn hits(&self) -> usize {
        self.hits.load(Ordering::SeqCst)
    }

    /// Complete the oldest in-flight request. Returns false if the request
    /// was cancelled before the response could be delivered.
    pub fn complete_next(&self, status: u16) -> bool {
        let sender = self.pending.lock().unwrap().remove(0);

        sender.send(Ok(response(status))).is_ok()
    }

    /// Fail the oldest in-flight request with an IO error.
    pub fn fail_next(&self) -> bool {
        let sender = self.pending.lock().unwrap().remove(0);

        sender
            .send(Err(Error::io(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                "broken pipe",
            ))))
            .is_ok()
    }
}

impl Channel for ControlledChannel {
    fn execute(&self, _: &Endpoint, _: &Request) -> ResponseFuture {
        self.hits.fetch_add(1, Ordering::SeqCst);
        let (sender, receiver) = oneshot::channel();
        self.pending.lock().unwrap().push(sender);

        Box::pin(async move {
            match receiver.await {
                Ok(result) => result,
                Err(_) => Err(Error::canceled()),
            }
        })
    }
}

/// Token-gated [`LimitedChannel`]: each admission consumes one token.
#[derive(Debug)]
pub struct Gate {
    inner: Arc<dyn Channel>,
    tokens: AtomicUsize,
}

impl Gate {
    pub fn new(inner: Arc<dyn Channel>, tokens: usize) -> Arc<Self> {
        Arc::new(Self {
            inner,
            tokens: AtomicUsize::new(tokens),
        })
    }

    pub fn add_tokens(&self, amount: usize) {
        self.tokens.fetch_add(amount, Ordering::SeqCst);
    }
}

impl LimitedChannel for Gate {
    fn maybe_execute(&self, endpoint: &Endpoint, request: &Request) -> Option<ResponseFuture> {
        let mut tokens = self.tokens.load(Ordering::SeqCst);

        loop {
            if tokens == 0 {
                return None;
            }

            match self.tokens.compare_exchange(
                tokens,
                tokens - 1,
                Ordering::SeqCst,
                Ordering::SeqCst,
            ) {
                Ok(_) => return Some(self.inner.execute(endpoint, request)),
                Err(observed) => tokens = observed,
            }
        }
    }
}

/// Yield until `condition` holds or the yield budget runs out.
pub async fn wait_until(mut condition: impl FnMut() -> bool) {
    for _ in 0..100 {
        if condition() {
            return;
        }

        tokio::task::yield_now().await;
    }

    assert!(condition(), "condition not reached within the yield budget");
}
