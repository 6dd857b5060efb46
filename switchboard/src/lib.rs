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
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc
)]

pub mod channel;
pub mod client;
pub mod endpoint;
pub mod error;
pub mod limited;
pub mod metrics;
pub mod node_selection;
pub mod queue;
pub mod request;
pub mod response;
pub mod retry;

pub use switchboard_limiting as limiting;

pub use self::{
    channel::{Channel, LimitedChannel, ResponseFuture},
    client::{Client, ClientBuilder, ClientQos, Host, StickySession},
    endpoint::Endpoint,
    error::{Error, ErrorType},
    node_selection::{NodeSelectionChannel, NodeSelectionStrategy},
    queue::{QueuedChannel, StickyQueueChannel},
    request::Request,
    response::Response,
    retry::{RetryOnTimeout, RetryPolicy, RetryingChannel, ServerQos},
};
