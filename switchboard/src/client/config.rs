//! The configuration surface the pipeline consumes.
//!
//! Parsing configuration files is the embedder's business; the engine only
//! consumes the already-typed values gathered here and on
//! [`ClientBuilder`](super::ClientBuilder).

pub use crate::{
    node_selection::NodeSelectionStrategy,
    retry::{RetryOnTimeout, RetryPolicy, ServerQos},
};

/// Whether requests are gated behind per-host adaptive concurrency limiters.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
#[non_exhaustive]
pub enum ClientQos {
    /// Gate every host behind an AIMD concurrency limiter.
    #[default]
    Enabled,
    /// Send requests without any sympathetic client-side limiting.
    ///
    /// With this set, the only backpressure left is whatever the servers
    /// manage to signal while being overrun. The name is a warning.
    DangerousDisableSympatheticClientQos,
}
