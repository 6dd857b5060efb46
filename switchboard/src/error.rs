//! Errors surfaced by the engine.

use std::{
    error::Error as StdError,
    fmt::{Display, Formatter, Result as FmtResult},
};

/// Failure of a request somewhere between submission and completion.
#[derive(Debug)]
pub struct Error {
    pub(crate) kind: ErrorType,
    pub(crate) source: Option<Box<dyn StdError + Send + Sync>>,
}

impl Error {
    /// Immutable reference to the type of error that occurred.
    #[must_use = "retrieving the type has no effect if left unused"]
    pub const fn kind(&self) -> &ErrorType {
        &self.kind
    }

    /// Consume the error, returning the source error if there is any.
    #[must_use = "consuming the error and retrieving the source has no effect if left unused"]
    pub fn into_source(self) -> Option<Box<dyn StdError + Send + Sync>> {
        self.source
    }

    /// Consume the error, returning the owned error type and the source error.
    #[must_use = "consuming the error into its parts has no effect if left unused"]
    pub fn into_parts(self) -> (ErrorType, Option<Box<dyn StdError + Send + Sync>>) {
        (self.kind, self.source)
    }

    /// The transport failed to carry the request.
    pub fn io(source: impl Into<Box<dyn StdError + Send + Sync>>) -> Self {
        Self {
            kind: ErrorType::Io,
            source: Some(source.into()),
        }
    }

    /// The connection was reset while the request was in flight.
    pub fn connection_reset(source: impl Into<Box<dyn StdError + Send + Sync>>) -> Self {
        Self {
            kind: ErrorType::ConnectionReset,
            source: Some(source.into()),
        }
    }

    /// The transport gave up waiting for a response.
    pub fn timed_out() -> Self {
        Self {
            kind: ErrorType::RequestTimedOut,
            source: None,
        }
    }

    /// The caller abandoned the request.
    pub fn canceled() -> Self {
        Self {
            kind: ErrorType::Canceled,
            source: None,
        }
    }

    pub(crate) fn queue_full() -> Self {
        Self {
            kind: ErrorType::QueueFull,
            source: None,
        }
    }

    pub(crate) fn limited() -> Self {
        Self {
            kind: ErrorType::Limited,
            source: None,
        }
    }

    pub(crate) fn internal(message: &'static str) -> Self {
        Self {
            kind: ErrorType::Internal { message },
            source: None,
        }
    }
}

impl Display for Error {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match &self.kind {
            ErrorType::Canceled => f.write_str("request was canceled by the caller"),
            ErrorType::ConnectionReset => f.write_str("connection was reset while in flight"),
            ErrorType::Internal { message } => {
                f.write_str("internal invariant violated: ")?;

                f.write_str(message)
            }
            ErrorType::Io => f.write_str("transport failed to carry the request"),
            ErrorType::Limited => f.write_str("every host declined the request"),
            ErrorType::QueueFull => f.write_str("queue is full"),
            ErrorType::RequestTimedOut => f.write_str("request timed out"),
        }
    }
}

impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.source
            .as_ref()
            .map(|source| &**source as &(dyn StdError + 'static))
    }
}

/// Type of [`Error`] that occurred.
#[derive(Debug)]
#[non_exhaustive]
pub enum ErrorType {
    /// The caller dropped the response future before completion.
    Canceled,
    /// The connection was reset mid-request.
    ConnectionReset,
    /// An internal invariant was violated; the request cannot be accounted
    /// for. Always accompanied by a log line.
    Internal {
        /// Short description of the violated invariant.
        message: &'static str,
    },
    /// The transport failed before a response arrived.
    Io,
    /// Every host declined the request on a path that does not queue.
    Limited,
    /// The request queue is at capacity.
    QueueFull,
    /// No response arrived within the transport's deadline.
    RequestTimedOut,
}

#[cfg(test)]
mod tests {
    use super::{Error, ErrorType};
    use static_assertions::assert_impl_all;
    use std::{error::Error as StdError, fmt::Debug};

    assert_impl_all!(Error: Debug, Send, StdError, Sync);
    assert_impl_all!(ErrorType: Debug, Send, Sync);

    #[test]
    fn queue_full_message_is_stable() {
        assert_eq!("queue is full", Error::queue_full().to_string());
    }

    #[test]
    fn io_errors_keep_their_source() {
        let error = Error::io(std::io::Error::new(
            std::io::ErrorKind::BrokenPipe,
            "broken pipe",
        ));

        assert!(matches!(error.kind(), ErrorType::Io));
        assert!(error.into_source().is_some());
    }
}
