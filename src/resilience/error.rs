//! Errors surfaced by `CircuitBreaker::execute`.

use std::time::Duration;

use thiserror::Error;

/// Outcome of a guarded call that did not succeed.
///
/// `E` is the wrapped operation's own error type. It is returned unchanged in
/// [`BreakerError::Operation`].
#[derive(Debug, Error)]
pub enum BreakerError<E> {
    /// The circuit is open; the operation was not invoked.
    #[error("circuit '{circuit}' is open, next attempt in {retry_after:?}")]
    Open {
        circuit: String,
        retry_after: Duration,
    },

    /// The operation did not settle within the configured timeout.
    #[error("circuit '{circuit}' call timed out after {timeout:?}")]
    Timeout { circuit: String, timeout: Duration },

    /// A blocking operation panicked.
    #[error("circuit '{circuit}' operation panicked: {message}")]
    Panicked { circuit: String, message: String },

    /// The operation's own error.
    #[error("{0}")]
    Operation(E),
}

impl<E> BreakerError<E> {
    pub fn is_open(&self) -> bool {
        matches!(self, BreakerError::Open { .. })
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, BreakerError::Timeout { .. })
    }

    /// The operation's error, if that is what this is.
    pub fn into_operation_error(self) -> Option<E> {
        match self {
            BreakerError::Operation(e) => Some(e),
            _ => None,
        }
    }
}
