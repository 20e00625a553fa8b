//! Timeout enforcement.
//!
//! # Responsibilities
//! - Race a guarded call against its deadline
//! - Keep timeout errors distinct from the operation's own errors
//!
//! # Design Decisions
//! - Uses Tokio's timeout facilities
//! - Async work is dropped when the deadline wins (cooperative cancellation)
//! - Blocking work cannot be interrupted; it is detached and its result discarded

use std::future::Future;
use std::time::Duration;

use thiserror::Error;
use tokio::task::JoinError;
use tokio::time::timeout;

/// The deadline elapsed before the operation settled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("deadline of {limit:?} elapsed")]
pub struct TimedOut {
    pub limit: Duration,
}

/// Race `fut` against a timer of `limit`. Whichever settles first wins; a
/// losing future is dropped and never polled again.
pub async fn run_with_timeout<F>(limit: Duration, fut: F) -> Result<F::Output, TimedOut>
where
    F: Future,
{
    timeout(limit, fut).await.map_err(|_| TimedOut { limit })
}

/// Run `operation` on the blocking pool, racing it against `limit`.
///
/// On timeout the task keeps running to completion, but its `JoinHandle` is
/// dropped so the eventual result is discarded.
pub async fn spawn_blocking_with_timeout<F, R>(
    limit: Duration,
    operation: F,
) -> Result<Result<R, JoinError>, TimedOut>
where
    F: FnOnce() -> R + Send + 'static,
    R: Send + 'static,
{
    let handle = tokio::task::spawn_blocking(operation);
    run_with_timeout(limit, handle).await
}

/// Best-effort text for a panic payload carried by a `JoinError`.
pub fn panic_message(err: JoinError) -> String {
    match err.try_into_panic() {
        Ok(payload) => {
            if let Some(s) = payload.downcast_ref::<&str>() {
                s.to_string()
            } else if let Some(s) = payload.downcast_ref::<String>() {
                s.clone()
            } else {
                "non-string panic payload".to_string()
            }
        }
        Err(err) => err.to_string(),
    }
}
