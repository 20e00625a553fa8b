//! Shared helpers for breaker integration tests.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use circuit_guard::{BreakerError, BreakerOptions, CircuitBreaker};

/// Options with the given cooldown; everything else default.
#[allow(dead_code)]
pub fn with_reset_timeout(ms: u64) -> BreakerOptions {
    BreakerOptions::default().with_reset_timeout(Duration::from_millis(ms))
}

/// Run a call that succeeds immediately.
#[allow(dead_code)]
pub async fn call_ok(cb: &CircuitBreaker) -> Result<(), BreakerError<String>> {
    cb.execute(|| async { Ok::<_, String>(()) }).await
}

/// Run a call that fails immediately with "dependency down".
#[allow(dead_code)]
pub async fn call_err(cb: &CircuitBreaker) -> Result<(), BreakerError<String>> {
    cb.execute(|| async { Err::<(), _>("dependency down".to_string()) })
        .await
}

/// Counts how many times the wrapped operation actually ran.
#[allow(dead_code)]
#[derive(Clone, Default)]
pub struct InvocationCounter(Arc<AtomicU32>);

#[allow(dead_code)]
impl InvocationCounter {
    pub async fn call(&self, cb: &CircuitBreaker, succeed: bool) -> Result<(), BreakerError<String>> {
        let counter = self.0.clone();
        cb.execute(|| async move {
            counter.fetch_add(1, Ordering::SeqCst);
            if succeed {
                Ok(())
            } else {
                Err("dependency down".to_string())
            }
        })
        .await
    }

    pub fn count(&self) -> u32 {
        self.0.load(Ordering::SeqCst)
    }
}
