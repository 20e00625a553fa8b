//! Circuit breaker for dependency protection.
//!
//! # States
//! - Closed: normal operation, calls pass through and are counted
//! - Open: dependency assumed down, calls fail fast
//! - Half-Open: trial calls test whether the dependency recovered
//!
//! # State Transitions
//! ```text
//! Closed → Open: a failure pushes error rate strictly above the threshold
//! Open → Half-Open: first call at or after next_attempt
//! Half-Open → Closed: `half_open_successes` consecutive successes
//! Half-Open → Open: any failure
//! any → Closed: reset()
//! ```
//!
//! # Design Decisions
//! - One mutex guards state, counters and timestamps as a unit
//! - Admission and outcome recording are separate critical sections; the lock
//!   is never held across an await
//! - Successes decay the failure count by one instead of clearing it
//! - Error rate is derived from the counters on demand, never stored
//! - Outcomes of calls admitted before a reset() are discarded

use std::fmt;
use std::future::Future;
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tokio::time::Instant;

use crate::config::validation::validate_breaker;
use crate::config::{BreakerOptions, ConfigError};
use crate::observability::events::{BreakerEvent, BreakerEventKind, EventPublisher, FailureKind};
use crate::resilience::error::BreakerError;
use crate::resilience::timeouts::{panic_message, run_with_timeout, spawn_blocking_with_timeout};

/// Circuit breaker states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CircuitState {
    /// Normal operation - calls allowed
    Closed,
    /// Too many failures - reject calls immediately
    Open,
    /// Testing recovery - calls allowed, outcome decides the next state
    HalfOpen,
}

impl CircuitState {
    pub fn as_str(&self) -> &'static str {
        match self {
            CircuitState::Closed => "CLOSED",
            CircuitState::Open => "OPEN",
            CircuitState::HalfOpen => "HALF_OPEN",
        }
    }
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Read-only diagnostic snapshot of a breaker.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BreakerStats {
    pub name: String,
    pub state: CircuitState,
    pub failures: u64,
    pub successes: u64,
    /// Percentage (0-100) of failures among recorded calls; 0 when none recorded.
    pub error_rate: f64,
    /// Unix timestamp (ms) of the most recent failure.
    pub last_failure_time: Option<u64>,
    /// Unix timestamp (ms) before which an open circuit rejects calls.
    pub next_attempt_time: Option<u64>,
}

/// `100 * failures / (failures + successes)`, or 0 with no calls.
pub fn error_rate(failures: u64, successes: u64) -> f64 {
    let total = failures + successes;
    if total == 0 {
        0.0
    } else {
        100.0 * failures as f64 / total as f64
    }
}

fn unix_millis(at: SystemTime) -> u64 {
    at.duration_since(UNIX_EPOCH).unwrap_or_default().as_millis() as u64
}

#[derive(Debug)]
struct BreakerCore {
    state: CircuitState,
    failures: u64,
    successes: u64,
    half_open_streak: u32,
    last_failure_at: Option<SystemTime>,
    /// Monotonic deadline used for admission decisions.
    next_attempt: Option<Instant>,
    /// Wall-clock mirror of `next_attempt` for reporting.
    next_attempt_at: Option<SystemTime>,
    /// Bumped by reset(); outcomes from earlier admissions are ignored.
    generation: u64,
}

impl BreakerCore {
    fn new() -> Self {
        Self {
            state: CircuitState::Closed,
            failures: 0,
            successes: 0,
            half_open_streak: 0,
            last_failure_at: None,
            next_attempt: None,
            next_attempt_at: None,
            generation: 0,
        }
    }

    fn close(&mut self) {
        self.state = CircuitState::Closed;
        self.failures = 0;
        self.successes = 0;
        self.half_open_streak = 0;
        self.last_failure_at = None;
        self.next_attempt = None;
        self.next_attempt_at = None;
    }

    fn trip(&mut self, reset_timeout: Duration) {
        self.state = CircuitState::Open;
        self.half_open_streak = 0;
        self.next_attempt = Some(Instant::now() + reset_timeout);
        self.next_attempt_at = Some(SystemTime::now() + reset_timeout);
    }
}

/// Ticket for one admitted call.
#[derive(Debug, Clone, Copy)]
struct Admission {
    generation: u64,
    started: Instant,
}

/// Circuit breaker guarding one named dependency.
///
/// Share it behind an `Arc`; every method takes `&self`.
#[derive(Debug)]
pub struct CircuitBreaker {
    name: String,
    options: BreakerOptions,
    core: Mutex<BreakerCore>,
    events: EventPublisher,
}

impl CircuitBreaker {
    /// Create a closed breaker. Invalid options fail here, never at first use.
    pub fn new(name: impl Into<String>, options: BreakerOptions) -> Result<Self, ConfigError> {
        let name = name.into();
        validate_breaker(&name, &options).map_err(ConfigError::Validation)?;

        tracing::debug!(
            circuit = %name,
            timeout_ms = options.timeout_ms,
            error_threshold_percentage = options.error_threshold_percentage,
            reset_timeout_ms = options.reset_timeout_ms,
            monitoring_period = ?options.monitoring_period(),
            "Circuit breaker created"
        );

        Ok(Self {
            events: EventPublisher::new(&name),
            name,
            options,
            core: Mutex::new(BreakerCore::new()),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn options(&self) -> &BreakerOptions {
        &self.options
    }

    /// Current state. Does not advance Open → Half-Open; only a call does that.
    pub fn state(&self) -> CircuitState {
        self.lock().state
    }

    /// Receive every event this breaker emits from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<BreakerEvent> {
        self.events.subscribe()
    }

    /// Run an async operation through the breaker.
    ///
    /// # Errors
    /// - [`BreakerError::Open`] if the circuit is open; `operation` is not invoked
    /// - [`BreakerError::Timeout`] if it does not settle within `timeout_ms`
    /// - [`BreakerError::Operation`] carrying the operation's own error
    pub async fn execute<F, Fut, T, E>(&self, operation: F) -> Result<T, BreakerError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: fmt::Display,
    {
        let admission = self.admit::<E>()?;

        match run_with_timeout(self.options.timeout(), operation()).await {
            Ok(Ok(value)) => {
                self.record_success(admission);
                Ok(value)
            }
            Ok(Err(err)) => {
                self.record_failure(admission, FailureKind::Operation, err.to_string());
                Err(BreakerError::Operation(err))
            }
            Err(timed_out) => {
                self.record_failure(admission, FailureKind::Timeout, timed_out.to_string());
                Err(self.timeout_error())
            }
        }
    }

    /// Run a blocking operation on Tokio's blocking pool through the breaker.
    ///
    /// On timeout the operation keeps running in the background and its result
    /// is discarded. A panic inside it is reported as [`BreakerError::Panicked`].
    pub async fn execute_blocking<F, T, E>(&self, operation: F) -> Result<T, BreakerError<E>>
    where
        F: FnOnce() -> Result<T, E> + Send + 'static,
        T: Send + 'static,
        E: fmt::Display + Send + 'static,
    {
        let admission = self.admit::<E>()?;

        match spawn_blocking_with_timeout(self.options.timeout(), operation).await {
            Ok(Ok(Ok(value))) => {
                self.record_success(admission);
                Ok(value)
            }
            Ok(Ok(Err(err))) => {
                self.record_failure(admission, FailureKind::Operation, err.to_string());
                Err(BreakerError::Operation(err))
            }
            Ok(Err(join_err)) => {
                let message = panic_message(join_err);
                self.record_failure(admission, FailureKind::Panicked, message.clone());
                Err(BreakerError::Panicked {
                    circuit: self.name.clone(),
                    message,
                })
            }
            Err(timed_out) => {
                self.record_failure(admission, FailureKind::Timeout, timed_out.to_string());
                Err(self.timeout_error())
            }
        }
    }

    /// Snapshot of counters and timers.
    pub fn stats(&self) -> BreakerStats {
        let core = self.lock();
        BreakerStats {
            name: self.name.clone(),
            state: core.state,
            failures: core.failures,
            successes: core.successes,
            error_rate: error_rate(core.failures, core.successes),
            last_failure_time: core.last_failure_at.map(unix_millis),
            next_attempt_time: core.next_attempt_at.map(unix_millis),
        }
    }

    /// Force the circuit closed and zero everything. Calls still in flight
    /// will not be counted when they finish.
    pub fn reset(&self) {
        let mut core = self.lock();
        core.close();
        core.generation += 1;
        self.events.publish(core.state, BreakerEventKind::Reset);
    }

    fn lock(&self) -> MutexGuard<'_, BreakerCore> {
        self.core.lock().expect("circuit breaker mutex poisoned")
    }

    fn timeout_error<E>(&self) -> BreakerError<E> {
        BreakerError::Timeout {
            circuit: self.name.clone(),
            timeout: self.options.timeout(),
        }
    }

    /// Decide whether a call may run, flipping Open → Half-Open once the
    /// cooldown has passed.
    fn admit<E>(&self) -> Result<Admission, BreakerError<E>> {
        let mut core = self.lock();
        let now = Instant::now();

        if core.state == CircuitState::Open {
            let next_attempt = core.next_attempt;
            match next_attempt {
                Some(at) if now < at => {
                    let retry_after = at - now;
                    drop(core);
                    self.events.rejected(retry_after);
                    return Err(BreakerError::Open {
                        circuit: self.name.clone(),
                        retry_after,
                    });
                }
                _ => {
                    core.state = CircuitState::HalfOpen;
                    core.half_open_streak = 0;
                    self.events.publish(core.state, BreakerEventKind::HalfOpen);
                }
            }
        }

        Ok(Admission {
            generation: core.generation,
            started: now,
        })
    }

    fn record_success(&self, admission: Admission) {
        let duration_ms = admission.started.elapsed().as_millis() as u64;
        let mut core = self.lock();

        if core.generation != admission.generation {
            tracing::debug!(circuit = %self.name, "Discarding success admitted before reset");
            return;
        }

        core.successes += 1;
        core.failures = core.failures.saturating_sub(1);
        self.events
            .publish(core.state, BreakerEventKind::Success { duration_ms });

        if core.state == CircuitState::HalfOpen {
            core.half_open_streak += 1;
            if core.half_open_streak >= self.options.half_open_successes {
                core.close();
                self.events.publish(core.state, BreakerEventKind::Closed);
            }
        }
    }

    fn record_failure(&self, admission: Admission, kind: FailureKind, error: String) {
        let duration_ms = admission.started.elapsed().as_millis() as u64;
        let mut core = self.lock();

        if core.generation != admission.generation {
            tracing::debug!(circuit = %self.name, "Discarding failure admitted before reset");
            return;
        }

        core.failures += 1;
        core.half_open_streak = 0;
        core.last_failure_at = Some(SystemTime::now());
        self.events.publish(
            core.state,
            BreakerEventKind::Failure {
                kind,
                error,
                duration_ms,
            },
        );

        match core.state {
            CircuitState::HalfOpen => {
                core.trip(self.options.reset_timeout());
                self.events
                    .publish(core.state, BreakerEventKind::OpenedFromHalfOpen);
            }
            CircuitState::Closed => {
                let rate = error_rate(core.failures, core.successes);
                if rate > self.options.error_threshold_percentage {
                    core.trip(self.options.reset_timeout());
                    self.events.publish(
                        core.state,
                        BreakerEventKind::Opened {
                            failures: core.failures,
                            error_rate: rate,
                        },
                    );
                }
            }
            // Admitted before another caller tripped the circuit.
            CircuitState::Open => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn breaker(options: BreakerOptions) -> CircuitBreaker {
        CircuitBreaker::new("vector-index", options).unwrap()
    }

    async fn succeed(cb: &CircuitBreaker) {
        cb.execute(|| async { Ok::<_, String>(()) }).await.unwrap();
    }

    async fn fail(cb: &CircuitBreaker) -> BreakerError<String> {
        cb.execute(|| async { Err::<(), _>("boom".to_string()) })
            .await
            .unwrap_err()
    }

    #[test]
    fn test_error_rate_without_calls_is_zero() {
        assert_eq!(error_rate(0, 0), 0.0);
        assert_eq!(error_rate(3, 7), 30.0);
        assert_eq!(error_rate(1, 0), 100.0);
    }

    #[test]
    fn test_initial_state_closed() {
        let cb = breaker(BreakerOptions::default());
        let stats = cb.stats();

        assert_eq!(stats.state, CircuitState::Closed);
        assert_eq!(stats.failures, 0);
        assert_eq!(stats.successes, 0);
        assert_eq!(stats.error_rate, 0.0);
        assert_eq!(stats.last_failure_time, None);
        assert_eq!(stats.next_attempt_time, None);
    }

    #[test]
    fn test_invalid_options_fail_construction() {
        let options = BreakerOptions::default().with_error_threshold(101.0);
        assert!(matches!(
            CircuitBreaker::new("vector-index", options),
            Err(ConfigError::Validation(_))
        ));
        assert!(CircuitBreaker::new("", BreakerOptions::default()).is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_exactly_threshold_does_not_open() {
        let cb = breaker(BreakerOptions::default().with_error_threshold(50.0));

        succeed(&cb).await;
        succeed(&cb).await;
        // 1 failure / 3 calls
        fail(&cb).await;
        // 2 failures / 4 calls = 50%
        fail(&cb).await;
        assert_eq!(cb.stats().error_rate, 50.0);
        assert_eq!(cb.state(), CircuitState::Closed);

        // 3 / 5 = 60%
        fail(&cb).await;
        assert_eq!(cb.state(), CircuitState::Open);
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_decays_failures_by_one() {
        let cb = breaker(BreakerOptions::default().with_error_threshold(100.0));

        for _ in 0..3 {
            fail(&cb).await;
        }
        succeed(&cb).await;

        let stats = cb.stats();
        assert_eq!(stats.failures, 2);
        assert_eq!(stats.successes, 1);
        assert!(stats.last_failure_time.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_open_rejects_without_invoking() {
        let cb = breaker(BreakerOptions::default());
        fail(&cb).await;
        assert_eq!(cb.state(), CircuitState::Open);
        assert!(cb.stats().next_attempt_time.is_some());

        let calls = AtomicU32::new(0);
        for _ in 0..5 {
            let err = cb
                .execute(|| {
                    calls.fetch_add(1, Ordering::SeqCst);
                    async { Ok::<_, String>(()) }
                })
                .await
                .unwrap_err();
            assert!(err.is_open());
        }

        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(cb.stats().failures, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_half_open_failure_reopens_with_fresh_cooldown() {
        let options = BreakerOptions::default().with_reset_timeout(Duration::from_secs(5));
        let cb = breaker(options);

        fail(&cb).await;
        tokio::time::advance(Duration::from_secs(5)).await;

        let err = fail(&cb).await;
        assert!(matches!(err, BreakerError::Operation(ref e) if e == "boom"));
        assert_eq!(cb.state(), CircuitState::Open);

        // Cooldown restarted from the half-open failure.
        tokio::time::advance(Duration::from_secs(4)).await;
        assert!(fail(&cb).await.is_open());

        tokio::time::advance(Duration::from_secs(1)).await;
        succeed(&cb).await;
        assert_eq!(cb.state(), CircuitState::HalfOpen);
    }

    #[tokio::test(start_paused = true)]
    async fn test_half_open_successes_configurable() {
        let options = BreakerOptions::default()
            .with_reset_timeout(Duration::from_secs(1))
            .with_half_open_successes(1);
        let cb = breaker(options);

        fail(&cb).await;
        tokio::time::advance(Duration::from_secs(1)).await;
        succeed(&cb).await;

        assert_eq!(cb.state(), CircuitState::Closed);
        assert_eq!(cb.stats().successes, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reset_from_open() {
        let cb = breaker(BreakerOptions::default());
        fail(&cb).await;
        assert_eq!(cb.state(), CircuitState::Open);

        cb.reset();
        cb.reset();

        let stats = cb.stats();
        assert_eq!(stats.state, CircuitState::Closed);
        assert_eq!(stats.failures, 0);
        assert_eq!(stats.successes, 0);
        assert_eq!(stats.next_attempt_time, None);
        succeed(&cb).await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_in_flight_outcome_discarded_after_reset() {
        let cb = Arc::new(breaker(BreakerOptions::default()));
        let started = Arc::new(tokio::sync::Notify::new());

        let task = {
            let cb = cb.clone();
            let started = started.clone();
            tokio::spawn(async move {
                cb.execute(|| async move {
                    started.notify_one();
                    tokio::time::sleep(Duration::from_millis(500)).await;
                    Err::<(), _>("late failure".to_string())
                })
                .await
            })
        };

        started.notified().await;
        cb.reset();

        let result = task.await.unwrap();
        assert!(matches!(result, Err(BreakerError::Operation(_))));
        assert_eq!(cb.stats().failures, 0);
        assert_eq!(cb.state(), CircuitState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_event_sequence() {
        let options = BreakerOptions::default()
            .with_reset_timeout(Duration::from_secs(1))
            .with_half_open_successes(1);
        let cb = breaker(options);
        let mut rx = cb.subscribe();

        fail(&cb).await;
        tokio::time::advance(Duration::from_secs(1)).await;
        succeed(&cb).await;
        cb.reset();

        let mut names = Vec::new();
        while let Ok(event) = rx.try_recv() {
            assert_eq!(event.circuit, "vector-index");
            names.push(event.kind.name());
        }

        assert_eq!(
            names,
            vec![
                "circuit_breaker_failure",
                "circuit_breaker_opened",
                "circuit_breaker_half_open",
                "circuit_breaker_success",
                "circuit_breaker_closed",
                "circuit_breaker_reset",
            ]
        );
    }

    #[tokio::test]
    async fn test_blocking_operation_error_passes_through() {
        let cb = breaker(BreakerOptions::default().with_error_threshold(100.0));

        let value = cb
            .execute_blocking(|| Ok::<_, String>(42))
            .await
            .unwrap();
        assert_eq!(value, 42);

        let err = cb
            .execute_blocking(|| Err::<u32, _>("disk full".to_string()))
            .await
            .unwrap_err();
        assert_eq!(err.into_operation_error().as_deref(), Some("disk full"));
        assert_eq!(cb.stats().failures, 1);
    }

    #[tokio::test]
    async fn test_blocking_panic_counts_as_failure() {
        let cb = breaker(BreakerOptions::default().with_error_threshold(100.0));

        let err = cb
            .execute_blocking(|| -> Result<(), String> { panic!("segment missing") })
            .await
            .unwrap_err();

        assert!(matches!(err, BreakerError::Panicked { ref message, .. } if message == "segment missing"));
        assert_eq!(cb.stats().failures, 1);
    }

    #[tokio::test]
    async fn test_blocking_timeout_counts_once() {
        let options = BreakerOptions::default()
            .with_timeout(Duration::from_millis(20))
            .with_error_threshold(100.0);
        let cb = breaker(options);

        let err = cb
            .execute_blocking(|| {
                std::thread::sleep(Duration::from_millis(150));
                Ok::<_, String>(())
            })
            .await
            .unwrap_err();
        assert!(err.is_timeout());

        // Let the detached work finish; its success must not be recorded.
        tokio::time::sleep(Duration::from_millis(250)).await;
        let stats = cb.stats();
        assert_eq!(stats.failures, 1);
        assert_eq!(stats.successes, 0);
    }
}
