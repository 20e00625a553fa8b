//! Breaker lifecycle events.
//!
//! Every event is written to the log, counted in metrics and broadcast to
//! in-process subscribers of the breaker that produced it.

use std::time::Duration;

use serde::Serialize;
use tokio::sync::broadcast;

use crate::observability::metrics::{self, CallOutcome};
use crate::resilience::circuit_breaker::CircuitState;

/// What went wrong in a failed call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// The operation returned its own error.
    Operation,
    /// The operation did not settle before the deadline.
    Timeout,
    /// A blocking operation panicked.
    Panicked,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum BreakerEventKind {
    Success {
        duration_ms: u64,
    },
    Failure {
        kind: FailureKind,
        error: String,
        duration_ms: u64,
    },
    Opened {
        failures: u64,
        error_rate: f64,
    },
    HalfOpen,
    Closed,
    OpenedFromHalfOpen,
    Reset,
}

impl BreakerEventKind {
    /// Stable event name as emitted in logs.
    pub fn name(&self) -> &'static str {
        match self {
            BreakerEventKind::Success { .. } => "circuit_breaker_success",
            BreakerEventKind::Failure { .. } => "circuit_breaker_failure",
            BreakerEventKind::Opened { .. } => "circuit_breaker_opened",
            BreakerEventKind::HalfOpen => "circuit_breaker_half_open",
            BreakerEventKind::Closed => "circuit_breaker_closed",
            BreakerEventKind::OpenedFromHalfOpen => "circuit_breaker_opened_from_half_open",
            BreakerEventKind::Reset => "circuit_breaker_reset",
        }
    }
}

/// An event tagged with the circuit it came from and the state after it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BreakerEvent {
    pub circuit: String,
    pub state: CircuitState,
    #[serde(flatten)]
    pub kind: BreakerEventKind,
}

/// Fan-out point for one breaker's events.
#[derive(Debug)]
pub struct EventPublisher {
    circuit: String,
    tx: broadcast::Sender<BreakerEvent>,
}

impl EventPublisher {
    const CAPACITY: usize = 256;

    pub fn new(circuit: &str) -> Self {
        let (tx, _) = broadcast::channel(Self::CAPACITY);
        Self {
            circuit: circuit.to_string(),
            tx,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<BreakerEvent> {
        self.tx.subscribe()
    }

    /// Log, count and broadcast an event. `state` is the state after the event.
    pub fn publish(&self, state: CircuitState, kind: BreakerEventKind) {
        let event = kind.name();
        let circuit = self.circuit.as_str();

        match &kind {
            BreakerEventKind::Success { duration_ms } => {
                tracing::debug!(event, circuit, state = %state, duration_ms, "Call succeeded");
                metrics::record_call(circuit, CallOutcome::Success);
                metrics::record_call_duration(circuit, Duration::from_millis(*duration_ms));
            }
            BreakerEventKind::Failure {
                kind: failure,
                error,
                duration_ms,
            } => {
                tracing::warn!(
                    event,
                    circuit,
                    state = %state,
                    kind = ?failure,
                    error = %error,
                    duration_ms,
                    "Call failed"
                );
                let outcome = match failure {
                    FailureKind::Timeout => CallOutcome::Timeout,
                    FailureKind::Operation | FailureKind::Panicked => CallOutcome::Failure,
                };
                metrics::record_call(circuit, outcome);
                metrics::record_call_duration(circuit, Duration::from_millis(*duration_ms));
            }
            BreakerEventKind::Opened { failures, error_rate } => {
                tracing::warn!(event, circuit, state = %state, failures, error_rate, "Circuit opened");
                metrics::record_transition(circuit, state);
            }
            BreakerEventKind::HalfOpen => {
                tracing::info!(event, circuit, state = %state, "Circuit half-open, probing dependency");
                metrics::record_transition(circuit, state);
            }
            BreakerEventKind::Closed => {
                tracing::info!(event, circuit, state = %state, "Circuit closed, dependency recovered");
                metrics::record_transition(circuit, state);
            }
            BreakerEventKind::OpenedFromHalfOpen => {
                tracing::warn!(event, circuit, state = %state, "Probe failed, circuit re-opened");
                metrics::record_transition(circuit, state);
            }
            BreakerEventKind::Reset => {
                tracing::info!(event, circuit, state = %state, "Circuit manually reset");
                metrics::record_transition(circuit, state);
            }
        }

        // No subscribers is the normal case.
        let _ = self.tx.send(BreakerEvent {
            circuit: self.circuit.clone(),
            state,
            kind,
        });
    }

    /// Count a call rejected by an open circuit. Not broadcast.
    pub fn rejected(&self, retry_after: Duration) {
        tracing::debug!(
            circuit = %self.circuit,
            retry_after_ms = retry_after.as_millis() as u64,
            "Call rejected, circuit open"
        );
        metrics::record_call(&self.circuit, CallOutcome::Rejected);
    }
}
