//! Metrics collection and exposition.
//!
//! # Metrics
//! - `circuit_breaker_calls_total` (counter): calls by circuit, outcome
//! - `circuit_breaker_call_duration_seconds` (histogram): latency of attempted calls
//! - `circuit_breaker_state` (gauge): 0=closed, 1=half-open, 2=open
//! - `circuit_breaker_transitions_total` (counter): state changes by circuit, target state
//!
//! # Design Decisions
//! - Recording goes through the `metrics` facade; without an installed recorder it is a no-op
//! - The Prometheus exporter is installed only by the binary

use std::net::SocketAddr;
use std::time::Duration;

use metrics_exporter_prometheus::PrometheusBuilder;

use crate::resilience::circuit_breaker::CircuitState;

/// Outcome label for `circuit_breaker_calls_total`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallOutcome {
    Success,
    Failure,
    Timeout,
    Rejected,
}

impl CallOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            CallOutcome::Success => "success",
            CallOutcome::Failure => "failure",
            CallOutcome::Timeout => "timeout",
            CallOutcome::Rejected => "rejected",
        }
    }
}

/// Start the Prometheus scrape endpoint. Must run inside a Tokio runtime.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_call(circuit: &str, outcome: CallOutcome) {
    metrics::counter!(
        "circuit_breaker_calls_total",
        "circuit" => circuit.to_string(),
        "outcome" => outcome.as_str()
    )
    .increment(1);
}

pub fn record_call_duration(circuit: &str, duration: Duration) {
    metrics::histogram!(
        "circuit_breaker_call_duration_seconds",
        "circuit" => circuit.to_string()
    )
    .record(duration.as_secs_f64());
}

pub fn record_state(circuit: &str, state: CircuitState) {
    let value = match state {
        CircuitState::Closed => 0.0,
        CircuitState::HalfOpen => 1.0,
        CircuitState::Open => 2.0,
    };
    metrics::gauge!("circuit_breaker_state", "circuit" => circuit.to_string()).set(value);
}

pub fn record_transition(circuit: &str, to: CircuitState) {
    metrics::counter!(
        "circuit_breaker_transitions_total",
        "circuit" => circuit.to_string(),
        "to" => to.as_str()
    )
    .increment(1);
    record_state(circuit, to);
}
