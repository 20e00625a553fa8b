//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the breaker service.
//! All types derive Serde traits for deserialization from config files.

use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Root configuration.
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq)]
#[serde(default)]
pub struct AppConfig {
    /// Logging and metrics settings.
    pub observability: ObservabilityConfig,

    /// Options applied to every breaker without an explicit override.
    pub defaults: BreakerOptions,

    /// Per-dependency overrides, keyed by breaker name.
    pub breakers: HashMap<String, BreakerOverrides>,
}

impl AppConfig {
    /// Effective options for the named breaker: its overrides layered on `defaults`.
    pub fn options_for(&self, name: &str) -> BreakerOptions {
        match self.breakers.get(name) {
            Some(overrides) => overrides.apply_to(&self.defaults),
            None => self.defaults.clone(),
        }
    }
}

/// Immutable tuning for a single circuit breaker.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct BreakerOptions {
    /// Deadline for a single wrapped call, in milliseconds.
    pub timeout_ms: u64,

    /// Error rate (0-100) that must be exceeded to open the circuit.
    pub error_threshold_percentage: f64,

    /// Cooldown before an open circuit admits a trial call, in milliseconds.
    pub reset_timeout_ms: u64,

    /// Observation window, in milliseconds. Reported only; the error rate is
    /// computed over all calls since the circuit last closed.
    pub monitoring_period_ms: u64,

    /// Consecutive half-open successes required to close the circuit.
    pub half_open_successes: u32,
}

impl BreakerOptions {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn reset_timeout(&self) -> Duration {
        Duration::from_millis(self.reset_timeout_ms)
    }

    pub fn monitoring_period(&self) -> Duration {
        Duration::from_millis(self.monitoring_period_ms)
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_ms = timeout.as_millis() as u64;
        self
    }

    pub fn with_reset_timeout(mut self, reset_timeout: Duration) -> Self {
        self.reset_timeout_ms = reset_timeout.as_millis() as u64;
        self
    }

    pub fn with_error_threshold(mut self, percentage: f64) -> Self {
        self.error_threshold_percentage = percentage;
        self
    }

    pub fn with_half_open_successes(mut self, successes: u32) -> Self {
        self.half_open_successes = successes;
        self
    }
}

impl Default for BreakerOptions {
    fn default() -> Self {
        Self {
            timeout_ms: 3_000,
            error_threshold_percentage: 50.0,
            reset_timeout_ms: 30_000,
            monitoring_period_ms: 10_000,
            half_open_successes: 3,
        }
    }
}

/// Partial options for one dependency. Unset fields inherit `[defaults]`.
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq)]
#[serde(default)]
pub struct BreakerOverrides {
    pub timeout_ms: Option<u64>,
    pub error_threshold_percentage: Option<f64>,
    pub reset_timeout_ms: Option<u64>,
    pub monitoring_period_ms: Option<u64>,
    pub half_open_successes: Option<u32>,
}

impl BreakerOverrides {
    /// Layer these overrides on top of `base`.
    pub fn apply_to(&self, base: &BreakerOptions) -> BreakerOptions {
        BreakerOptions {
            timeout_ms: self.timeout_ms.unwrap_or(base.timeout_ms),
            error_threshold_percentage: self
                .error_threshold_percentage
                .unwrap_or(base.error_threshold_percentage),
            reset_timeout_ms: self.reset_timeout_ms.unwrap_or(base.reset_timeout_ms),
            monitoring_period_ms: self.monitoring_period_ms.unwrap_or(base.monitoring_period_ms),
            half_open_successes: self.half_open_successes.unwrap_or(base.half_open_successes),
        }
    }
}

/// Output format for the log subscriber.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Human-readable or JSON log lines.
    pub log_format: LogFormat,

    /// Enable the Prometheus scrape endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}
