//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (timeouts > 0, threshold within 0..=100)
//! - Validate observability settings (metrics address parses)
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: AppConfig → Result<(), Vec<ValidationError>>
//! - Breaker construction runs the same checks, so bad options fail before first use

use std::net::SocketAddr;

use thiserror::Error;

use crate::config::schema::{AppConfig, BreakerOptions};

/// A single semantic problem with a configuration value.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("breaker name must not be empty")]
    EmptyName,

    #[error("{scope}: timeout_ms must be greater than zero")]
    ZeroTimeout { scope: String },

    #[error("{scope}: error_threshold_percentage must be within 0..=100, got {value}")]
    ThresholdOutOfRange { scope: String, value: f64 },

    #[error("{scope}: reset_timeout_ms must be greater than zero")]
    ZeroResetTimeout { scope: String },

    #[error("{scope}: monitoring_period_ms must be greater than zero")]
    ZeroMonitoringPeriod { scope: String },

    #[error("{scope}: half_open_successes must be at least 1")]
    ZeroHalfOpenSuccesses { scope: String },

    #[error("invalid metrics address '{0}'")]
    InvalidMetricsAddress(String),
}

/// Check one set of breaker options, appending every problem to `errors`.
fn check_options(scope: &str, options: &BreakerOptions, errors: &mut Vec<ValidationError>) {
    let scope = scope.to_string();

    if options.timeout_ms == 0 {
        errors.push(ValidationError::ZeroTimeout { scope: scope.clone() });
    }

    let threshold = options.error_threshold_percentage;
    if !threshold.is_finite() || !(0.0..=100.0).contains(&threshold) {
        errors.push(ValidationError::ThresholdOutOfRange {
            scope: scope.clone(),
            value: threshold,
        });
    }

    if options.reset_timeout_ms == 0 {
        errors.push(ValidationError::ZeroResetTimeout { scope: scope.clone() });
    }

    if options.monitoring_period_ms == 0 {
        errors.push(ValidationError::ZeroMonitoringPeriod { scope: scope.clone() });
    }

    if options.half_open_successes == 0 {
        errors.push(ValidationError::ZeroHalfOpenSuccesses { scope });
    }
}

/// Validate the options a named breaker would be built with.
pub fn validate_breaker(name: &str, options: &BreakerOptions) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if name.trim().is_empty() {
        errors.push(ValidationError::EmptyName);
    }
    check_options(name, options, &mut errors);

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

/// Validate a whole configuration file.
pub fn validate_config(config: &AppConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    check_options("defaults", &config.defaults, &mut errors);

    let mut names: Vec<&String> = config.breakers.keys().collect();
    names.sort();
    for name in names {
        if name.trim().is_empty() {
            errors.push(ValidationError::EmptyName);
            continue;
        }
        check_options(
            &format!("breakers.{}", name),
            &config.options_for(name),
            &mut errors,
        );
    }

    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::InvalidMetricsAddress(
            config.observability.metrics_address.clone(),
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
