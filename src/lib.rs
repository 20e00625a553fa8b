//! Circuit breakers for guarding calls to unreliable dependencies.

pub mod config;
pub mod observability;
pub mod resilience;
pub mod simulation;

pub use config::schema::{AppConfig, BreakerOptions};
pub use resilience::{BreakerError, BreakerRegistry, BreakerStats, CircuitBreaker, CircuitState};
