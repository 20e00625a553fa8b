//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Call to a dependency:
//!     → registry.rs (shared breaker for the dependency name)
//!     → circuit_breaker.rs (admit or fail fast)
//!     → timeouts.rs (race the operation against its deadline)
//!     → circuit_breaker.rs (record outcome, maybe change state)
//!     → caller gets the value, the operation's error, Timeout or Open
//! ```
//!
//! # Design Decisions
//! - Timeouts are non-negotiable; every guarded call has a deadline
//! - The breaker decides whether a call runs, never what it returns
//! - Retries are the caller's business
//! - Breaker state is process-local

pub mod circuit_breaker;
pub mod error;
pub mod registry;
pub mod timeouts;

pub use circuit_breaker::{BreakerStats, CircuitBreaker, CircuitState};
pub use error::BreakerError;
pub use registry::BreakerRegistry;
