//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! Circuit breakers produce:
//!     → events.rs (one BreakerEvent per success, failure and transition)
//!         → logging.rs subscriber (structured log lines)
//!         → metrics.rs (counters, gauges, histograms)
//!         → broadcast channel (in-process subscribers)
//!
//! Consumers:
//!     → Log aggregation (stdout, pretty or JSON)
//!     → Metrics endpoint (Prometheus scrape)
//! ```
//!
//! # Design Decisions
//! - Structured logging with a stable `event` field for machine parsing
//! - Metrics are cheap and a no-op until the binary installs an exporter
//! - Slow or absent event subscribers never block a breaker

pub mod events;
pub mod logging;
pub mod metrics;
