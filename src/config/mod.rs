//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → AppConfig (validated, immutable)
//!     → BreakerRegistry defaults + per-dependency overrides
//!
//! On file change:
//!     watcher.rs detects change
//!     → loader.rs loads new config
//!     → validation.rs validates
//!     → registry swaps its defaults atomically
//!     → breakers created afterwards use the new options
//! ```
//!
//! # Design Decisions
//! - Breaker options are immutable once a breaker exists; reloads affect new breakers only
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;
pub mod watcher;

pub use loader::{load_config, parse_config, ConfigError};
pub use schema::{AppConfig, BreakerOptions, BreakerOverrides, LogFormat, ObservabilityConfig};
pub use validation::ValidationError;
