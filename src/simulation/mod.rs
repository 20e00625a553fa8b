//! Load simulation against unreliable in-process dependencies.
//!
//! Used by the `simulate` command to watch breakers trip and recover without
//! any real backing service.

pub mod driver;
pub mod flaky;

pub use driver::{run, CallTally, SimulationPlan, SimulationReport};
pub use flaky::{DependencyError, FlakyDependency, FlakyProfile};
