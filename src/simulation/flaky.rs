//! In-process stand-in for an unreliable dependency.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use rand::Rng;
use thiserror::Error;

/// How badly a simulated dependency behaves.
#[derive(Debug, Clone)]
pub struct FlakyProfile {
    /// Probability (0.0-1.0) that a call fails.
    pub failure_rate: f64,
    /// Latency of a normal call.
    pub latency: Duration,
    /// Probability (0.0-1.0) that a call hangs for `stall` instead.
    pub stall_rate: f64,
    pub stall: Duration,
}

impl Default for FlakyProfile {
    fn default() -> Self {
        Self {
            failure_rate: 0.3,
            latency: Duration::from_millis(20),
            stall_rate: 0.0,
            stall: Duration::from_secs(5),
        }
    }
}

#[derive(Debug, Error)]
pub enum DependencyError {
    #[error("{dependency} unavailable (call #{call})")]
    Unavailable { dependency: String, call: u64 },
}

/// A dependency that fails and stalls at random according to its profile.
#[derive(Debug)]
pub struct FlakyDependency {
    name: String,
    profile: FlakyProfile,
    calls: AtomicU64,
}

impl FlakyDependency {
    pub fn new(name: impl Into<String>, profile: FlakyProfile) -> Self {
        Self {
            name: name.into(),
            profile,
            calls: AtomicU64::new(0),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Number of times the dependency was actually invoked.
    pub fn invocations(&self) -> u64 {
        self.calls.load(Ordering::Relaxed)
    }

    /// Simulate one request. Returns the call number on success.
    pub async fn call(&self) -> Result<u64, DependencyError> {
        let call = self.calls.fetch_add(1, Ordering::Relaxed) + 1;

        let (fails, stalls) = {
            let mut rng = rand::thread_rng();
            (
                rng.gen_bool(probability(self.profile.failure_rate)),
                rng.gen_bool(probability(self.profile.stall_rate)),
            )
        };

        let delay = if stalls {
            self.profile.stall
        } else {
            self.profile.latency
        };
        tokio::time::sleep(delay).await;

        if fails {
            Err(DependencyError::Unavailable {
                dependency: self.name.clone(),
                call,
            })
        } else {
            Ok(call)
        }
    }
}

/// `gen_bool` panics outside 0.0..=1.0; NaN is treated as never.
fn probability(p: f64) -> f64 {
    if p.is_nan() {
        0.0
    } else {
        p.clamp(0.0, 1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_always_failing_profile() {
        let dep = FlakyDependency::new(
            "vector-index",
            FlakyProfile {
                failure_rate: 1.0,
                ..Default::default()
            },
        );

        assert!(dep.call().await.is_err());
        assert!(dep.call().await.is_err());
        assert_eq!(dep.invocations(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_healthy_profile_counts_calls() {
        let dep = FlakyDependency::new(
            "primary-store",
            FlakyProfile {
                failure_rate: 0.0,
                ..Default::default()
            },
        );

        assert_eq!(dep.call().await.unwrap(), 1);
        assert_eq!(dep.call().await.unwrap(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_out_of_range_rates_do_not_panic() {
        let dep = FlakyDependency::new(
            "embeddings-api",
            FlakyProfile {
                failure_rate: f64::NAN,
                stall_rate: f64::INFINITY,
                stall: Duration::from_millis(1),
                ..Default::default()
            },
        );

        // NaN never fails; +inf clamps to always stalling.
        assert_eq!(dep.call().await.unwrap(), 1);
        assert_eq!(probability(-0.5), 0.0);
        assert_eq!(probability(f64::NEG_INFINITY), 0.0);
    }
}
