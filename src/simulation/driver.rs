//! Concurrent load driver for the simulate command.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::future::join_all;
use serde::Serialize;
use tokio::sync::broadcast;

use crate::config::ConfigError;
use crate::resilience::{BreakerError, BreakerRegistry, BreakerStats, CircuitBreaker};
use crate::simulation::flaky::{FlakyDependency, FlakyProfile};

/// What to run.
#[derive(Debug, Clone)]
pub struct SimulationPlan {
    /// One breaker and one simulated dependency per name.
    pub dependencies: Vec<String>,
    /// Total calls across all workers and dependencies.
    pub calls: u64,
    pub concurrency: usize,
    /// Pause between calls of a single worker.
    pub interval: Duration,
    pub profile: FlakyProfile,
}

/// Caller-visible outcomes for one dependency.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CallTally {
    pub succeeded: u64,
    pub failed: u64,
    pub timed_out: u64,
    pub rejected: u64,
    /// Times the dependency itself was invoked.
    pub invocations: u64,
}

impl CallTally {
    fn merge(&mut self, other: &CallTally) {
        self.succeeded += other.succeeded;
        self.failed += other.failed;
        self.timed_out += other.timed_out;
        self.rejected += other.rejected;
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SimulationReport {
    pub calls_attempted: u64,
    pub tallies: BTreeMap<String, CallTally>,
    pub breakers: Vec<BreakerStats>,
}

struct Target {
    breaker: Arc<CircuitBreaker>,
    dependency: FlakyDependency,
}

/// Drive `plan` against breakers from `registry` until all calls are made or
/// `shutdown` fires.
pub async fn run(
    registry: &BreakerRegistry,
    plan: &SimulationPlan,
    shutdown: &broadcast::Sender<()>,
) -> Result<SimulationReport, ConfigError> {
    let targets = plan
        .dependencies
        .iter()
        .map(|name| {
            Ok(Target {
                breaker: registry.get_or_create(name, None)?,
                dependency: FlakyDependency::new(name, plan.profile.clone()),
            })
        })
        .collect::<Result<Vec<_>, ConfigError>>()?;

    if targets.is_empty() {
        return Ok(SimulationReport {
            calls_attempted: 0,
            tallies: BTreeMap::new(),
            breakers: registry.stats(),
        });
    }

    tracing::info!(
        dependencies = ?plan.dependencies,
        calls = plan.calls,
        concurrency = plan.concurrency,
        "Simulation starting"
    );

    let next_call = AtomicU64::new(0);
    let workers = (0..plan.concurrency.max(1))
        .map(|worker| run_worker(worker, &targets, plan, &next_call, shutdown.subscribe()));
    let results = join_all(workers).await;

    let mut tallies: BTreeMap<String, CallTally> = BTreeMap::new();
    for worker_tallies in results {
        for (i, tally) in worker_tallies.iter().enumerate() {
            tallies
                .entry(targets[i].dependency.name().to_string())
                .or_default()
                .merge(tally);
        }
    }
    for target in &targets {
        if let Some(tally) = tallies.get_mut(target.dependency.name()) {
            tally.invocations = target.dependency.invocations();
        }
    }

    let calls_attempted = next_call.load(Ordering::SeqCst).min(plan.calls);
    tracing::info!(calls_attempted, "Simulation finished");

    Ok(SimulationReport {
        calls_attempted,
        tallies,
        breakers: registry.stats(),
    })
}

async fn run_worker(
    worker: usize,
    targets: &[Target],
    plan: &SimulationPlan,
    next_call: &AtomicU64,
    mut shutdown: broadcast::Receiver<()>,
) -> Vec<CallTally> {
    let mut tallies = vec![CallTally::default(); targets.len()];

    loop {
        let n = next_call.fetch_add(1, Ordering::SeqCst);
        if n >= plan.calls {
            break;
        }
        let idx = (n % targets.len() as u64) as usize;
        let target = &targets[idx];

        let outcome = tokio::select! {
            outcome = target.breaker.execute(|| target.dependency.call()) => outcome,
            _ = shutdown.recv() => {
                tracing::debug!(worker, "Worker received shutdown signal");
                break;
            }
        };

        let tally = &mut tallies[idx];
        match outcome {
            Ok(_) => tally.succeeded += 1,
            Err(BreakerError::Open { .. }) => tally.rejected += 1,
            Err(BreakerError::Timeout { .. }) => tally.timed_out += 1,
            Err(BreakerError::Operation(_)) | Err(BreakerError::Panicked { .. }) => {
                tally.failed += 1
            }
        }

        if !plan.interval.is_zero() {
            tokio::select! {
                _ = tokio::time::sleep(plan.interval) => {}
                _ = shutdown.recv() => break,
            }
        }
    }

    tallies
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BreakerOptions;
    use crate::resilience::CircuitState;

    fn plan(failure_rate: f64, calls: u64) -> SimulationPlan {
        SimulationPlan {
            dependencies: vec!["vector-index".to_string(), "primary-store".to_string()],
            calls,
            concurrency: 3,
            interval: Duration::ZERO,
            profile: FlakyProfile {
                failure_rate,
                latency: Duration::from_millis(5),
                ..Default::default()
            },
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_healthy_run_succeeds_everything() {
        let registry = BreakerRegistry::default();
        let (shutdown, _) = broadcast::channel(1);

        let report = run(&registry, &plan(0.0, 40), &shutdown).await.unwrap();

        assert_eq!(report.calls_attempted, 40);
        assert_eq!(report.tallies["vector-index"].succeeded, 20);
        assert_eq!(report.tallies["primary-store"].succeeded, 20);
        assert!(report
            .breakers
            .iter()
            .all(|stats| stats.state == CircuitState::Closed));
    }

    #[tokio::test(start_paused = true)]
    async fn test_failing_dependency_is_shielded() {
        let registry = BreakerRegistry::new(
            BreakerOptions::default().with_reset_timeout(Duration::from_secs(60)),
        );
        let (shutdown, _) = broadcast::channel(1);

        let report = run(&registry, &plan(1.0, 100), &shutdown).await.unwrap();

        let tally = &report.tallies["vector-index"];
        assert_eq!(tally.succeeded, 0);
        assert!(tally.rejected > 0);
        // Every rejected call was spared from reaching the dependency.
        assert_eq!(tally.invocations, tally.failed + tally.timed_out);
        assert_eq!(
            registry.get("vector-index").unwrap().state(),
            CircuitState::Open
        );
    }

    #[tokio::test]
    async fn test_empty_plan() {
        let registry = BreakerRegistry::default();
        let (shutdown, _) = broadcast::channel(1);
        let mut empty = plan(0.0, 10);
        empty.dependencies.clear();

        let report = run(&registry, &empty, &shutdown).await.unwrap();
        assert_eq!(report.calls_attempted, 0);
        assert!(report.tallies.is_empty());
    }
}
