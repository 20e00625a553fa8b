//! circuit-guard
//!
//! Drives named circuit breakers against simulated dependencies and inspects
//! breaker configuration.
//!
//! # Architecture Overview
//!
//! ```text
//!   caller ──▶ BreakerRegistry ──▶ CircuitBreaker ──▶ timeout race ──▶ dependency
//!                   ▲                    │
//!                   │                    ▼
//!             config (+ watcher)   events: logs, metrics, broadcast
//! ```

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use serde_json::json;
use tokio::sync::broadcast;

use circuit_guard::config::watcher::ConfigWatcher;
use circuit_guard::config::{load_config, AppConfig};
use circuit_guard::observability::{logging, metrics};
use circuit_guard::simulation::{self, FlakyProfile, SimulationPlan};
use circuit_guard::BreakerRegistry;

#[derive(Parser)]
#[command(name = "circuit-guard")]
#[command(about = "Circuit breakers for flaky dependencies", long_about = None)]
struct Cli {
    /// Path to a TOML config file. Built-in defaults are used when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Reload the config file when it changes.
    #[arg(long)]
    watch: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Drive breakers against simulated flaky dependencies and print their stats
    Simulate(SimulateArgs),
    /// Validate the config and print the effective options per breaker
    Check {
        /// Extra breaker names to resolve besides those in the config
        #[arg(short, long = "breaker")]
        breakers: Vec<String>,
    },
}

#[derive(Args)]
struct SimulateArgs {
    /// Dependency (breaker) name; repeat for several
    #[arg(short, long = "dependency", default_values_t = vec!["vector-index".to_string()])]
    dependencies: Vec<String>,

    #[arg(long, default_value_t = 200)]
    calls: u64,

    #[arg(long, default_value_t = 4)]
    concurrency: usize,

    /// Probability (0.0-1.0) that a call fails
    #[arg(long, default_value_t = 0.3)]
    failure_rate: f64,

    #[arg(long, default_value_t = 20)]
    latency_ms: u64,

    /// Probability (0.0-1.0) that a call hangs for --stall-ms
    #[arg(long, default_value_t = 0.0)]
    stall_rate: f64,

    #[arg(long, default_value_t = 5_000)]
    stall_ms: u64,

    /// Pause between calls of one worker
    #[arg(long, default_value_t = 10)]
    interval_ms: u64,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => load_config(path)?,
        None => AppConfig::default(),
    };

    logging::init_logging(&config.observability);
    tracing::info!(
        config = ?cli.config,
        breaker_overrides = config.breakers.len(),
        "circuit-guard v0.1.0 starting"
    );

    if config.observability.metrics_enabled {
        if let Ok(addr) = config.observability.metrics_address.parse() {
            metrics::init_metrics(addr);
        } else {
            tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            );
        }
    }

    let registry = Arc::new(BreakerRegistry::from_config(&config));

    // Held for the lifetime of main; dropping it stops the watch.
    let _watcher = match (&cli.config, cli.watch) {
        (Some(path), true) => Some(ConfigWatcher::new(path, registry.clone()).spawn()?),
        (None, true) => {
            tracing::warn!("--watch ignored without --config");
            None
        }
        _ => None,
    };

    match cli.command {
        Commands::Simulate(args) => simulate(&registry, args).await?,
        Commands::Check { breakers } => check(&config, &registry, breakers)?,
    }

    Ok(())
}

async fn simulate(
    registry: &BreakerRegistry,
    args: SimulateArgs,
) -> Result<(), Box<dyn std::error::Error>> {
    let plan = SimulationPlan {
        dependencies: args.dependencies,
        calls: args.calls,
        concurrency: args.concurrency,
        interval: Duration::from_millis(args.interval_ms),
        profile: FlakyProfile {
            failure_rate: args.failure_rate,
            latency: Duration::from_millis(args.latency_ms),
            stall_rate: args.stall_rate,
            stall: Duration::from_millis(args.stall_ms),
        },
    };

    let (shutdown, _) = broadcast::channel(1);
    let ctrl_c = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Interrupted, stopping simulation");
            let _ = ctrl_c.send(());
        }
    });

    let report = simulation::run(registry, &plan, &shutdown).await?;
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

fn check(
    config: &AppConfig,
    registry: &BreakerRegistry,
    extra: Vec<String>,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut names: Vec<String> = config.breakers.keys().cloned().chain(extra).collect();
    names.sort();
    names.dedup();

    let breakers: serde_json::Map<String, serde_json::Value> = names
        .into_iter()
        .map(|name| {
            let options = serde_json::to_value(registry.effective_options(&name))?;
            Ok((name, options))
        })
        .collect::<Result<_, serde_json::Error>>()?;

    let summary = json!({
        "defaults": config.defaults,
        "breakers": breakers,
    });
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}
