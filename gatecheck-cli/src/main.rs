//! Benchmark driver: loads config and dataset, builds the harness, and runs
//! weighted scenario workers until the deadline or the first fatal error.

use anyhow::{Context, Result};
use clap::Parser;
use gatecheck_config::domains::logging::LogFormat;
use gatecheck_config::{ConfigLoader, GatecheckConfig};
use gatecheck_core::{Counters, Dataset, Harness, MemoryCounters, ScenarioKind};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

mod cli;
use cli::Cli;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = ConfigLoader::new()
        .load(cli.config.as_ref())
        .context("loading configuration")?;
    apply_cli_overrides(&mut config, &cli);

    init_tracing(&config);

    let dataset = load_dataset(&cli)?;
    let counters = Arc::new(MemoryCounters::new());
    let harness = Arc::new(
        Harness::new(&dataset, &config, counters.clone()).context("building the harness")?,
    );

    info!(
        "benchmarking {} with {} workers for {:?}",
        config.target.base_url, config.load.workers, config.load.duration
    );

    let failed = run_drivers(harness.clone(), &config, counters.clone()).await;

    // Post-test: the full sales report must reconcile once traffic stopped
    let failed = if failed {
        true
    } else if let Err(err) = harness.check_report().await {
        error!("post-test report reconciliation failed: {}", err);
        true
    } else {
        false
    };

    for (key, value) in counters.snapshot() {
        info!("counter {} = {}", key, value);
    }

    if failed {
        error!("benchmark failed: a scenario hit a fatal error");
        std::process::exit(1);
    }
    info!("benchmark passed");
    Ok(())
}

fn apply_cli_overrides(config: &mut GatecheckConfig, cli: &Cli) {
    if let Some(target) = &cli.target {
        config.target.base_url = target.clone();
    }
    if let Some(duration) = cli.duration {
        config.load.duration = Duration::from_secs(duration);
    }
    if let Some(workers) = cli.workers {
        config.load.workers = workers;
    }
    if let Some(seed) = cli.seed {
        config.load.seed = Some(seed);
    }
}

fn init_tracing(config: &GatecheckConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.logging.level.as_str()));
    match config.logging.format {
        LogFormat::Json => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init(),
        LogFormat::Text => tracing_subscriber::fmt().with_env_filter(filter).init(),
    }
}

fn load_dataset(cli: &Cli) -> Result<Dataset> {
    match &cli.dataset {
        Some(path) => {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("reading dataset {}", path.display()))?;
            serde_json::from_str(&content)
                .with_context(|| format!("parsing dataset {}", path.display()))
        }
        None => Ok(Dataset::sample()),
    }
}

/// Run weighted scenario workers until the deadline; the first fatal error
/// stops every worker and fails the run
async fn run_drivers(
    harness: Arc<Harness>,
    config: &GatecheckConfig,
    counters: Arc<MemoryCounters>,
) -> bool {
    let stop = Arc::new(AtomicBool::new(false));
    let failed = Arc::new(AtomicBool::new(false));
    let deadline = Instant::now() + config.load.duration;
    let schedule = ScenarioKind::weighted();
    let total_weight: u32 = schedule.iter().map(|(_, w)| w).sum();

    let mut handles = Vec::with_capacity(config.load.workers);
    for worker in 0..config.load.workers {
        let harness = harness.clone();
        let counters = counters.clone();
        let stop = stop.clone();
        let failed = failed.clone();
        let mut rng = match config.load.seed {
            Some(seed) => fastrand::Rng::with_seed(seed.wrapping_add(worker as u64)),
            None => fastrand::Rng::new(),
        };

        handles.push(tokio::spawn(async move {
            while Instant::now() < deadline && !stop.load(Ordering::Relaxed) {
                let kind = pick_weighted(&mut rng, schedule, total_weight);
                match harness.run(kind).await {
                    Ok(()) => {
                        counters.increment(&format!("scenario-{}-ok", kind.name()));
                    }
                    Err(err) => {
                        counters.increment(&format!("scenario-{}-failed", kind.name()));
                        error!("scenario {} failed: {}", kind.name(), err);
                        failed.store(true, Ordering::Relaxed);
                        stop.store(true, Ordering::Relaxed);
                        break;
                    }
                }
            }
        }));
    }

    for handle in handles {
        if let Err(err) = handle.await {
            error!("worker task panicked: {}", err);
            failed.store(true, Ordering::Relaxed);
        }
    }

    failed.load(Ordering::Relaxed)
}

fn pick_weighted(
    rng: &mut fastrand::Rng,
    schedule: &[(ScenarioKind, u32)],
    total_weight: u32,
) -> ScenarioKind {
    let mut roll = rng.u32(0..total_weight);
    for (kind, weight) in schedule {
        if roll < *weight {
            return *kind;
        }
        roll -= weight;
    }
    schedule[0].0
}
