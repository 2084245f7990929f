//! Coffer Simulator
//!
//! Drives the ledger with concurrent load and checks its invariants.

use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod controller;
mod metrics;
mod population;
mod scenario;

use controller::{SimulationConfig, SimulationController};
use scenario::Scenario;

/// Coffer Simulator CLI
#[derive(Parser, Debug)]
#[command(name = "simulator")]
#[command(about = "Concurrent load generator and invariant checker for the Coffer ledger")]
struct Args {
    /// Scenario to run
    #[arg(short, long, value_enum, default_value_t = Scenario::TransferStorm)]
    scenario: Scenario,

    /// Number of accounts in transfer scenarios
    #[arg(short, long, default_value = "8")]
    accounts: usize,

    /// Number of concurrent workers
    #[arg(short, long, default_value = "8")]
    workers: usize,

    /// Total operations across all workers
    #[arg(short, long, default_value = "1000")]
    operations: usize,

    /// Opening balance of each simulated account
    #[arg(long, default_value = "10000")]
    initial_balance: i64,

    /// Probability of arming a commit failure before each flaky-store operation
    #[arg(long, default_value = "0.2")]
    fault_rate: f64,

    /// Random seed for reproducibility
    #[arg(long)]
    seed: Option<u64>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();

    info!("Starting Coffer Simulator");

    let mut controller = SimulationController::new(SimulationConfig {
        accounts: args.accounts,
        workers: args.workers,
        operations: args.operations,
        initial_balance: args.initial_balance,
        seed: args.seed,
        fault_rate: args.fault_rate,
    });

    let report = controller.run(args.scenario).await?;
    let metrics = &report.metrics;

    info!("Simulation complete: {}", report.scenario);
    info!("Total operations: {}", metrics.total_operations);
    info!("Succeeded: {}", metrics.succeeded);
    info!("Rejected: {}", metrics.rejected);
    info!("Failed: {}", metrics.failed);
    info!("Success rate: {:.1}%", metrics.success_rate() * 100.0);
    info!("Throughput: {:.0} ops/s", metrics.throughput(report.elapsed));
    info!(
        "Latency p50: {}us, p99: {}us",
        metrics.p50_latency_us(),
        metrics.p99_latency_us()
    );

    if !report.passed() {
        for violation in &report.violations {
            error!("Invariant violated: {}", violation);
        }
        anyhow::bail!("{} invariant check(s) failed", report.violations.len());
    }

    info!("All invariant checks passed");
    Ok(())
}
