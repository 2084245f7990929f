//! Simulation controller.

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::future::join_all;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{debug, info, warn};

use coffer_common::{AccountRef, Balance, ErrorKind, LedgerError};
use coffer_ledger::{LedgerConfig, LedgerEngine, MemoryAccountStore, NewAccount};

use crate::metrics::SimulationMetrics;
use crate::population::Population;
use crate::scenario::Scenario;

const DEPOSITOR: &str = "sim-depositor";
const CONTESTED_USERNAME: &str = "sim-contested";

/// Simulation parameters.
#[derive(Debug, Clone)]
pub struct SimulationConfig {
    /// Accounts in the transfer population.
    pub accounts: usize,
    /// Concurrent worker tasks.
    pub workers: usize,
    /// Operations across all workers.
    pub operations: usize,
    /// Opening balance of every simulated account.
    pub initial_balance: Balance,
    /// Random seed for reproducibility.
    pub seed: Option<u64>,
    /// Probability that a flaky-store operation arms one commit failure.
    pub fault_rate: f64,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            accounts: 8,
            workers: 8,
            operations: 1000,
            initial_balance: 10_000,
            seed: None,
            fault_rate: 0.2,
        }
    }
}

impl SimulationConfig {
    pub fn validate(&self, scenario: Scenario) -> Result<(), String> {
        if self.workers == 0 {
            return Err("At least one worker is required".to_string());
        }
        if scenario.transfers() && self.accounts < 2 {
            return Err("Transfer scenarios need at least two accounts".to_string());
        }
        if self.initial_balance < 0 {
            return Err("Initial balance cannot be negative".to_string());
        }
        if scenario == Scenario::DepositStorm
            && Balance::try_from(self.operations)
                .ok()
                .and_then(|ops| self.initial_balance.checked_add(ops))
                .is_none()
        {
            return Err("Initial balance plus deposits would overflow".to_string());
        }
        if !(0.0..=1.0).contains(&self.fault_rate) {
            return Err("Fault rate must be between 0 and 1".to_string());
        }
        Ok(())
    }
}

/// Result of one scenario run.
#[derive(Debug)]
pub struct SimulationReport {
    pub scenario: Scenario,
    pub metrics: SimulationMetrics,
    pub elapsed: Duration,
    /// Invariant checks that failed, one line each.
    pub violations: Vec<String>,
}

impl SimulationReport {
    pub fn passed(&self) -> bool {
        self.violations.is_empty()
    }
}

/// Controls the simulation.
pub struct SimulationController {
    config: SimulationConfig,
    engine: Arc<LedgerEngine<MemoryAccountStore>>,
    rng: StdRng,
}

impl SimulationController {
    /// Create a new simulation controller over a fresh in-memory ledger.
    pub fn new(config: SimulationConfig) -> Self {
        let rng = match config.seed {
            Some(s) => StdRng::seed_from_u64(s),
            None => StdRng::from_entropy(),
        };
        let engine = LedgerEngine::new(Arc::new(MemoryAccountStore::new()), LedgerConfig::default());

        Self {
            config,
            engine: Arc::new(engine),
            rng,
        }
    }

    /// Run a scenario and check its invariants.
    pub async fn run(&mut self, scenario: Scenario) -> anyhow::Result<SimulationReport> {
        self.config.validate(scenario).map_err(anyhow::Error::msg)?;
        info!(
            %scenario,
            workers = self.config.workers,
            operations = self.config.operations,
            "Running scenario: {}",
            scenario.description()
        );

        let started = Instant::now();
        let (metrics, violations) = match scenario {
            Scenario::TransferStorm => self.transfer_storm(0.0).await?,
            Scenario::FlakyStore => self.transfer_storm(self.config.fault_rate).await?,
            Scenario::DepositStorm => self.deposit_storm().await?,
            Scenario::DuplicateSignup => self.duplicate_signup().await?,
        };

        for violation in &violations {
            warn!(%scenario, "Invariant violated: {}", violation);
        }

        Ok(SimulationReport {
            scenario,
            metrics,
            elapsed: started.elapsed(),
            violations,
        })
    }

    async fn transfer_storm(
        &mut self,
        fault_rate: f64,
    ) -> anyhow::Result<(SimulationMetrics, Vec<String>)> {
        let population = Arc::new(
            Population::open(&self.engine, self.config.accounts, self.config.initial_balance)
                .await?,
        );
        let max_amount = (self.config.initial_balance / 2).max(1);

        let engine = Arc::clone(&self.engine);
        let workers_population = Arc::clone(&population);
        let metrics = self
            .spawn_workers(move |operations, mut rng| {
                let engine = Arc::clone(&engine);
                let population = Arc::clone(&workers_population);
                async move {
                    let mut metrics = SimulationMetrics::new();
                    for _ in 0..operations {
                        let Some((from, to)) = population.pick_pair(&mut rng) else {
                            break;
                        };
                        let amount = rng.gen_range(1..=max_amount);
                        if fault_rate > 0.0 && rng.gen_bool(fault_rate) {
                            engine.store().inject_commit_failures(1);
                        }

                        let started = Instant::now();
                        let result = engine.transfer(from, to, amount).await;
                        record(&mut metrics, started, &result);
                    }
                    metrics
                }
            })
            .await?;

        self.engine.store().inject_commit_failures(0);

        let mut violations = Vec::new();
        let balances = population.balances(&self.engine).await?;
        let total: i128 = balances.iter().map(|(_, b)| i128::from(*b)).sum();
        if total != population.expected_total() {
            violations.push(format!(
                "total balance {} differs from opening total {}",
                total,
                population.expected_total()
            ));
        }
        for (id, balance) in balances.iter().filter(|(_, b)| *b < 0) {
            violations.push(format!("account {} went negative: {}", id, balance));
        }

        Ok((metrics, violations))
    }

    async fn deposit_storm(&mut self) -> anyhow::Result<(SimulationMetrics, Vec<String>)> {
        let initial = self.config.initial_balance;
        self.engine
            .create_account(NewAccount::new(DEPOSITOR, "simulated", initial))
            .await?;

        let engine = Arc::clone(&self.engine);
        let metrics = self
            .spawn_workers(move |operations, _rng| {
                let engine = Arc::clone(&engine);
                async move {
                    let mut metrics = SimulationMetrics::new();
                    for _ in 0..operations {
                        let started = Instant::now();
                        let result = engine.adjust_balance(DEPOSITOR, 1).await;
                        record(&mut metrics, started, &result);
                    }
                    metrics
                }
            })
            .await?;

        let mut violations = Vec::new();
        let balance = self
            .engine
            .check_balance(&AccountRef::username(DEPOSITOR))
            .await?;
        let expected = i128::from(initial) + self.config.operations as i128;
        if i128::from(balance) != expected {
            violations.push(format!(
                "balance {} after {} deposits, expected {}",
                balance, self.config.operations, expected
            ));
        }

        Ok((metrics, violations))
    }

    async fn duplicate_signup(&mut self) -> anyhow::Result<(SimulationMetrics, Vec<String>)> {
        let engine = Arc::clone(&self.engine);
        let metrics = self
            .spawn_workers(move |operations, _rng| {
                let engine = Arc::clone(&engine);
                async move {
                    let mut metrics = SimulationMetrics::new();
                    for _ in 0..operations {
                        let started = Instant::now();
                        let result = engine
                            .create_account(NewAccount::new(CONTESTED_USERNAME, "simulated", 0))
                            .await;
                        record(&mut metrics, started, &result);
                    }
                    metrics
                }
            })
            .await?;

        let mut violations = Vec::new();
        if metrics.succeeded != 1 {
            violations.push(format!(
                "{} signups succeeded for one username",
                metrics.succeeded
            ));
        }
        if metrics.failed > 0 {
            violations.push(format!("{} signups failed in the store", metrics.failed));
        }
        if self.engine.store().len() != 1 {
            violations.push(format!(
                "store holds {} accounts after contested signup",
                self.engine.store().len()
            ));
        }

        Ok((metrics, violations))
    }

    /// Split the configured operations across workers and merge their metrics.
    async fn spawn_workers<F, Fut>(&mut self, work: F) -> anyhow::Result<SimulationMetrics>
    where
        F: Fn(usize, StdRng) -> Fut,
        Fut: Future<Output = SimulationMetrics> + Send + 'static,
    {
        let workers = self.config.workers;
        let operations = self.config.operations;

        let handles: Vec<_> = (0..workers)
            .map(|worker| {
                let share = operations / workers + usize::from(worker < operations % workers);
                let rng = StdRng::seed_from_u64(self.rng.gen());
                tokio::spawn(work(share, rng))
            })
            .collect();

        let mut metrics = SimulationMetrics::new();
        for handle in join_all(handles).await {
            metrics.merge(handle?);
        }
        Ok(metrics)
    }
}

fn record<T>(metrics: &mut SimulationMetrics, started: Instant, result: &Result<T, LedgerError>) {
    match result {
        Ok(_) => metrics.record_success(started.elapsed()),
        Err(e) if e.kind() == ErrorKind::Internal => {
            debug!(error = %e, "Operation failed");
            metrics.record_failure();
        }
        Err(_) => metrics.record_rejection(started.elapsed()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> SimulationConfig {
        SimulationConfig {
            accounts: 4,
            workers: 4,
            operations: 200,
            initial_balance: 1_000,
            seed: Some(42),
            fault_rate: 0.3,
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_transfer_storm_conserves() {
        let mut controller = SimulationController::new(config());
        let report = controller.run(Scenario::TransferStorm).await.unwrap();

        assert!(report.passed(), "{:?}", report.violations);
        assert_eq!(report.metrics.total_operations, 200);
        assert_eq!(report.metrics.failed, 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_deposit_storm_loses_nothing() {
        let mut controller = SimulationController::new(config());
        let report = tokio_test::assert_ok!(controller.run(Scenario::DepositStorm).await);

        assert!(report.passed(), "{:?}", report.violations);
        assert_eq!(report.metrics.succeeded, 200);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_duplicate_signup_single_winner() {
        let mut controller = SimulationController::new(config());
        let report = controller.run(Scenario::DuplicateSignup).await.unwrap();

        assert!(report.passed(), "{:?}", report.violations);
        assert_eq!(report.metrics.rejected, 199);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_flaky_store_conserves() {
        let mut controller = SimulationController::new(config());
        let report = controller.run(Scenario::FlakyStore).await.unwrap();

        assert!(report.passed(), "{:?}", report.violations);
        assert_eq!(report.metrics.total_operations, 200);
    }

    #[tokio::test]
    async fn test_rejects_bad_config() {
        let mut controller = SimulationController::new(SimulationConfig {
            accounts: 1,
            ..config()
        });
        tokio_test::assert_err!(controller.run(Scenario::TransferStorm).await);
    }

    #[tokio::test]
    async fn test_deposit_storm_rejects_overflowing_balance() {
        let config = SimulationConfig {
            initial_balance: Balance::MAX,
            ..config()
        };
        assert!(config.validate(Scenario::DepositStorm).is_err());
        assert!(config.validate(Scenario::TransferStorm).is_ok());

        let mut controller = SimulationController::new(config);
        tokio_test::assert_err!(controller.run(Scenario::DepositStorm).await);
    }
}
