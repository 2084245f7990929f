//! Simulation metrics.

use std::time::Duration;

/// Outcome counters and latency samples for one run.
#[derive(Debug, Clone, Default)]
pub struct SimulationMetrics {
    /// Total operations attempted.
    pub total_operations: u64,
    /// Operations the ledger committed.
    pub succeeded: u64,
    /// Operations refused for a business reason (insufficient funds, conflict).
    pub rejected: u64,
    /// Operations that failed in the store after retries.
    pub failed: u64,
    /// Latency samples (microseconds).
    latency_samples: Vec<u64>,
}

impl SimulationMetrics {
    /// Create new metrics.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a committed operation.
    pub fn record_success(&mut self, latency: Duration) {
        self.total_operations += 1;
        self.succeeded += 1;
        self.latency_samples.push(latency.as_micros() as u64);
    }

    /// Record a business rejection.
    pub fn record_rejection(&mut self, latency: Duration) {
        self.total_operations += 1;
        self.rejected += 1;
        self.latency_samples.push(latency.as_micros() as u64);
    }

    /// Record a store failure.
    pub fn record_failure(&mut self) {
        self.total_operations += 1;
        self.failed += 1;
    }

    /// Fold another worker's metrics into this one.
    pub fn merge(&mut self, other: SimulationMetrics) {
        self.total_operations += other.total_operations;
        self.succeeded += other.succeeded;
        self.rejected += other.rejected;
        self.failed += other.failed;
        self.latency_samples.extend(other.latency_samples);
    }

    /// Get p50 latency.
    pub fn p50_latency_us(&self) -> u64 {
        self.percentile_latency(50)
    }

    /// Get p99 latency.
    pub fn p99_latency_us(&self) -> u64 {
        self.percentile_latency(99)
    }

    fn percentile_latency(&self, percentile: usize) -> u64 {
        if self.latency_samples.is_empty() {
            return 0;
        }

        let mut sorted = self.latency_samples.clone();
        sorted.sort_unstable();

        let idx = (sorted.len() * percentile / 100).min(sorted.len() - 1);
        sorted[idx]
    }

    /// Get success rate.
    pub fn success_rate(&self) -> f64 {
        if self.total_operations == 0 {
            return 0.0;
        }

        self.succeeded as f64 / self.total_operations as f64
    }

    /// Get throughput (operations per second).
    pub fn throughput(&self, elapsed: Duration) -> f64 {
        let secs = elapsed.as_secs_f64();
        if secs == 0.0 {
            return 0.0;
        }

        self.total_operations as f64 / secs
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics() {
        let mut metrics = SimulationMetrics::new();

        metrics.record_success(Duration::from_micros(100));
        metrics.record_success(Duration::from_micros(200));
        metrics.record_rejection(Duration::from_micros(150));
        metrics.record_failure();

        assert_eq!(metrics.total_operations, 4);
        assert_eq!(metrics.succeeded, 2);
        assert_eq!(metrics.rejected, 1);
        assert_eq!(metrics.failed, 1);
        assert_eq!(metrics.success_rate(), 0.5);
        assert_eq!(metrics.p50_latency_us(), 150);
        assert_eq!(metrics.p99_latency_us(), 200);
    }

    #[test]
    fn test_merge() {
        let mut a = SimulationMetrics::new();
        a.record_success(Duration::from_micros(10));
        let mut b = SimulationMetrics::new();
        b.record_failure();
        b.record_success(Duration::from_micros(30));

        a.merge(b);
        assert_eq!(a.total_operations, 3);
        assert_eq!(a.succeeded, 2);
        assert_eq!(a.p99_latency_us(), 30);
    }

    #[test]
    fn test_empty_metrics() {
        let metrics = SimulationMetrics::new();
        assert_eq!(metrics.p50_latency_us(), 0);
        assert_eq!(metrics.success_rate(), 0.0);
        assert_eq!(metrics.throughput(Duration::ZERO), 0.0);
    }
}
