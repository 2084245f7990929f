//! Metrics collection for gateway monitoring.

use std::fmt::Write;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use coffer_common::{ErrorKind, LedgerError};

/// Ledger operations exposed by the gateway.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    CreateAccount,
    Login,
    UpdateBalance,
    CheckBalance,
    Transfer,
}

impl Operation {
    pub const ALL: [Operation; 5] = [
        Operation::CreateAccount,
        Operation::Login,
        Operation::UpdateBalance,
        Operation::CheckBalance,
        Operation::Transfer,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::CreateAccount => "create_account",
            Operation::Login => "login",
            Operation::UpdateBalance => "update_balance",
            Operation::CheckBalance => "check_balance",
            Operation::Transfer => "transfer",
        }
    }

    fn index(self) -> usize {
        self as usize
    }
}

#[derive(Default)]
struct OperationCounters {
    succeeded: AtomicU64,
    rejected: AtomicU64,
    failed: AtomicU64,
}

/// Gateway metrics.
///
/// A request is `rejected` when the ledger refused it for a business reason
/// and `failed` when the store could not serve it.
pub struct Metrics {
    operations: [OperationCounters; 5],
    /// Requests refused before reaching the ledger (malformed bodies).
    malformed_requests: AtomicU64,
}

impl Metrics {
    /// Create new metrics instance.
    pub fn new() -> Self {
        Self {
            operations: Default::default(),
            malformed_requests: AtomicU64::new(0),
        }
    }

    /// Record the outcome of one ledger call.
    pub fn record<T>(&self, operation: Operation, result: &Result<T, LedgerError>) {
        let counters = &self.operations[operation.index()];
        let counter = match result {
            Ok(_) => &counters.succeeded,
            Err(e) if e.kind() == ErrorKind::Internal => &counters.failed,
            Err(_) => &counters.rejected,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Increment malformed requests.
    pub fn malformed_request(&self) {
        self.malformed_requests.fetch_add(1, Ordering::Relaxed);
    }

    /// Get current metrics snapshot.
    pub fn snapshot(&self) -> MetricsSnapshot {
        let operations = Operation::ALL
            .iter()
            .map(|op| {
                let counters = &self.operations[op.index()];
                OperationSnapshot {
                    operation: *op,
                    succeeded: counters.succeeded.load(Ordering::Relaxed),
                    rejected: counters.rejected.load(Ordering::Relaxed),
                    failed: counters.failed.load(Ordering::Relaxed),
                }
            })
            .collect();

        MetricsSnapshot {
            operations,
            malformed_requests: self.malformed_requests.load(Ordering::Relaxed),
        }
    }

    /// Export metrics in Prometheus format.
    pub fn to_prometheus(&self) -> String {
        let snapshot = self.snapshot();
        let mut out = String::new();

        out.push_str("# HELP coffer_requests_total Ledger requests by operation and outcome\n");
        out.push_str("# TYPE coffer_requests_total counter\n");
        for op in &snapshot.operations {
            for (outcome, value) in [
                ("succeeded", op.succeeded),
                ("rejected", op.rejected),
                ("failed", op.failed),
            ] {
                let _ = writeln!(
                    out,
                    "coffer_requests_total{{operation=\"{}\",outcome=\"{}\"}} {}",
                    op.operation.as_str(),
                    outcome,
                    value
                );
            }
        }

        out.push_str("\n# HELP coffer_malformed_requests_total Requests with unreadable bodies\n");
        out.push_str("# TYPE coffer_malformed_requests_total counter\n");
        let _ = writeln!(
            out,
            "coffer_malformed_requests_total {}",
            snapshot.malformed_requests
        );

        out
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Counters for one operation at a point in time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperationSnapshot {
    pub operation: Operation,
    pub succeeded: u64,
    pub rejected: u64,
    pub failed: u64,
}

/// Snapshot of metrics at a point in time.
#[derive(Debug, Clone)]
pub struct MetricsSnapshot {
    pub operations: Vec<OperationSnapshot>,
    pub malformed_requests: u64,
}

impl MetricsSnapshot {
    pub fn operation(&self, operation: Operation) -> &OperationSnapshot {
        &self.operations[operation.index()]
    }
}

/// Shared metrics instance.
pub type SharedMetrics = Arc<Metrics>;

#[cfg(test)]
mod tests {
    use super::*;
    use coffer_common::StoreError;

    #[test]
    fn test_metrics_record() {
        let metrics = Metrics::new();

        metrics.record(Operation::Transfer, &Ok::<_, LedgerError>(()));
        metrics.record::<()>(Operation::Transfer, &Err(LedgerError::InvalidCredentials));
        metrics.record::<()>(
            Operation::Transfer,
            &Err(StoreError::Transient("timeout".into()).into()),
        );
        metrics.record(Operation::Login, &Ok::<_, LedgerError>(()));

        let snapshot = metrics.snapshot();
        let transfer = snapshot.operation(Operation::Transfer);
        assert_eq!((transfer.succeeded, transfer.rejected, transfer.failed), (1, 1, 1));
        assert_eq!(snapshot.operation(Operation::Login).succeeded, 1);
        assert_eq!(snapshot.operation(Operation::CheckBalance).succeeded, 0);
    }

    #[test]
    fn test_prometheus_export() {
        let metrics = Metrics::new();
        metrics.record(Operation::CreateAccount, &Ok::<_, LedgerError>(()));
        metrics.malformed_request();

        let output = metrics.to_prometheus();
        assert!(output
            .contains("coffer_requests_total{operation=\"create_account\",outcome=\"succeeded\"} 1"));
        assert!(output.contains("coffer_malformed_requests_total 1"));
    }
}
