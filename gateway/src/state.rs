//! Gateway state definitions.

use std::sync::Arc;

use parking_lot::RwLock;

use coffer_ledger::{AccountStore, LedgerEngine};

use crate::metrics::{Metrics, SharedMetrics};

/// Gateway operational state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GatewayState {
    /// Gateway is starting up.
    Starting,
    /// Gateway is running and accepting requests.
    Running,
    /// Gateway is draining in-flight requests.
    ShuttingDown,
}

impl GatewayState {
    /// Check if the gateway is accepting new requests.
    pub fn accepts_requests(&self) -> bool {
        matches!(self, GatewayState::Running)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            GatewayState::Starting => "starting",
            GatewayState::Running => "running",
            GatewayState::ShuttingDown => "shutting_down",
        }
    }
}

/// Shared handler state.
pub struct AppState<S> {
    pub engine: Arc<LedgerEngine<S>>,
    pub metrics: SharedMetrics,
    lifecycle: Arc<RwLock<GatewayState>>,
}

impl<S: AccountStore> AppState<S> {
    /// Create handler state in the `Starting` state.
    pub fn new(engine: Arc<LedgerEngine<S>>) -> Self {
        Self {
            engine,
            metrics: Arc::new(Metrics::new()),
            lifecycle: Arc::new(RwLock::new(GatewayState::Starting)),
        }
    }

    pub fn state(&self) -> GatewayState {
        *self.lifecycle.read()
    }

    pub fn set_state(&self, state: GatewayState) {
        *self.lifecycle.write() = state;
    }
}

// Derived Clone would require `S: Clone`.
impl<S> Clone for AppState<S> {
    fn clone(&self) -> Self {
        Self {
            engine: Arc::clone(&self.engine),
            metrics: Arc::clone(&self.metrics),
            lifecycle: Arc::clone(&self.lifecycle),
        }
    }
}
