//! Coffer Gateway
//!
//! HTTP+JSON binding for the account ledger. Handlers translate requests into
//! ledger calls and map each ledger error kind onto one status code.

pub mod config;
pub mod dto;
pub mod errors;
pub mod metrics;
pub mod routes;
pub mod state;

pub use config::{GatewayConfig, StoreBackend};
pub use routes::router;
pub use state::{AppState, GatewayState};
