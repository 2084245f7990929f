//! Coffer Ledger Engine
//!
//! Account ledger with atomic balance mutations. The engine owns every
//! business rule; an [`AccountStore`] only provides atomicity and durability.

pub mod account;
pub mod balance;
pub mod config;
pub mod engine;
pub mod store;

pub use account::{Account, NewAccount};
pub use balance::{BalanceChange, TransferReceipt};
pub use config::{LedgerConfig, RetryPolicy};
pub use engine::LedgerEngine;
pub use store::{AccountStore, AccountTransaction, MemoryAccountStore, PgAccountStore};
