//! Balance mutation results.

use chrono::{DateTime, Utc};
use coffer_common::{AccountId, Balance, TransferId};
use serde::{Deserialize, Serialize};

/// A committed change to a single account balance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BalanceChange {
    /// Account affected.
    pub account_id: AccountId,
    /// Signed amount applied.
    pub amount: Balance,
    /// Balance before change.
    pub balance_before: Balance,
    /// Balance after change.
    pub balance_after: Balance,
}

/// Confirmation of a committed transfer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferReceipt {
    pub id: TransferId,
    pub from: AccountId,
    pub to: AccountId,
    pub amount: Balance,
    /// Source balance after the transfer.
    pub from_balance: Balance,
    /// Destination balance after the transfer.
    pub to_balance: Balance,
    pub committed_at: DateTime<Utc>,
}
