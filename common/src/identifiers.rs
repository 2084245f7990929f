//! Identifier types for Coffer ledger entities.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Unique identifier for an account.
///
/// Ordered so that multi-account operations can acquire row locks in a
/// single global order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AccountId(i64);

impl AccountId {
    /// Create a new account ID.
    pub fn new(id: i64) -> Self {
        Self(id)
    }

    /// Get the raw integer value.
    pub fn get(&self) -> i64 {
        self.0
    }

    /// Only positive ids may be assigned to accounts.
    pub fn is_valid(&self) -> bool {
        self.0 > 0
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for AccountId {
    fn from(id: i64) -> Self {
        Self(id)
    }
}

/// Unique identifier for a committed transfer.
/// Uses UUID v7 for time-ordered identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TransferId(Uuid);

impl TransferId {
    /// Create a new transfer ID.
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    /// Parse from string.
    pub fn parse(s: &str) -> Result<Self, uuid::Error> {
        Ok(Self(Uuid::parse_str(s)?))
    }

    /// Get the underlying UUID.
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for TransferId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TransferId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A way of naming an account: by id or by username.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccountRef {
    Id(AccountId),
    Username(String),
}

impl AccountRef {
    pub fn username(username: impl Into<String>) -> Self {
        Self::Username(username.into())
    }
}

impl fmt::Display for AccountRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AccountRef::Id(id) => write!(f, "id={}", id),
            AccountRef::Username(name) => write!(f, "username={}", name),
        }
    }
}

impl From<AccountId> for AccountRef {
    fn from(id: AccountId) -> Self {
        Self::Id(id)
    }
}
