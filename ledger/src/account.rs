//! Account definitions for the ledger.

use chrono::{DateTime, Utc};
use coffer_common::{AccountId, Balance, LedgerError, Result};
use serde::{Deserialize, Serialize};

/// Longest username the ledger accepts.
pub const MAX_USERNAME_LEN: usize = 64;

/// A ledger account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    /// Unique account identifier.
    pub id: AccountId,
    /// Unique login name, compared exactly.
    pub username: String,
    /// Stored as given and compared in plaintext.
    #[serde(skip_serializing, default)]
    pub password: String,
    /// Current balance in minor units.
    pub balance: Balance,
    /// Reserved; no operation writes it.
    #[serde(rename = "timeDonate", skip_serializing_if = "Option::is_none", default)]
    pub time_donate: Option<DateTime<Utc>>,
}

impl Account {
    /// Check a password against the stored one.
    pub fn password_matches(&self, password: &str) -> bool {
        self.password == password
    }
}

/// Request to open an account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewAccount {
    /// Caller-supplied id, or `None` to let the store assign one.
    #[serde(default)]
    pub id: Option<AccountId>,
    pub username: String,
    pub password: String,
    /// Opening balance.
    #[serde(default)]
    pub balance: Balance,
}

impl NewAccount {
    /// Create a request with a store-assigned id.
    pub fn new(username: impl Into<String>, password: impl Into<String>, balance: Balance) -> Self {
        Self {
            id: None,
            username: username.into(),
            password: password.into(),
            balance,
        }
    }

    /// Use a caller-supplied id.
    pub fn with_id(mut self, id: AccountId) -> Self {
        self.id = Some(id);
        self
    }

    /// Validate the request before it reaches the store.
    pub fn validate(&self) -> Result<()> {
        if self.username.trim().is_empty() {
            return Err(LedgerError::invalid("username", "username cannot be empty"));
        }

        if self.username.chars().count() > MAX_USERNAME_LEN {
            return Err(LedgerError::invalid(
                "username",
                format!("username cannot exceed {} characters", MAX_USERNAME_LEN),
            ));
        }

        if let Some(id) = self.id {
            if !id.is_valid() {
                return Err(LedgerError::invalid("id", "id must be positive"));
            }
        }

        if self.balance < 0 {
            return Err(LedgerError::invalid("balance", "opening balance cannot be negative"));
        }

        Ok(())
    }

    /// Build the account record the store persists under `id`.
    pub fn into_account(self, id: AccountId) -> Account {
        Account {
            id,
            username: self.username,
            password: self.password,
            balance: self.balance,
            time_donate: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use coffer_common::ErrorKind;

    #[test]
    fn test_valid_request() {
        let request = NewAccount::new("alice", "p", 100).with_id(AccountId::new(1));
        assert!(request.validate().is_ok());
    }

    #[test]
    fn test_rejects_blank_username() {
        let err = NewAccount::new("   ", "p", 0).validate().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    }

    #[test]
    fn test_rejects_long_username() {
        let name = "x".repeat(MAX_USERNAME_LEN + 1);
        assert!(NewAccount::new(name, "p", 0).validate().is_err());
    }

    #[test]
    fn test_rejects_non_positive_id() {
        let request = NewAccount::new("alice", "p", 0).with_id(AccountId::new(0));
        match request.validate() {
            Err(LedgerError::InvalidArgument { field, .. }) => {
                assert_eq!(field.as_deref(), Some("id"))
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_rejects_negative_opening_balance() {
        assert!(NewAccount::new("alice", "p", -1).validate().is_err());
    }

    #[test]
    fn test_password_not_serialized() {
        let account = NewAccount::new("alice", "secret", 5).into_account(AccountId::new(9));
        let json = serde_json::to_value(&account).unwrap();
        assert!(json.get("password").is_none());
        assert!(json.get("timeDonate").is_none());
        assert_eq!(json["balance"], 5);
        assert!(account.password_matches("secret"));
        assert!(!account.password_matches("Secret"));
    }
}
