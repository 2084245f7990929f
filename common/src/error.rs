//! Error types for Coffer ledger operations.

use std::fmt;

use crate::{AccountId, AccountRef, Balance, BalanceOverflow};
use thiserror::Error;

/// Uniqueness constraint reported by an account store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Constraint {
    /// Account usernames are unique.
    Username,
    /// Account ids are unique.
    PrimaryKey,
    /// Any other named constraint.
    Other(String),
}

impl Constraint {
    /// Classify a database constraint by name.
    pub fn from_name(name: Option<&str>) -> Self {
        match name {
            Some("accounts_username_key") => Constraint::Username,
            Some("accounts_pkey") => Constraint::PrimaryKey,
            Some(other) => Constraint::Other(other.to_string()),
            None => Constraint::Other("unknown".to_string()),
        }
    }
}

impl fmt::Display for Constraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Constraint::Username => write!(f, "username"),
            Constraint::PrimaryKey => write!(f, "id"),
            Constraint::Other(name) => write!(f, "{}", name),
        }
    }
}

/// Failure reported by an account store adapter.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// A uniqueness constraint rejected a write.
    #[error("Unique constraint violated: {0}")]
    UniqueViolation(Constraint),

    /// Deadlock, serialization failure or lost connection. The whole
    /// transaction may be re-run from scratch.
    #[error("Transient store failure: {0}")]
    Transient(String),

    /// Any other store failure.
    #[error("Store failure: {0}")]
    Backend(String),
}

/// The failure kinds callers of the ledger distinguish.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    NotFound,
    Conflict,
    Unauthorized,
    InsufficientFunds,
    InvalidArgument,
    Internal,
}

/// Main error type for ledger operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LedgerError {
    /// No account matches the reference.
    #[error("Account not found: {0}")]
    AccountNotFound(AccountRef),

    /// Another account already uses this username.
    #[error("Username already taken: {0}")]
    UsernameTaken(String),

    /// Another account already uses this id.
    #[error("Account id already in use: {0}")]
    AccountIdTaken(AccountId),

    /// Password does not match.
    #[error("Invalid credentials")]
    InvalidCredentials,

    /// Source balance does not cover the transfer.
    #[error("Insufficient funds: required {required}, available {available}")]
    InsufficientFunds { required: Balance, available: Balance },

    /// Malformed or policy-violating input.
    #[error("Invalid argument: {message}")]
    InvalidArgument {
        message: String,
        field: Option<String>,
    },

    /// Store-layer failure.
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

impl LedgerError {
    /// Create an invalid argument error naming the offending field.
    pub fn invalid(field: impl Into<String>, message: impl Into<String>) -> Self {
        LedgerError::InvalidArgument {
            message: message.into(),
            field: Some(field.into()),
        }
    }

    /// Classify the error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            LedgerError::AccountNotFound(_) => ErrorKind::NotFound,
            LedgerError::UsernameTaken(_) | LedgerError::AccountIdTaken(_) => ErrorKind::Conflict,
            LedgerError::InvalidCredentials => ErrorKind::Unauthorized,
            LedgerError::InsufficientFunds { .. } => ErrorKind::InsufficientFunds,
            LedgerError::InvalidArgument { .. } => ErrorKind::InvalidArgument,
            LedgerError::Store(_) => ErrorKind::Internal,
        }
    }

    /// Check if this error is retryable.
    ///
    /// Business-rule failures are terminal; only transient store failures
    /// warrant re-running a transaction.
    pub fn is_retryable(&self) -> bool {
        matches!(self, LedgerError::Store(StoreError::Transient(_)))
    }

    /// Get a stable error code.
    pub fn error_code(&self) -> &'static str {
        match self {
            LedgerError::AccountNotFound(_) => "ACCOUNT_NOT_FOUND",
            LedgerError::UsernameTaken(_) => "USERNAME_TAKEN",
            LedgerError::AccountIdTaken(_) => "ACCOUNT_ID_TAKEN",
            LedgerError::InvalidCredentials => "INVALID_CREDENTIALS",
            LedgerError::InsufficientFunds { .. } => "INSUFFICIENT_FUNDS",
            LedgerError::InvalidArgument { .. } => "INVALID_ARGUMENT",
            LedgerError::Store(StoreError::Transient(_)) => "STORE_UNAVAILABLE",
            LedgerError::Store(_) => "STORE_ERROR",
        }
    }
}

impl From<BalanceOverflow> for LedgerError {
    fn from(err: BalanceOverflow) -> Self {
        LedgerError::invalid("amount", err.to_string())
    }
}

/// Result type alias for ledger operations.
pub type Result<T> = std::result::Result<T, LedgerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_mapping() {
        assert_eq!(
            LedgerError::AccountNotFound(AccountRef::username("nobody")).kind(),
            ErrorKind::NotFound
        );
        assert_eq!(
            LedgerError::UsernameTaken("alice".into()).kind(),
            ErrorKind::Conflict
        );
        assert_eq!(
            LedgerError::AccountIdTaken(AccountId::new(1)).kind(),
            ErrorKind::Conflict
        );
        assert_eq!(LedgerError::InvalidCredentials.kind(), ErrorKind::Unauthorized);
        assert_eq!(
            LedgerError::InsufficientFunds {
                required: 10,
                available: 5
            }
            .kind(),
            ErrorKind::InsufficientFunds
        );
        assert_eq!(
            LedgerError::invalid("amount", "must be positive").kind(),
            ErrorKind::InvalidArgument
        );
        assert_eq!(
            LedgerError::Store(StoreError::Backend("boom".into())).kind(),
            ErrorKind::Internal
        );
    }

    #[test]
    fn test_only_transient_store_errors_retry() {
        assert!(LedgerError::Store(StoreError::Transient("deadlock".into())).is_retryable());
        assert!(!LedgerError::Store(StoreError::Backend("syntax".into())).is_retryable());
        assert!(!LedgerError::InsufficientFunds {
            required: 1,
            available: 0
        }
        .is_retryable());
        assert!(!LedgerError::UsernameTaken("bob".into()).is_retryable());
    }

    #[test]
    fn test_constraint_from_name() {
        assert_eq!(
            Constraint::from_name(Some("accounts_username_key")),
            Constraint::Username
        );
        assert_eq!(Constraint::from_name(Some("accounts_pkey")), Constraint::PrimaryKey);
        assert_eq!(
            Constraint::from_name(Some("other_idx")),
            Constraint::Other("other_idx".into())
        );
    }

    #[test]
    fn test_overflow_becomes_invalid_argument() {
        let err: LedgerError = crate::credit(i64::MAX, 1).unwrap_err().into();
        assert_eq!(err.error_code(), "INVALID_ARGUMENT");
    }
}
