//! Balance arithmetic.
//!
//! Balances and amounts are signed 64-bit integers in minor units of the
//! single ledger currency. Every mutation goes through the checked helpers
//! here so that no balance ever wraps.

use std::fmt;

/// A balance or amount in minor units.
pub type Balance = i64;

/// Error when a balance change would leave the representable range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BalanceOverflow {
    pub balance: Balance,
    pub delta: Balance,
}

impl fmt::Display for BalanceOverflow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Balance overflow: {} + {} is out of range",
            self.balance, self.delta
        )
    }
}

impl std::error::Error for BalanceOverflow {}

/// Add `amount` to `balance`. `amount` may be negative.
pub fn credit(balance: Balance, amount: Balance) -> Result<Balance, BalanceOverflow> {
    balance.checked_add(amount).ok_or(BalanceOverflow {
        balance,
        delta: amount,
    })
}

/// Subtract `amount` from `balance`.
pub fn debit(balance: Balance, amount: Balance) -> Result<Balance, BalanceOverflow> {
    balance.checked_sub(amount).ok_or(BalanceOverflow {
        balance,
        delta: amount.saturating_neg(),
    })
}

/// Check if `balance` covers `amount`.
pub fn has_sufficient_funds(balance: Balance, amount: Balance) -> bool {
    balance >= amount
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_credit_and_debit() {
        assert_eq!(credit(100, 30), Ok(130));
        assert_eq!(credit(100, -130), Ok(-30));
        assert_eq!(debit(100, 30), Ok(70));
    }

    #[test]
    fn test_overflow_is_reported() {
        let err = credit(i64::MAX, 1).unwrap_err();
        assert_eq!(err.balance, i64::MAX);
        assert_eq!(err.delta, 1);
        assert!(debit(i64::MIN, 1).is_err());
    }

    #[test]
    fn test_sufficient_funds() {
        assert!(has_sufficient_funds(100, 100));
        assert!(!has_sufficient_funds(99, 100));
    }

    proptest! {
        #[test]
        fn debit_then_credit_restores_balance(
            balance in -1_000_000_000i64..1_000_000_000,
            amount in 0i64..1_000_000_000,
        ) {
            let debited = debit(balance, amount).unwrap();
            prop_assert_eq!(credit(debited, amount).unwrap(), balance);
        }

        #[test]
        fn moving_amount_conserves_sum(
            a in 0i64..1_000_000_000,
            b in 0i64..1_000_000_000,
            amount in 1i64..1_000_000_000,
        ) {
            prop_assume!(has_sufficient_funds(a, amount));
            let a_after = debit(a, amount).unwrap();
            let b_after = credit(b, amount).unwrap();
            prop_assert_eq!(a_after + b_after, a + b);
        }
    }
}
