//! Core ledger engine implementation.

use std::future::Future;
use std::sync::Arc;

use chrono::Utc;
use tracing::{info, instrument, warn};

use coffer_common::{
    credit, debit, has_sufficient_funds, AccountId, AccountRef, Balance, Constraint,
    LedgerError, Result, StoreError, TransferId,
};

use crate::account::{Account, NewAccount};
use crate::balance::{BalanceChange, TransferReceipt};
use crate::config::LedgerConfig;
use crate::store::{AccountStore, AccountTransaction};

/// The ledger engine enforces every balance invariant over an account store.
///
/// It holds no mutable state of its own: each operation re-reads current
/// state from the store, and all isolation comes from store transactions.
pub struct LedgerEngine<S> {
    store: Arc<S>,
    config: LedgerConfig,
}

impl<S: AccountStore> LedgerEngine<S> {
    /// Create a new ledger engine over an injected store.
    pub fn new(store: Arc<S>, config: LedgerConfig) -> Self {
        Self { store, config }
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn config(&self) -> &LedgerConfig {
        &self.config
    }

    /// Open a new account.
    ///
    /// The username pre-check is only a fast path; the store's uniqueness
    /// constraint decides races between concurrent creations.
    #[instrument(skip(self, request), fields(username = %request.username))]
    pub async fn create_account(&self, request: NewAccount) -> Result<Account> {
        request.validate()?;

        if self.store.find_by_username(&request.username).await?.is_some() {
            return Err(LedgerError::UsernameTaken(request.username));
        }

        let account = match self.store.insert(&request).await {
            Ok(account) => account,
            Err(StoreError::UniqueViolation(Constraint::Username)) => {
                return Err(LedgerError::UsernameTaken(request.username));
            }
            Err(StoreError::UniqueViolation(Constraint::PrimaryKey)) => {
                return Err(match request.id {
                    Some(id) => LedgerError::AccountIdTaken(id),
                    None => StoreError::UniqueViolation(Constraint::PrimaryKey).into(),
                });
            }
            Err(e) => return Err(e.into()),
        };

        info!(
            account_id = %account.id,
            balance = account.balance,
            "Account created"
        );

        Ok(account)
    }

    /// Verify credentials and return the account.
    #[instrument(skip(self, password))]
    pub async fn authenticate(&self, username: &str, password: &str) -> Result<Account> {
        let account = self
            .store
            .find_by_username(username)
            .await?
            .ok_or_else(|| LedgerError::AccountNotFound(AccountRef::username(username)))?;

        if !account.password_matches(password) {
            warn!(account_id = %account.id, "Rejected credentials");
            return Err(LedgerError::InvalidCredentials);
        }

        Ok(account)
    }

    /// Look up an account by id or username.
    pub async fn get_account(&self, account: &AccountRef) -> Result<Account> {
        let found = match account {
            AccountRef::Id(id) => self.store.find_by_id(*id).await?,
            AccountRef::Username(username) => self.store.find_by_username(username).await?,
        };

        found.ok_or_else(|| LedgerError::AccountNotFound(account.clone()))
    }

    /// Current balance of an account.
    pub async fn check_balance(&self, account: &AccountRef) -> Result<Balance> {
        Ok(self.get_account(account).await?.balance)
    }

    /// Add `amount` (which may be negative) to an account balance.
    ///
    /// No floor is applied here: unlike [`LedgerEngine::transfer`], a
    /// negative adjustment may take the balance below zero.
    #[instrument(skip(self))]
    pub async fn adjust_balance(&self, username: &str, amount: Balance) -> Result<BalanceChange> {
        let change = self
            .retrying("adjust_balance", || self.try_adjust_balance(username, amount))
            .await?;

        info!(
            account_id = %change.account_id,
            amount,
            balance = change.balance_after,
            "Balance adjusted"
        );

        Ok(change)
    }

    /// Move `amount` from one account to another atomically.
    #[instrument(skip(self))]
    pub async fn transfer(
        &self,
        from: AccountId,
        to: AccountId,
        amount: Balance,
    ) -> Result<TransferReceipt> {
        if amount <= 0 {
            return Err(LedgerError::invalid("amount", "transfer amount must be positive"));
        }

        if from == to {
            return Err(LedgerError::invalid(
                "to_user_id",
                "cannot transfer to the source account",
            ));
        }

        let receipt = self
            .retrying("transfer", || self.try_transfer(from, to, amount))
            .await?;

        info!(
            transfer_id = %receipt.id,
            amount,
            from_balance = receipt.from_balance,
            to_balance = receipt.to_balance,
            "Transfer committed"
        );

        Ok(receipt)
    }

    async fn try_adjust_balance(&self, username: &str, amount: Balance) -> Result<BalanceChange> {
        let mut tx = self.store.begin().await?;

        let Some(account) = tx.lock_by_username(username).await? else {
            return abort(tx, LedgerError::AccountNotFound(AccountRef::username(username))).await;
        };

        let balance_after = match credit(account.balance, amount) {
            Ok(balance) => balance,
            Err(overflow) => return abort(tx, overflow.into()).await,
        };

        tx.set_balance(account.id, balance_after).await?;
        tx.commit().await?;

        Ok(BalanceChange {
            account_id: account.id,
            amount,
            balance_before: account.balance,
            balance_after,
        })
    }

    async fn try_transfer(
        &self,
        from: AccountId,
        to: AccountId,
        amount: Balance,
    ) -> Result<TransferReceipt> {
        let mut tx = self.store.begin().await?;

        // Lock in ascending id order so opposing transfers cannot deadlock.
        let (source, destination) = if from < to {
            let source = tx.lock_by_id(from).await?;
            let destination = tx.lock_by_id(to).await?;
            (source, destination)
        } else {
            let destination = tx.lock_by_id(to).await?;
            let source = tx.lock_by_id(from).await?;
            (source, destination)
        };

        let Some(source) = source else {
            return abort(tx, LedgerError::AccountNotFound(AccountRef::Id(from))).await;
        };
        let Some(destination) = destination else {
            return abort(tx, LedgerError::AccountNotFound(AccountRef::Id(to))).await;
        };

        if !has_sufficient_funds(source.balance, amount) {
            let err = LedgerError::InsufficientFunds {
                required: amount,
                available: source.balance,
            };
            return abort(tx, err).await;
        }

        let (from_balance, to_balance) =
            match (debit(source.balance, amount), credit(destination.balance, amount)) {
                (Ok(from_balance), Ok(to_balance)) => (from_balance, to_balance),
                (Err(overflow), _) | (_, Err(overflow)) => {
                    return abort(tx, overflow.into()).await
                }
            };

        tx.set_balance(source.id, from_balance).await?;
        tx.set_balance(destination.id, to_balance).await?;
        tx.commit().await?;

        Ok(TransferReceipt {
            id: TransferId::new(),
            from,
            to,
            amount,
            from_balance,
            to_balance,
            committed_at: Utc::now(),
        })
    }

    /// Run `attempt` until it succeeds, fails terminally, or the retry
    /// policy is exhausted. Each attempt is a fresh transaction.
    async fn retrying<T, F, Fut>(&self, operation: &'static str, mut attempt: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let policy = &self.config.retry;
        let mut attempts = 1;

        loop {
            match attempt().await {
                Err(err) if err.is_retryable() && attempts < policy.max_attempts => {
                    let delay = policy.backoff(attempts);
                    warn!(
                        operation,
                        attempt = attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "Transient store failure, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempts += 1;
                }
                result => return result,
            }
        }
    }
}

/// Roll back and report a business failure.
async fn abort<T, Tx: AccountTransaction>(tx: Tx, err: LedgerError) -> Result<T> {
    if let Err(rollback_err) = tx.rollback().await {
        warn!(error = %rollback_err, "Rollback failed");
    }
    Err(err)
}
