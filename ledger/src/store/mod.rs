//! Account store abstraction.
//!
//! The engine reaches durable state only through these traits. A store
//! provides atomicity, row locking and uniqueness enforcement; it applies no
//! business rules of its own.

use async_trait::async_trait;

use coffer_common::{AccountId, Balance, StoreError};

use crate::account::{Account, NewAccount};

pub mod memory;
pub mod postgres;

pub use memory::MemoryAccountStore;
pub use postgres::PgAccountStore;

/// Durable mapping from account id to account record.
#[async_trait]
pub trait AccountStore: Send + Sync + 'static {
    /// Transaction handle returned by [`AccountStore::begin`].
    type Tx: AccountTransaction;

    /// Start a transaction.
    async fn begin(&self) -> Result<Self::Tx, StoreError>;

    /// Insert a new account.
    ///
    /// Uniqueness of both id and username is checked atomically with the
    /// insert; a violation is reported as [`StoreError::UniqueViolation`].
    /// When `account.id` is `None` the store assigns one.
    async fn insert(&self, account: &NewAccount) -> Result<Account, StoreError>;

    /// Point lookup by id, without locking.
    async fn find_by_id(&self, id: AccountId) -> Result<Option<Account>, StoreError>;

    /// Point lookup by exact username, without locking.
    async fn find_by_username(&self, username: &str) -> Result<Option<Account>, StoreError>;
}

/// A multi-record atomic unit of work.
///
/// Rows read through `lock_*` stay locked until the transaction ends.
/// Dropping a transaction without committing rolls it back.
#[async_trait]
pub trait AccountTransaction: Send + Sized {
    /// Lock and read an account by id.
    ///
    /// Locking a row this transaction already holds returns it without
    /// blocking, reflecting any staged balance.
    async fn lock_by_id(&mut self, id: AccountId) -> Result<Option<Account>, StoreError>;

    /// Lock and read an account by username.
    async fn lock_by_username(&mut self, username: &str) -> Result<Option<Account>, StoreError>;

    /// Write a balance. The row must already be locked by this transaction.
    async fn set_balance(&mut self, id: AccountId, balance: Balance) -> Result<(), StoreError>;

    /// Make every write durable, or none of them.
    async fn commit(self) -> Result<(), StoreError>;

    /// Discard every write.
    async fn rollback(self) -> Result<(), StoreError>;
}
