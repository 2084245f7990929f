//! In-memory account store.
//!
//! Intended for tests, the simulator and single-process deployments. Each row
//! carries its own async mutex, so a transaction blocks only the transactions
//! that touch the same accounts. Unlocked reads see the last committed state.

use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, AtomicU32, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::RwLock;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::debug;

use coffer_common::{AccountId, Balance, Constraint, StoreError};

use super::{AccountStore, AccountTransaction};
use crate::account::{Account, NewAccount};

/// A stored account plus the lock transactions hold on it.
#[derive(Debug)]
struct Row {
    lock: Arc<Mutex<()>>,
    committed: RwLock<Account>,
}

impl Row {
    fn new(account: Account) -> Self {
        Self {
            lock: Arc::new(Mutex::new(())),
            committed: RwLock::new(account),
        }
    }

    fn snapshot(&self) -> Account {
        self.committed.read().clone()
    }
}

/// Fault injection for exercising rollback and retry paths.
#[derive(Debug, Default)]
struct Faults {
    commit_failures: AtomicU32,
}

impl Faults {
    fn take_commit_failure(&self) -> bool {
        self.commit_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

/// In-memory [`AccountStore`].
#[derive(Debug)]
pub struct MemoryAccountStore {
    rows: Arc<DashMap<AccountId, Arc<Row>>>,
    usernames: Arc<DashMap<String, AccountId>>,
    next_id: AtomicI64,
    faults: Arc<Faults>,
}

impl MemoryAccountStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self {
            rows: Arc::new(DashMap::new()),
            usernames: Arc::new(DashMap::new()),
            next_id: AtomicI64::new(1),
            faults: Arc::new(Faults::default()),
        }
    }

    /// Make the next `count` commits fail with a transient error and roll back.
    pub fn inject_commit_failures(&self, count: u32) {
        self.faults.commit_failures.store(count, Ordering::SeqCst);
    }

    /// Number of injected commit failures not yet consumed.
    pub fn pending_commit_failures(&self) -> u32 {
        self.faults.commit_failures.load(Ordering::SeqCst)
    }

    /// Number of accounts.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Sum of all committed balances.
    pub fn total_balance(&self) -> i128 {
        self.rows
            .iter()
            .map(|row| i128::from(row.value().snapshot().balance))
            .sum()
    }
}

impl Default for MemoryAccountStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AccountStore for MemoryAccountStore {
    type Tx = MemoryTransaction;

    async fn begin(&self) -> Result<Self::Tx, StoreError> {
        Ok(MemoryTransaction {
            rows: Arc::clone(&self.rows),
            usernames: Arc::clone(&self.usernames),
            faults: Arc::clone(&self.faults),
            locked: Vec::new(),
            staged: HashMap::new(),
        })
    }

    async fn insert(&self, new: &NewAccount) -> Result<Account, StoreError> {
        // The username slot stays locked until the row is in place, so two
        // inserts with one username cannot both pass.
        let username_slot = match self.usernames.entry(new.username.clone()) {
            Entry::Occupied(_) => return Err(StoreError::UniqueViolation(Constraint::Username)),
            Entry::Vacant(slot) => slot,
        };

        let account = match new.id {
            Some(id) => match self.rows.entry(id) {
                Entry::Occupied(_) => {
                    return Err(StoreError::UniqueViolation(Constraint::PrimaryKey))
                }
                Entry::Vacant(slot) => {
                    let account = new.clone().into_account(id);
                    slot.insert(Arc::new(Row::new(account.clone())));
                    self.next_id
                        .fetch_max(id.get().saturating_add(1), Ordering::SeqCst);
                    account
                }
            },
            None => loop {
                let id = AccountId::new(self.next_id.fetch_add(1, Ordering::SeqCst));
                if let Entry::Vacant(slot) = self.rows.entry(id) {
                    let account = new.clone().into_account(id);
                    slot.insert(Arc::new(Row::new(account.clone())));
                    break account;
                }
            },
        };

        username_slot.insert(account.id);
        Ok(account)
    }

    async fn find_by_id(&self, id: AccountId) -> Result<Option<Account>, StoreError> {
        Ok(self.rows.get(&id).map(|row| row.value().snapshot()))
    }

    async fn find_by_username(&self, username: &str) -> Result<Option<Account>, StoreError> {
        let id = match self.usernames.get(username) {
            Some(entry) => *entry.value(),
            None => return Ok(None),
        };
        self.find_by_id(id).await
    }
}

struct LockedRow {
    row: Arc<Row>,
    _guard: OwnedMutexGuard<()>,
}

/// Transaction over a [`MemoryAccountStore`].
///
/// Balance writes are staged and applied to the committed rows only on
/// [`AccountTransaction::commit`]. Locks are released when the transaction
/// is dropped.
pub struct MemoryTransaction {
    rows: Arc<DashMap<AccountId, Arc<Row>>>,
    usernames: Arc<DashMap<String, AccountId>>,
    faults: Arc<Faults>,
    locked: Vec<LockedRow>,
    staged: HashMap<AccountId, Balance>,
}

impl MemoryTransaction {
    fn holds(&self, id: AccountId) -> Option<&LockedRow> {
        self.locked.iter().find(|locked| locked.row.committed.read().id == id)
    }

    fn view(&self, locked: &LockedRow) -> Account {
        let mut account = locked.row.snapshot();
        if let Some(balance) = self.staged.get(&account.id) {
            account.balance = *balance;
        }
        account
    }
}

#[async_trait]
impl AccountTransaction for MemoryTransaction {
    async fn lock_by_id(&mut self, id: AccountId) -> Result<Option<Account>, StoreError> {
        if let Some(locked) = self.holds(id) {
            return Ok(Some(self.view(locked)));
        }

        let row = match self.rows.get(&id) {
            Some(entry) => Arc::clone(entry.value()),
            None => return Ok(None),
        };

        let guard = Arc::clone(&row.lock).lock_owned().await;
        let account = row.snapshot();
        self.locked.push(LockedRow { row, _guard: guard });

        Ok(Some(account))
    }

    async fn lock_by_username(&mut self, username: &str) -> Result<Option<Account>, StoreError> {
        let id = match self.usernames.get(username) {
            Some(entry) => *entry.value(),
            None => return Ok(None),
        };
        self.lock_by_id(id).await
    }

    async fn set_balance(&mut self, id: AccountId, balance: Balance) -> Result<(), StoreError> {
        if self.holds(id).is_none() {
            return Err(StoreError::Backend(format!(
                "account {} is not locked by this transaction",
                id
            )));
        }
        self.staged.insert(id, balance);
        Ok(())
    }

    async fn commit(self) -> Result<(), StoreError> {
        if self.faults.take_commit_failure() {
            debug!(rows = self.locked.len(), "Injected commit failure");
            return Err(StoreError::Transient("injected commit failure".to_string()));
        }

        // Take every write lock first so readers never see half a commit.
        let mut writes: Vec<_> = self
            .locked
            .iter()
            .map(|locked| locked.row.committed.write())
            .collect();

        for account in writes.iter_mut() {
            if let Some(balance) = self.staged.get(&account.id) {
                account.balance = *balance;
            }
        }

        Ok(())
    }

    async fn rollback(self) -> Result<(), StoreError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn alice() -> NewAccount {
        NewAccount::new("alice", "p", 100).with_id(AccountId::new(1))
    }

    #[tokio::test]
    async fn test_insert_and_find() {
        let store = MemoryAccountStore::new();
        let account = store.insert(&alice()).await.unwrap();

        assert_eq!(account.id, AccountId::new(1));
        assert_eq!(
            store.find_by_username("alice").await.unwrap(),
            Some(account.clone())
        );
        assert_eq!(store.find_by_id(AccountId::new(1)).await.unwrap(), Some(account));
        assert_eq!(store.find_by_username("Alice").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_unique_constraints() {
        let store = MemoryAccountStore::new();
        store.insert(&alice()).await.unwrap();

        let same_name = NewAccount::new("alice", "q", 0).with_id(AccountId::new(2));
        assert_eq!(
            store.insert(&same_name).await.unwrap_err(),
            StoreError::UniqueViolation(Constraint::Username)
        );

        let same_id = NewAccount::new("bob", "q", 0).with_id(AccountId::new(1));
        assert_eq!(
            store.insert(&same_id).await.unwrap_err(),
            StoreError::UniqueViolation(Constraint::PrimaryKey)
        );

        // A failed insert must not leave its username behind.
        assert_eq!(store.find_by_username("bob").await.unwrap(), None);
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_generated_ids_skip_caller_ids() {
        let store = MemoryAccountStore::new();
        store
            .insert(&NewAccount::new("a", "p", 0).with_id(AccountId::new(5)))
            .await
            .unwrap();
        let generated = store.insert(&NewAccount::new("b", "p", 0)).await.unwrap();
        assert_eq!(generated.id, AccountId::new(6));
    }

    #[tokio::test]
    async fn test_staged_writes_invisible_until_commit() {
        let store = MemoryAccountStore::new();
        store.insert(&alice()).await.unwrap();

        let mut tx = store.begin().await.unwrap();
        let locked = tx.lock_by_username("alice").await.unwrap().unwrap();
        tx.set_balance(locked.id, 70).await.unwrap();

        assert_eq!(tx.lock_by_id(locked.id).await.unwrap().unwrap().balance, 70);
        assert_eq!(store.find_by_id(locked.id).await.unwrap().unwrap().balance, 100);

        tx.commit().await.unwrap();
        assert_eq!(store.find_by_id(locked.id).await.unwrap().unwrap().balance, 70);
    }

    #[tokio::test]
    async fn test_rollback_and_drop_discard_writes() {
        let store = MemoryAccountStore::new();
        store.insert(&alice()).await.unwrap();
        let id = AccountId::new(1);

        let mut tx = store.begin().await.unwrap();
        tx.lock_by_id(id).await.unwrap();
        tx.set_balance(id, 1).await.unwrap();
        tx.rollback().await.unwrap();

        {
            let mut tx = store.begin().await.unwrap();
            tx.lock_by_id(id).await.unwrap();
            tx.set_balance(id, 2).await.unwrap();
        }

        assert_eq!(store.find_by_id(id).await.unwrap().unwrap().balance, 100);
    }

    #[tokio::test]
    async fn test_set_balance_requires_lock() {
        let store = MemoryAccountStore::new();
        store.insert(&alice()).await.unwrap();

        let mut tx = store.begin().await.unwrap();
        assert!(matches!(
            tx.set_balance(AccountId::new(1), 5).await,
            Err(StoreError::Backend(_))
        ));
    }

    #[tokio::test]
    async fn test_row_lock_blocks_second_transaction() {
        let store = MemoryAccountStore::new();
        store.insert(&alice()).await.unwrap();
        let id = AccountId::new(1);

        let mut first = store.begin().await.unwrap();
        first.lock_by_id(id).await.unwrap();

        let mut second = store.begin().await.unwrap();
        let blocked = tokio::time::timeout(Duration::from_millis(50), second.lock_by_id(id)).await;
        assert!(blocked.is_err());

        first.set_balance(id, 150).await.unwrap();
        first.commit().await.unwrap();

        let seen = second.lock_by_id(id).await.unwrap().unwrap();
        assert_eq!(seen.balance, 150);
    }

    #[tokio::test]
    async fn test_injected_commit_failure_rolls_back() {
        let store = MemoryAccountStore::new();
        store.insert(&alice()).await.unwrap();
        store.inject_commit_failures(1);
        let id = AccountId::new(1);

        let mut tx = store.begin().await.unwrap();
        tx.lock_by_id(id).await.unwrap();
        tx.set_balance(id, 0).await.unwrap();
        assert!(matches!(tx.commit().await, Err(StoreError::Transient(_))));

        assert_eq!(store.pending_commit_failures(), 0);
        assert_eq!(store.find_by_id(id).await.unwrap().unwrap().balance, 100);
        assert_eq!(store.total_balance(), 100);
    }
}
