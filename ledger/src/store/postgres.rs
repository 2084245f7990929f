//! Postgres-backed account store.
//!
//! Accounts live in a single `accounts` table keyed by `id` with a unique
//! constraint on `username`. Transactions run under READ COMMITTED and take
//! row locks with `SELECT ... FOR UPDATE`, so concurrent read-modify-write
//! cycles on one account serialize instead of losing updates.
//!
//! ## Error Mapping
//!
//! | SQLx error | SQLSTATE | StoreError |
//! |---|---|---|
//! | Database (unique violation) | `23505` | `UniqueViolation` (constraint name decides which) |
//! | Database (serialization failure) | `40001` | `Transient` |
//! | Database (deadlock detected) | `40P01` | `Transient` |
//! | Io, PoolTimedOut | n/a | `Transient` |
//! | anything else | any | `Backend` |

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgPoolOptions;
use sqlx::{FromRow, PgPool, Postgres, Transaction};
use tracing::{debug, info, instrument};

use coffer_common::{AccountId, Balance, Constraint, StoreError};

use super::{AccountStore, AccountTransaction};
use crate::account::{Account, NewAccount};

/// Generated-id collisions tolerated before giving up.
const MAX_ID_COLLISIONS: u32 = 16;

const SELECT_ACCOUNT: &str =
    "SELECT id, username, password, balance, time_donate FROM accounts";

/// Connection pool settings.
#[derive(Debug, Clone)]
pub struct PgStoreOptions {
    pub max_connections: u32,
    pub acquire_timeout: Duration,
}

impl Default for PgStoreOptions {
    fn default() -> Self {
        Self {
            max_connections: 10,
            acquire_timeout: Duration::from_secs(5),
        }
    }
}

/// Postgres-backed [`AccountStore`].
#[derive(Debug, Clone)]
pub struct PgAccountStore {
    pool: PgPool,
}

impl PgAccountStore {
    /// Wrap an existing pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Open a connection pool.
    pub async fn connect(url: &str, options: &PgStoreOptions) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(options.max_connections)
            .acquire_timeout(options.acquire_timeout)
            .connect(url)
            .await
            .map_err(|e| map_sqlx_error("connect", e))?;

        info!(max_connections = options.max_connections, "Connected to account database");
        Ok(Self::new(pool))
    }

    /// Create the accounts table and id sequence if they do not exist.
    pub async fn ensure_schema(&self) -> Result<(), StoreError> {
        let statements = [
            "CREATE SEQUENCE IF NOT EXISTS accounts_id_seq",
            r#"
            CREATE TABLE IF NOT EXISTS accounts (
                id BIGINT NOT NULL,
                username TEXT NOT NULL,
                password TEXT NOT NULL,
                balance BIGINT NOT NULL,
                time_donate TIMESTAMPTZ,
                CONSTRAINT accounts_pkey PRIMARY KEY (id),
                CONSTRAINT accounts_username_key UNIQUE (username)
            )
            "#,
        ];

        for statement in statements {
            sqlx::query(statement)
                .execute(&self.pool)
                .await
                .map_err(|e| map_sqlx_error("ensure_schema", e))?;
        }

        Ok(())
    }

    /// Close the pool, waiting for checked-out connections to return.
    pub async fn close(&self) {
        self.pool.close().await;
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Insert under a caller-supplied id, then move the sequence past it.
    async fn insert_with_id(
        &self,
        account: &NewAccount,
        id: AccountId,
    ) -> Result<Account, StoreError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;

        let row = sqlx::query_as::<_, AccountRow>(
            r#"
            INSERT INTO accounts (id, username, password, balance)
            VALUES ($1, $2, $3, $4)
            RETURNING id, username, password, balance, time_donate
            "#,
        )
        .bind(id.get())
        .bind(&account.username)
        .bind(&account.password)
        .bind(account.balance)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("insert_account", e))?;

        sqlx::query(
            "SELECT setval('accounts_id_seq', GREATEST($1, (SELECT last_value FROM accounts_id_seq)))",
        )
        .bind(id.get())
        .execute(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("advance_id_sequence", e))?;

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))?;

        Ok(row.into())
    }

    async fn insert_generated(&self, account: &NewAccount) -> Result<Account, StoreError> {
        let row = sqlx::query_as::<_, AccountRow>(
            r#"
            INSERT INTO accounts (id, username, password, balance)
            VALUES (nextval('accounts_id_seq'), $1, $2, $3)
            RETURNING id, username, password, balance, time_donate
            "#,
        )
        .bind(&account.username)
        .bind(&account.password)
        .bind(account.balance)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("insert_account", e))?;

        Ok(row.into())
    }
}

#[async_trait]
impl AccountStore for PgAccountStore {
    type Tx = PgAccountTransaction;

    async fn begin(&self) -> Result<Self::Tx, StoreError> {
        let tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;
        Ok(PgAccountTransaction { tx })
    }

    #[instrument(skip(self, account), fields(username = %account.username), err)]
    async fn insert(&self, account: &NewAccount) -> Result<Account, StoreError> {
        match account.id {
            Some(id) => self.insert_with_id(account, id).await,
            None => {
                // Ids taken before an explicit insert advanced the sequence can
                // still be handed out; a collision there is never our own row.
                let mut attempts = 0;
                loop {
                    match self.insert_generated(account).await {
                        Err(StoreError::UniqueViolation(Constraint::PrimaryKey))
                            if attempts < MAX_ID_COLLISIONS =>
                        {
                            attempts += 1;
                            debug!(attempts, "Generated id already taken, drawing again");
                        }
                        result => return result,
                    }
                }
            }
        }
    }

    async fn find_by_id(&self, id: AccountId) -> Result<Option<Account>, StoreError> {
        let row = sqlx::query_as::<_, AccountRow>(&format!("{SELECT_ACCOUNT} WHERE id = $1"))
            .bind(id.get())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("find_by_id", e))?;

        Ok(row.map(Into::into))
    }

    async fn find_by_username(&self, username: &str) -> Result<Option<Account>, StoreError> {
        let row =
            sqlx::query_as::<_, AccountRow>(&format!("{SELECT_ACCOUNT} WHERE username = $1"))
                .bind(username)
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| map_sqlx_error("find_by_username", e))?;

        Ok(row.map(Into::into))
    }
}

/// Transaction over a [`PgAccountStore`].
///
/// sqlx rolls the transaction back when it is dropped uncommitted.
pub struct PgAccountTransaction {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl AccountTransaction for PgAccountTransaction {
    async fn lock_by_id(&mut self, id: AccountId) -> Result<Option<Account>, StoreError> {
        let row = sqlx::query_as::<_, AccountRow>(&format!(
            "{SELECT_ACCOUNT} WHERE id = $1 FOR UPDATE"
        ))
        .bind(id.get())
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("lock_by_id", e))?;

        Ok(row.map(Into::into))
    }

    async fn lock_by_username(&mut self, username: &str) -> Result<Option<Account>, StoreError> {
        let row = sqlx::query_as::<_, AccountRow>(&format!(
            "{SELECT_ACCOUNT} WHERE username = $1 FOR UPDATE"
        ))
        .bind(username)
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("lock_by_username", e))?;

        Ok(row.map(Into::into))
    }

    async fn set_balance(&mut self, id: AccountId, balance: Balance) -> Result<(), StoreError> {
        let result = sqlx::query("UPDATE accounts SET balance = $2 WHERE id = $1")
            .bind(id.get())
            .bind(balance)
            .execute(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("set_balance", e))?;

        if result.rows_affected() != 1 {
            return Err(StoreError::Backend(format!(
                "balance update for account {} touched {} rows",
                id,
                result.rows_affected()
            )));
        }

        Ok(())
    }

    async fn commit(self) -> Result<(), StoreError> {
        self.tx
            .commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))
    }

    async fn rollback(self) -> Result<(), StoreError> {
        self.tx
            .rollback()
            .await
            .map_err(|e| map_sqlx_error("rollback", e))
    }
}

fn map_sqlx_error(operation: &str, err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::Database(db_err) => {
            let msg = format!("database error in {}: {}", operation, db_err.message());

            match db_err.code().as_deref() {
                Some(code) => classify_sqlstate(code, db_err.constraint(), msg),
                None => StoreError::Backend(msg),
            }
        }
        sqlx::Error::Io(e) => StoreError::Transient(format!("io error in {}: {}", operation, e)),
        sqlx::Error::PoolTimedOut => {
            StoreError::Transient(format!("connection pool timed out in {}", operation))
        }
        other => StoreError::Backend(format!("error in {}: {}", operation, other)),
    }
}

fn classify_sqlstate(code: &str, constraint: Option<&str>, msg: String) -> StoreError {
    match code {
        "23505" => StoreError::UniqueViolation(Constraint::from_name(constraint)),
        "40001" | "40P01" => StoreError::Transient(msg),
        _ => StoreError::Backend(msg),
    }
}

// SQLx row types

#[derive(Debug, FromRow)]
struct AccountRow {
    id: i64,
    username: String,
    password: String,
    balance: i64,
    time_donate: Option<DateTime<Utc>>,
}

impl From<AccountRow> for Account {
    fn from(row: AccountRow) -> Self {
        Account {
            id: AccountId::new(row.id),
            username: row.username,
            password: row.password,
            balance: row.balance,
            time_donate: row.time_donate,
        }
    }
}
