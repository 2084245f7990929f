//! Request and response bodies.

use serde::{Deserialize, Serialize};

use coffer_common::{AccountId, Balance};
use coffer_ledger::{Account, NewAccount, TransferReceipt};

#[derive(Debug, Deserialize)]
pub struct CreateAccountRequest {
    /// Omit to let the store assign an id.
    #[serde(default)]
    pub id: Option<i64>,
    pub username: String,
    pub password: String,
    #[serde(default)]
    pub balance: Balance,
}

impl From<CreateAccountRequest> for NewAccount {
    fn from(req: CreateAccountRequest) -> Self {
        let account = NewAccount::new(req.username, req.password, req.balance);
        match req.id {
            Some(id) => account.with_id(AccountId::new(id)),
            None => account,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct UpdateBalanceRequest {
    pub username: String,
    pub amount: Balance,
}

#[derive(Debug, Deserialize)]
pub struct BalanceQuery {
    pub username: String,
}

#[derive(Debug, Deserialize)]
pub struct TransferRequest {
    pub from_user_id: i64,
    pub to_user_id: i64,
    pub amount: Balance,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub message: &'static str,
    pub account: Account,
}

#[derive(Debug, Serialize)]
pub struct BalanceUpdatedResponse {
    pub message: &'static str,
    pub balance: Balance,
}

#[derive(Debug, Serialize)]
pub struct BalanceResponse {
    pub balance: Balance,
}

#[derive(Debug, Serialize)]
pub struct TransferResponse {
    pub message: &'static str,
    pub receipt: TransferReceipt,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
}
