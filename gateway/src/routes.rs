//! HTTP routes over the ledger engine.

use axum::extract::rejection::{JsonRejection, PathRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};

use coffer_common::{AccountId, AccountRef};
use coffer_ledger::{Account, AccountStore};

use crate::dto::{
    BalanceQuery, BalanceResponse, BalanceUpdatedResponse, CreateAccountRequest,
    HealthResponse, LoginRequest, LoginResponse, TransferRequest, TransferResponse,
    UpdateBalanceRequest,
};
use crate::errors::ApiError;
use crate::metrics::Operation;
use crate::state::AppState;

type ApiResult<T> = Result<Json<T>, ApiError>;

/// Build the gateway router.
pub fn router<S: AccountStore>(state: AppState<S>) -> Router {
    Router::new()
        .route("/create-account", post(create_account::<S>))
        .route("/login", post(login::<S>))
        .route("/update-balance", post(update_balance::<S>))
        .route("/check-balance", get(check_balance_by_username::<S>))
        .route("/check-balance/:id", get(check_balance_by_id::<S>))
        .route("/transfer", post(transfer::<S>))
        .route("/health", get(health::<S>))
        .route("/metrics", get(metrics::<S>))
        .with_state(state)
}

/// Unwrap an extractor, counting rejections.
fn accept<S, T, R>(state: &AppState<S>, extracted: Result<T, R>) -> Result<T, ApiError>
where
    R: Into<ApiError>,
{
    extracted.map_err(|rejection| {
        state.metrics.malformed_request();
        rejection.into()
    })
}

async fn create_account<S: AccountStore>(
    State(state): State<AppState<S>>,
    body: Result<Json<CreateAccountRequest>, JsonRejection>,
) -> ApiResult<Account> {
    let Json(req) = accept(&state, body)?;

    let result = state.engine.create_account(req.into()).await;
    state.metrics.record(Operation::CreateAccount, &result);

    Ok(Json(result?))
}

async fn login<S: AccountStore>(
    State(state): State<AppState<S>>,
    body: Result<Json<LoginRequest>, JsonRejection>,
) -> ApiResult<LoginResponse> {
    let Json(req) = accept(&state, body)?;

    let result = state.engine.authenticate(&req.username, &req.password).await;
    state.metrics.record(Operation::Login, &result);

    Ok(Json(LoginResponse {
        message: "Login successful",
        account: result?,
    }))
}

async fn update_balance<S: AccountStore>(
    State(state): State<AppState<S>>,
    body: Result<Json<UpdateBalanceRequest>, JsonRejection>,
) -> ApiResult<BalanceUpdatedResponse> {
    let Json(req) = accept(&state, body)?;

    let result = state.engine.adjust_balance(&req.username, req.amount).await;
    state.metrics.record(Operation::UpdateBalance, &result);

    Ok(Json(BalanceUpdatedResponse {
        message: "Balance updated",
        balance: result?.balance_after,
    }))
}

async fn check_balance_by_username<S: AccountStore>(
    State(state): State<AppState<S>>,
    query: Result<Query<BalanceQuery>, QueryRejection>,
) -> ApiResult<BalanceResponse> {
    let Query(query) = accept(&state, query)?;
    check_balance(&state, AccountRef::Username(query.username)).await
}

async fn check_balance_by_id<S: AccountStore>(
    State(state): State<AppState<S>>,
    id: Result<Path<i64>, PathRejection>,
) -> ApiResult<BalanceResponse> {
    let Path(id) = accept(&state, id)?;
    check_balance(&state, AccountRef::Id(AccountId::new(id))).await
}

async fn check_balance<S: AccountStore>(
    state: &AppState<S>,
    account: AccountRef,
) -> ApiResult<BalanceResponse> {
    let result = state.engine.check_balance(&account).await;
    state.metrics.record(Operation::CheckBalance, &result);

    Ok(Json(BalanceResponse { balance: result? }))
}

async fn transfer<S: AccountStore>(
    State(state): State<AppState<S>>,
    body: Result<Json<TransferRequest>, JsonRejection>,
) -> ApiResult<TransferResponse> {
    let Json(req) = accept(&state, body)?;

    let result = state
        .engine
        .transfer(
            AccountId::new(req.from_user_id),
            AccountId::new(req.to_user_id),
            req.amount,
        )
        .await;
    state.metrics.record(Operation::Transfer, &result);

    Ok(Json(TransferResponse {
        message: "Transfer successful",
        receipt: result?,
    }))
}

async fn health<S: AccountStore>(State(state): State<AppState<S>>) -> impl IntoResponse {
    let current = state.state();
    let status = if current.accepts_requests() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (
        status,
        Json(HealthResponse {
            status: current.as_str(),
        }),
    )
}

async fn metrics<S: AccountStore>(State(state): State<AppState<S>>) -> impl IntoResponse {
    (
        [("content-type", "text/plain; version=0.0.4")],
        state.metrics.to_prometheus(),
    )
}
