//! Mapping of ledger failures onto HTTP responses.

use axum::extract::rejection::{JsonRejection, PathRejection, QueryRejection};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use tracing::error;

use coffer_common::{ErrorKind, LedgerError};

/// Error returned by every handler.
#[derive(Debug)]
pub enum ApiError {
    /// The ledger refused or failed the operation.
    Ledger(LedgerError),
    /// The request could not be decoded.
    Malformed(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Ledger(e) => status_for(e.kind()),
            ApiError::Malformed(_) => StatusCode::BAD_REQUEST,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            ApiError::Ledger(e) => e.error_code(),
            ApiError::Malformed(_) => "MALFORMED_REQUEST",
        }
    }
}

/// One status per error kind.
pub fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::NotFound => StatusCode::NOT_FOUND,
        ErrorKind::Conflict => StatusCode::CONFLICT,
        ErrorKind::Unauthorized => StatusCode::UNAUTHORIZED,
        ErrorKind::InsufficientFunds => StatusCode::UNPROCESSABLE_ENTITY,
        ErrorKind::InvalidArgument => StatusCode::BAD_REQUEST,
        ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl From<LedgerError> for ApiError {
    fn from(err: LedgerError) -> Self {
        ApiError::Ledger(err)
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::Malformed(rejection.body_text())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        ApiError::Malformed(rejection.body_text())
    }
}

impl From<PathRejection> for ApiError {
    fn from(rejection: PathRejection) -> Self {
        ApiError::Malformed(rejection.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let code = self.code();

        let message = match self {
            ApiError::Ledger(LedgerError::Store(e)) => {
                error!(error = %e, "Store failure");
                "the account store could not complete the request".to_string()
            }
            ApiError::Ledger(e) => e.to_string(),
            ApiError::Malformed(msg) => msg,
        };

        json_error(status, code, message)
    }
}

pub fn json_error(status: StatusCode, code: &'static str, message: impl Into<String>) -> Response {
    (
        status,
        axum::Json(json!({
            "error": code,
            "message": message.into(),
        })),
    )
        .into_response()
}
