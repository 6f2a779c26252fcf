//! API error types and responses.

use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use usage_ledger_core::{Counter, LedgerError};
use usage_ledger_store::StoreError;

use crate::stripe::StripeError;

/// API error type.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Unauthorized - missing or invalid credentials.
    #[error("unauthorized")]
    Unauthorized,

    /// Resource not found.
    #[error("not found: {0}")]
    NotFound(String),

    /// Bad request - missing or malformed input.
    #[error("bad request: {0}")]
    BadRequest(String),

    /// Counter cannot cover the debit.
    #[error("insufficient {counter} balance: balance={balance}, required={required}")]
    InsufficientBalance {
        /// The counter that was debited.
        counter: Counter,
        /// Current balance.
        balance: i64,
        /// Required amount.
        required: i64,
    },

    /// Conflict - concurrent update or already-applied reference.
    #[error("conflict: {0}")]
    Conflict(String),

    /// Payment provider call failed or is not configured.
    #[error("upstream failure: {0}")]
    Upstream(String),

    /// Internal server error.
    #[error("internal error: {0}")]
    Internal(String),
}

/// JSON error response body.
#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: ErrorBody,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    code: String,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<serde_json::Value>,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code, message, details) = match &self {
            Self::Unauthorized => (
                StatusCode::UNAUTHORIZED,
                "unauthorized",
                self.to_string(),
                None,
            ),
            Self::NotFound(msg) => (StatusCode::NOT_FOUND, "not_found", msg.clone(), None),
            Self::BadRequest(msg) => (StatusCode::BAD_REQUEST, "bad_request", msg.clone(), None),
            Self::InsufficientBalance {
                counter,
                balance,
                required,
            } => (
                StatusCode::BAD_REQUEST,
                "insufficient_balance",
                self.to_string(),
                Some(serde_json::json!({
                    "counter": counter,
                    "balance": balance,
                    "required": required
                })),
            ),
            Self::Conflict(msg) => (StatusCode::CONFLICT, "conflict", msg.clone(), None),
            Self::Upstream(msg) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "upstream_failure",
                msg.clone(),
                None,
            ),
            Self::Internal(msg) => {
                tracing::error!(error = %msg, "Internal server error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal_error",
                    "An internal error occurred".to_string(),
                    None,
                )
            }
        };

        let body = ErrorResponse {
            error: ErrorBody {
                code: code.to_string(),
                message,
                details,
            },
        };

        (status, Json(body)).into_response()
    }
}

impl From<LedgerError> for ApiError {
    fn from(err: LedgerError) -> Self {
        match err {
            LedgerError::InsufficientBalance {
                counter,
                balance,
                required,
            } => Self::InsufficientBalance {
                counter,
                balance,
                required,
            },
            LedgerError::NoActiveSubscription { .. } => Self::NotFound(err.to_string()),
            LedgerError::InvalidAmount(_)
            | LedgerError::UnknownPack { .. }
            | LedgerError::BelowMinimum { .. }
            | LedgerError::InvalidId(_) => Self::BadRequest(err.to_string()),
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound { entity, id } => Self::NotFound(format!("{entity} not found: {id}")),
            StoreError::VersionConflict { .. } | StoreError::DuplicateReference { .. } => {
                Self::Conflict(err.to_string())
            }
            StoreError::Database(msg) | StoreError::Serialization(msg) => Self::Internal(msg),
        }
    }
}

impl From<StripeError> for ApiError {
    fn from(err: StripeError) -> Self {
        Self::Upstream(format!("payment provider error: {err}"))
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::BadRequest(rejection.body_text())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        Self::BadRequest(rejection.body_text())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ledger_errors_map_to_validation_and_not_found() {
        let err: ApiError = LedgerError::BelowMinimum {
            amount_cents: 4999,
            minimum_cents: 5000,
        }
        .into();
        assert!(matches!(err, ApiError::BadRequest(_)));

        let err: ApiError = LedgerError::NoActiveSubscription {
            email: "lp@example.com".into(),
        }
        .into();
        assert!(matches!(err, ApiError::NotFound(_)));
    }

    #[test]
    fn insufficient_balance_is_bad_request() {
        let response = ApiError::InsufficientBalance {
            counter: Counter::Credits,
            balance: 10,
            required: 20,
        }
        .into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn upstream_failure_is_server_error() {
        let response = ApiError::Upstream("card declined".into()).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn store_conflicts_map_to_conflict() {
        let err: ApiError = StoreError::VersionConflict {
            subscription_id: "sub_1".into(),
            expected: 1,
            actual: 2,
        }
        .into();
        assert!(matches!(err, ApiError::Conflict(_)));
    }
}
