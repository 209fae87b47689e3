//! Centralized API error handling for the QuickCash backend
//!
//! Every business-rule violation in the loan core maps to a typed variant
//! with a stable machine-readable code. HTTP status mapping lives here so
//! the core services never decide transport codes themselves.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

/// API error type with HTTP status code mapping
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Borrower already has an unsettled loan")]
    DuplicateActiveLoan,

    #[error("Loan has already been processed")]
    AlreadyProcessed,

    #[error("Invalid loan state: {0}")]
    InvalidLoanState(String),

    #[error("Payment amount must be greater than zero")]
    InvalidAmount,

    #[error("Payment amount exceeds the remaining loan balance")]
    Overpayment,

    #[error("Invalid term: {0} weeks. Only 1-4 weeks are allowed")]
    InvalidTerm(i32),

    #[error("Operation could not acquire the loan record in time, retry: {0}")]
    Concurrency(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Internal server error: {0}")]
    Internal(String),
}

/// JSON error response body
#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: ErrorDetails,
}

/// Error details in the response
#[derive(Serialize)]
pub struct ErrorDetails {
    pub code: String,
    pub message: String,
    pub retryable: bool,
}

impl ApiError {
    /// Get the error code string
    pub fn error_code(&self) -> &'static str {
        match self {
            ApiError::NotFound(_) => "NOT_FOUND",
            ApiError::Validation(_) => "VALIDATION_ERROR",
            ApiError::DuplicateActiveLoan => "DUPLICATE_ACTIVE_LOAN",
            ApiError::AlreadyProcessed => "ALREADY_PROCESSED",
            ApiError::InvalidLoanState(_) => "INVALID_LOAN_STATE",
            ApiError::InvalidAmount => "INVALID_AMOUNT",
            ApiError::Overpayment => "OVERPAYMENT",
            ApiError::InvalidTerm(_) => "INVALID_TERM",
            ApiError::Concurrency(_) => "CONCURRENCY",
            ApiError::Unauthorized(_) => "UNAUTHORIZED",
            ApiError::Forbidden(_) => "FORBIDDEN",
            ApiError::Database(_) => "DATABASE_ERROR",
            ApiError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Get the HTTP status code
    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Validation(_) => StatusCode::BAD_REQUEST,
            ApiError::DuplicateActiveLoan => StatusCode::CONFLICT,
            ApiError::AlreadyProcessed => StatusCode::CONFLICT,
            ApiError::InvalidLoanState(_) => StatusCode::CONFLICT,
            ApiError::InvalidAmount => StatusCode::BAD_REQUEST,
            ApiError::Overpayment => StatusCode::BAD_REQUEST,
            ApiError::InvalidTerm(_) => StatusCode::BAD_REQUEST,
            ApiError::Concurrency(_) => StatusCode::CONFLICT,
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Whether the caller may retry the same request unchanged
    pub fn is_retryable(&self) -> bool {
        matches!(self, ApiError::Concurrency(_))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let error_code = self.error_code();
        let message = self.to_string();

        match &self {
            ApiError::Database(_) | ApiError::Internal(_) => {
                tracing::error!(error = %message, code = %error_code, "Server error occurred");
            }
            _ => {
                tracing::debug!(error = %message, code = %error_code, "Client error occurred");
            }
        }

        let body = ErrorResponse {
            error: ErrorDetails {
                code: error_code.to_string(),
                message,
                retryable: self.is_retryable(),
            },
        };

        (status, Json(body)).into_response()
    }
}

// Convenience conversions from common error types

impl From<sqlx::Error> for ApiError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::RowNotFound => ApiError::NotFound("Resource not found".to_string()),
            sqlx::Error::Database(db) => match db.code().as_deref() {
                // lock_not_available, serialization_failure, deadlock_detected:
                // the transaction lost a race and is safe to retry.
                Some("55P03") | Some("40001") | Some("40P01") => {
                    ApiError::Concurrency(db.message().to_string())
                }
                _ => ApiError::Database(db.message().to_string()),
            },
            sqlx::Error::PoolTimedOut => ApiError::Concurrency(err.to_string()),
            _ => ApiError::Database(err.to_string()),
        }
    }
}

impl From<validator::ValidationErrors> for ApiError {
    fn from(err: validator::ValidationErrors) -> Self {
        ApiError::Validation(err.to_string())
    }
}

impl From<serde_json::Error> for ApiError {
    fn from(err: serde_json::Error) -> Self {
        ApiError::Validation(format!("Invalid JSON: {}", err))
    }
}

/// Returns the violated constraint name for a unique-violation error, if any.
pub fn unique_violation(err: &sqlx::Error) -> Option<&str> {
    match err {
        sqlx::Error::Database(db) if db.code().as_deref() == Some("23505") => db.constraint(),
        _ => None,
    }
}

/// Result type alias using ApiError
pub type ApiResult<T> = Result<T, ApiError>;
