//! services/api/src/error.rs
//!
//! Defines the primary error type for the entire API service and its mapping
//! onto HTTP responses.

use crate::config::ConfigError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use carelink_core::error::{AuthErrorKind, CareError};
use serde::Serialize;

/// Structured error response body.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: ErrorDetail,
}

#[derive(Debug, Serialize)]
pub struct ErrorDetail {
    pub code: &'static str,
    pub message: String,
}

/// The primary error type for the `api` service.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Represents an error that occurred during configuration loading.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Represents a failed core operation.
    #[error(transparent)]
    Care(#[from] CareError),

    /// Represents an error from the underlying database library.
    #[error("Database Error: {0}")]
    Database(#[from] sqlx::Error),

    /// Represents a failure to apply the database migrations.
    #[error("Migration Error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// Represents a standard Input/Output error (e.g., binding to a network socket).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Authentication required")]
    Unauthorized,

    #[error("Invalid request: {0}")]
    BadRequest(String),

    /// A catch-all for any other unexpected errors.
    #[error("An unexpected internal error occurred: {0}")]
    Internal(String),
}

fn auth_status(kind: AuthErrorKind) -> (StatusCode, &'static str) {
    match kind {
        AuthErrorKind::InvalidCredentials => (StatusCode::UNAUTHORIZED, "INVALID_CREDENTIALS"),
        AuthErrorKind::AccountDisabled => (StatusCode::FORBIDDEN, "ACCOUNT_DISABLED"),
        AuthErrorKind::WeakPassword => (StatusCode::BAD_REQUEST, "WEAK_PASSWORD"),
        AuthErrorKind::EmailTaken => (StatusCode::CONFLICT, "EMAIL_TAKEN"),
        AuthErrorKind::Unknown => (StatusCode::UNAUTHORIZED, "AUTH_FAILED"),
    }
}

fn care_status(err: &CareError) -> (StatusCode, &'static str) {
    match err {
        CareError::Validation(_) => (StatusCode::BAD_REQUEST, "VALIDATION"),
        CareError::UserNotFound(_) => (StatusCode::NOT_FOUND, "USER_NOT_FOUND"),
        CareError::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
        CareError::NotPending(_) => (StatusCode::CONFLICT, "NOT_PENDING"),
        CareError::Conflict(_) => (StatusCode::CONFLICT, "CONFLICT"),
        CareError::Forbidden(_) => (StatusCode::FORBIDDEN, "FORBIDDEN"),
        CareError::IncompleteSubmission { .. } => {
            (StatusCode::UNPROCESSABLE_ENTITY, "INCOMPLETE_SUBMISSION")
        }
        CareError::Auth(kind) => auth_status(*kind),
        CareError::Timeout(_) => (StatusCode::GATEWAY_TIMEOUT, "TIMEOUT"),
        CareError::Persistence(_) => (StatusCode::SERVICE_UNAVAILABLE, "STORE_UNAVAILABLE"),
        CareError::PartialWrite { .. } => (StatusCode::INTERNAL_SERVER_ERROR, "PARTIAL_WRITE"),
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            ApiError::Care(err) => {
                let (status, code) = care_status(err);
                let message = match err {
                    CareError::Persistence(detail) | CareError::Timeout(detail) => {
                        tracing::error!(detail, "storage failure");
                        "The data store is unavailable, please retry".to_string()
                    }
                    CareError::PartialWrite { .. } => {
                        tracing::error!("{}", err);
                        err.to_string()
                    }
                    other => other.to_string(),
                };
                (status, code, message)
            }
            ApiError::Unauthorized => (
                StatusCode::UNAUTHORIZED,
                "AUTH_REQUIRED",
                "Authentication required".to_string(),
            ),
            ApiError::BadRequest(detail) => {
                (StatusCode::BAD_REQUEST, "BAD_REQUEST", detail.clone())
            }
            other => {
                tracing::error!(detail = %other, "API internal error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL",
                    "An internal error occurred".to_string(),
                )
            }
        };

        let body = ErrorBody {
            error: ErrorDetail { code, message },
        };
        (status, Json(body)).into_response()
    }
}
