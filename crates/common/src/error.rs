//! Common error types and handling for Reelcast

use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

/// Common result type
pub type Result<T> = std::result::Result<T, Error>;

/// Common error type for the Reelcast application.
///
/// Every failure in the admission and worker pipelines becomes one of these
/// variants and is mapped to HTTP exactly once, in `IntoResponse`.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Unexpected error: {0}")]
    Unexpected(#[from] anyhow::Error),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Authentication error: {0}")]
    Authentication(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Idempotency conflict: {0}")]
    IdempotencyConflict(String),

    #[error("{message}")]
    RateLimited {
        message: String,
        retry_after_seconds: i64,
    },

    #[error("Quota exceeded: {0}")]
    QuotaExceeded(String),

    #[error("{message}")]
    ConcurrencyLimit {
        message: String,
        retry_after_seconds: i64,
    },

    #[error("Key/value store error: {0}")]
    KvStore(String),

    #[error("Dispatch error: {0}")]
    Dispatch(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Get the appropriate HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            Error::Authentication(_) => StatusCode::UNAUTHORIZED,
            Error::Forbidden(_) | Error::QuotaExceeded(_) => StatusCode::FORBIDDEN,
            Error::Validation(_) | Error::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            Error::NotFound(_) => StatusCode::NOT_FOUND,
            Error::IdempotencyConflict(_) => StatusCode::CONFLICT,
            Error::RateLimited { .. } | Error::ConcurrencyLimit { .. } => {
                StatusCode::TOO_MANY_REQUESTS
            }
            Error::Unexpected(_)
            | Error::Database(_)
            | Error::Serialization(_)
            | Error::KvStore(_)
            | Error::Dispatch(_)
            | Error::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Stable error code surfaced to API clients
    pub fn error_code(&self) -> &'static str {
        match self {
            Error::Validation(_) => "VALIDATION_ERROR",
            Error::InvalidRequest(_) => "INVALID_REQUEST",
            Error::Authentication(_) => "UNAUTHORIZED",
            Error::Forbidden(_) => "FORBIDDEN",
            Error::NotFound(_) => "NOT_FOUND",
            Error::IdempotencyConflict(_) => "IDEMPOTENCY_CONFLICT",
            Error::RateLimited { .. } => "RATE_LIMITED",
            Error::QuotaExceeded(_) => "QUOTA_EXCEEDED",
            Error::ConcurrencyLimit { .. } => "CONCURRENCY_LIMIT",
            Error::Unexpected(_)
            | Error::Database(_)
            | Error::Serialization(_)
            | Error::KvStore(_)
            | Error::Dispatch(_)
            | Error::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Seconds the client should wait before retrying, when applicable
    pub fn retry_after_seconds(&self) -> Option<i64> {
        match self {
            Error::RateLimited {
                retry_after_seconds,
                ..
            }
            | Error::ConcurrencyLimit {
                retry_after_seconds,
                ..
            } => Some(*retry_after_seconds),
            _ => None,
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let error_code = self.error_code();
        let retry_after = self.retry_after_seconds();

        // Internal messages stay in the logs; clients get a generic message.
        let message = if status == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!(error = %self, "Internal server error");
            "Internal server error".to_string()
        } else {
            self.to_string()
        };

        let body = Json(json!({
            "success": false,
            "error": {
                "code": error_code,
                "message": message,
            }
        }));

        let mut response = (status, body).into_response();
        if let Some(seconds) = retry_after {
            if let Ok(value) = HeaderValue::from_str(&seconds.to_string()) {
                response.headers_mut().insert(header::RETRY_AFTER, value);
            }
        }
        response
    }
}
