use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};
use chrono::Utc;
use serde::Serialize;

use crate::domain::ledger::LedgerError;
use crate::domain::order::OrderError;
use crate::domain::FailureKind;
use crate::store::StoreError;
use crate::utils::IsTransient;

/// Error returned by every HTTP handler.
///
/// ```json
/// {
///   "timestamp": "2024-11-15T10:30:00Z",
///   "status": 400,
///   "error": "Bad Request",
///   "code": "INSUFFICIENT_BALANCE",
///   "message": "Insufficient balance for alice@example.com. Required: $300.00"
/// }
/// ```
#[derive(Debug, thiserror::Error)]
#[error("{message}")]
pub struct ApiError {
    kind: FailureKind,
    message: String,
}

#[derive(Debug, Serialize)]
struct ErrorBody<'a> {
    timestamp: String,
    status: u16,
    error: &'a str,
    code: &'a str,
    message: &'a str,
}

impl ApiError {
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(FailureKind::Validation, message)
    }
}

impl From<OrderError> for ApiError {
    fn from(e: OrderError) -> Self {
        Self::new(e.kind(), e.to_string())
    }
}

impl From<LedgerError> for ApiError {
    fn from(e: LedgerError) -> Self {
        Self::new(e.kind(), e.to_string())
    }
}

impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> Self {
        let kind = if e.is_transient() {
            FailureKind::DownstreamUnavailable
        } else {
            FailureKind::Internal
        };
        Self::new(kind, e.to_string())
    }
}

impl ResponseError for ApiError {
    fn status_code(&self) -> StatusCode {
        match self.kind {
            FailureKind::Validation | FailureKind::ProductNotFound | FailureKind::InsufficientBalance => {
                StatusCode::BAD_REQUEST
            }
            FailureKind::AccountNotFound | FailureKind::OrderNotFound => StatusCode::NOT_FOUND,
            FailureKind::DuplicateReference => StatusCode::CONFLICT,
            FailureKind::DownstreamUnavailable => StatusCode::SERVICE_UNAVAILABLE,
            FailureKind::Serialization | FailureKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let status = self.status_code();

        if status.is_server_error() {
            tracing::error!(code = self.kind.code(), error = %self.message, "Request failed");
        } else {
            tracing::debug!(code = self.kind.code(), error = %self.message, "Request rejected");
        }

        HttpResponse::build(status).json(ErrorBody {
            timestamp: Utc::now().to_rfc3339(),
            status: status.as_u16(),
            error: status.canonical_reason().unwrap_or("Error"),
            code: self.kind.code(),
            message: &self.message,
        })
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

/// Reject malformed JSON bodies and query strings with the same error body
/// as any other validation failure.
pub fn json_config() -> actix_web::web::JsonConfig {
    actix_web::web::JsonConfig::default()
        .error_handler(|err, _req| ApiError::validation(format!("Malformed request body: {}", err)).into())
}

pub fn query_config() -> actix_web::web::QueryConfig {
    actix_web::web::QueryConfig::default()
        .error_handler(|err, _req| ApiError::validation(format!("Malformed query string: {}", err)).into())
}

pub fn path_config() -> actix_web::web::PathConfig {
    actix_web::web::PathConfig::default()
        .error_handler(|err, _req| ApiError::validation(format!("Malformed path: {}", err)).into())
}
