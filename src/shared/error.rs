//! Application Error Types
//!
//! One error type for every layer, rendered as `{code, message, errors?}`.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use validator::ValidationErrors;

/// Application error type
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Service unavailable: {0}")]
    Unavailable(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Validation error: {}", summarize(.0))]
    Validation(Vec<FieldError>),
}

/// Field-level validation error
#[derive(Debug, Clone, Serialize)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

fn summarize(fields: &[FieldError]) -> String {
    match fields.first() {
        Some(first) => format!("{}: {}", first.field, first.message),
        None => "invalid request".to_string(),
    }
}

fn database_unreachable(e: &sqlx::Error) -> bool {
    matches!(
        e,
        sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_)
    )
}

/// SQLSTATE classes that describe the server's condition rather than the
/// statement: connection exceptions, transaction rollbacks (serialization
/// failures, deadlocks), insufficient resources and operator intervention.
fn retryable_sqlstate(code: &str) -> bool {
    matches!(code.get(..2), Some("08" | "40" | "53" | "57"))
}

fn database_transient(e: &sqlx::Error) -> bool {
    match e {
        sqlx::Error::Database(db) => db.code().is_some_and(|code| retryable_sqlstate(&code)),
        e => database_unreachable(e),
    }
}

fn redis_transient(e: &redis::RedisError) -> bool {
    e.is_io_error() || e.is_timeout()
}

impl AppError {
    /// Whether retrying the same operation later can succeed.
    ///
    /// Only an unreachable or overloaded backend is transient. Decode
    /// failures, constraint and data errors (SQLSTATE 22, 23) and missing
    /// rows fail the same way on every attempt.
    pub fn is_transient(&self) -> bool {
        match self {
            AppError::Unavailable(_) => true,
            AppError::Database(e) => database_transient(e),
            AppError::Redis(e) => redis_transient(e),
            _ => false,
        }
    }

    /// HTTP status and numeric error code.
    fn classify(&self) -> (StatusCode, u16) {
        match self {
            AppError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, 10000),
            AppError::NotFound(_) => (StatusCode::NOT_FOUND, 10001),
            AppError::BadRequest(_) => (StatusCode::BAD_REQUEST, 10002),
            AppError::Unauthorized(_) => (StatusCode::UNAUTHORIZED, 10003),
            AppError::Forbidden(_) => (StatusCode::FORBIDDEN, 10004),
            AppError::Validation(_) => (StatusCode::BAD_REQUEST, 10007),
            AppError::Unavailable(_) => (StatusCode::SERVICE_UNAVAILABLE, 10008),
            AppError::Database(e) if database_unreachable(e) => (StatusCode::SERVICE_UNAVAILABLE, 10008),
            AppError::Database(_) => (StatusCode::INTERNAL_SERVER_ERROR, 10000),
            AppError::Redis(e) if redis_transient(e) => {
                (StatusCode::SERVICE_UNAVAILABLE, 10008)
            }
            AppError::Redis(_) => (StatusCode::INTERNAL_SERVER_ERROR, 10000),
        }
    }
}

/// Error response body
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub code: u16,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub errors: Option<Vec<FieldError>>,
}

impl From<ValidationErrors> for AppError {
    fn from(errors: ValidationErrors) -> Self {
        let mut fields: Vec<FieldError> = errors
            .field_errors()
            .iter()
            .flat_map(|(field, errs)| {
                errs.iter().map(move |e| FieldError {
                    field: field.to_string(),
                    message: e
                        .message
                        .as_ref()
                        .map(|m| m.to_string())
                        .unwrap_or_else(|| e.code.to_string()),
                })
            })
            .collect();
        fields.sort_by(|a, b| a.field.cmp(&b.field));
        AppError::Validation(fields)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code) = self.classify();

        // Server-side details stay in the log
        let message = if status.is_server_error() {
            tracing::error!(error = %self, status = status.as_u16(), "Request failed");
            match status {
                StatusCode::SERVICE_UNAVAILABLE => "Service temporarily unavailable".to_string(),
                _ => "Internal server error".to_string(),
            }
        } else {
            match &self {
                AppError::NotFound(msg)
                | AppError::BadRequest(msg)
                | AppError::Unauthorized(msg)
                | AppError::Forbidden(msg) => msg.clone(),
                other => other.to_string(),
            }
        };

        let errors = match self {
            AppError::Validation(fields) => Some(fields),
            _ => None,
        };

        (status, Json(ErrorResponse { code, message, errors })).into_response()
    }
}
