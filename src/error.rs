//! Error types for the library server

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use utoipa::ToSchema;

/// Stable machine-readable error kinds exposed to API clients
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum ErrorCode {
    Failure = 1,
    NotAuthorized = 2,
    DbFailure = 3,
    NotFound = 4,
    AlreadyLoaned = 5,
    NoActiveLoan = 6,
    Conflict = 7,
    BadValue = 8,
}

/// Current holder of an item, reported when an issue is refused
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct HolderDetails {
    /// Display name of the patron holding the item
    pub holder: String,
    /// When the open loan was issued
    pub issued_at: DateTime<Utc>,
}

/// Main application error type
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Authentication failed: {0}")]
    Authentication(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Item is already loaned to {} since {}", .0.holder, .0.issued_at.format("%d.%m.%Y"))]
    AlreadyLoaned(HolderDetails),

    #[error("No active loan: {0}")]
    NoActiveLoan(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Internal server error: {0}")]
    Internal(String),
}

impl AppError {
    /// Error kind and HTTP status for this error
    pub fn code(&self) -> (StatusCode, ErrorCode) {
        match self {
            AppError::Authentication(_) => (StatusCode::UNAUTHORIZED, ErrorCode::NotAuthorized),
            AppError::NotFound(_) => (StatusCode::NOT_FOUND, ErrorCode::NotFound),
            AppError::AlreadyLoaned(_) => (StatusCode::BAD_REQUEST, ErrorCode::AlreadyLoaned),
            AppError::NoActiveLoan(_) => (StatusCode::NOT_FOUND, ErrorCode::NoActiveLoan),
            AppError::Conflict(_) => (StatusCode::CONFLICT, ErrorCode::Conflict),
            AppError::Validation(_) => (StatusCode::BAD_REQUEST, ErrorCode::BadValue),
            AppError::Database(_) => (StatusCode::INTERNAL_SERVER_ERROR, ErrorCode::DbFailure),
            AppError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, ErrorCode::Failure),
        }
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(errors: validator::ValidationErrors) -> Self {
        AppError::Validation(errors.to_string())
    }
}

/// Error response body
#[derive(Serialize, ToSchema)]
pub struct ErrorResponse {
    pub code: u32,
    pub error: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<HolderDetails>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code) = self.code();

        let message = match &self {
            AppError::Database(e) => {
                tracing::error!("Database error: {:?}", e);
                "Database error".to_string()
            }
            AppError::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                "Internal server error".to_string()
            }
            AppError::Authentication(msg)
            | AppError::NotFound(msg)
            | AppError::NoActiveLoan(msg)
            | AppError::Conflict(msg)
            | AppError::Validation(msg) => msg.clone(),
            AppError::AlreadyLoaned(_) => self.to_string(),
        };

        let details = match self {
            AppError::AlreadyLoaned(details) => Some(details),
            _ => None,
        };

        let body = Json(ErrorResponse {
            code: code as u32,
            error: format!("{:?}", code),
            message,
            details,
        });

        (status, body).into_response()
    }
}

/// Result type alias for application operations
pub type AppResult<T> = Result<T, AppError>;

/// PostgreSQL unique_violation
const PG_UNIQUE_VIOLATION: &str = "23505";
/// PostgreSQL foreign_key_violation
const PG_FOREIGN_KEY_VIOLATION: &str = "23503";

/// Map constraint violations on write paths to domain errors.
///
/// `conflict` and `missing` supply the messages for unique and foreign key
/// violations respectively; other errors stay database errors.
pub fn map_constraint_error(err: sqlx::Error, conflict: &str, missing: &str) -> AppError {
    if let sqlx::Error::Database(ref db_err) = err {
        match db_err.code().as_deref() {
            Some(PG_UNIQUE_VIOLATION) => return AppError::Conflict(conflict.to_string()),
            Some(PG_FOREIGN_KEY_VIOLATION) => return AppError::NotFound(missing.to_string()),
            _ => {}
        }
    }
    AppError::Database(err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_status_codes() {
        assert_eq!(
            AppError::NotFound("x".into()).code(),
            (StatusCode::NOT_FOUND, ErrorCode::NotFound)
        );
        assert_eq!(
            AppError::NoActiveLoan("x".into()).code(),
            (StatusCode::NOT_FOUND, ErrorCode::NoActiveLoan)
        );
        assert_eq!(
            AppError::Conflict("x".into()).code(),
            (StatusCode::CONFLICT, ErrorCode::Conflict)
        );
        assert_eq!(
            AppError::Authentication("x".into()).code().0,
            StatusCode::UNAUTHORIZED
        );
    }

    #[test]
    fn test_already_loaned_message() {
        let err = AppError::AlreadyLoaned(HolderDetails {
            holder: "Ivanov Ivan".to_string(),
            issued_at: Utc.with_ymd_and_hms(2024, 3, 5, 10, 0, 0).unwrap(),
        });
        assert_eq!(err.code().0, StatusCode::BAD_REQUEST);
        assert_eq!(err.to_string(), "Item is already loaned to Ivanov Ivan since 05.03.2024");
    }

    #[test]
    fn test_non_database_errors_pass_through() {
        let err = map_constraint_error(sqlx::Error::RowNotFound, "dup", "missing");
        assert!(matches!(err, AppError::Database(sqlx::Error::RowNotFound)));
    }
}
