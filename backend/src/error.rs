//! Error handling for the estate weighbridge server
//!
//! Error bodies carry English and Indonesian messages.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use shared::DomainError;
use thiserror::Error;

/// Application error types
#[derive(Error, Debug)]
pub enum AppError {
    // Authentication errors
    #[error("Token expired")]
    TokenExpired,

    #[error("Unauthorized: {message}")]
    Unauthorized { message: String, message_id: String },

    /// Company switch or registry missing for the requested operation
    #[error("{0}")]
    Forbidden(String),

    // Validation errors
    #[error("Validation error: {message}")]
    Validation {
        field: String,
        message: String,
        message_id: String,
    },

    #[error("{0}")]
    ValidationError(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    InvalidStateTransition(String),

    #[error("Database error: {0}")]
    DatabaseError(#[from] sqlx::Error),

    #[error("Stored data is malformed: {0}")]
    CorruptRecord(String),

    #[error("Internal server error: {0}")]
    Internal(String),

    #[error("Internal server error")]
    InternalError(#[from] anyhow::Error),
}

impl From<DomainError> for AppError {
    fn from(err: DomainError) -> Self {
        match err {
            DomainError::Validation(msg) => AppError::ValidationError(msg),
            DomainError::NotFound(msg) => AppError::NotFound(msg),
            DomainError::InvalidState(msg) => AppError::InvalidStateTransition(msg),
        }
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(errors: validator::ValidationErrors) -> Self {
        let field = errors
            .field_errors()
            .keys()
            .next()
            .map(|f| f.to_string())
            .unwrap_or_default();
        AppError::Validation {
            message: format!("Invalid value for {}", field),
            message_id: format!("Nilai tidak valid untuk {}", field),
            field,
        }
    }
}

impl AppError {
    /// Message reported in a failed batch item.
    ///
    /// Domain messages pass through unchanged; infrastructure failures are
    /// reduced to a generic text.
    pub fn item_message(&self) -> String {
        match self {
            AppError::DatabaseError(_) => "A database error occurred".to_string(),
            AppError::InternalError(_) => "An internal server error occurred".to_string(),
            AppError::Validation { message, .. } => message.clone(),
            other => other.to_string(),
        }
    }
}

/// Error response structure
#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: ErrorDetail,
}

#[derive(Serialize)]
pub struct ErrorDetail {
    pub code: String,
    pub message_en: String,
    pub message_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
}

impl ErrorDetail {
    pub fn new(code: &str, message_en: impl Into<String>, message_id: impl Into<String>) -> Self {
        Self {
            code: code.to_string(),
            message_en: message_en.into(),
            message_id: message_id.into(),
            field: None,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_detail) = match &self {
            AppError::TokenExpired => (
                StatusCode::UNAUTHORIZED,
                ErrorDetail::new("TOKEN_EXPIRED", "Token has expired", "Token sudah kedaluwarsa"),
            ),
            AppError::Unauthorized { message, message_id } => (
                StatusCode::UNAUTHORIZED,
                ErrorDetail::new("UNAUTHORIZED", message.clone(), message_id.clone()),
            ),
            AppError::Forbidden(msg) => (
                StatusCode::BAD_REQUEST,
                ErrorDetail::new("FORBIDDEN", msg.clone(), "Anda tidak memiliki akses"),
            ),
            AppError::Validation { field, message, message_id } => (
                StatusCode::BAD_REQUEST,
                ErrorDetail {
                    code: "VALIDATION_ERROR".to_string(),
                    message_en: message.clone(),
                    message_id: message_id.clone(),
                    field: Some(field.clone()),
                },
            ),
            AppError::ValidationError(msg) => (
                StatusCode::BAD_REQUEST,
                ErrorDetail::new(
                    "VALIDATION_ERROR",
                    msg.clone(),
                    format!("Data tidak valid: {}", msg),
                ),
            ),
            AppError::NotFound(msg) => (
                StatusCode::NOT_FOUND,
                ErrorDetail::new("NOT_FOUND", msg.clone(), format!("Tidak ditemukan: {}", msg)),
            ),
            AppError::InvalidStateTransition(msg) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                ErrorDetail::new(
                    "INVALID_STATE_TRANSITION",
                    msg.clone(),
                    format!("Status tidak dapat diubah: {}", msg),
                ),
            ),
            AppError::DatabaseError(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                ErrorDetail::new(
                    "DATABASE_ERROR",
                    "A database error occurred",
                    "Terjadi kesalahan pada basis data",
                ),
            ),
            AppError::CorruptRecord(msg) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                ErrorDetail::new(
                    "CORRUPT_RECORD",
                    format!("Stored data is malformed: {}", msg),
                    "Data tersimpan rusak",
                ),
            ),
            AppError::Internal(msg) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                ErrorDetail::new("INTERNAL_ERROR", msg.clone(), "Terjadi kesalahan pada server"),
            ),
            AppError::InternalError(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                ErrorDetail::new(
                    "INTERNAL_ERROR",
                    "An internal server error occurred",
                    "Terjadi kesalahan pada server",
                ),
            ),
        };

        tracing::error!("Error: {:?}", self);

        (status, Json(ErrorResponse { error: error_detail })).into_response()
    }
}

/// Result type alias for handlers and services
pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn domain_messages_reach_batch_items_unchanged() {
        let err: AppError = DomainError::validation("Employee contract is not active").into();
        assert_eq!(err.item_message(), "Employee contract is not active");

        let err: AppError = DomainError::not_found("Record Not Found").into();
        assert_eq!(err.item_message(), "Record Not Found");
    }

    #[test]
    fn database_failures_are_masked() {
        let err = AppError::DatabaseError(sqlx::Error::RowNotFound);
        assert_eq!(err.item_message(), "A database error occurred");
    }

    #[test]
    fn domain_validation_maps_to_bad_request() {
        let response = AppError::from(DomainError::validation("x")).into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let response = AppError::from(DomainError::invalid_state("y")).into_response();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    }
}
