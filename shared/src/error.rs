//! Domain error type shared by the premi engine and the weighbridge lifecycle

use thiserror::Error;

/// Errors raised by domain operations.
///
/// `Validation` is the user-visible class: it aborts the current operation
/// and its message is returned to the caller unchanged.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DomainError {
    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    InvalidState(String),
}

impl DomainError {
    pub fn validation(message: impl Into<String>) -> Self {
        DomainError::Validation(message.into())
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        DomainError::NotFound(message.into())
    }

    pub fn invalid_state(message: impl Into<String>) -> Self {
        DomainError::InvalidState(message.into())
    }
}

pub type DomainResult<T> = Result<T, DomainError>;
