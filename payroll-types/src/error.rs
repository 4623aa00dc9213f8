//! Error types for the payroll service.

use chrono::NaiveDate;

use crate::domain::{EmployeeId, LifecycleAction, PayrollId, PayrollStatus};

/// Domain-level errors (business rule violations).
#[derive(Debug, thiserror::Error)]
pub enum DomainError {
    #[error("{message}")]
    Validation { field: String, message: String },

    #[error("Date from ({from}) must not be after date to ({to})")]
    InvalidPeriod { from: NaiveDate, to: NaiveDate },

    #[error("Reference number already exists: {0}")]
    DuplicateRefNo(String),

    #[error("A payroll already exists for {key} ({existing})")]
    DuplicatePeriod { key: String, existing: PayrollId },

    #[error("Employee not found: {0}")]
    EmployeeNotFound(EmployeeId),

    #[error("Payroll not found: {0}")]
    PayrollNotFound(PayrollId),

    #[error("Cannot {action} a payroll in {status} status; only PENDING payrolls can change")]
    IllegalTransition {
        status: PayrollStatus,
        action: LifecycleAction,
    },

    #[error("Payroll fields are immutable once generated: {0}")]
    ImmutableField(String),

    #[error("Monetary amount overflow")]
    Overflow,
}

impl DomainError {
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        DomainError::Validation {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// Repository-level errors (data access failures).
#[derive(Debug, thiserror::Error)]
pub enum RepoError {
    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Transaction error: {0}")]
    Transaction(String),

    #[error("Entity not found")]
    NotFound,

    #[error("Conflict: {0}")]
    Conflict(String),
}

/// Application-level errors (for HTTP responses).
///
/// Maps cleanly to HTTP status codes.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("{message}")]
    Validation { field: String, message: String },

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<DomainError> for AppError {
    fn from(err: DomainError) -> Self {
        match err {
            DomainError::Validation { field, message } => AppError::Validation { field, message },
            e @ DomainError::InvalidPeriod { .. } => AppError::Validation {
                field: "date_from".into(),
                message: e.to_string(),
            },
            e @ (DomainError::DuplicateRefNo(_)
            | DomainError::DuplicatePeriod { .. }
            | DomainError::IllegalTransition { .. }
            | DomainError::ImmutableField(_)) => AppError::Conflict(e.to_string()),
            e @ (DomainError::EmployeeNotFound(_) | DomainError::PayrollNotFound(_)) => {
                AppError::NotFound(e.to_string())
            }
            e @ DomainError::Overflow => AppError::BadRequest(e.to_string()),
        }
    }
}

impl From<RepoError> for AppError {
    fn from(err: RepoError) -> Self {
        match err {
            RepoError::Domain(e) => e.into(),
            RepoError::NotFound => AppError::NotFound("Resource not found".into()),
            RepoError::Conflict(e) => AppError::Conflict(e),
            RepoError::Database(e) => AppError::Internal(e),
            RepoError::Transaction(e) => AppError::Internal(e),
        }
    }
}
