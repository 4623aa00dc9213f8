//! # Payroll Types
//!
//! Domain types, payroll rules and port traits for the payroll service.
//! This crate has ZERO external IO dependencies - only data structures,
//! business rules, and trait definitions.
//!
//! ## Architecture
//!
//! This crate represents the **innermost core** of the hexagonal architecture:
//! - `domain/` - Money, payroll records, the recurrence resolver, the net
//!   salary calculator and the generation guard
//! - `ports/` - Trait definitions that adapters must implement
//! - `dto/` - Data Transfer Objects for API boundaries
//! - `error/` - Domain and application error types

pub mod domain;
pub mod dto;
pub mod error;
pub mod ports;

// Re-export commonly used types
pub use domain::{
    ApiKey, ApiKeyId, Attendance, CategoryId, Employee, EmployeeId, LifecycleAction, Money,
    PayRecurrence, PayrollId, PayrollLine, PayrollPeriod, PayrollSnapshot, PayrollStatus,
    PeriodType, PeriodWindow, RecurrenceId, RecurrenceKind, RecurrenceType, Role,
    SalaryBreakdown,
};
pub use dto::*;
pub use error::{AppError, DomainError, RepoError};
pub use ports::{ApiKeyStore, EmployeeDirectory, PayrollRepository, PayrollStore};
