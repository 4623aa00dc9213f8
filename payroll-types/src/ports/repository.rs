//! Payroll repository port.
//!
//! This is the primary port in our hexagonal architecture.
//! Adapters (Postgres, SQLite, in-memory) implement this trait.

use crate::domain::{PayrollId, PayrollPeriod};
use crate::dto::{GeneratePayrollRequest, PayrollFilter, PayrollPage};
use crate::error::RepoError;

/// Persistence and lifecycle operations for payroll records.
///
/// Every mutating operation MUST run as one database transaction.
#[async_trait::async_trait]
pub trait PayrollRepository: Send + Sync + 'static {
    // ─────────────────────────────────────────────────────────────────────────────
    // Generation (MUST be atomic)
    // ─────────────────────────────────────────────────────────────────────────────

    /// Generates a PENDING payroll.
    ///
    /// Inside one transaction: runs the uniqueness guard, loads the employee
    /// and their assignments, resolves and computes the snapshot, inserts it.
    /// Nothing is written if any step fails.
    async fn generate_payroll(&self, req: GeneratePayrollRequest)
    -> Result<PayrollPeriod, RepoError>;

    // ─────────────────────────────────────────────────────────────────────────────
    // Lifecycle (MUST re-read the status in the mutating transaction)
    // ─────────────────────────────────────────────────────────────────────────────

    /// PENDING -> PAID.
    async fn mark_paid(&self, id: PayrollId) -> Result<PayrollPeriod, RepoError>;

    /// PENDING -> CANCELLED.
    async fn cancel_payroll(&self, id: PayrollId) -> Result<PayrollPeriod, RepoError>;

    /// Deletes a PENDING payroll and its lines.
    async fn remove_payroll(&self, id: PayrollId) -> Result<(), RepoError>;

    // ─────────────────────────────────────────────────────────────────────────────
    // Reads
    // ─────────────────────────────────────────────────────────────────────────────

    /// Gets a payroll by ID.
    async fn get_payroll(&self, id: PayrollId) -> Result<Option<PayrollPeriod>, RepoError>;

    /// Lists payrolls, newest first.
    async fn list_payrolls(&self, filter: &PayrollFilter) -> Result<PayrollPage, RepoError>;
}
