//! Read-only port onto employee master data.
//!
//! Employees and their allowance/deduction assignments are administered
//! elsewhere; payroll only reads them.

use crate::domain::{Employee, EmployeeId, PayRecurrence};
use crate::error::RepoError;

#[async_trait::async_trait]
pub trait EmployeeDirectory: Send + Sync + 'static {
    /// Gets an employee by ID.
    async fn get_employee(&self, id: EmployeeId) -> Result<Option<Employee>, RepoError>;

    /// Lists every allowance assigned to an employee.
    async fn list_allowances(&self, employee_id: EmployeeId)
    -> Result<Vec<PayRecurrence>, RepoError>;

    /// Lists every deduction assigned to an employee.
    async fn list_deductions(&self, employee_id: EmployeeId)
    -> Result<Vec<PayRecurrence>, RepoError>;
}
