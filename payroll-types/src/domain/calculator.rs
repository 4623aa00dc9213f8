//! Net salary calculation.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::money::Money;
use super::recurrence::PayRecurrence;
use crate::error::DomainError;

/// Signed salary breakdown of one payroll run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct SalaryBreakdown {
    pub base_salary: Money,
    pub allowance_total: Money,
    pub deduction_total: Money,
    /// `base_salary + allowance_total - deduction_total`; not clamped at zero.
    pub net: Money,
}

/// Combines a base salary with the resolved allowances and deductions.
pub fn compute(
    base_salary: Money,
    allowances: &[PayRecurrence],
    deductions: &[PayRecurrence],
) -> Result<SalaryBreakdown, DomainError> {
    let allowance_total = Money::checked_sum(allowances.iter().map(|a| a.amount))?;
    let deduction_total = Money::checked_sum(deductions.iter().map(|d| d.amount))?;
    let net = base_salary
        .checked_add(allowance_total)?
        .checked_sub(deduction_total)?;

    Ok(SalaryBreakdown {
        base_salary,
        allowance_total,
        deduction_total,
        net,
    })
}
