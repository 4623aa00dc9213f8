//! Employee view consumed by the payroll engine.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::ids::EmployeeId;
use super::money::Money;

/// The part of an employee record payroll generation needs.
///
/// Employees are administered elsewhere; the engine only reads them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Employee {
    pub id: EmployeeId,
    pub full_name: String,
    /// Monthly base salary in minor units.
    pub base_salary: Money,
}

impl Employee {
    pub fn new(full_name: impl Into<String>, base_salary: Money) -> Self {
        Self {
            id: EmployeeId::new(),
            full_name: full_name.into(),
            base_salary,
        }
    }
}
