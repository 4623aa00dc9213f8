//! Payroll record, its computed snapshot and its lifecycle.

use std::collections::HashSet;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::calculator::{self, SalaryBreakdown};
use super::ids::{CategoryId, EmployeeId, PayrollId, RecurrenceId};
use super::money::Money;
use super::period::{PeriodType, PeriodWindow};
use super::recurrence::{self, PayRecurrence, RecurrenceKind, RecurrenceType};
use crate::error::DomainError;

/// Lifecycle state of a payroll record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PayrollStatus {
    Pending,
    Paid,
    Cancelled,
}

impl PayrollStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PayrollStatus::Pending => "PENDING",
            PayrollStatus::Paid => "PAID",
            PayrollStatus::Cancelled => "CANCELLED",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, PayrollStatus::Pending)
    }

    /// Checks that `action` is allowed from this status and returns the
    /// resulting status (`None` when the record is removed).
    pub fn apply(self, action: LifecycleAction) -> Result<Option<PayrollStatus>, DomainError> {
        if self != PayrollStatus::Pending {
            return Err(DomainError::IllegalTransition {
                status: self,
                action,
            });
        }
        Ok(action.target())
    }
}

impl std::fmt::Display for PayrollStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for PayrollStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "PENDING" => Ok(PayrollStatus::Pending),
            "PAID" => Ok(PayrollStatus::Paid),
            "CANCELLED" => Ok(PayrollStatus::Cancelled),
            _ => Err(DomainError::validation(
                "status",
                "Status must be one of: PENDING, PAID, CANCELLED",
            )),
        }
    }
}

/// The three mutations a pending payroll accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleAction {
    MarkPaid,
    Cancel,
    Remove,
}

impl LifecycleAction {
    pub fn target(&self) -> Option<PayrollStatus> {
        match self {
            LifecycleAction::MarkPaid => Some(PayrollStatus::Paid),
            LifecycleAction::Cancel => Some(PayrollStatus::Cancelled),
            LifecycleAction::Remove => None,
        }
    }
}

impl std::fmt::Display for LifecycleAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LifecycleAction::MarkPaid => f.write_str("mark as paid"),
            LifecycleAction::Cancel => f.write_str("cancel"),
            LifecycleAction::Remove => f.write_str("delete"),
        }
    }
}

/// Attendance counters recorded alongside a payroll. Informational only.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Attendance {
    pub present: i32,
    pub absent: i32,
    pub late: i32,
}

impl Attendance {
    pub fn validate(&self) -> Result<(), DomainError> {
        for (field, value) in [
            ("present", self.present),
            ("absent", self.absent),
            ("late", self.late),
        ] {
            if value < 0 {
                return Err(DomainError::validation(
                    field,
                    format!("{} cannot be negative", capitalize(field)),
                ));
            }
        }
        Ok(())
    }
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// One allowance or deduction applied by a payroll run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct PayrollLine {
    pub recurrence_id: RecurrenceId,
    pub category_id: CategoryId,
    pub kind: RecurrenceKind,
    pub recurrence_type: RecurrenceType,
    pub amount: Money,
    #[schema(value_type = String, format = Date)]
    pub effective_date: NaiveDate,
}

impl PayrollLine {
    fn from_recurrence(kind: RecurrenceKind, r: &PayRecurrence) -> Self {
        Self {
            recurrence_id: r.id,
            category_id: r.category_id,
            kind,
            recurrence_type: r.recurrence_type,
            amount: r.amount,
            effective_date: r.effective_date,
        }
    }
}

/// Totals and applied lines frozen on a payroll at generation time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PayrollSnapshot {
    pub breakdown: SalaryBreakdown,
    pub lines: Vec<PayrollLine>,
}

impl PayrollSnapshot {
    /// Resolves the applicable assignments and computes the breakdown.
    ///
    /// `consumed` holds ONCE assignments already applied by another live
    /// payroll of the same employee.
    pub fn build(
        base_salary: Money,
        allowances: &[PayRecurrence],
        deductions: &[PayRecurrence],
        window: &PeriodWindow,
        period_type: PeriodType,
        consumed: &HashSet<RecurrenceId>,
    ) -> Result<Self, DomainError> {
        let allowances =
            recurrence::exclude_consumed(recurrence::resolve(allowances, window, period_type), consumed);
        let deductions =
            recurrence::exclude_consumed(recurrence::resolve(deductions, window, period_type), consumed);

        let breakdown = calculator::compute(base_salary, &allowances, &deductions)?;

        let lines = allowances
            .iter()
            .map(|a| PayrollLine::from_recurrence(RecurrenceKind::Allowance, a))
            .chain(
                deductions
                    .iter()
                    .map(|d| PayrollLine::from_recurrence(RecurrenceKind::Deduction, d)),
            )
            .collect();

        Ok(Self { breakdown, lines })
    }
}

/// A generated payroll for one employee and one pay period.
///
/// The salary figures are a snapshot: they are computed once when the
/// record is generated and are never recomputed.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct PayrollPeriod {
    pub id: PayrollId,
    pub user_id: EmployeeId,
    /// Globally unique reference number
    #[schema(example = "PAY-2025-01-0001")]
    pub ref_no: String,
    #[schema(value_type = String, format = Date)]
    pub date_from: NaiveDate,
    #[schema(value_type = String, format = Date)]
    pub date_to: NaiveDate,
    pub period_type: PeriodType,
    pub status: PayrollStatus,
    pub base_salary: Money,
    pub allowance_total: Money,
    pub deduction_total: Money,
    pub net: Money,
    #[serde(flatten)]
    pub attendance: Attendance,
    pub lines: Vec<PayrollLine>,
    #[schema(value_type = String, format = DateTime)]
    pub created_at: DateTime<Utc>,
    #[schema(value_type = String, format = DateTime)]
    pub updated_at: DateTime<Utc>,
}

impl PayrollPeriod {
    /// Creates a new pending payroll holding `snapshot`.
    pub fn pending(
        user_id: EmployeeId,
        ref_no: String,
        window: PeriodWindow,
        period_type: PeriodType,
        attendance: Attendance,
        snapshot: PayrollSnapshot,
    ) -> Self {
        let now = Utc::now();
        let PayrollSnapshot { breakdown, lines } = snapshot;
        Self {
            id: PayrollId::new(),
            user_id,
            ref_no,
            date_from: window.from(),
            date_to: window.to(),
            period_type,
            status: PayrollStatus::Pending,
            base_salary: breakdown.base_salary,
            allowance_total: breakdown.allowance_total,
            deduction_total: breakdown.deduction_total,
            net: breakdown.net,
            attendance,
            lines,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn breakdown(&self) -> SalaryBreakdown {
        SalaryBreakdown {
            base_salary: self.base_salary,
            allowance_total: self.allowance_total,
            deduction_total: self.deduction_total,
            net: self.net,
        }
    }

    /// Applies a status transition in place.
    pub fn transition(&mut self, action: LifecycleAction) -> Result<(), DomainError> {
        if let Some(next) = self.status.apply(action)? {
            self.status = next;
            self.updated_at = Utc::now();
        }
        Ok(())
    }

    /// ONCE assignments this payroll has consumed, unless it was cancelled.
    pub fn consumed_once(&self) -> impl Iterator<Item = RecurrenceId> + '_ {
        self.lines
            .iter()
            .filter(|_| self.status != PayrollStatus::Cancelled)
            .filter(|l| l.recurrence_type == RecurrenceType::Once)
            .map(|l| l.recurrence_id)
    }
}
