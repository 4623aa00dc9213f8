//! Recurring allowance/deduction assignments and the rule that decides
//! which of them apply to a payroll run.

use std::collections::HashSet;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::ids::{CategoryId, EmployeeId, RecurrenceId};
use super::money::Money;
use super::period::{PeriodType, PeriodWindow};
use crate::error::DomainError;

/// How often an assignment is meant to be paid out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RecurrenceType {
    /// Applied by a single payroll run, never again.
    Once,
    Monthly,
    /// Only applied by semi-monthly runs.
    SemiMonthly,
}

impl RecurrenceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecurrenceType::Once => "ONCE",
            RecurrenceType::Monthly => "MONTHLY",
            RecurrenceType::SemiMonthly => "SEMI_MONTHLY",
        }
    }
}

impl std::fmt::Display for RecurrenceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for RecurrenceType {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "ONCE" => Ok(RecurrenceType::Once),
            "MONTHLY" => Ok(RecurrenceType::Monthly),
            "SEMI_MONTHLY" => Ok(RecurrenceType::SemiMonthly),
            _ => Err(DomainError::validation(
                "type",
                "Type must be one of: MONTHLY, SEMI_MONTHLY, ONCE",
            )),
        }
    }
}

/// Whether an assignment adds to or subtracts from the salary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RecurrenceKind {
    Allowance,
    Deduction,
}

impl RecurrenceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecurrenceKind::Allowance => "ALLOWANCE",
            RecurrenceKind::Deduction => "DEDUCTION",
        }
    }
}

impl std::str::FromStr for RecurrenceKind {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ALLOWANCE" => Ok(RecurrenceKind::Allowance),
            "DEDUCTION" => Ok(RecurrenceKind::Deduction),
            _ => Err(DomainError::validation(
                "kind",
                "Kind must be ALLOWANCE or DEDUCTION",
            )),
        }
    }
}

/// An allowance or deduction assigned to an employee.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct PayRecurrence {
    pub id: RecurrenceId,
    pub employee_id: EmployeeId,
    /// Catalog entry (e.g. "Transport", "BPJS").
    pub category_id: CategoryId,
    pub recurrence_type: RecurrenceType,
    pub amount: Money,
    #[schema(value_type = String, format = Date)]
    pub effective_date: NaiveDate,
}

impl PayRecurrence {
    pub fn new(
        employee_id: EmployeeId,
        category_id: CategoryId,
        recurrence_type: RecurrenceType,
        amount: Money,
        effective_date: NaiveDate,
    ) -> Self {
        Self {
            id: RecurrenceId::new(),
            employee_id,
            category_id,
            recurrence_type,
            amount,
            effective_date,
        }
    }

    /// Whether this assignment applies to a run over `window` of type `period_type`.
    pub fn applies_to(&self, window: &PeriodWindow, period_type: PeriodType) -> bool {
        if !window.contains(self.effective_date) {
            return false;
        }
        match self.recurrence_type {
            RecurrenceType::Once | RecurrenceType::Monthly => true,
            RecurrenceType::SemiMonthly => period_type == PeriodType::SemiMonthly,
        }
    }
}

/// Selects the assignments that apply to a payroll run.
///
/// Pure: input order is preserved and nothing else is consulted.
pub fn resolve(
    recurrences: &[PayRecurrence],
    window: &PeriodWindow,
    period_type: PeriodType,
) -> Vec<PayRecurrence> {
    recurrences
        .iter()
        .filter(|r| r.applies_to(window, period_type))
        .cloned()
        .collect()
}

/// Drops ONCE assignments that another live payroll has already applied.
pub fn exclude_consumed(
    resolved: Vec<PayRecurrence>,
    consumed: &HashSet<RecurrenceId>,
) -> Vec<PayRecurrence> {
    resolved
        .into_iter()
        .filter(|r| r.recurrence_type != RecurrenceType::Once || !consumed.contains(&r.id))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn recurrence(kind: RecurrenceType, effective: NaiveDate) -> PayRecurrence {
        PayRecurrence::new(
            EmployeeId::new(),
            CategoryId::new(),
            kind,
            Money::from_major(100_000).unwrap(),
            effective,
        )
    }

    fn january() -> PeriodWindow {
        PeriodWindow::new(date(2025, 1, 1), date(2025, 1, 31)).unwrap()
    }

    #[test]
    fn test_monthly_inside_window_applies_to_both_period_types() {
        let r = recurrence(RecurrenceType::Monthly, date(2025, 1, 10));
        assert!(r.applies_to(&january(), PeriodType::Monthly));
        assert!(r.applies_to(&january(), PeriodType::SemiMonthly));
    }

    #[test]
    fn test_semi_monthly_skipped_by_monthly_run() {
        let r = recurrence(RecurrenceType::SemiMonthly, date(2025, 1, 10));
        assert!(!r.applies_to(&january(), PeriodType::Monthly));
        assert!(r.applies_to(&january(), PeriodType::SemiMonthly));
    }

    #[test]
    fn test_effective_before_window_never_applies() {
        // An open lower bound would count this again in every later month.
        let r = recurrence(RecurrenceType::Monthly, date(2024, 12, 31));
        assert!(!r.applies_to(&january(), PeriodType::Monthly));
    }

    #[test]
    fn test_window_bounds_are_inclusive() {
        let first = recurrence(RecurrenceType::Once, date(2025, 1, 1));
        let last = recurrence(RecurrenceType::Once, date(2025, 1, 31));
        let resolved = resolve(&[first.clone(), last.clone()], &january(), PeriodType::Monthly);
        assert_eq!(resolved, vec![first, last]);
    }

    #[test]
    fn test_resolve_preserves_order_and_filters() {
        let a = recurrence(RecurrenceType::Monthly, date(2025, 1, 5));
        let b = recurrence(RecurrenceType::SemiMonthly, date(2025, 1, 6));
        let c = recurrence(RecurrenceType::Once, date(2025, 2, 1));
        let d = recurrence(RecurrenceType::Once, date(2025, 1, 20));

        let resolved = resolve(
            &[a.clone(), b, c, d.clone()],
            &january(),
            PeriodType::Monthly,
        );
        assert_eq!(resolved, vec![a, d]);
    }

    #[test]
    fn test_exclude_consumed_only_touches_once() {
        let once = recurrence(RecurrenceType::Once, date(2025, 1, 5));
        let monthly = recurrence(RecurrenceType::Monthly, date(2025, 1, 5));
        let consumed: HashSet<_> = [once.id, monthly.id].into_iter().collect();

        let kept = exclude_consumed(vec![once, monthly.clone()], &consumed);
        assert_eq!(kept, vec![monthly]);
    }

    #[test]
    fn test_recurrence_type_parse() {
        assert_eq!("once".parse::<RecurrenceType>().unwrap(), RecurrenceType::Once);
        assert!(matches!(
            "YEARLY".parse::<RecurrenceType>(),
            Err(DomainError::Validation { .. })
        ));
    }

    fn recurrence_type() -> impl Strategy<Value = RecurrenceType> {
        prop_oneof![
            Just(RecurrenceType::Once),
            Just(RecurrenceType::Monthly),
            Just(RecurrenceType::SemiMonthly),
        ]
    }

    proptest! {
        #[test]
        fn prop_outside_window_never_included(
            kind in recurrence_type(),
            days_before in 1i64..400,
            days_after in 1i64..400,
            semi in any::<bool>(),
        ) {
            let window = january();
            let period_type = if semi { PeriodType::SemiMonthly } else { PeriodType::Monthly };
            let before = recurrence(kind, window.from() - chrono::Duration::days(days_before));
            let after = recurrence(kind, window.to() + chrono::Duration::days(days_after));
            prop_assert!(resolve(&[before, after], &window, period_type).is_empty());
        }

        #[test]
        fn prop_semi_monthly_follows_period_type(offset in 0i64..31) {
            let window = january();
            let r = recurrence(RecurrenceType::SemiMonthly, window.from() + chrono::Duration::days(offset));
            prop_assert!(resolve(std::slice::from_ref(&r), &window, PeriodType::Monthly).is_empty());
            prop_assert_eq!(resolve(std::slice::from_ref(&r), &window, PeriodType::SemiMonthly), vec![r]);
        }
    }
}
