//! Uniqueness and consistency checks run before a payroll is inserted.
//!
//! Adapters perform the lookups inside the generating transaction and feed
//! the results here; the store's unique indexes back these checks up when
//! two generations race.

use chrono::NaiveDate;

use super::ids::{EmployeeId, PayrollId};
use super::payroll::Attendance;
use super::period::{PeriodType, PeriodWindow};
use crate::error::DomainError;

/// At most one non-cancelled payroll may exist per key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PeriodKey {
    pub user_id: EmployeeId,
    pub date_from: NaiveDate,
    pub date_to: NaiveDate,
    pub period_type: PeriodType,
}

impl std::fmt::Display for PeriodKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "employee {} {} {}..{}",
            self.user_id, self.period_type, self.date_from, self.date_to
        )
    }
}

/// A generation request that passed field validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationInput {
    pub user_id: EmployeeId,
    pub ref_no: String,
    pub window: PeriodWindow,
    pub period_type: PeriodType,
    pub attendance: Attendance,
}

impl GenerationInput {
    pub fn key(&self) -> PeriodKey {
        PeriodKey {
            user_id: self.user_id,
            date_from: self.window.from(),
            date_to: self.window.to(),
            period_type: self.period_type,
        }
    }
}

/// Validates the fields of a generation request.
pub fn validate(
    user_id: EmployeeId,
    ref_no: &str,
    date_from: NaiveDate,
    date_to: NaiveDate,
    period_type: PeriodType,
    attendance: Attendance,
) -> Result<GenerationInput, DomainError> {
    let ref_no = ref_no.trim();
    if ref_no.is_empty() {
        return Err(DomainError::validation(
            "ref_no",
            "Reference number is required",
        ));
    }
    let window = PeriodWindow::new(date_from, date_to)?;
    attendance.validate()?;

    Ok(GenerationInput {
        user_id,
        ref_no: ref_no.to_string(),
        window,
        period_type,
        attendance,
    })
}

/// Rejects a reference number already used by any payroll.
pub fn ensure_ref_no_free(ref_no: &str, existing: Option<PayrollId>) -> Result<(), DomainError> {
    match existing {
        Some(_) => Err(DomainError::DuplicateRefNo(ref_no.to_string())),
        None => Ok(()),
    }
}

/// Rejects a second live payroll for the same employee and period.
pub fn ensure_period_free(key: &PeriodKey, existing: Option<PayrollId>) -> Result<(), DomainError> {
    match existing {
        Some(existing) => Err(DomainError::DuplicatePeriod {
            key: key.to_string(),
            existing,
        }),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_validate_trims_ref_no() {
        let input = validate(
            EmployeeId::new(),
            "  PAY-01  ",
            date(2025, 1, 1),
            date(2025, 1, 31),
            PeriodType::Monthly,
            Attendance::default(),
        )
        .unwrap();
        assert_eq!(input.ref_no, "PAY-01");
    }

    #[test]
    fn test_validate_blank_ref_no() {
        let result = validate(
            EmployeeId::new(),
            "   ",
            date(2025, 1, 1),
            date(2025, 1, 31),
            PeriodType::Monthly,
            Attendance::default(),
        );
        assert!(matches!(result, Err(DomainError::Validation { field, .. }) if field == "ref_no"));
    }

    #[test]
    fn test_validate_reversed_period() {
        let result = validate(
            EmployeeId::new(),
            "PAY-01",
            date(2025, 1, 31),
            date(2025, 1, 1),
            PeriodType::Monthly,
            Attendance::default(),
        );
        assert!(matches!(result, Err(DomainError::InvalidPeriod { .. })));
    }

    #[test]
    fn test_duplicate_checks() {
        let key = PeriodKey {
            user_id: EmployeeId::new(),
            date_from: date(2025, 1, 1),
            date_to: date(2025, 1, 15),
            period_type: PeriodType::SemiMonthly,
        };
        assert!(ensure_ref_no_free("PAY-01", None).is_ok());
        assert!(matches!(
            ensure_ref_no_free("PAY-01", Some(PayrollId::new())),
            Err(DomainError::DuplicateRefNo(r)) if r == "PAY-01"
        ));
        assert!(ensure_period_free(&key, None).is_ok());
        assert!(matches!(
            ensure_period_free(&key, Some(PayrollId::new())),
            Err(DomainError::DuplicatePeriod { .. })
        ));
    }
}
