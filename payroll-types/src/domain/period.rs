//! Pay period window and pay period type.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::error::DomainError;

/// How often a payroll run is made for an employee.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PeriodType {
    Monthly,
    SemiMonthly,
}

impl PeriodType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PeriodType::Monthly => "MONTHLY",
            PeriodType::SemiMonthly => "SEMI_MONTHLY",
        }
    }
}

impl std::fmt::Display for PeriodType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for PeriodType {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "MONTHLY" => Ok(PeriodType::Monthly),
            "SEMI_MONTHLY" => Ok(PeriodType::SemiMonthly),
            _ => Err(DomainError::validation(
                "type",
                "Type must be either MONTHLY or SEMI_MONTHLY",
            )),
        }
    }
}

/// Inclusive date window `[from, to]` of a payroll run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PeriodWindow {
    from: NaiveDate,
    to: NaiveDate,
}

impl PeriodWindow {
    /// Builds a window, rejecting `from > to`.
    pub fn new(from: NaiveDate, to: NaiveDate) -> Result<Self, DomainError> {
        if from > to {
            return Err(DomainError::InvalidPeriod { from, to });
        }
        Ok(Self { from, to })
    }

    pub fn from(&self) -> NaiveDate {
        self.from
    }

    pub fn to(&self) -> NaiveDate {
        self.to
    }

    /// Inclusive on both ends.
    pub fn contains(&self, date: NaiveDate) -> bool {
        self.from <= date && date <= self.to
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_window_is_inclusive() {
        let window = PeriodWindow::new(date(2025, 1, 1), date(2025, 1, 31)).unwrap();
        assert!(window.contains(date(2025, 1, 1)));
        assert!(window.contains(date(2025, 1, 31)));
        assert!(!window.contains(date(2024, 12, 31)));
        assert!(!window.contains(date(2025, 2, 1)));
    }

    #[test]
    fn test_single_day_window_allowed() {
        assert!(PeriodWindow::new(date(2025, 1, 15), date(2025, 1, 15)).is_ok());
    }

    #[test]
    fn test_reversed_window_rejected() {
        let result = PeriodWindow::new(date(2025, 2, 1), date(2025, 1, 1));
        assert!(matches!(result, Err(DomainError::InvalidPeriod { .. })));
    }

    #[test]
    fn test_period_type_parse() {
        assert_eq!("monthly".parse::<PeriodType>().unwrap(), PeriodType::Monthly);
        assert_eq!(
            "SEMI_MONTHLY".parse::<PeriodType>().unwrap(),
            PeriodType::SemiMonthly
        );
        assert!("WEEKLY".parse::<PeriodType>().is_err());
    }
}
