//! Exact monetary value stored in minor currency units.

use serde::{Deserialize, Serialize};
use std::fmt;
use utoipa::ToSchema;

use crate::error::DomainError;

/// Number of minor units in one major unit (two decimal places).
pub const MINOR_PER_MAJOR: i64 = 100;

/// Signed monetary amount.
///
/// Amount is stored in the smallest unit of the currency (hundredths)
/// so sums of many small recurring amounts never drift. Payroll runs in a
/// single currency, so no currency tag is carried.
///
/// Values may be negative: a net salary is allowed to fall below zero.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
    ToSchema,
)]
#[serde(transparent)]
#[schema(example = 800000000)]
pub struct Money(i64);

impl Money {
    pub const ZERO: Money = Money(0);

    /// Creates a value from minor units (e.g. `150` is `1.50`).
    pub const fn from_minor(minor: i64) -> Self {
        Self(minor)
    }

    /// Creates a value from whole major units.
    pub fn from_major(major: i64) -> Result<Self, DomainError> {
        major
            .checked_mul(MINOR_PER_MAJOR)
            .map(Self)
            .ok_or(DomainError::Overflow)
    }

    /// Returns the amount in minor units.
    pub fn minor_units(&self) -> i64 {
        self.0
    }

    pub fn is_negative(&self) -> bool {
        self.0 < 0
    }

    /// Checked addition.
    pub fn checked_add(&self, other: Money) -> Result<Money, DomainError> {
        self.0
            .checked_add(other.0)
            .map(Money)
            .ok_or(DomainError::Overflow)
    }

    /// Checked subtraction. The result may be negative.
    pub fn checked_sub(&self, other: Money) -> Result<Money, DomainError> {
        self.0
            .checked_sub(other.0)
            .map(Money)
            .ok_or(DomainError::Overflow)
    }

    /// Sums an iterator of amounts, failing on overflow.
    pub fn checked_sum<I>(amounts: I) -> Result<Money, DomainError>
    where
        I: IntoIterator<Item = Money>,
    {
        amounts
            .into_iter()
            .try_fold(Money::ZERO, |acc, amount| acc.checked_add(amount))
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.unsigned_abs();
        let per = MINOR_PER_MAJOR as u64;
        write!(f, "{}{}.{:02}", sign, abs / per, abs % per)
    }
}
