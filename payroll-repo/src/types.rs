//! Database row types for SQLite and PostgreSQL, and their conversions.
//!
//! SQLite stores identifiers, dates and timestamps as TEXT; PostgreSQL
//! uses native UUID, DATE and TIMESTAMPTZ columns.

use std::str::FromStr;

#[cfg(feature = "sqlite")]
use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};

use payroll_types::{DomainError, RepoError};

// ─────────────────────────────────────────────────────────────────────────────
// Error mapping
// ─────────────────────────────────────────────────────────────────────────────

pub(crate) fn db_err(e: sqlx::Error) -> RepoError {
    RepoError::Database(e.to_string())
}

pub(crate) fn tx_err(e: sqlx::Error) -> RepoError {
    RepoError::Transaction(e.to_string())
}

/// Maps a write failure, turning unique-constraint violations into conflicts.
///
/// The store's unique indexes are the last line of defence when two
/// generations race past the guard lookups.
pub(crate) fn write_err(e: sqlx::Error) -> RepoError {
    match e.as_database_error() {
        Some(db) if db.is_unique_violation() => {
            tracing::warn!(
                constraint = db.constraint().unwrap_or("unknown"),
                "Unique constraint rejected payroll write"
            );
            RepoError::Conflict(format!(
                "A payroll with the same reference number or period already exists ({})",
                db.message()
            ))
        }
        _ => db_err(e),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Value parsing
// ─────────────────────────────────────────────────────────────────────────────

fn corrupt(column: &str, value: &str) -> RepoError {
    RepoError::Database(format!("Invalid {} value in database: {}", column, value))
}

/// Parses a stored enum discriminant (`PENDING`, `MONTHLY`, ...).
pub(crate) fn parse_enum<T>(column: &str, value: &str) -> Result<T, RepoError>
where
    T: FromStr<Err = DomainError>,
{
    value.parse().map_err(|_| corrupt(column, value))
}

#[cfg(feature = "sqlite")]
pub(crate) fn parse_id<T>(column: &str, value: &str) -> Result<T, RepoError>
where
    T: FromStr<Err = uuid::Error>,
{
    value.parse().map_err(|_| corrupt(column, value))
}

#[cfg(feature = "sqlite")]
pub(crate) fn parse_date(column: &str, value: &str) -> Result<NaiveDate, RepoError> {
    NaiveDate::parse_from_str(value, "%Y-%m-%d").map_err(|_| corrupt(column, value))
}

#[cfg(feature = "sqlite")]
pub(crate) fn parse_timestamp(column: &str, value: &str) -> Result<DateTime<Utc>, RepoError> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|_| corrupt(column, value))
}

/// Fixed-width RFC 3339 so TEXT ordering matches time ordering.
#[cfg(feature = "sqlite")]
pub(crate) fn format_timestamp(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

#[cfg(feature = "sqlite")]
pub(crate) fn format_date(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

// ─────────────────────────────────────────────────────────────────────────────
// SQLite rows
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(feature = "sqlite")]
pub mod sqlite {
    use sqlx::FromRow;

    use payroll_types::{
        ApiKey, Attendance, Employee, Money, PayRecurrence, PayrollLine, PayrollPeriod, RepoError,
    };

    use super::{parse_date, parse_enum, parse_id, parse_timestamp};

    #[derive(FromRow)]
    pub struct DbEmployee {
        pub id: String,
        pub full_name: String,
        pub base_salary: i64,
    }

    impl DbEmployee {
        pub fn into_domain(self) -> Result<Employee, RepoError> {
            Ok(Employee {
                id: parse_id("employees.id", &self.id)?,
                full_name: self.full_name,
                base_salary: Money::from_minor(self.base_salary),
            })
        }
    }

    /// Allowance or deduction assignment row.
    #[derive(FromRow)]
    pub struct DbRecurrence {
        pub id: String,
        pub user_id: String,
        pub category_id: String,
        pub recurrence_type: String,
        pub amount: i64,
        pub effective_date: String,
    }

    impl DbRecurrence {
        pub fn into_domain(self) -> Result<PayRecurrence, RepoError> {
            Ok(PayRecurrence {
                id: parse_id("recurrence id", &self.id)?,
                employee_id: parse_id("user_id", &self.user_id)?,
                category_id: parse_id("category id", &self.category_id)?,
                recurrence_type: parse_enum("type", &self.recurrence_type)?,
                amount: Money::from_minor(self.amount),
                effective_date: parse_date("effective_date", &self.effective_date)?,
            })
        }
    }

    #[derive(FromRow)]
    pub struct DbPayroll {
        pub id: String,
        pub user_id: String,
        pub ref_no: String,
        pub date_from: String,
        pub date_to: String,
        pub period_type: String,
        pub status: String,
        pub base_salary: i64,
        pub allowance_total: i64,
        pub deduction_total: i64,
        pub net: i64,
        pub present: i32,
        pub absent: i32,
        pub late: i32,
        pub created_at: String,
        pub updated_at: String,
    }

    impl DbPayroll {
        pub fn into_domain(self, lines: Vec<PayrollLine>) -> Result<PayrollPeriod, RepoError> {
            Ok(PayrollPeriod {
                id: parse_id("payroll_periods.id", &self.id)?,
                user_id: parse_id("payroll_periods.user_id", &self.user_id)?,
                ref_no: self.ref_no,
                date_from: parse_date("date_from", &self.date_from)?,
                date_to: parse_date("date_to", &self.date_to)?,
                period_type: parse_enum("period_type", &self.period_type)?,
                status: parse_enum("status", &self.status)?,
                base_salary: Money::from_minor(self.base_salary),
                allowance_total: Money::from_minor(self.allowance_total),
                deduction_total: Money::from_minor(self.deduction_total),
                net: Money::from_minor(self.net),
                attendance: Attendance {
                    present: self.present,
                    absent: self.absent,
                    late: self.late,
                },
                lines,
                created_at: parse_timestamp("created_at", &self.created_at)?,
                updated_at: parse_timestamp("updated_at", &self.updated_at)?,
            })
        }
    }

    #[derive(FromRow)]
    pub struct DbPayrollLine {
        pub payroll_id: String,
        pub recurrence_id: String,
        pub category_id: String,
        pub kind: String,
        pub recurrence_type: String,
        pub amount: i64,
        pub effective_date: String,
    }

    impl DbPayrollLine {
        pub fn into_domain(self) -> Result<PayrollLine, RepoError> {
            Ok(PayrollLine {
                recurrence_id: parse_id("recurrence_id", &self.recurrence_id)?,
                category_id: parse_id("category_id", &self.category_id)?,
                kind: parse_enum("kind", &self.kind)?,
                recurrence_type: parse_enum("recurrence_type", &self.recurrence_type)?,
                amount: Money::from_minor(self.amount),
                effective_date: parse_date("effective_date", &self.effective_date)?,
            })
        }
    }

    #[derive(FromRow)]
    pub struct DbApiKey {
        pub id: String,
        pub name: String,
        pub key_hash: String,
        pub role: String,
        pub is_active: bool,
        pub created_at: String,
        pub last_used_at: Option<String>,
    }

    impl DbApiKey {
        pub fn into_domain(self) -> Result<ApiKey, RepoError> {
            Ok(ApiKey {
                id: parse_id("api_keys.id", &self.id)?,
                name: self.name,
                key_hash: self.key_hash,
                role: parse_enum("role", &self.role)?,
                is_active: self.is_active,
                created_at: parse_timestamp("created_at", &self.created_at)?,
                last_used_at: self
                    .last_used_at
                    .as_deref()
                    .map(|s| parse_timestamp("last_used_at", s))
                    .transpose()?,
            })
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// PostgreSQL rows
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(feature = "postgres")]
pub mod pg {
    use chrono::{DateTime, NaiveDate, Utc};
    use sqlx::FromRow;
    use uuid::Uuid;

    use payroll_types::{
        ApiKey, ApiKeyId, Attendance, CategoryId, Employee, EmployeeId, Money, PayRecurrence,
        PayrollId, PayrollLine, PayrollPeriod, RecurrenceId, RepoError,
    };

    use super::parse_enum;

    #[derive(FromRow)]
    pub struct DbEmployee {
        pub id: Uuid,
        pub full_name: String,
        pub base_salary: i64,
    }

    impl DbEmployee {
        pub fn into_domain(self) -> Employee {
            Employee {
                id: EmployeeId::from_uuid(self.id),
                full_name: self.full_name,
                base_salary: Money::from_minor(self.base_salary),
            }
        }
    }

    #[derive(FromRow)]
    pub struct DbRecurrence {
        pub id: Uuid,
        pub user_id: Uuid,
        pub category_id: Uuid,
        pub recurrence_type: String,
        pub amount: i64,
        pub effective_date: NaiveDate,
    }

    impl DbRecurrence {
        pub fn into_domain(self) -> Result<PayRecurrence, RepoError> {
            Ok(PayRecurrence {
                id: RecurrenceId::from_uuid(self.id),
                employee_id: EmployeeId::from_uuid(self.user_id),
                category_id: CategoryId::from_uuid(self.category_id),
                recurrence_type: parse_enum("type", &self.recurrence_type)?,
                amount: Money::from_minor(self.amount),
                effective_date: self.effective_date,
            })
        }
    }

    #[derive(FromRow)]
    pub struct DbPayroll {
        pub id: Uuid,
        pub user_id: Uuid,
        pub ref_no: String,
        pub date_from: NaiveDate,
        pub date_to: NaiveDate,
        pub period_type: String,
        pub status: String,
        pub base_salary: i64,
        pub allowance_total: i64,
        pub deduction_total: i64,
        pub net: i64,
        pub present: i32,
        pub absent: i32,
        pub late: i32,
        pub created_at: DateTime<Utc>,
        pub updated_at: DateTime<Utc>,
    }

    impl DbPayroll {
        pub fn into_domain(self, lines: Vec<PayrollLine>) -> Result<PayrollPeriod, RepoError> {
            Ok(PayrollPeriod {
                id: PayrollId::from_uuid(self.id),
                user_id: EmployeeId::from_uuid(self.user_id),
                ref_no: self.ref_no,
                date_from: self.date_from,
                date_to: self.date_to,
                period_type: parse_enum("period_type", &self.period_type)?,
                status: parse_enum("status", &self.status)?,
                base_salary: Money::from_minor(self.base_salary),
                allowance_total: Money::from_minor(self.allowance_total),
                deduction_total: Money::from_minor(self.deduction_total),
                net: Money::from_minor(self.net),
                attendance: Attendance {
                    present: self.present,
                    absent: self.absent,
                    late: self.late,
                },
                lines,
                created_at: self.created_at,
                updated_at: self.updated_at,
            })
        }
    }

    #[derive(FromRow)]
    pub struct DbPayrollLine {
        pub payroll_id: Uuid,
        pub recurrence_id: Uuid,
        pub category_id: Uuid,
        pub kind: String,
        pub recurrence_type: String,
        pub amount: i64,
        pub effective_date: NaiveDate,
    }

    impl DbPayrollLine {
        pub fn into_domain(self) -> Result<PayrollLine, RepoError> {
            Ok(PayrollLine {
                recurrence_id: RecurrenceId::from_uuid(self.recurrence_id),
                category_id: CategoryId::from_uuid(self.category_id),
                kind: parse_enum("kind", &self.kind)?,
                recurrence_type: parse_enum("recurrence_type", &self.recurrence_type)?,
                amount: Money::from_minor(self.amount),
                effective_date: self.effective_date,
            })
        }
    }

    #[derive(FromRow)]
    pub struct DbApiKey {
        pub id: Uuid,
        pub name: String,
        pub key_hash: String,
        pub role: String,
        pub is_active: bool,
        pub created_at: DateTime<Utc>,
        pub last_used_at: Option<DateTime<Utc>>,
    }

    impl DbApiKey {
        pub fn into_domain(self) -> Result<ApiKey, RepoError> {
            Ok(ApiKey {
                id: ApiKeyId::from_uuid(self.id),
                name: self.name,
                key_hash: self.key_hash,
                role: parse_enum("role", &self.role)?,
                is_active: self.is_active,
                created_at: self.created_at,
                last_used_at: self.last_used_at,
            })
        }
    }
}
