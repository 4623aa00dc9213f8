//! Domain models and payroll rules.

pub mod api_key;
pub mod calculator;
pub mod employee;
pub mod guard;
pub mod ids;
pub mod money;
pub mod payroll;
pub mod period;
pub mod recurrence;

pub use api_key::{ApiKey, Role};
pub use calculator::SalaryBreakdown;
pub use employee::Employee;
pub use guard::{GenerationInput, PeriodKey};
pub use ids::{ApiKeyId, CategoryId, EmployeeId, PayrollId, RecurrenceId};
pub use money::Money;
pub use payroll::{
    Attendance, LifecycleAction, PayrollLine, PayrollPeriod, PayrollSnapshot, PayrollStatus,
};
pub use period::{PeriodType, PeriodWindow};
pub use recurrence::{PayRecurrence, RecurrenceKind, RecurrenceType};
