//! Data Transfer Objects (DTOs) for requests and responses.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use crate::domain::{
    ApiKeyId, Attendance, EmployeeId, GenerationInput, LifecycleAction, PayrollLine, PayrollPeriod,
    PayrollStatus, PeriodType, PeriodWindow, Role, SalaryBreakdown, guard,
};
use crate::error::DomainError;

/// Page size used when a filter asks for a page without a limit.
pub const DEFAULT_PAGE_SIZE: u32 = 10;
/// Largest page size a caller may ask for.
pub const MAX_PAGE_SIZE: u32 = 100;

// ─────────────────────────────────────────────────────────────────────────────
// Payroll DTOs
// ─────────────────────────────────────────────────────────────────────────────

/// Request to generate a payroll for one employee and one period.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct GeneratePayrollRequest {
    /// Employee the payroll is generated for
    pub user_id: EmployeeId,
    /// Globally unique reference number
    #[schema(example = "PAY-2025-01-0001")]
    pub ref_no: String,
    #[schema(value_type = String, format = Date, example = "2025-01-01")]
    pub date_from: NaiveDate,
    #[schema(value_type = String, format = Date, example = "2025-01-31")]
    pub date_to: NaiveDate,
    pub period_type: PeriodType,
    /// Days present in the period
    #[serde(default)]
    pub present: i32,
    /// Days absent in the period
    #[serde(default)]
    pub absent: i32,
    /// Late arrivals in the period
    #[serde(default)]
    pub late: i32,
}

impl GeneratePayrollRequest {
    /// Checks field-level rules; lookups against the store happen later.
    pub fn validate(&self) -> Result<GenerationInput, DomainError> {
        guard::validate(
            self.user_id,
            &self.ref_no,
            self.date_from,
            self.date_to,
            self.period_type,
            Attendance {
                present: self.present,
                absent: self.absent,
                late: self.late,
            },
        )
    }
}

/// Generic update of a payroll.
///
/// Only `status` is honoured, and only as a transition out of PENDING.
/// Every other field is part of the immutable snapshot.
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct UpdatePayrollRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<PayrollStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ref_no: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<EmployeeId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schema(value_type = Option<String>, format = Date)]
    pub date_from: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schema(value_type = Option<String>, format = Date)]
    pub date_to: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub period_type: Option<PeriodType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_salary: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allowance_total: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deduction_total: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub net: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub present: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub absent: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub late: Option<i32>,
}

impl UpdatePayrollRequest {
    /// Names of the snapshot fields this request tries to change.
    pub fn snapshot_fields(&self) -> Vec<&'static str> {
        [
            ("ref_no", self.ref_no.is_some()),
            ("user_id", self.user_id.is_some()),
            ("date_from", self.date_from.is_some()),
            ("date_to", self.date_to.is_some()),
            ("period_type", self.period_type.is_some()),
            ("base_salary", self.base_salary.is_some()),
            ("allowance_total", self.allowance_total.is_some()),
            ("deduction_total", self.deduction_total.is_some()),
            ("net", self.net.is_some()),
            ("present", self.present.is_some()),
            ("absent", self.absent.is_some()),
            ("late", self.late.is_some()),
        ]
        .into_iter()
        .filter_map(|(name, set)| set.then_some(name))
        .collect()
    }

    /// Translates the update into the lifecycle action it stands for.
    pub fn into_action(self) -> Result<LifecycleAction, DomainError> {
        let touched = self.snapshot_fields();
        if !touched.is_empty() {
            return Err(DomainError::ImmutableField(touched.join(", ")));
        }
        match self.status {
            Some(PayrollStatus::Paid) => Ok(LifecycleAction::MarkPaid),
            Some(PayrollStatus::Cancelled) => Ok(LifecycleAction::Cancel),
            Some(PayrollStatus::Pending) => Err(DomainError::ImmutableField(
                "status can only move from PENDING to PAID or CANCELLED".into(),
            )),
            None => Err(DomainError::validation(
                "status",
                "At least one field must be provided for update",
            )),
        }
    }
}

/// Filter and pagination for payroll listings.
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct PayrollFilter {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<EmployeeId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<PayrollStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub period_type: Option<PeriodType>,
    /// Substring match on the reference number
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ref_no: Option<String>,
    /// 1-based page; omit to return every match
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<u32>,
}

impl PayrollFilter {
    pub fn validate(&self) -> Result<(), DomainError> {
        if self.page == Some(0) {
            return Err(DomainError::validation("page", "Page must be at least 1"));
        }
        if let Some(limit) = self.limit {
            if limit == 0 || limit > MAX_PAGE_SIZE {
                return Err(DomainError::validation(
                    "limit",
                    format!("Limit must be between 1 and {}", MAX_PAGE_SIZE),
                ));
            }
        }
        Ok(())
    }

    /// `(limit, offset)` when the filter asks for a page.
    ///
    /// The offset is widened to u64: any `page` up to `u32::MAX` times
    /// [`MAX_PAGE_SIZE`] fits without overflow.
    pub fn pagination(&self) -> Option<(u32, u64)> {
        self.page.map(|page| {
            let limit = self.limit.unwrap_or(DEFAULT_PAGE_SIZE);
            let offset = u64::from(page.saturating_sub(1)) * u64::from(limit);
            (limit, offset)
        })
    }

    /// Whether `payroll` matches the filter, ignoring pagination.
    pub fn matches(&self, payroll: &PayrollPeriod) -> bool {
        self.user_id.is_none_or(|id| payroll.user_id == id)
            && self.status.is_none_or(|s| payroll.status == s)
            && self.period_type.is_none_or(|t| payroll.period_type == t)
            && self
                .ref_no
                .as_deref()
                .is_none_or(|needle| payroll.ref_no.contains(needle))
    }

    /// Builds the pagination meta for a result of `total_items` rows.
    pub fn meta(&self, total_items: u64) -> Option<PageMeta> {
        self.pagination().map(|(limit, _)| PageMeta {
            total_items,
            total_pages: total_items.div_ceil(u64::from(limit)),
            current_page: self.page.unwrap_or(1),
            items_per_page: limit,
        })
    }
}

/// Pagination summary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct PageMeta {
    pub total_items: u64,
    pub total_pages: u64,
    pub current_page: u32,
    pub items_per_page: u32,
}

/// One page of payrolls.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct PayrollPage {
    pub data: Vec<PayrollPeriod>,
    pub meta: Option<PageMeta>,
}

/// Request to compute a payroll without recording it.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct PreviewPayrollRequest {
    pub user_id: EmployeeId,
    #[schema(value_type = String, format = Date, example = "2025-01-01")]
    pub date_from: NaiveDate,
    #[schema(value_type = String, format = Date, example = "2025-01-31")]
    pub date_to: NaiveDate,
    pub period_type: PeriodType,
}

impl PreviewPayrollRequest {
    pub fn window(&self) -> Result<PeriodWindow, DomainError> {
        PeriodWindow::new(self.date_from, self.date_to)
    }
}

/// Computed figures for a payroll that has not been generated.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct PayrollPreview {
    pub user_id: EmployeeId,
    #[schema(value_type = String, format = Date)]
    pub date_from: NaiveDate,
    #[schema(value_type = String, format = Date)]
    pub date_to: NaiveDate,
    pub period_type: PeriodType,
    #[serde(flatten)]
    pub breakdown: SalaryBreakdown,
    pub lines: Vec<PayrollLine>,
}

// ─────────────────────────────────────────────────────────────────────────────
// API key DTOs
// ─────────────────────────────────────────────────────────────────────────────

/// Request to create the first API key.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct BootstrapRequest {
    /// Name for the API key
    #[schema(example = "hr-admin")]
    pub name: String,
}

/// Request to create a new API key.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CreateApiKeyRequest {
    /// Name for the API key
    #[schema(example = "payroll-viewer")]
    pub name: String,
    #[serde(default = "default_role")]
    pub role: Role,
}

fn default_role() -> Role {
    Role::Viewer
}

/// Response carrying a freshly generated key.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ApiKeyResponse {
    /// The generated API key (shown only once)
    #[schema(example = "pk_abc123xyz...")]
    pub api_key: String,
    pub role: Role,
    /// Informational message
    pub message: String,
}

/// API key info without the raw key.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ApiKeyInfo {
    pub id: ApiKeyId,
    pub name: String,
    pub role: Role,
    pub is_active: bool,
    /// When the key was created (ISO 8601)
    #[schema(example = "2025-01-01T00:00:00Z")]
    pub created_at: String,
    /// When the key was last used (ISO 8601)
    pub last_used_at: Option<String>,
}
