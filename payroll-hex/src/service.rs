//! Payroll Application Service
//!
//! The lifecycle engine entry point. Orchestrates domain rules through the
//! store ports; contains NO infrastructure logic.

use std::collections::HashSet;

use payroll_types::{
    ApiKey, ApiKeyInfo, ApiKeyResponse, AppError, BootstrapRequest, CreateApiKeyRequest,
    DomainError, GeneratePayrollRequest, LifecycleAction, PayrollFilter, PayrollId, PayrollPage,
    PayrollPeriod, PayrollPreview, PayrollSnapshot, PayrollStore, PreviewPayrollRequest,
    RecurrenceId, Role, UpdatePayrollRequest,
};

/// Application service for payroll operations.
///
/// Generic over `R: PayrollStore` - the adapter is injected at compile time,
/// so the same service runs against SQLite, PostgreSQL or an in-memory mock.
pub struct PayrollService<R: PayrollStore> {
    repo: R,
}

impl<R: PayrollStore> PayrollService<R> {
    /// Creates a new payroll service with the given repository.
    pub fn new(repo: R) -> Self {
        Self { repo }
    }

    /// Returns a reference to the underlying repository.
    pub fn repo(&self) -> &R {
        &self.repo
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Generation
    // ─────────────────────────────────────────────────────────────────────────────

    /// Generates a PENDING payroll for one employee and one period.
    pub async fn generate(&self, req: GeneratePayrollRequest) -> Result<PayrollPeriod, AppError> {
        // Field checks fail fast, before a transaction is opened
        req.validate()?;

        self.repo.generate_payroll(req).await.map_err(Into::into)
    }

    /// Computes what a payroll run would produce, without writing anything.
    pub async fn preview(&self, req: PreviewPayrollRequest) -> Result<PayrollPreview, AppError> {
        let window = req.window()?;

        let employee = self
            .repo
            .get_employee(req.user_id)
            .await?
            .ok_or(DomainError::EmployeeNotFound(req.user_id))?;
        let allowances = self.repo.list_allowances(employee.id).await?;
        let deductions = self.repo.list_deductions(employee.id).await?;

        let history = self
            .repo
            .list_payrolls(&PayrollFilter {
                user_id: Some(employee.id),
                ..Default::default()
            })
            .await?;
        let consumed: HashSet<RecurrenceId> = history
            .data
            .iter()
            .flat_map(|p| p.consumed_once())
            .collect();

        let snapshot = PayrollSnapshot::build(
            employee.base_salary,
            &allowances,
            &deductions,
            &window,
            req.period_type,
            &consumed,
        )?;

        Ok(PayrollPreview {
            user_id: employee.id,
            date_from: window.from(),
            date_to: window.to(),
            period_type: req.period_type,
            breakdown: snapshot.breakdown,
            lines: snapshot.lines,
        })
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Lifecycle
    // ─────────────────────────────────────────────────────────────────────────────

    /// PENDING -> PAID.
    pub async fn mark_paid(&self, id: PayrollId) -> Result<PayrollPeriod, AppError> {
        self.repo.mark_paid(id).await.map_err(Into::into)
    }

    /// PENDING -> CANCELLED.
    pub async fn cancel(&self, id: PayrollId) -> Result<PayrollPeriod, AppError> {
        self.repo.cancel_payroll(id).await.map_err(Into::into)
    }

    /// Deletes a PENDING payroll.
    pub async fn remove(&self, id: PayrollId) -> Result<(), AppError> {
        self.repo.remove_payroll(id).await.map_err(Into::into)
    }

    /// Applies a generic update, which may only carry a status transition.
    pub async fn update(
        &self,
        id: PayrollId,
        req: UpdatePayrollRequest,
    ) -> Result<PayrollPeriod, AppError> {
        match req.into_action()? {
            LifecycleAction::MarkPaid => self.mark_paid(id).await,
            LifecycleAction::Cancel => self.cancel(id).await,
            LifecycleAction::Remove => Err(AppError::BadRequest(
                "Use DELETE to remove a payroll".into(),
            )),
        }
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Reads
    // ─────────────────────────────────────────────────────────────────────────────

    /// Gets a payroll by ID.
    pub async fn get(&self, id: PayrollId) -> Result<PayrollPeriod, AppError> {
        self.repo
            .get_payroll(id)
            .await
            .map_err(Into::into)
            .and_then(|opt| opt.ok_or_else(|| DomainError::PayrollNotFound(id).into()))
    }

    /// Lists payrolls matching the filter.
    pub async fn list(&self, filter: PayrollFilter) -> Result<PayrollPage, AppError> {
        filter.validate()?;

        self.repo.list_payrolls(&filter).await.map_err(Into::into)
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // API keys
    // ─────────────────────────────────────────────────────────────────────────────

    /// Resolves a raw key to its stored record.
    pub async fn authenticate(&self, raw_key: &str) -> Result<ApiKey, AppError> {
        let key_hash = payroll_repo::security::hash_api_key(raw_key);

        match self.repo.verify_api_key_hash(&key_hash).await? {
            Some(api_key) if payroll_repo::security::verify_api_key(raw_key, &api_key.key_hash) => {
                Ok(api_key)
            }
            _ => Err(AppError::Unauthorized("Invalid API key".into())),
        }
    }

    /// Creates the first admin key; refused once any key exists.
    pub async fn bootstrap(&self, req: BootstrapRequest) -> Result<ApiKeyResponse, AppError> {
        let name = validate_key_name(&req.name)?;

        if self.repo.count_api_keys().await? > 0 {
            return Err(AppError::Forbidden(
                "Bootstrap not allowed: API keys already exist. Use an existing admin key to create new ones."
                    .into(),
            ));
        }

        let (api_key, raw_key) = self.repo.create_api_key(name, Role::PayrollAdmin).await?;
        tracing::info!(key_id = %api_key.id, "Bootstrap API key created");

        Ok(ApiKeyResponse {
            api_key: raw_key,
            role: api_key.role,
            message: "First API key created. Save this key securely - it won't be shown again!"
                .into(),
        })
    }

    /// Creates an additional API key.
    pub async fn create_api_key(
        &self,
        req: CreateApiKeyRequest,
    ) -> Result<ApiKeyResponse, AppError> {
        let name = validate_key_name(&req.name)?;

        let (api_key, raw_key) = self.repo.create_api_key(name, req.role).await?;
        tracing::info!(key_id = %api_key.id, role = %api_key.role, "API key created");

        Ok(ApiKeyResponse {
            api_key: raw_key,
            role: api_key.role,
            message: "API key created. Save this key securely - it won't be shown again!".into(),
        })
    }

    /// Lists API keys without exposing hashes.
    pub async fn list_api_keys(&self) -> Result<Vec<ApiKeyInfo>, AppError> {
        let keys = self.repo.list_api_keys().await?;

        Ok(keys
            .into_iter()
            .map(|k| ApiKeyInfo {
                id: k.id,
                name: k.name,
                role: k.role,
                is_active: k.is_active,
                created_at: k.created_at.to_rfc3339(),
                last_used_at: k.last_used_at.map(|dt| dt.to_rfc3339()),
            })
            .collect())
    }
}

fn validate_key_name(name: &str) -> Result<&str, AppError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(AppError::Validation {
            field: "name".into(),
            message: "API key name cannot be empty".into(),
        });
    }
    Ok(name)
}
