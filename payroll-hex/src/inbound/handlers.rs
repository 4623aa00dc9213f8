//! HTTP request handlers.

use std::sync::Arc;

use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};

use payroll_types::{
    ApiKey, AppError, BootstrapRequest, CreateApiKeyRequest, GeneratePayrollRequest,
    PayrollFilter, PayrollId, PayrollStore, PreviewPayrollRequest, UpdatePayrollRequest,
};

use crate::PayrollService;

/// Application state shared across handlers.
pub struct AppState<R: PayrollStore> {
    pub service: PayrollService<R>,
}

/// Wrapper to implement IntoResponse for AppError (orphan rule workaround).
pub struct ApiError(pub AppError);

impl From<AppError> for ApiError {
    fn from(err: AppError) -> Self {
        ApiError(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message, field) = match self.0 {
            AppError::Validation { field, message } => {
                (StatusCode::UNPROCESSABLE_ENTITY, message, Some(field))
            }
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg, None),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg, None),
            AppError::Conflict(msg) => (StatusCode::CONFLICT, msg, None),
            AppError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, msg, None),
            AppError::Forbidden(msg) => (StatusCode::FORBIDDEN, msg, None),
            AppError::Internal(msg) => {
                tracing::error!(error = %msg, "Request failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                    None,
                )
            }
        };

        let mut body = serde_json::json!({
            "error": message,
            "code": status.as_u16()
        });
        if let Some(field) = field {
            body["field"] = serde_json::Value::String(field);
        }

        (status, Json(body)).into_response()
    }
}

/// Mutating payroll routes and key management need an admin key.
fn require_admin(caller: &ApiKey) -> Result<(), ApiError> {
    if caller.role.can_manage_payroll() {
        Ok(())
    } else {
        tracing::warn!(key_id = %caller.id, role = %caller.role, "Role not allowed");
        Err(AppError::Forbidden(format!(
            "Role {} may not perform this operation",
            caller.role
        ))
        .into())
    }
}

fn parse_payroll_id(id: &str) -> Result<PayrollId, ApiError> {
    id.parse()
        .map_err(|_| AppError::BadRequest("Invalid payroll ID".into()).into())
}

/// Health check endpoint.
pub async fn health() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "healthy" }))
}

// ─────────────────────────────────────────────────────────────────────────────
// Payrolls
// ─────────────────────────────────────────────────────────────────────────────

/// Generate a PENDING payroll.
#[tracing::instrument(skip(state, caller, req), fields(user_id = %req.user_id, ref_no = %req.ref_no))]
pub async fn generate<R: PayrollStore>(
    State(state): State<Arc<AppState<R>>>,
    Extension(caller): Extension<ApiKey>,
    Json(req): Json<GeneratePayrollRequest>,
) -> Result<impl IntoResponse, ApiError> {
    require_admin(&caller)?;

    let payroll = state.service.generate(req).await?;
    Ok((StatusCode::CREATED, Json(payroll)))
}

/// Compute a payroll without recording it.
#[tracing::instrument(skip(state, req), fields(user_id = %req.user_id))]
pub async fn preview<R: PayrollStore>(
    State(state): State<Arc<AppState<R>>>,
    Json(req): Json<PreviewPayrollRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let preview = state.service.preview(req).await?;
    Ok(Json(preview))
}

/// List payrolls.
#[tracing::instrument(skip(state))]
pub async fn list_payrolls<R: PayrollStore>(
    State(state): State<Arc<AppState<R>>>,
    Query(filter): Query<PayrollFilter>,
) -> Result<impl IntoResponse, ApiError> {
    let page = state.service.list(filter).await?;
    Ok(Json(page))
}

/// Get payroll by ID.
#[tracing::instrument(skip(state), fields(payroll_id = %id))]
pub async fn get_payroll<R: PayrollStore>(
    State(state): State<Arc<AppState<R>>>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let payroll_id = parse_payroll_id(&id)?;

    let payroll = state.service.get(payroll_id).await?;
    Ok(Json(payroll))
}

/// Generic update; only a status transition is accepted.
#[tracing::instrument(skip(state, caller, req), fields(payroll_id = %id))]
pub async fn update_payroll<R: PayrollStore>(
    State(state): State<Arc<AppState<R>>>,
    Extension(caller): Extension<ApiKey>,
    Path(id): Path<String>,
    Json(req): Json<UpdatePayrollRequest>,
) -> Result<impl IntoResponse, ApiError> {
    require_admin(&caller)?;
    let payroll_id = parse_payroll_id(&id)?;

    let payroll = state.service.update(payroll_id, req).await?;
    Ok(Json(payroll))
}

/// Mark a payroll as paid.
#[tracing::instrument(skip(state, caller), fields(payroll_id = %id))]
pub async fn mark_paid<R: PayrollStore>(
    State(state): State<Arc<AppState<R>>>,
    Extension(caller): Extension<ApiKey>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    require_admin(&caller)?;
    let payroll_id = parse_payroll_id(&id)?;

    let payroll = state.service.mark_paid(payroll_id).await?;
    Ok(Json(payroll))
}

/// Cancel a payroll.
#[tracing::instrument(skip(state, caller), fields(payroll_id = %id))]
pub async fn cancel_payroll<R: PayrollStore>(
    State(state): State<Arc<AppState<R>>>,
    Extension(caller): Extension<ApiKey>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    require_admin(&caller)?;
    let payroll_id = parse_payroll_id(&id)?;

    let payroll = state.service.cancel(payroll_id).await?;
    Ok(Json(payroll))
}

/// Delete a pending payroll.
#[tracing::instrument(skip(state, caller), fields(payroll_id = %id))]
pub async fn remove_payroll<R: PayrollStore>(
    State(state): State<Arc<AppState<R>>>,
    Extension(caller): Extension<ApiKey>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    require_admin(&caller)?;
    let payroll_id = parse_payroll_id(&id)?;

    state.service.remove(payroll_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

// ─────────────────────────────────────────────────────────────────────────────
// API Key Management
// ─────────────────────────────────────────────────────────────────────────────

/// Bootstrap endpoint - creates the first API key.
///
/// This endpoint only works when there are NO existing API keys in the system.
/// It returns the raw API key (only shown once) that should be saved securely.
#[tracing::instrument(skip(state), fields(key_name = %req.name))]
pub async fn bootstrap<R: PayrollStore>(
    State(state): State<Arc<AppState<R>>>,
    Json(req): Json<BootstrapRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let created = state.service.bootstrap(req).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

/// Create a new API key.
#[tracing::instrument(skip(state, caller), fields(key_name = %req.name))]
pub async fn create_api_key<R: PayrollStore>(
    State(state): State<Arc<AppState<R>>>,
    Extension(caller): Extension<ApiKey>,
    Json(req): Json<CreateApiKeyRequest>,
) -> Result<impl IntoResponse, ApiError> {
    require_admin(&caller)?;

    let created = state.service.create_api_key(req).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

/// List all API keys (without exposing raw keys).
#[tracing::instrument(skip(state, caller))]
pub async fn list_api_keys<R: PayrollStore>(
    State(state): State<Arc<AppState<R>>>,
    Extension(caller): Extension<ApiKey>,
) -> Result<impl IntoResponse, ApiError> {
    require_admin(&caller)?;

    let keys = state.service.list_api_keys().await?;
    Ok(Json(keys))
}
