//! Authentication middleware for API key validation.

use std::sync::Arc;

use axum::{
    body::Body,
    extract::State,
    http::{Method, Request},
    middleware::Next,
    response::{IntoResponse, Response},
};

use payroll_types::{AppError, PayrollStore};

use super::handlers::{ApiError, AppState};

/// Extracts the API key from the Authorization header.
/// Expected format: "Bearer <api_key>" or just "<api_key>"
fn extract_api_key(auth_header: Option<&str>) -> Option<&str> {
    let header = auth_header?;
    Some(header.strip_prefix("Bearer ").unwrap_or(header).trim())
}

/// Routes reachable without a key.
fn is_public(method: &Method, path: &str) -> bool {
    path == "/health"
        || (path == "/api/bootstrap" && method == Method::POST)
        || path.starts_with("/swagger-ui")
        || path.starts_with("/api-docs")
}

/// Authentication middleware that validates API keys.
///
/// On success the resolved [`payroll_types::ApiKey`] is stored in the request
/// extensions so handlers can check its role. Missing or unknown keys get
/// 401 Unauthorized.
///
/// Endpoints that bypass authentication:
/// - `/health` - Health check endpoint
/// - `POST /api/bootstrap` - Creates the first API key (only works when no keys exist)
/// - `/swagger-ui`, `/api-docs` - OpenAPI documentation
pub async fn auth_middleware<R: PayrollStore>(
    State(state): State<Arc<AppState<R>>>,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    if is_public(request.method(), request.uri().path()) {
        return next.run(request).await;
    }

    let auth_header = request
        .headers()
        .get("Authorization")
        .and_then(|v| v.to_str().ok());

    let raw_key = match extract_api_key(auth_header) {
        Some(key) if !key.is_empty() => key.to_string(),
        _ => {
            return ApiError(AppError::Unauthorized(
                "Missing or invalid Authorization header".into(),
            ))
            .into_response();
        }
    };

    match state.service.authenticate(&raw_key).await {
        Ok(api_key) => {
            tracing::debug!(key_id = %api_key.id, role = %api_key.role, "Authenticated");
            request.extensions_mut().insert(api_key);
            next.run(request).await
        }
        Err(e) => {
            if matches!(e, AppError::Internal(_)) {
                tracing::error!("API key verification failed: {}", e);
            }
            ApiError(e).into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_api_key_bearer() {
        assert_eq!(
            extract_api_key(Some("Bearer pk_test_123")),
            Some("pk_test_123")
        );
    }

    #[test]
    fn test_extract_api_key_raw() {
        assert_eq!(extract_api_key(Some("pk_test_123")), Some("pk_test_123"));
    }

    #[test]
    fn test_extract_api_key_none() {
        assert_eq!(extract_api_key(None), None);
    }

    #[test]
    fn test_public_routes() {
        assert!(is_public(&Method::GET, "/health"));
        assert!(is_public(&Method::POST, "/api/bootstrap"));
        assert!(is_public(&Method::GET, "/api-docs/openapi.json"));
        assert!(!is_public(&Method::GET, "/api/bootstrap"));
        assert!(!is_public(&Method::GET, "/api/payrolls"));
    }
}
