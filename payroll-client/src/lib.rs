//! # Payroll Client SDK
//!
//! A typed Rust client for the Payroll API.

use payroll_types::{
    ApiKeyInfo, ApiKeyResponse, BootstrapRequest, CreateApiKeyRequest, GeneratePayrollRequest,
    PayrollFilter, PayrollId, PayrollPage, PayrollPeriod, PayrollPreview, PayrollStatus,
    PreviewPayrollRequest, Role, UpdatePayrollRequest,
};
use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;

/// Error type for client operations.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error: {status} - {message}")]
    Api {
        status: u16,
        message: String,
        /// Offending request field, reported on 422 responses.
        field: Option<String>,
    },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ClientError {
    /// HTTP status of an API error, if this is one.
    pub fn status(&self) -> Option<u16> {
        match self {
            ClientError::Api { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// Payroll API client.
pub struct PayrollClient {
    base_url: String,
    api_key: Option<String>,
    http: Client,
}

impl PayrollClient {
    /// Creates a new client.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: None,
            http: Client::new(),
        }
    }

    /// Sets the API key for authentication.
    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    /// Checks if the API is healthy.
    pub async fn health(&self) -> Result<bool, ClientError> {
        let resp = self
            .http
            .get(format!("{}/health", self.base_url))
            .send()
            .await?;
        Ok(resp.status().is_success())
    }

    // ─────────────────────────────────────────────────────────────────────────
    // API keys
    // ─────────────────────────────────────────────────────────────────────────

    /// Creates the first admin key. Only succeeds while no key exists.
    pub async fn bootstrap(&self, name: &str) -> Result<ApiKeyResponse, ClientError> {
        let req = BootstrapRequest {
            name: name.to_string(),
        };
        self.send(self.http.post(self.url("/api/bootstrap")).json(&req))
            .await
    }

    /// Creates another API key (admin).
    pub async fn create_api_key(
        &self,
        name: &str,
        role: Role,
    ) -> Result<ApiKeyResponse, ClientError> {
        let req = CreateApiKeyRequest {
            name: name.to_string(),
            role,
        };
        self.send(self.http.post(self.url("/api/keys")).json(&req))
            .await
    }

    /// Lists API keys (admin).
    pub async fn list_api_keys(&self) -> Result<Vec<ApiKeyInfo>, ClientError> {
        self.send(self.http.get(self.url("/api/keys"))).await
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Payrolls
    // ─────────────────────────────────────────────────────────────────────────

    /// Generates a PENDING payroll.
    pub async fn generate(&self, req: &GeneratePayrollRequest) -> Result<PayrollPeriod, ClientError> {
        self.send(self.http.post(self.url("/api/payrolls")).json(req))
            .await
    }

    /// Computes a payroll without recording it.
    pub async fn preview(&self, req: &PreviewPayrollRequest) -> Result<PayrollPreview, ClientError> {
        self.send(self.http.post(self.url("/api/payrolls/preview")).json(req))
            .await
    }

    /// Gets a payroll by ID.
    pub async fn get_payroll(&self, id: PayrollId) -> Result<PayrollPeriod, ClientError> {
        self.send(self.http.get(self.url(&format!("/api/payrolls/{}", id))))
            .await
    }

    /// Lists payrolls matching the filter.
    pub async fn list_payrolls(&self, filter: &PayrollFilter) -> Result<PayrollPage, ClientError> {
        self.send(self.http.get(self.url("/api/payrolls")).query(filter))
            .await
    }

    /// Sends a generic update; only a status change is accepted by the server.
    pub async fn update_payroll(
        &self,
        id: PayrollId,
        req: &UpdatePayrollRequest,
    ) -> Result<PayrollPeriod, ClientError> {
        self.send(
            self.http
                .put(self.url(&format!("/api/payrolls/{}", id)))
                .json(req),
        )
        .await
    }

    /// Moves a payroll to the given terminal status through the update route.
    pub async fn set_status(
        &self,
        id: PayrollId,
        status: PayrollStatus,
    ) -> Result<PayrollPeriod, ClientError> {
        let req = UpdatePayrollRequest {
            status: Some(status),
            ..Default::default()
        };
        self.update_payroll(id, &req).await
    }

    /// Marks a payroll as paid.
    pub async fn mark_paid(&self, id: PayrollId) -> Result<PayrollPeriod, ClientError> {
        self.send(self.http.post(self.url(&format!("/api/payrolls/{}/pay", id))))
            .await
    }

    /// Cancels a payroll.
    pub async fn cancel(&self, id: PayrollId) -> Result<PayrollPeriod, ClientError> {
        self.send(
            self.http
                .post(self.url(&format!("/api/payrolls/{}/cancel", id))),
        )
        .await
    }

    /// Deletes a pending payroll.
    pub async fn remove(&self, id: PayrollId) -> Result<(), ClientError> {
        let resp = self
            .authorize(self.http.delete(self.url(&format!("/api/payrolls/{}", id))))
            .send()
            .await?;
        let status = resp.status();
        if status.is_success() {
            Ok(())
        } else {
            let body = resp.text().await.unwrap_or_default();
            Err(api_error(status.as_u16(), &body))
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn authorize(&self, req: RequestBuilder) -> RequestBuilder {
        match &self.api_key {
            Some(key) => req.bearer_auth(key),
            None => req,
        }
    }

    async fn send<T: DeserializeOwned>(&self, req: RequestBuilder) -> Result<T, ClientError> {
        let resp = self.authorize(req).send().await?;
        self.handle_response(resp).await
    }

    async fn handle_response<T: DeserializeOwned>(
        &self,
        resp: reqwest::Response,
    ) -> Result<T, ClientError> {
        let status = resp.status();
        if status.is_success() {
            let body = resp.text().await?;
            Ok(serde_json::from_str(&body)?)
        } else {
            let body = resp.text().await.unwrap_or_default();
            Err(api_error(status.as_u16(), &body))
        }
    }
}

/// Builds an API error from a `{ "error", "code", "field"? }` body, falling
/// back to the raw text.
fn api_error(status: u16, body: &str) -> ClientError {
    let parsed = serde_json::from_str::<serde_json::Value>(body).ok();
    let message = parsed
        .as_ref()
        .and_then(|v| v.get("error").and_then(|e| e.as_str()).map(String::from))
        .unwrap_or_else(|| body.to_string());
    let field = parsed
        .as_ref()
        .and_then(|v| v.get("field").and_then(|f| f.as_str()).map(String::from));
    ClientError::Api {
        status,
        message,
        field,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_creation() {
        let client = PayrollClient::new("http://localhost:3000");
        assert_eq!(client.base_url, "http://localhost:3000");
    }

    #[test]
    fn test_client_with_trailing_slash() {
        let client = PayrollClient::new("http://localhost:3000/");
        assert_eq!(client.url("/api/payrolls"), "http://localhost:3000/api/payrolls");
    }

    #[test]
    fn test_client_with_api_key() {
        let client = PayrollClient::new("http://localhost:3000").with_api_key("test-key");
        assert_eq!(client.api_key, Some("test-key".to_string()));
    }

    #[test]
    fn test_api_error_reads_field() {
        let err = api_error(
            422,
            r#"{"error":"Reference number cannot be empty","code":422,"field":"ref_no"}"#,
        );
        match err {
            ClientError::Api {
                status,
                message,
                field,
            } => {
                assert_eq!(status, 422);
                assert_eq!(message, "Reference number cannot be empty");
                assert_eq!(field.as_deref(), Some("ref_no"));
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_api_error_falls_back_to_body() {
        let err = api_error(502, "Bad Gateway");
        assert_eq!(err.status(), Some(502));
        assert_eq!(err.to_string(), "API error: 502 - Bad Gateway");
    }
}
