//! API key storage port.

use crate::domain::{ApiKey, Role};
use crate::error::RepoError;

#[async_trait::async_trait]
pub trait ApiKeyStore: Send + Sync + 'static {
    /// Looks up an active key by hash and records its use.
    async fn verify_api_key_hash(&self, key_hash: &str) -> Result<Option<ApiKey>, RepoError>;

    /// Creates a key and returns it with the raw secret (shown once).
    async fn create_api_key(&self, name: &str, role: Role) -> Result<(ApiKey, String), RepoError>;

    async fn count_api_keys(&self) -> Result<i64, RepoError>;

    async fn list_api_keys(&self) -> Result<Vec<ApiKey>, RepoError>;
}
