//! API key domain type.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::ids::ApiKeyId;
use crate::error::DomainError;

/// Role attached to an API key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    /// May generate, pay, cancel and delete payrolls.
    PayrollAdmin,
    /// Read-only access.
    Viewer,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::PayrollAdmin => "PAYROLL_ADMIN",
            Role::Viewer => "VIEWER",
        }
    }

    pub fn can_manage_payroll(&self) -> bool {
        matches!(self, Role::PayrollAdmin)
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Role {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "PAYROLL_ADMIN" => Ok(Role::PayrollAdmin),
            "VIEWER" => Ok(Role::Viewer),
            _ => Err(DomainError::validation(
                "role",
                "Role must be PAYROLL_ADMIN or VIEWER",
            )),
        }
    }
}

/// An API key for authenticating requests.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiKey {
    pub id: ApiKeyId,
    pub name: String,
    pub key_hash: String,
    pub role: Role,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub last_used_at: Option<DateTime<Utc>>,
}

impl ApiKey {
    /// Creates a new API key with the given name, hash and role.
    pub fn new(name: String, key_hash: String, role: Role) -> Self {
        Self {
            id: ApiKeyId::new(),
            name,
            key_hash,
            role,
            is_active: true,
            created_at: Utc::now(),
            last_used_at: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_admin_manages_payroll() {
        assert!(Role::PayrollAdmin.can_manage_payroll());
        assert!(!Role::Viewer.can_manage_payroll());
    }

    #[test]
    fn test_role_parse() {
        assert_eq!("viewer".parse::<Role>().unwrap(), Role::Viewer);
        assert!("ROOT".parse::<Role>().is_err());
    }
}
