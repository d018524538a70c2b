use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Closed set of operator roles.
///
/// Policy hangs off explicit capability methods rather than role-name
/// string comparison, so a renamed role cannot silently change behavior.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    SystemAdmin,
    Physician,
    Nurse,
    Reception,
}

impl Role {
    /// Break-glass availability safeguard: the highest administrative role
    /// is never auto-locked by failed-attempt counting. Excessive failures
    /// on such accounts are logged at high severity instead.
    pub fn exempt_from_lockout(&self) -> bool {
        matches!(self, Role::SystemAdmin)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenType {
    Access,
    Refresh,
}

impl std::fmt::Display for TokenType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Access => f.write_str("access"),
            Self::Refresh => f.write_str("refresh"),
        }
    }
}

/// What a caller asks to embed in a token.
#[derive(Debug, Clone)]
pub struct TokenPayload {
    pub user_id: Uuid,
    pub role: Role,
    pub permissions: Vec<String>,
    /// Optional pre-assigned token id; a fresh one is generated when absent.
    pub token_id: Option<Uuid>,
}

impl TokenPayload {
    pub fn new(user_id: Uuid, role: Role, permissions: Vec<String>) -> Self {
        Self {
            user_id,
            role,
            permissions,
            token_id: None,
        }
    }
}

/// Signed token claims.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Claims {
    /// Token id, tracked by sessions and the blacklist.
    pub jti: Uuid,
    /// Subject user id.
    pub sub: Uuid,
    pub role: Role,
    pub permissions: Vec<String>,
    pub token_type: TokenType,
    /// Issued-at, seconds since epoch.
    pub iat: i64,
    /// Expiry, seconds since epoch.
    pub exp: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_system_admin_is_lockout_exempt() {
        assert!(Role::SystemAdmin.exempt_from_lockout());
        assert!(!Role::Physician.exempt_from_lockout());
        assert!(!Role::Nurse.exempt_from_lockout());
        assert!(!Role::Reception.exempt_from_lockout());
    }

    #[test]
    fn token_type_serializes_lowercase() {
        assert_eq!(
            serde_json::to_string(&TokenType::Access).unwrap(),
            "\"access\""
        );
        assert_eq!(
            serde_json::to_string(&TokenType::Refresh).unwrap(),
            "\"refresh\""
        );
    }
}
