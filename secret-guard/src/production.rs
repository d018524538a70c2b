use secrecy::{ExposeSecret, SecretString};

use crate::error::SecretViolation;
use crate::guard::{check_secret, SecretKind};

/// A secret that provably passed validation.
///
/// There is no other way to construct one, so an API taking
/// `ProductionSecret` cannot be handed a denylisted or undersized value —
/// the fail-closed property is carried by the type rather than by call
/// discipline.
pub struct ProductionSecret {
    kind: SecretKind,
    value: SecretString,
}

impl ProductionSecret {
    pub fn new(kind: SecretKind, value: &str) -> Result<Self, Vec<SecretViolation>> {
        let violations = check_secret(kind, value);
        if !violations.is_empty() {
            return Err(violations);
        }
        Ok(Self {
            kind,
            value: SecretString::new(value.to_string()),
        })
    }

    pub fn kind(&self) -> SecretKind {
        self.kind
    }

    pub fn expose(&self) -> &str {
        self.value.expose_secret()
    }
}

impl std::fmt::Debug for ProductionSecret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProductionSecret")
            .field("kind", &self.kind)
            .field("value", &"[REDACTED]")
            .finish()
    }
}
