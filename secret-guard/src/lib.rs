//! Operational secret validation for the WardFlow authentication core.
//!
//! No component may issue tokens before the process-wide secrets (token
//! signing keys, pepper, crypto key) have passed this guard. Policy is
//! environment-dependent: production refuses to start on any failure,
//! development substitutes random fallbacks with a warning, and the test
//! environment silently substitutes deterministic placeholders.

pub mod error;
pub mod guard;
pub mod production;

pub use error::{SecretGuardError, SecretViolation, ViolationReason};
pub use guard::{
    Environment, SecretGuard, SecretKind, SecretsInput, ValidatedSecrets, ValidationReport,
};
pub use production::ProductionSecret;
