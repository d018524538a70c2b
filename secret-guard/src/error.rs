use thiserror::Error;

use crate::guard::SecretKind;

/// A single failed check against one secret.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecretViolation {
    pub kind: SecretKind,
    pub reason: ViolationReason,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ViolationReason {
    Missing,
    TooShort { min: usize, got: usize },
    WrongLength { expected: usize, got: usize },
    KnownInsecureDefault,
    SingleRepeatedCharacter,
    WeakPattern(&'static str),
}

impl std::fmt::Display for SecretViolation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Never echo secret material; only the check that failed.
        match &self.reason {
            ViolationReason::Missing => write!(f, "{}: not set", self.kind),
            ViolationReason::TooShort { min, got } => {
                write!(f, "{}: {} chars, minimum {}", self.kind, got, min)
            }
            ViolationReason::WrongLength { expected, got } => {
                write!(f, "{}: {} chars, must be exactly {}", self.kind, got, expected)
            }
            ViolationReason::KnownInsecureDefault => {
                write!(f, "{}: matches a known insecure default", self.kind)
            }
            ViolationReason::SingleRepeatedCharacter => {
                write!(f, "{}: single repeated character", self.kind)
            }
            ViolationReason::WeakPattern(p) => {
                write!(f, "{}: contains weak pattern {p:?}", self.kind)
            }
        }
    }
}

#[derive(Error, Debug)]
pub enum SecretGuardError {
    /// Production policy: the process must not start.
    #[error("secret validation failed in production: {}", format_violations(.0))]
    Fatal(Vec<SecretViolation>),
}

fn format_violations(violations: &[SecretViolation]) -> String {
    violations
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}
