use std::collections::HashMap;

use rand::distributions::Alphanumeric;
use rand::Rng;
use secrecy::SecretString;
use serde::{Deserialize, Serialize};

use crate::error::{SecretGuardError, SecretViolation, ViolationReason};

/// Known-insecure values that must never be accepted, in any environment
/// where validation is enforced.
const DENYLIST: &[&str] = &[
    "secret",
    "changeme",
    "change-me",
    "password",
    "default",
    "your-secret-key",
    "dev-secret",
    "test-secret",
    "insecure",
    "letmein",
];

/// Weak substrings / prefixes rejected outright.
const WEAK_SEQUENCES: &[&str] = &["abc", "123", "qwerty"];

/// Minimum unique-characters/length ratio before a warning is emitted.
const ENTROPY_RATIO_FLOOR: f64 = 0.3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SecretKind {
    AccessTokenKey,
    RefreshTokenKey,
    Pepper,
    CryptoKey,
}

impl SecretKind {
    pub const ALL: [SecretKind; 4] = [
        SecretKind::AccessTokenKey,
        SecretKind::RefreshTokenKey,
        SecretKind::Pepper,
        SecretKind::CryptoKey,
    ];

    pub fn env_var(&self) -> &'static str {
        match self {
            Self::AccessTokenKey => "WARDFLOW_ACCESS_TOKEN_KEY",
            Self::RefreshTokenKey => "WARDFLOW_REFRESH_TOKEN_KEY",
            Self::Pepper => "WARDFLOW_PEPPER",
            Self::CryptoKey => "WARDFLOW_CRYPTO_KEY",
        }
    }

    pub fn min_len(&self) -> usize {
        match self {
            Self::AccessTokenKey | Self::RefreshTokenKey => 32,
            Self::Pepper => 16,
            Self::CryptoKey => 32,
        }
    }

    /// The crypto key doubles as an AES-256 key, so its length is fixed.
    pub fn exact_len(&self) -> Option<usize> {
        match self {
            Self::CryptoKey => Some(32),
            _ => None,
        }
    }

    fn test_placeholder(&self) -> &'static str {
        match self {
            Self::AccessTokenKey => "placeholder-access-signing-key-0f2a7c",
            Self::RefreshTokenKey => "placeholder-refresh-signing-key-4e9d1b",
            Self::Pepper => "placeholder-pepper-77c3",
            Self::CryptoKey => "placeholder-crypto-key-32chars-q",
        }
    }
}

impl std::fmt::Display for SecretKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::AccessTokenKey => "access token key",
            Self::RefreshTokenKey => "refresh token key",
            Self::Pepper => "pepper",
            Self::CryptoKey => "crypto key",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    Production,
    Development,
    Test,
}

impl Environment {
    /// Resolve from `WARDFLOW_ENV`, defaulting to development.
    pub fn from_env() -> Self {
        match std::env::var("WARDFLOW_ENV").as_deref() {
            Ok("production") | Ok("prod") => Self::Production,
            Ok("test") => Self::Test,
            _ => Self::Development,
        }
    }
}

/// Raw secret material as provided by the operator.
#[derive(Debug, Default, Clone)]
pub struct SecretsInput {
    pub access_token_key: Option<String>,
    pub refresh_token_key: Option<String>,
    pub pepper: Option<String>,
    pub crypto_key: Option<String>,
}

impl SecretsInput {
    pub fn from_env() -> Self {
        let read = |kind: SecretKind| std::env::var(kind.env_var()).ok().filter(|v| !v.is_empty());
        Self {
            access_token_key: read(SecretKind::AccessTokenKey),
            refresh_token_key: read(SecretKind::RefreshTokenKey),
            pepper: read(SecretKind::Pepper),
            crypto_key: read(SecretKind::CryptoKey),
        }
    }

    fn get(&self, kind: SecretKind) -> Option<&str> {
        match kind {
            SecretKind::AccessTokenKey => self.access_token_key.as_deref(),
            SecretKind::RefreshTokenKey => self.refresh_token_key.as_deref(),
            SecretKind::Pepper => self.pepper.as_deref(),
            SecretKind::CryptoKey => self.crypto_key.as_deref(),
        }
    }
}

/// Secrets that passed the guard, wrapped so they never appear in debug
/// output or logs.
#[derive(Debug)]
pub struct ValidatedSecrets {
    pub access_token_key: SecretString,
    pub refresh_token_key: SecretString,
    pub pepper: SecretString,
    pub crypto_key: SecretString,
}

#[derive(Debug)]
pub struct ValidationReport {
    pub valid: bool,
    pub errors: Vec<SecretViolation>,
    pub warnings: Vec<String>,
    pub secrets: ValidatedSecrets,
}

pub struct SecretGuard;

impl SecretGuard {
    /// Validate operational secrets against the environment policy.
    ///
    /// # Errors
    ///
    /// In production any check failure is fatal and the process must not
    /// start. Development failures are remediated with freshly generated
    /// random fallbacks (warned); test failures are remediated silently
    /// with deterministic placeholders.
    pub fn validate(
        input: &SecretsInput,
        environment: Environment,
    ) -> Result<ValidationReport, SecretGuardError> {
        let mut errors = Vec::new();
        let mut warnings = Vec::new();
        let mut resolved: HashMap<SecretKind, String> = HashMap::new();

        for kind in SecretKind::ALL {
            let violations = match input.get(kind) {
                Some(value) => {
                    let found = check_secret(kind, value);
                    if found.is_empty() {
                        if entropy_ratio(value) < ENTROPY_RATIO_FLOOR {
                            warnings.push(format!("{kind}: low character diversity"));
                        }
                        resolved.insert(kind, value.to_string());
                    }
                    found
                }
                None => vec![SecretViolation {
                    kind,
                    reason: ViolationReason::Missing,
                }],
            };

            if violations.is_empty() {
                continue;
            }

            match environment {
                Environment::Production => errors.extend(violations),
                Environment::Development => {
                    for v in &violations {
                        tracing::warn!(secret = %kind, "replacing secret with generated fallback: {v}");
                        warnings.push(format!("{v}; generated fallback in use"));
                    }
                    resolved.insert(kind, generate_fallback(kind));
                }
                Environment::Test => {
                    resolved.insert(kind, kind.test_placeholder().to_string());
                }
            }
        }

        if environment == Environment::Production && !errors.is_empty() {
            return Err(SecretGuardError::Fatal(errors));
        }

        let mut take = |kind: SecretKind| {
            // Every kind is resolved by now: either it validated or the
            // non-production policy substituted a value.
            SecretString::new(resolved.remove(&kind).unwrap_or_default())
        };

        Ok(ValidationReport {
            valid: errors.is_empty(),
            errors,
            warnings,
            secrets: ValidatedSecrets {
                access_token_key: take(SecretKind::AccessTokenKey),
                refresh_token_key: take(SecretKind::RefreshTokenKey),
                pepper: take(SecretKind::Pepper),
                crypto_key: take(SecretKind::CryptoKey),
            },
        })
    }
}

/// Run every structural check against one secret value.
pub(crate) fn check_secret(kind: SecretKind, value: &str) -> Vec<SecretViolation> {
    let mut violations = Vec::new();
    let mut push = |reason| violations.push(SecretViolation { kind, reason });

    if let Some(expected) = kind.exact_len() {
        if value.len() != expected {
            push(ViolationReason::WrongLength {
                expected,
                got: value.len(),
            });
        }
    } else if value.len() < kind.min_len() {
        push(ViolationReason::TooShort {
            min: kind.min_len(),
            got: value.len(),
        });
    }

    let lowered = value.to_lowercase();
    if DENYLIST.contains(&lowered.as_str()) {
        push(ViolationReason::KnownInsecureDefault);
    }

    let mut chars = value.chars();
    if let Some(first) = chars.next() {
        if chars.all(|c| c == first) {
            push(ViolationReason::SingleRepeatedCharacter);
        }
    }

    for seq in WEAK_SEQUENCES {
        if lowered.contains(seq) {
            push(ViolationReason::WeakPattern(seq));
        }
    }
    if lowered.starts_with("password") {
        push(ViolationReason::WeakPattern("password"));
    }

    violations
}

fn entropy_ratio(value: &str) -> f64 {
    if value.is_empty() {
        return 0.0;
    }
    let unique: std::collections::HashSet<char> = value.chars().collect();
    unique.len() as f64 / value.chars().count() as f64
}

fn generate_fallback(kind: SecretKind) -> String {
    let len = kind.exact_len().unwrap_or_else(|| kind.min_len().max(48));
    loop {
        let candidate: String = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(len)
            .map(char::from)
            .collect();
        // Regenerate on the (unlikely) chance a weak sequence appears.
        if check_secret(kind, &candidate).is_empty() {
            return candidate;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;

    fn strong_input() -> SecretsInput {
        SecretsInput {
            access_token_key: Some("kX9mP4vQ8wR2tY6uZ0aS5dF7gH9jL4nB".into()),
            refresh_token_key: Some("qW3eR5tY7uI9oP0aS2dF4gH6jK8lZ0xC".into()),
            pepper: Some("nV4bM8cX2zQ6wE0r".into()),
            crypto_key: Some("aS9dF3gH7jK5lQ1wE6rT0yU4iO8pZ2xV".into()),
        }
    }

    #[test]
    fn strong_secrets_pass_in_production() {
        let report = SecretGuard::validate(&strong_input(), Environment::Production).unwrap();
        assert!(report.valid);
        assert!(report.errors.is_empty());
        assert_eq!(
            report.secrets.pepper.expose_secret(),
            "nV4bM8cX2zQ6wE0r"
        );
    }

    #[test]
    fn missing_secret_is_fatal_in_production() {
        let mut input = strong_input();
        input.pepper = None;
        let err = SecretGuard::validate(&input, Environment::Production).unwrap_err();
        let SecretGuardError::Fatal(violations) = err;
        assert!(violations
            .iter()
            .any(|v| v.kind == SecretKind::Pepper && v.reason == ViolationReason::Missing));
    }

    #[test]
    fn denylisted_secret_is_fatal_in_production() {
        let mut input = strong_input();
        input.access_token_key = Some("your-secret-key".into());
        assert!(SecretGuard::validate(&input, Environment::Production).is_err());
    }

    #[test]
    fn crypto_key_length_is_exact() {
        let mut input = strong_input();
        input.crypto_key = Some("only-31-chars-long-not-enough-x".into());
        assert_eq!(input.crypto_key.as_deref().unwrap().len(), 31);
        assert!(SecretGuard::validate(&input, Environment::Production).is_err());
    }

    #[test]
    fn weak_patterns_rejected() {
        for bad in [
            "password-prefixed-but-long-enough-key",
            "contains-qwerty-somewhere-in-the-key",
            "zzzzzzzzzzzzzzzzzzzzzzzzzzzzzzzz",
        ] {
            let mut input = strong_input();
            input.refresh_token_key = Some(bad.into());
            assert!(
                SecretGuard::validate(&input, Environment::Production).is_err(),
                "expected rejection for {bad:?}"
            );
        }
    }

    #[test]
    fn development_substitutes_fallback_with_warning() {
        let mut input = strong_input();
        input.pepper = None;
        let report = SecretGuard::validate(&input, Environment::Development).unwrap();
        assert!(report.valid);
        assert!(!report.warnings.is_empty());
        assert!(report.secrets.pepper.expose_secret().len() >= 16);
    }

    #[test]
    fn test_environment_substitutes_placeholders_silently() {
        let report =
            SecretGuard::validate(&SecretsInput::default(), Environment::Test).unwrap();
        assert!(report.valid);
        assert!(report.warnings.is_empty());
        assert_eq!(report.secrets.crypto_key.expose_secret().len(), 32);
    }

    #[test]
    fn placeholders_pass_their_own_checks() {
        for kind in SecretKind::ALL {
            assert!(
                check_secret(kind, kind.test_placeholder()).is_empty(),
                "placeholder for {kind} fails validation"
            );
        }
    }

    #[test]
    fn low_entropy_is_warning_only() {
        let mut input = strong_input();
        // Long enough, not monotonous, no weak sequence, but few distinct chars.
        input.access_token_key = Some("xyxyxyxyxyxyxyxyxyxyxyxyxyxyxyxz".into());
        let report = SecretGuard::validate(&input, Environment::Production).unwrap();
        assert!(report.valid);
        assert!(report
            .warnings
            .iter()
            .any(|w| w.contains("character diversity")));
    }
}
