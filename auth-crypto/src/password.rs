use argon2::password_hash::{rand_core::OsRng, SaltString};
use argon2::{Algorithm, Argon2, Params, PasswordHash, PasswordHasher as _, PasswordVerifier, Version};
use rand::RngCore;
use secrecy::{ExposeSecret, SecretString};
use zeroize::Zeroizing;

use crate::error::{CryptoError, CryptoResult};

/// Number of historical hashes consulted on password change.
pub const HISTORY_LIMIT: usize = 10;

/// Argon2id work factors.
///
/// Defaults are sized for interactive login on server hardware: 64 MiB of
/// memory, 3 passes, 4 lanes, 32-byte output.
#[derive(Debug, Clone)]
pub struct Argon2Params {
    /// Memory cost in KiB
    pub memory_cost: u32,
    /// Time cost (iterations)
    pub time_cost: u32,
    /// Parallelism factor
    pub parallelism: u32,
    /// Output length in bytes
    pub output_len: usize,
}

impl Default for Argon2Params {
    fn default() -> Self {
        Self {
            memory_cost: 65536, // 64 MiB
            time_cost: 3,
            parallelism: 4,
            output_len: 32,
        }
    }
}

/// Memory-hard password hasher combining a per-user salt with a
/// process-wide pepper.
///
/// The pepper is injected at construction and never stored alongside the
/// hash: a stolen credential table without the pepper is not crackable by
/// itself. Verification delegates to the argon2 verifier, which compares
/// digests in constant time.
pub struct PasswordHasher {
    argon2: Argon2<'static>,
    pepper: SecretString,
}

impl PasswordHasher {
    pub fn new(pepper: SecretString, params: Argon2Params) -> CryptoResult<Self> {
        let argon2 = Argon2::new(
            Algorithm::Argon2id,
            Version::V0x13,
            Params::new(
                params.memory_cost,
                params.time_cost,
                params.parallelism,
                Some(params.output_len),
            )
            .map_err(|e| CryptoError::HashingFailed(e.to_string()))?,
        );
        Ok(Self { argon2, pepper })
    }

    /// Hash `password ‖ salt ‖ pepper` into a PHC-format string.
    pub fn hash(&self, password: &str, salt: &str) -> CryptoResult<String> {
        let peppered = self.peppered(password, salt);
        let hash_salt = SaltString::generate(&mut OsRng);

        let hash = self
            .argon2
            .hash_password(peppered.as_bytes(), &hash_salt)
            .map_err(|e| CryptoError::HashingFailed(e.to_string()))?
            .to_string();

        Ok(hash)
    }

    /// Verify a password against a stored hash using the user's salt.
    ///
    /// Returns `Ok(false)` on mismatch; errors only on a malformed hash.
    pub fn verify(&self, password: &str, hash: &str, salt: &str) -> CryptoResult<bool> {
        let parsed = PasswordHash::new(hash).map_err(|_| CryptoError::InvalidHashFormat)?;
        let peppered = self.peppered(password, salt);

        Ok(self
            .argon2
            .verify_password(peppered.as_bytes(), &parsed)
            .is_ok())
    }

    /// Check a candidate password against historical hashes, all verified
    /// with the user's *current* salt. At most [`HISTORY_LIMIT`] entries
    /// are consulted.
    pub fn is_password_reused<S: AsRef<str>>(
        &self,
        candidate: &str,
        salt: &str,
        history: &[S],
    ) -> bool {
        history
            .iter()
            .take(HISTORY_LIMIT)
            .any(|old| self.verify(candidate, old.as_ref(), salt).unwrap_or(false))
    }

    fn peppered(&self, password: &str, salt: &str) -> Zeroizing<String> {
        Zeroizing::new(format!(
            "{password}{salt}{}",
            self.pepper.expose_secret()
        ))
    }
}

/// Generate a fresh per-user salt: 32 random bytes, hex-encoded.
pub fn generate_salt() -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// Validate password strength before hashing.
///
/// Requirements: at least 12 characters with upper, lower, digit and
/// special characters present.
pub fn validate_password_strength(password: &str) -> CryptoResult<()> {
    if password.len() < 12 {
        return Err(CryptoError::WeakPassword(
            "must be at least 12 characters".into(),
        ));
    }

    let has_uppercase = password.chars().any(|c| c.is_uppercase());
    let has_lowercase = password.chars().any(|c| c.is_lowercase());
    let has_digit = password.chars().any(|c| c.is_ascii_digit());
    let has_special = password.chars().any(|c| !c.is_alphanumeric());

    if has_uppercase && has_lowercase && has_digit && has_special {
        Ok(())
    } else {
        Err(CryptoError::WeakPassword(
            "must contain upper, lower, digit and special characters".into(),
        ))
    }
}
