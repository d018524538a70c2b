//! Cryptographic primitives for the WardFlow authentication core.
//!
//! Scope is deliberately narrow: memory-hard password hashing with a
//! process-wide pepper, password-history reuse checks, AES-256-GCM
//! encryption for TOTP secrets at rest, and constant-time comparison
//! helpers. Token signing lives in `token-service`; fingerprint HMACs live
//! in `device-fingerprint`.

pub mod constant_time;
pub mod error;
pub mod password;
pub mod secret_cipher;

pub use error::{CryptoError, CryptoResult};
pub use password::{Argon2Params, PasswordHasher, HISTORY_LIMIT};
pub use secret_cipher::SecretCipher;
