//! TOTP generation and verification for the step-up flow.
//!
//! Codes are 6 digits over a 30-second step, verified with a configurable
//! drift tolerance (default one step either side) to absorb client clock
//! skew. The shared secret is 20 random bytes, stored base64-encoded and
//! encrypted at rest; it is only decrypted for the duration of a
//! verification call.

use auth_crypto::constant_time::ct_eq_str;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use rand::RngCore;
use totp_lite::{totp_custom, Sha1, DEFAULT_STEP};

const SECRET_LEN: usize = 20;
const DIGITS: u32 = 6;

/// Generate a fresh TOTP secret, base64-encoded.
pub fn generate_secret() -> String {
    let mut bytes = [0u8; SECRET_LEN];
    rand::thread_rng().fill_bytes(&mut bytes);
    BASE64.encode(bytes)
}

/// Provisioning URI for authenticator apps.
pub fn provisioning_uri(issuer: &str, account: &str, secret_b64: &str) -> String {
    format!("otpauth://totp/{issuer}:{account}?secret={secret_b64}&issuer={issuer}&digits={DIGITS}")
}

/// Whether a submitted code is shaped like a TOTP code at all. Anything
/// else is a validation failure, not a wrong code.
pub fn is_well_formed(code: &str) -> bool {
    code.len() == 6 && code.chars().all(|c| c.is_ascii_digit())
}

/// Verify a 6-digit code against the base64 secret at the given unix time,
/// tolerating `drift_steps` steps of clock skew either side.
pub fn verify_code(secret_b64: &str, code: &str, unix_seconds: u64, drift_steps: u64) -> bool {
    if !is_well_formed(code) {
        return false;
    }
    let Ok(secret) = BASE64.decode(secret_b64) else {
        return false;
    };
    if secret.len() != SECRET_LEN {
        return false;
    }

    let drift = drift_steps as i64;
    (-drift..=drift).any(|offset| {
        let at = unix_seconds as i64 + offset * DEFAULT_STEP as i64;
        if at < 0 {
            return false;
        }
        let expected = totp_custom::<Sha1>(DEFAULT_STEP, DIGITS, &secret, at as u64);
        ct_eq_str(&expected, code)
    })
}
