use aes_gcm::{
    aead::{Aead, KeyInit, OsRng},
    Aes256Gcm, Nonce,
};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use rand::RngCore;
use zeroize::Zeroizing;

use crate::error::{CryptoError, CryptoResult};

const NONCE_LEN: usize = 12;

/// AES-256-GCM cipher for secrets at rest (TOTP seeds).
///
/// Wire format is `base64(nonce ‖ ciphertext)` with a random 96-bit nonce
/// per encryption, so the same plaintext never encrypts to the same value
/// twice.
pub struct SecretCipher {
    cipher: Aes256Gcm,
}

impl SecretCipher {
    /// Build from raw key material. The key must be exactly 32 bytes.
    pub fn new(key: &[u8]) -> CryptoResult<Self> {
        if key.len() != 32 {
            return Err(CryptoError::InvalidKeyLength {
                expected: 32,
                got: key.len(),
            });
        }
        let cipher =
            Aes256Gcm::new_from_slice(key).map_err(|_| CryptoError::InvalidKeyLength {
                expected: 32,
                got: key.len(),
            })?;
        Ok(Self { cipher })
    }

    pub fn encrypt(&self, plaintext: &str) -> CryptoResult<String> {
        let mut nonce_bytes = [0u8; NONCE_LEN];
        OsRng.fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = self
            .cipher
            .encrypt(nonce, plaintext.as_bytes())
            .map_err(|_| CryptoError::EncryptionFailed)?;

        let mut combined = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        combined.extend_from_slice(&nonce_bytes);
        combined.extend_from_slice(&ciphertext);

        Ok(BASE64.encode(combined))
    }

    /// Decrypt and return the plaintext, zeroized when dropped.
    pub fn decrypt(&self, encoded: &str) -> CryptoResult<Zeroizing<String>> {
        let combined = BASE64
            .decode(encoded)
            .map_err(|_| CryptoError::InvalidFormat)?;

        if combined.len() <= NONCE_LEN {
            return Err(CryptoError::InvalidFormat);
        }
        let (nonce_bytes, ciphertext) = combined.split_at(NONCE_LEN);
        let nonce = Nonce::from_slice(nonce_bytes);

        let plaintext = self
            .cipher
            .decrypt(nonce, ciphertext)
            .map_err(|_| CryptoError::DecryptionFailed)?;

        String::from_utf8(plaintext)
            .map(Zeroizing::new)
            .map_err(|_| CryptoError::DecryptionFailed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cipher() -> SecretCipher {
        SecretCipher::new(b"0123456789abcdef0123456789abcdef").unwrap()
    }

    #[test]
    fn encrypt_decrypt_round_trip() {
        let c = cipher();
        let encrypted = c.encrypt("JBSWY3DPEHPK3PXP").unwrap();
        let decrypted = c.decrypt(&encrypted).unwrap();
        assert_eq!(decrypted.as_str(), "JBSWY3DPEHPK3PXP");
    }

    #[test]
    fn nonce_makes_ciphertexts_differ() {
        let c = cipher();
        let a = c.encrypt("same-secret").unwrap();
        let b = c.encrypt("same-secret").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn wrong_key_fails_to_decrypt() {
        let encrypted = cipher().encrypt("JBSWY3DPEHPK3PXP").unwrap();
        let other = SecretCipher::new(b"ffffffffffffffffffffffffffffffff").unwrap();
        assert!(matches!(
            other.decrypt(&encrypted),
            Err(CryptoError::DecryptionFailed)
        ));
    }

    #[test]
    fn rejects_bad_key_length() {
        assert!(matches!(
            SecretCipher::new(b"too-short"),
            Err(CryptoError::InvalidKeyLength { expected: 32, .. })
        ));
    }

    #[test]
    fn rejects_truncated_payload() {
        let c = cipher();
        assert!(c.decrypt("AAAA").is_err());
        assert!(c.decrypt("not base64 at all!").is_err());
    }
}
