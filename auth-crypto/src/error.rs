use thiserror::Error;

#[derive(Error, Debug)]
pub enum CryptoError {
    #[error("Hashing failed: {0}")]
    HashingFailed(String),

    #[error("Invalid hash format")]
    InvalidHashFormat,

    #[error("Invalid key length: expected {expected}, got {got}")]
    InvalidKeyLength { expected: usize, got: usize },

    #[error("Encryption failed")]
    EncryptionFailed,

    #[error("Decryption failed")]
    DecryptionFailed,

    #[error("Invalid encrypted data format")]
    InvalidFormat,

    #[error("Password does not meet policy: {0}")]
    WeakPassword(String),
}

pub type CryptoResult<T> = Result<T, CryptoError>;
