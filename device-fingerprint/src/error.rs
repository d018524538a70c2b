use thiserror::Error;

#[derive(Error, Debug)]
pub enum FingerprintError {
    #[error("Fingerprint engine configuration error: {0}")]
    Configuration(String),
}

pub type FingerprintResult<T> = Result<T, FingerprintError>;
