use thiserror::Error;

use crate::codes::ErrorCode;

/// Error taxonomy for the authentication core.
#[derive(Error, Debug)]
pub enum AuthError {
    /// Unknown username or wrong password. Never split into two variants:
    /// the caller must not be able to tell them apart.
    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Account locked")]
    AccountLocked,

    #[error("Token expired")]
    TokenExpired,

    #[error("Token invalid")]
    TokenInvalid,

    #[error("Token blacklisted")]
    TokenBlacklisted,

    #[error("Session invalid")]
    SessionInvalid,

    #[error("Device fingerprint mismatch")]
    DeviceMismatch,

    /// Input shape problems (2FA code format, password strength).
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Internal failure: {0}")]
    Internal(#[from] anyhow::Error),
}

impl AuthError {
    /// Stable machine code for caller-side branching.
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::InvalidCredentials => ErrorCode::InvalidCredentials,
            Self::AccountLocked => ErrorCode::AccountLocked,
            Self::TokenExpired => ErrorCode::TokenExpired,
            Self::TokenInvalid => ErrorCode::TokenInvalid,
            Self::TokenBlacklisted => ErrorCode::TokenBlacklisted,
            Self::SessionInvalid => ErrorCode::SessionInvalid,
            Self::DeviceMismatch => ErrorCode::DeviceMismatch,
            Self::Validation(_) => ErrorCode::ValidationFailed,
            Self::Internal(_) => ErrorCode::InternalFailure,
        }
    }

    /// Generic message safe to show a client. Intentionally lossy: a locked
    /// account and a wrong password produce the same text, and token
    /// failures never explain themselves.
    pub fn client_message(&self) -> &'static str {
        match self {
            Self::InvalidCredentials | Self::AccountLocked => "Invalid credentials",
            Self::TokenExpired | Self::TokenInvalid | Self::TokenBlacklisted => {
                "Authentication required"
            }
            Self::SessionInvalid | Self::DeviceMismatch => "Session is no longer valid",
            Self::Validation(_) => "The request could not be processed",
            Self::Internal(_) => "An internal error occurred",
        }
    }
}

/// Result type alias for authentication core operations.
pub type Result<T> = std::result::Result<T, AuthError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn locked_and_wrong_password_are_indistinguishable() {
        assert_eq!(
            AuthError::InvalidCredentials.client_message(),
            AuthError::AccountLocked.client_message()
        );
    }

    #[test]
    fn token_failures_share_client_text_but_not_codes() {
        let expired = AuthError::TokenExpired;
        let invalid = AuthError::TokenInvalid;
        assert_eq!(expired.client_message(), invalid.client_message());
        assert_ne!(expired.code(), invalid.code());
    }
}
