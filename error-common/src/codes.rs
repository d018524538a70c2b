use serde::{Deserialize, Serialize};

/// Stable machine codes exposed to the calling layer.
///
/// These are part of the external contract: the HTTP layer branches on them
/// (e.g. `TOKEN_EXPIRED` triggers a silent refresh while `TOKEN_INVALID`
/// forces a re-login) but never forwards them as distinct client text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    InvalidCredentials,
    AccountLocked,
    TokenExpired,
    TokenInvalid,
    TokenBlacklisted,
    SessionInvalid,
    DeviceMismatch,
    ValidationFailed,
    InternalFailure,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InvalidCredentials => "INVALID_CREDENTIALS",
            Self::AccountLocked => "ACCOUNT_LOCKED",
            Self::TokenExpired => "TOKEN_EXPIRED",
            Self::TokenInvalid => "TOKEN_INVALID",
            Self::TokenBlacklisted => "TOKEN_BLACKLISTED",
            Self::SessionInvalid => "SESSION_INVALID",
            Self::DeviceMismatch => "DEVICE_MISMATCH",
            Self::ValidationFailed => "VALIDATION_FAILED",
            Self::InternalFailure => "INTERNAL_FAILURE",
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
