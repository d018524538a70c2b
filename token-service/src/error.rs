use thiserror::Error;

/// Token verification failures are typed so callers can branch: an expired
/// access token means "try a silent refresh", anything else means "force
/// re-login". The distinction never becomes distinct client-facing text.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum TokenError {
    #[error("Token expired")]
    Expired,

    #[error("Token invalid")]
    Invalid,

    #[error("Token blacklisted")]
    Blacklisted,

    #[error("Token signing failed: {0}")]
    Signing(String),
}

impl From<TokenError> for error_common::AuthError {
    fn from(err: TokenError) -> Self {
        match err {
            TokenError::Expired => Self::TokenExpired,
            TokenError::Invalid => Self::TokenInvalid,
            TokenError::Blacklisted => Self::TokenBlacklisted,
            TokenError::Signing(msg) => Self::Internal(anyhow::anyhow!(msg)),
        }
    }
}

pub type TokenResult<T> = Result<T, TokenError>;
