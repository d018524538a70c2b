use anyhow::anyhow;
use chrono::{DateTime, Utc};
use device_fingerprint::RequestAttributes;
use error_common::{AuthError, ErrorCode};
use serde::{Deserialize, Serialize};
use token_service::Role;
use uuid::Uuid;

/// A user's credential material, as the orchestrator sees it.
///
/// The pepper never appears here: it lives in the process-wide
/// `PasswordHasher`. The TOTP secret is stored encrypted and only
/// decrypted for the duration of a verification call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CredentialRecord {
    pub id: Uuid,
    pub username: String,
    pub password_hash: String,
    pub salt: String,
    pub role: Role,
    pub permissions: Vec<String>,
    pub totp_secret_enc: Option<String>,
    pub webauthn_credentials: Vec<String>,
    pub failed_attempts: u32,
    pub locked_until: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl CredentialRecord {
    pub fn is_locked(&self, now: DateTime<Utc>) -> bool {
        self.locked_until.is_some_and(|until| until > now)
    }

    pub fn totp_enabled(&self) -> bool {
        self.totp_secret_enc.is_some()
    }

    pub fn webauthn_enabled(&self) -> bool {
        !self.webauthn_credentials.is_empty()
    }
}

/// Append-only password history row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PasswordHistoryEntry {
    pub user_id: Uuid,
    pub password_hash: String,
    pub created_at: DateTime<Utc>,
}

/// Per-request context handed in by the excluded HTTP layer.
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub attributes: RequestAttributes,
    /// Fingerprint value the client echoes back, once it has been handed
    /// one. Absent on first contact.
    pub client_fingerprint: Option<String>,
}

impl RequestContext {
    pub fn new(attributes: RequestAttributes) -> Self {
        Self {
            attributes,
            client_fingerprint: None,
        }
    }

    pub fn with_client_fingerprint(mut self, fingerprint: impl Into<String>) -> Self {
        self.client_fingerprint = Some(fingerprint.into());
        self
    }

    pub fn ip(&self) -> &str {
        &self.attributes.ip
    }

    pub fn user_agent(&self) -> &str {
        &self.attributes.user_agent
    }
}

/// Bearer strings plus expiries for the cookie layer. Cookie attributes
/// (httpOnly, path scoping, sameSite) are the HTTP layer's job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenPair {
    pub access_token: String,
    pub access_expires_in: i64,
    pub refresh_token: String,
    pub refresh_expires_in: i64,
}

/// The result-object contract every inbound operation returns.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthResponse {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<ErrorCode>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<Uuid>,
    pub require_totp: bool,
    pub require_webauthn: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tokens: Option<TokenPair>,
}

impl AuthResponse {
    pub fn rejected(error: &AuthError) -> Self {
        Self {
            success: false,
            message: error.client_message().to_string(),
            code: Some(error.code()),
            user_id: None,
            require_totp: false,
            require_webauthn: false,
            tokens: None,
        }
    }

    pub fn step_up_totp(user_id: Uuid) -> Self {
        Self {
            success: true,
            message: "Additional verification required".into(),
            code: None,
            user_id: Some(user_id),
            require_totp: true,
            require_webauthn: false,
            tokens: None,
        }
    }

    pub fn step_up_webauthn(user_id: Uuid) -> Self {
        Self {
            success: true,
            message: "Additional verification required".into(),
            code: None,
            user_id: Some(user_id),
            require_totp: false,
            require_webauthn: true,
            tokens: None,
        }
    }

    pub fn authenticated(user_id: Uuid, tokens: TokenPair) -> Self {
        Self {
            success: true,
            message: "Authenticated".into(),
            code: None,
            user_id: Some(user_id),
            require_totp: false,
            require_webauthn: false,
            tokens: Some(tokens),
        }
    }

    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
            code: None,
            user_id: None,
            require_totp: false,
            require_webauthn: false,
            tokens: None,
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            code: None,
            user_id: None,
            require_totp: false,
            require_webauthn: false,
            tokens: None,
        }
    }
}

/// Login state machine states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LoginState {
    AwaitingCredentials,
    PasswordVerified,
    RequireTotp,
    RequireWebauthn,
    Authenticated,
    TokensIssued,
    Rejected,
}

impl LoginState {
    /// Legal transitions. `Rejected` is reachable from anywhere except the
    /// two terminal states.
    fn can_transition_to(self, next: LoginState) -> bool {
        use LoginState::*;
        if next == Rejected {
            return !matches!(self, TokensIssued | Rejected);
        }
        matches!(
            (self, next),
            (AwaitingCredentials, PasswordVerified)
                | (PasswordVerified, RequireTotp)
                | (PasswordVerified, RequireWebauthn)
                | (PasswordVerified, Authenticated)
                | (RequireTotp, Authenticated)
                | (RequireWebauthn, Authenticated)
                | (Authenticated, TokensIssued)
        )
    }
}

/// Tracks one authentication attempt through the state machine. An illegal
/// transition is a programming error and surfaces as `INTERNAL_FAILURE`
/// rather than silently producing tokens.
#[derive(Debug)]
pub struct LoginFlow {
    state: LoginState,
}

impl LoginFlow {
    pub fn start() -> Self {
        Self {
            state: LoginState::AwaitingCredentials,
        }
    }

    /// Resume at a step-up state for the second-factor calls.
    pub fn resume_at(state: LoginState) -> Self {
        Self { state }
    }

    pub fn state(&self) -> LoginState {
        self.state
    }

    pub fn advance(&mut self, next: LoginState) -> error_common::Result<()> {
        if !self.state.can_transition_to(next) {
            return Err(AuthError::Internal(anyhow!(
                "illegal login state transition {:?} -> {:?}",
                self.state,
                next
            )));
        }
        self.state = next;
        Ok(())
    }

    pub fn reject(&mut self) {
        // Permitted from every non-terminal state; terminal states stay.
        if self.state.can_transition_to(LoginState::Rejected) {
            self.state = LoginState::Rejected;
        }
    }
}
