use std::sync::Arc;

use anyhow::anyhow;
use chrono::Utc;
use serde_json::json;
use uuid::Uuid;

use anomaly_detection::{AnomalyEngine, AnomalyReport, LoginEvent, TokenUsageEvent};
use auth_crypto::password::{generate_salt, validate_password_strength};
use auth_crypto::{PasswordHasher, SecretCipher, HISTORY_LIMIT};
use device_fingerprint::{
    FingerprintComponents, FingerprintEngine, FingerprintRecord, FingerprintStore,
    SessionCheckClassification,
};
use error_common::{AuthError, Result};
use security_audit::{AuditSink, EmailAlertSink, SecurityEvent, Severity};
use session_store::{Session, SessionContext, SessionManager};
use token_service::{BlacklistReason, Role, TokenPayload, TokenType};

use crate::config::GatewayConfig;
use crate::models::{
    AuthResponse, CredentialRecord, LoginFlow, LoginState, PasswordHistoryEntry, RequestContext,
    TokenPair,
};
use crate::repository::UserRepository;
use crate::totp;
use crate::webauthn::WebAuthnVerifier;

/// Everything the orchestrator is wired with. Explicit construction, no
/// module-level singletons: tests build one per case with distinct secrets.
pub struct GatewayComponents {
    pub users: Arc<dyn UserRepository>,
    pub hasher: Arc<PasswordHasher>,
    pub cipher: Arc<SecretCipher>,
    pub tokens: Arc<token_service::TokenService>,
    pub sessions: Arc<SessionManager>,
    pub fingerprints: Arc<FingerprintEngine>,
    pub fingerprint_store: Arc<dyn FingerprintStore>,
    pub anomalies: Arc<AnomalyEngine>,
    pub audit: Arc<dyn AuditSink>,
    pub email: Arc<dyn EmailAlertSink>,
    pub webauthn: Arc<dyn WebAuthnVerifier>,
}

pub struct AuthGateway {
    components: GatewayComponents,
    config: GatewayConfig,
}

impl AuthGateway {
    pub fn new(components: GatewayComponents, config: GatewayConfig) -> Self {
        Self { components, config }
    }

    /// Password step of the login state machine.
    ///
    /// Unknown username and wrong password return the identical generic
    /// message; only the audit trail tells them apart. Accounts with a
    /// lockout-exempt role never auto-lock.
    pub async fn authenticate(
        &self,
        username: &str,
        password: &str,
        ctx: &RequestContext,
    ) -> Result<AuthResponse> {
        let mut flow = LoginFlow::start();
        let c = &self.components;

        let Some(user) = c.users.find_by_username(username).await? else {
            flow.reject();
            self.emit(
                SecurityEvent::new("login.unknown_user", Severity::Medium)
                    .ip(ctx.ip())
                    .metadata(json!({ "username": username })),
            )
            .await;
            return Ok(AuthResponse::rejected(&AuthError::InvalidCredentials));
        };

        if user.is_locked(Utc::now()) {
            flow.reject();
            self.emit(
                SecurityEvent::new("login.locked_account_attempt", Severity::Medium)
                    .user(user.id)
                    .ip(ctx.ip()),
            )
            .await;
            // Same client text as a wrong password.
            return Ok(AuthResponse::rejected(&AuthError::AccountLocked));
        }

        let password_ok = c
            .hasher
            .verify(password, &user.password_hash, &user.salt)
            .map_err(|e| AuthError::Internal(anyhow!(e)))?;

        if !password_ok {
            flow.reject();
            return self.handle_failed_password(&user, ctx).await;
        }

        flow.advance(LoginState::PasswordVerified)?;
        c.users.reset_failed_attempts(user.id).await?;

        if user.totp_enabled() {
            flow.advance(LoginState::RequireTotp)?;
            self.emit(
                SecurityEvent::new("login.step_up_totp", Severity::Info)
                    .user(user.id)
                    .ip(ctx.ip()),
            )
            .await;
            return Ok(AuthResponse::step_up_totp(user.id));
        }

        if user.webauthn_enabled() {
            flow.advance(LoginState::RequireWebauthn)?;
            self.emit(
                SecurityEvent::new("login.step_up_webauthn", Severity::Info)
                    .user(user.id)
                    .ip(ctx.ip()),
            )
            .await;
            return Ok(AuthResponse::step_up_webauthn(user.id));
        }

        flow.advance(LoginState::Authenticated)?;
        self.finalize_authentication(&user, ctx, flow).await
    }

    /// Second factor: TOTP.
    pub async fn verify_totp(
        &self,
        user_id: Uuid,
        code: &str,
        ctx: &RequestContext,
    ) -> Result<AuthResponse> {
        let c = &self.components;

        if !totp::is_well_formed(code) {
            return Ok(AuthResponse::rejected(&AuthError::Validation(
                "one-time code must be 6 digits".into(),
            )));
        }

        let Some(user) = c.users.find_by_id(user_id).await? else {
            self.emit(SecurityEvent::new("totp.unknown_user", Severity::Medium).ip(ctx.ip()))
                .await;
            return Ok(AuthResponse::rejected(&AuthError::InvalidCredentials));
        };

        if user.is_locked(Utc::now()) {
            return Ok(AuthResponse::rejected(&AuthError::AccountLocked));
        }

        let Some(encrypted) = &user.totp_secret_enc else {
            self.emit(
                SecurityEvent::new("totp.not_enrolled", Severity::Medium)
                    .user(user.id)
                    .ip(ctx.ip()),
            )
            .await;
            return Ok(AuthResponse::rejected(&AuthError::InvalidCredentials));
        };

        // Decrypted secret lives only for this call; it zeroizes on drop.
        let secret = c
            .cipher
            .decrypt(encrypted)
            .map_err(|e| AuthError::Internal(anyhow!(e)))?;
        let verified = totp::verify_code(
            &secret,
            code,
            Utc::now().timestamp().max(0) as u64,
            self.config.totp_drift_steps,
        );
        drop(secret);

        if !verified {
            self.emit(
                SecurityEvent::new("totp.failed", Severity::Medium)
                    .user(user.id)
                    .ip(ctx.ip()),
            )
            .await;
            return Ok(AuthResponse::rejected(&AuthError::InvalidCredentials));
        }

        self.emit(
            SecurityEvent::new("totp.verified", Severity::Info)
                .user(user.id)
                .ip(ctx.ip()),
        )
        .await;

        let mut flow = LoginFlow::resume_at(LoginState::RequireTotp);
        flow.advance(LoginState::Authenticated)?;
        self.finalize_authentication(&user, ctx, flow).await
    }

    /// Second factor: WebAuthn assertion, verified by the external
    /// capability behind the [`WebAuthnVerifier`] seam.
    pub async fn verify_webauthn(
        &self,
        user_id: Uuid,
        credential: &str,
        ctx: &RequestContext,
    ) -> Result<AuthResponse> {
        let c = &self.components;

        let Some(user) = c.users.find_by_id(user_id).await? else {
            self.emit(SecurityEvent::new("webauthn.unknown_user", Severity::Medium).ip(ctx.ip()))
                .await;
            return Ok(AuthResponse::rejected(&AuthError::InvalidCredentials));
        };

        if user.is_locked(Utc::now()) {
            return Ok(AuthResponse::rejected(&AuthError::AccountLocked));
        }

        let verified = c
            .webauthn
            .verify(user.id, credential, &user.webauthn_credentials)
            .await;

        if !verified {
            self.emit(
                SecurityEvent::new("webauthn.failed", Severity::Medium)
                    .user(user.id)
                    .ip(ctx.ip()),
            )
            .await;
            return Ok(AuthResponse::rejected(&AuthError::InvalidCredentials));
        }

        self.emit(
            SecurityEvent::new("webauthn.verified", Severity::Info)
                .user(user.id)
                .ip(ctx.ip()),
        )
        .await;

        let mut flow = LoginFlow::resume_at(LoginState::RequireWebauthn);
        flow.advance(LoginState::Authenticated)?;
        self.finalize_authentication(&user, ctx, flow).await
    }

    /// Refresh sub-flow: validate the refresh token, re-check the device
    /// binding, rotate the pair, blacklist the old refresh id and score the
    /// usage in the background.
    pub async fn refresh_token(
        &self,
        refresh_token: &str,
        ctx: &RequestContext,
    ) -> Result<AuthResponse> {
        let c = &self.components;

        let claims = match c.tokens.verify(refresh_token, TokenType::Refresh).await {
            Ok(claims) => claims,
            Err(err) => {
                let err: AuthError = err.into();
                self.emit(
                    SecurityEvent::new("refresh.rejected", Severity::Medium)
                        .ip(ctx.ip())
                        .metadata(json!({ "code": err.code().as_str() })),
                )
                .await;
                return Ok(AuthResponse::rejected(&err));
            }
        };

        let Some(session) = c
            .sessions
            .repository()
            .find_by_refresh_token_id(claims.jti)
            .await
            .map_err(|e| AuthError::Internal(anyhow!(e)))?
        else {
            self.emit(
                SecurityEvent::new("refresh.orphan_token", Severity::High)
                    .user(claims.sub)
                    .ip(ctx.ip()),
            )
            .await;
            return Ok(AuthResponse::rejected(&AuthError::SessionInvalid));
        };

        if !session.can_refresh(Utc::now()) {
            self.emit(
                SecurityEvent::new("refresh.session_expired", Severity::Low)
                    .user(claims.sub)
                    .ip(ctx.ip()),
            )
            .await;
            return Ok(AuthResponse::rejected(&AuthError::SessionInvalid));
        }

        // Device binding check against the fingerprint the session was
        // created with. A mismatch kills the session outright.
        let stored = self.stored_fingerprint_for(&session).await;
        if let Some(rejection) = self
            .check_device_binding(&session, stored.as_ref(), ctx)
            .await?
        {
            return Ok(rejection);
        }

        let payload = TokenPayload::new(claims.sub, claims.role, claims.permissions.clone());
        let access = c
            .tokens
            .issue(payload.clone(), TokenType::Access)
            .map_err(AuthError::from)?;
        let new_refresh = c
            .tokens
            .issue(payload, TokenType::Refresh)
            .map_err(AuthError::from)?;

        c.sessions
            .apply_refresh(session.id, &access, &new_refresh)
            .await
            .map_err(|e| AuthError::Internal(anyhow!(e)))?;
        c.tokens
            .blacklist_token(claims.jti, claims.sub, BlacklistReason::RefreshRotation)
            .await;

        self.emit(
            SecurityEvent::new("refresh.success", Severity::Info)
                .user(claims.sub)
                .ip(ctx.ip())
                .metadata(json!({ "session_id": session.id })),
        )
        .await;

        let current = c.fingerprints.generate(&ctx.attributes);
        self.spawn_token_usage_scoring(
            claims.sub,
            &session,
            current.components,
            stored.map(|s| s.components),
            ctx,
        );

        Ok(AuthResponse::authenticated(
            claims.sub,
            TokenPair {
                access_token: access.token,
                access_expires_in: access.expires_in,
                refresh_token: new_refresh.token,
                refresh_expires_in: new_refresh.expires_in,
            },
        ))
    }

    /// Proactively rotate an access token in its last minutes of life,
    /// updating the owning session's token pointer and expiry.
    ///
    /// Returns `None` when the token is not near expiry yet, or when a
    /// concurrent request already rotated it — the caller then simply keeps
    /// using the original token.
    pub async fn rotate_access_token(
        &self,
        access_token: &str,
    ) -> Result<Option<token_service::IssuedToken>> {
        let c = &self.components;

        let claims = c
            .tokens
            .verify(access_token, TokenType::Access)
            .await
            .map_err(AuthError::from)?;
        if !c.tokens.needs_rotation(&claims) {
            return Ok(None);
        }

        let Some(rotated) = c.tokens.rotate(access_token).await.map_err(AuthError::from)?
        else {
            return Ok(None);
        };

        if let Some(session) = c
            .sessions
            .repository()
            .find_by_access_token_id(claims.jti)
            .await
            .map_err(|e| AuthError::Internal(anyhow!(e)))?
        {
            c.sessions
                .apply_access_rotation(session.id, &rotated)
                .await
                .map_err(|e| AuthError::Internal(anyhow!(e)))?;
        }

        self.emit(
            SecurityEvent::new("token.rotated", Severity::Info)
                .user(claims.sub)
                .metadata(json!({ "old_token_id": claims.jti, "new_token_id": rotated.id })),
        )
        .await;

        Ok(Some(rotated))
    }

    /// Invalidate the session owning `access_token_id`. Idempotent: a
    /// missing or already-invalid session reports failure, not an error.
    pub async fn logout(
        &self,
        access_token_id: Uuid,
        user_id: Uuid,
        ctx: &RequestContext,
    ) -> Result<AuthResponse> {
        let c = &self.components;

        let Some(session) = c
            .sessions
            .repository()
            .find_by_access_token_id(access_token_id)
            .await
            .map_err(|e| AuthError::Internal(anyhow!(e)))?
        else {
            self.emit(
                SecurityEvent::new("logout.unknown_session", Severity::Low)
                    .user(user_id)
                    .ip(ctx.ip()),
            )
            .await;
            return Ok(AuthResponse::failed("Session already closed"));
        };

        if session.user_id != user_id {
            self.emit(
                SecurityEvent::new("logout.user_mismatch", Severity::High)
                    .user(user_id)
                    .ip(ctx.ip())
                    .metadata(json!({ "session_user": session.user_id })),
            )
            .await;
            return Ok(AuthResponse::failed("Session already closed"));
        }

        let invalidated = c
            .sessions
            .invalidate_one(session.id, BlacklistReason::Logout)
            .await
            .map_err(|e| AuthError::Internal(anyhow!(e)))?;

        if invalidated {
            self.emit(
                SecurityEvent::new("logout.success", Severity::Info)
                    .user(user_id)
                    .ip(ctx.ip()),
            )
            .await;
            Ok(AuthResponse::ok("Signed out"))
        } else {
            Ok(AuthResponse::failed("Session already closed"))
        }
    }

    /// Change password with history enforcement. Reuse of any of the last
    /// ten passwords is rejected with a message that does not reveal which
    /// entry matched.
    pub async fn change_password(
        &self,
        user_id: Uuid,
        current_password: &str,
        new_password: &str,
        ctx: &RequestContext,
    ) -> Result<AuthResponse> {
        let c = &self.components;

        let Some(user) = c.users.find_by_id(user_id).await? else {
            return Ok(AuthResponse::rejected(&AuthError::InvalidCredentials));
        };

        let current_ok = c
            .hasher
            .verify(current_password, &user.password_hash, &user.salt)
            .map_err(|e| AuthError::Internal(anyhow!(e)))?;
        if !current_ok {
            self.emit(
                SecurityEvent::new("password.change_failed", Severity::Medium)
                    .user(user.id)
                    .ip(ctx.ip()),
            )
            .await;
            return Ok(AuthResponse::rejected(&AuthError::InvalidCredentials));
        }

        if validate_password_strength(new_password).is_err() {
            return Ok(AuthResponse::rejected(&AuthError::Validation(
                "password does not meet policy".into(),
            )));
        }

        let history = c.users.password_history(user.id, HISTORY_LIMIT).await?;
        let hashes: Vec<&str> = history.iter().map(|h| h.password_hash.as_str()).collect();
        let reused = c
            .hasher
            .verify(new_password, &user.password_hash, &user.salt)
            .unwrap_or(false)
            || c.hasher.is_password_reused(new_password, &user.salt, &hashes);

        if reused {
            self.emit(
                SecurityEvent::new("password.reuse_blocked", Severity::Medium)
                    .user(user.id)
                    .ip(ctx.ip()),
            )
            .await;
            return Ok(AuthResponse::rejected(&AuthError::Validation(
                "password does not meet policy".into(),
            )));
        }

        let new_hash = c
            .hasher
            .hash(new_password, &user.salt)
            .map_err(|e| AuthError::Internal(anyhow!(e)))?;

        c.users
            .append_password_history(&PasswordHistoryEntry {
                user_id: user.id,
                password_hash: user.password_hash.clone(),
                created_at: Utc::now(),
            })
            .await?;
        c.users.update_password(user.id, &new_hash).await?;

        let killed = c
            .sessions
            .invalidate_all(user.id, BlacklistReason::PasswordChange)
            .await
            .map_err(|e| AuthError::Internal(anyhow!(e)))?;

        self.emit(
            SecurityEvent::new("password.changed", Severity::Info)
                .user(user.id)
                .ip(ctx.ip())
                .metadata(json!({ "sessions_invalidated": killed })),
        )
        .await;

        Ok(AuthResponse::ok("Password updated"))
    }

    /// Re-authentication for sensitive operations. Does not touch the
    /// failed-attempt counter.
    pub async fn verify_user_password(&self, user_id: Uuid, password: &str) -> Result<bool> {
        let c = &self.components;

        let Some(user) = c.users.find_by_id(user_id).await? else {
            return Ok(false);
        };

        let ok = c
            .hasher
            .verify(password, &user.password_hash, &user.salt)
            .map_err(|e| AuthError::Internal(anyhow!(e)))?;

        if !ok {
            self.emit(SecurityEvent::new("reauth.failed", Severity::Medium).user(user.id))
                .await;
        }
        Ok(ok)
    }

    /// Create a credential record (reference-code redemption path).
    pub async fn provision_user(
        &self,
        username: &str,
        password: &str,
        role: Role,
        permissions: Vec<String>,
    ) -> Result<CredentialRecord> {
        let c = &self.components;

        validate_password_strength(password)
            .map_err(|e| AuthError::Validation(e.to_string()))?;
        if c.users.find_by_username(username).await?.is_some() {
            return Err(AuthError::Validation("username already in use".into()));
        }

        let salt = generate_salt();
        let password_hash = c
            .hasher
            .hash(password, &salt)
            .map_err(|e| AuthError::Internal(anyhow!(e)))?;

        let now = Utc::now();
        let record = CredentialRecord {
            id: Uuid::new_v4(),
            username: username.to_string(),
            password_hash,
            salt,
            role,
            permissions,
            totp_secret_enc: None,
            webauthn_credentials: vec![],
            failed_attempts: 0,
            locked_until: None,
            created_at: now,
            updated_at: now,
        };

        let created = c.users.create_user(&record).await?;
        self.emit(SecurityEvent::new("user.provisioned", Severity::Info).user(created.id))
            .await;
        Ok(created)
    }

    /// Enroll TOTP: generates a secret, stores it encrypted, returns the
    /// base64 secret for QR provisioning.
    pub async fn enroll_totp(&self, user_id: Uuid) -> Result<String> {
        let c = &self.components;

        if c.users.find_by_id(user_id).await?.is_none() {
            return Err(AuthError::InvalidCredentials);
        }

        let secret = totp::generate_secret();
        let encrypted = c
            .cipher
            .encrypt(&secret)
            .map_err(|e| AuthError::Internal(anyhow!(e)))?;
        c.users.set_totp_secret(user_id, Some(encrypted)).await?;

        self.emit(SecurityEvent::new("totp.enrolled", Severity::Info).user(user_id))
            .await;
        Ok(secret)
    }

    pub async fn register_webauthn_credential(
        &self,
        user_id: Uuid,
        credential: &str,
    ) -> Result<()> {
        let c = &self.components;

        if c.users.find_by_id(user_id).await?.is_none() {
            return Err(AuthError::InvalidCredentials);
        }
        c.users.add_webauthn_credential(user_id, credential).await?;

        self.emit(SecurityEvent::new("webauthn.enrolled", Severity::Info).user(user_id))
            .await;
        Ok(())
    }

    async fn handle_failed_password(
        &self,
        user: &CredentialRecord,
        ctx: &RequestContext,
    ) -> Result<AuthResponse> {
        let c = &self.components;
        let attempts = c.users.record_failed_attempt(user.id).await?;

        if attempts >= self.config.max_failed_attempts {
            if user.role.exempt_from_lockout() {
                self.emit(
                    SecurityEvent::new("login.lockout_exempt", Severity::High)
                        .user(user.id)
                        .ip(ctx.ip())
                        .metadata(json!({ "attempts": attempts })),
                )
                .await;
            } else {
                c.users
                    .set_lock(user.id, Utc::now() + self.config.lockout_duration)
                    .await?;
                self.emit(
                    SecurityEvent::new("login.locked_out", Severity::High)
                        .user(user.id)
                        .ip(ctx.ip())
                        .metadata(json!({ "attempts": attempts })),
                )
                .await;
            }
        } else {
            self.emit(
                SecurityEvent::new("login.failed", Severity::Medium)
                    .user(user.id)
                    .ip(ctx.ip())
                    .metadata(json!({ "attempts": attempts })),
            )
            .await;
        }

        Ok(AuthResponse::rejected(&AuthError::InvalidCredentials))
    }

    /// Fully-authenticated epilogue shared by every path: supersede prior
    /// sessions, issue the token pair, persist the session and fingerprint,
    /// then score the login in the background.
    async fn finalize_authentication(
        &self,
        user: &CredentialRecord,
        ctx: &RequestContext,
        mut flow: LoginFlow,
    ) -> Result<AuthResponse> {
        let c = &self.components;

        let payload = TokenPayload::new(user.id, user.role, user.permissions.clone());
        let access = c
            .tokens
            .issue(payload.clone(), TokenType::Access)
            .map_err(AuthError::from)?;
        let refresh = c
            .tokens
            .issue(payload, TokenType::Refresh)
            .map_err(AuthError::from)?;

        let fingerprint = c.fingerprints.generate(&ctx.attributes);
        let session = c
            .sessions
            .create(
                user.id,
                &access,
                &refresh,
                &SessionContext {
                    ip: ctx.ip().to_string(),
                    device_fingerprint: fingerprint.fingerprint.clone(),
                    user_agent: ctx.user_agent().to_string(),
                },
            )
            .await
            .map_err(|e| AuthError::Internal(anyhow!(e)))?;

        c.fingerprint_store
            .record(FingerprintRecord::from_fingerprint(user.id, &fingerprint))
            .await;

        flow.advance(LoginState::TokensIssued)?;
        self.emit(
            SecurityEvent::new("login.success", Severity::Info)
                .user(user.id)
                .ip(ctx.ip())
                .fingerprint(fingerprint.public_hash.as_str())
                .metadata(json!({ "session_id": session.id })),
        )
        .await;

        self.spawn_login_scoring(user.id, ctx, fingerprint.components);

        Ok(AuthResponse::authenticated(
            user.id,
            TokenPair {
                access_token: access.token,
                access_expires_in: access.expires_in,
                refresh_token: refresh.token,
                refresh_expires_in: refresh.expires_in,
            },
        ))
    }

    async fn stored_fingerprint_for(&self, session: &Session) -> Option<FingerprintRecord> {
        let records = self
            .components
            .fingerprint_store
            .recent(session.user_id, 10)
            .await;
        records
            .iter()
            .find(|r| r.fingerprint == session.device_fingerprint)
            .or_else(|| records.first())
            .cloned()
    }

    /// Returns the rejection response when the device binding fails, after
    /// invalidating the session.
    async fn check_device_binding(
        &self,
        session: &Session,
        stored: Option<&FingerprintRecord>,
        ctx: &RequestContext,
    ) -> Result<Option<AuthResponse>> {
        let c = &self.components;
        let client_value = ctx.client_fingerprint.as_deref().unwrap_or_default();

        let bound = match stored {
            Some(record) => {
                let check = c.fingerprints.validate_for_session(
                    &ctx.attributes,
                    client_value,
                    record,
                    &session.ip,
                );
                if check.validation.suspicious {
                    // Client presented something it should not hold (the
                    // public hash, or a replayed value).
                    self.emit(
                        SecurityEvent::new("session.fingerprint_suspicious", Severity::Medium)
                            .user(session.user_id)
                            .ip(ctx.ip())
                            .metadata(json!({ "session_id": session.id })),
                    )
                    .await;
                }
                check.validation.valid
                    && check.classification == SessionCheckClassification::Normal
            }
            // No stored component vector: fall back to comparing the fresh
            // keyed digest against the one the session was bound to.
            None => {
                let fresh = c.fingerprints.generate(&ctx.attributes);
                auth_crypto::constant_time::ct_eq_str(
                    &fresh.fingerprint,
                    &session.device_fingerprint,
                )
            }
        };

        if bound {
            return Ok(None);
        }

        c.sessions
            .invalidate_one(session.id, BlacklistReason::SecurityViolation)
            .await
            .map_err(|e| AuthError::Internal(anyhow!(e)))?;

        self.emit(
            SecurityEvent::new("session.device_mismatch", Severity::Critical)
                .user(session.user_id)
                .ip(ctx.ip())
                .metadata(json!({ "session_id": session.id, "session_ip": session.ip })),
        )
        .await;

        Ok(Some(AuthResponse::rejected(&AuthError::DeviceMismatch)))
    }

    /// Fire-and-forget login scoring. The task owns its error boundary; a
    /// slow GeoIP lookup or mail send never delays the auth decision.
    fn spawn_login_scoring(
        &self,
        user_id: Uuid,
        ctx: &RequestContext,
        components: FingerprintComponents,
    ) {
        let engine = self.components.anomalies.clone();
        let email = self.components.email.clone();
        let audit = self.components.audit.clone();
        let event = LoginEvent {
            user_id,
            at: Utc::now(),
            ip: ctx.ip().to_string(),
            components,
        };

        tokio::spawn(async move {
            let report = engine.score_login(&event).await;
            if report.should_alert {
                email
                    .send_security_alert(
                        event.user_id,
                        "Unusual sign-in to your account",
                        &alert_body(&report),
                    )
                    .await;
                audit
                    .record(
                        SecurityEvent::new("anomaly.login_alert", Severity::High)
                            .user(event.user_id)
                            .ip(event.ip.clone())
                            .metadata(json!({ "score": report.total_score })),
                    )
                    .await;
            }
        });
    }

    /// Fire-and-forget token-usage scoring. Crossing the invalidation
    /// threshold kills the session and blacklists both token ids.
    fn spawn_token_usage_scoring(
        &self,
        user_id: Uuid,
        session: &Session,
        components: FingerprintComponents,
        stored_components: Option<FingerprintComponents>,
        ctx: &RequestContext,
    ) {
        let engine = self.components.anomalies.clone();
        let sessions = self.components.sessions.clone();
        let audit = self.components.audit.clone();
        let event = TokenUsageEvent {
            user_id,
            at: Utc::now(),
            ip: ctx.ip().to_string(),
            previous_ip: session.ip.clone(),
            last_activity: session.last_activity,
            stored_components: stored_components.unwrap_or_else(|| components.clone()),
            components,
        };
        let session_id = session.id;

        tokio::spawn(async move {
            let report = engine.score_token_usage(&event).await;
            if report.should_invalidate_session {
                match sessions
                    .invalidate_one(session_id, BlacklistReason::SecurityViolation)
                    .await
                {
                    Ok(_) => {
                        audit
                            .record(
                                SecurityEvent::new("anomaly.session_killed", Severity::Critical)
                                    .user(event.user_id)
                                    .ip(event.ip.clone())
                                    .metadata(json!({ "score": report.total_score })),
                            )
                            .await;
                    }
                    Err(e) => {
                        tracing::error!(%session_id, error = %e, "failed to kill session after anomaly");
                    }
                }
            }
        });
    }

    async fn emit(&self, event: SecurityEvent) {
        self.components.audit.record(event).await;
    }
}

fn alert_body(report: &AnomalyReport) -> String {
    let mut body = format!(
        "We noticed unusual activity on your account (risk score {}).\n",
        report.total_score
    );
    for finding in &report.findings {
        body.push_str(&format!("- {}\n", finding.description));
    }
    body.push_str("If this was not you, change your password immediately.");
    body
}
