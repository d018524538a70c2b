use std::sync::Arc;

use chrono::{Duration, Utc};
use uuid::Uuid;

use token_service::{BlacklistReason, IssuedToken, TokenService};

use crate::error::SessionResult;
use crate::model::{Session, SessionContext};
use crate::repository::SessionRepository;

/// Coordinates session rows with the token blacklist.
///
/// Sessions and blacklist entries must never diverge: a dead session with
/// a live access token is exactly the hole token theft exploits, so the
/// blacklist writes come first and the validity flip last.
pub struct SessionManager {
    repo: Arc<dyn SessionRepository>,
    tokens: Arc<TokenService>,
}

impl SessionManager {
    pub fn new(repo: Arc<dyn SessionRepository>, tokens: Arc<TokenService>) -> Self {
        Self { repo, tokens }
    }

    pub fn repository(&self) -> &Arc<dyn SessionRepository> {
        &self.repo
    }

    /// Create the session for a fresh authentication.
    ///
    /// Enforces the single-active-session policy: every prior valid
    /// session for the user is invalidated (and its tokens blacklisted)
    /// before the new session is persisted.
    pub async fn create(
        &self,
        user_id: Uuid,
        access: &IssuedToken,
        refresh: &IssuedToken,
        context: &SessionContext,
    ) -> SessionResult<Session> {
        let superseded = self
            .invalidate_all(user_id, BlacklistReason::Rotation)
            .await?;
        if superseded > 0 {
            tracing::info!(%user_id, superseded, "prior sessions superseded by new login");
        }

        let now = Utc::now();
        let session = Session {
            id: Uuid::new_v4(),
            user_id,
            access_token_id: access.id,
            refresh_token_id: refresh.id,
            ip: context.ip.clone(),
            device_fingerprint: context.device_fingerprint.clone(),
            user_agent: context.user_agent.clone(),
            created_at: now,
            last_activity: now,
            expires_at: now + Duration::seconds(access.expires_in),
            refresh_expires_at: now + Duration::seconds(refresh.expires_in),
            is_valid: true,
        };

        self.repo.create(&session).await
    }

    /// Invalidate one session and blacklist both of its token ids.
    ///
    /// Ordering is deliberate: access blacklist, refresh blacklist, then
    /// the validity flip. A crash between steps leaves tokens dead and the
    /// session row stale, never the reverse. Idempotent: an absent or
    /// already-invalid session reports `false`.
    pub async fn invalidate_one(
        &self,
        session_id: Uuid,
        reason: BlacklistReason,
    ) -> SessionResult<bool> {
        let Some(session) = self.repo.find_by_id(session_id).await? else {
            return Ok(false);
        };
        if !session.is_valid {
            return Ok(false);
        }

        self.tokens
            .blacklist_token(session.access_token_id, session.user_id, reason)
            .await;
        self.tokens
            .blacklist_token(session.refresh_token_id, session.user_id, reason)
            .await;
        let flipped = self.repo.mark_invalid(session_id).await?;

        if flipped {
            tracing::info!(
                %session_id,
                user_id = %session.user_id,
                reason = reason.as_str(),
                "session invalidated"
            );
        }
        Ok(flipped)
    }

    /// Invalidate every valid session of a user. Returns the count.
    pub async fn invalidate_all(
        &self,
        user_id: Uuid,
        reason: BlacklistReason,
    ) -> SessionResult<u32> {
        let mut invalidated = 0;
        for session in self.repo.find_valid_by_user(user_id).await? {
            if self.invalidate_one(session.id, reason).await? {
                invalidated += 1;
            }
        }
        Ok(invalidated)
    }

    /// Point a session at a freshly rotated access/refresh pair.
    pub async fn apply_refresh(
        &self,
        session_id: Uuid,
        access: &IssuedToken,
        refresh: &IssuedToken,
    ) -> SessionResult<()> {
        let now = Utc::now();
        self.repo
            .update_tokens(
                session_id,
                access.id,
                refresh.id,
                now + Duration::seconds(access.expires_in),
                now + Duration::seconds(refresh.expires_in),
            )
            .await
    }

    /// Point a session at a proactively rotated access token.
    pub async fn apply_access_rotation(
        &self,
        session_id: Uuid,
        access: &IssuedToken,
    ) -> SessionResult<()> {
        let now = Utc::now();
        self.repo
            .update_access_token(
                session_id,
                access.id,
                now + Duration::seconds(access.expires_in),
            )
            .await
    }
}
