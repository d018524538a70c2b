use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use uuid::Uuid;

use crate::error::{SessionError, SessionResult};
use crate::model::Session;

#[async_trait]
pub trait SessionRepository: Send + Sync {
    async fn create(&self, session: &Session) -> SessionResult<Session>;

    async fn find_by_id(&self, id: Uuid) -> SessionResult<Option<Session>>;

    async fn find_by_refresh_token_id(&self, token_id: Uuid) -> SessionResult<Option<Session>>;

    async fn find_by_access_token_id(&self, token_id: Uuid) -> SessionResult<Option<Session>>;

    /// Sessions still flagged valid for a user, regardless of expiry.
    async fn find_valid_by_user(&self, user_id: Uuid) -> SessionResult<Vec<Session>>;

    /// Replace both token ids and expiries after a refresh rotation.
    async fn update_tokens(
        &self,
        session_id: Uuid,
        access_token_id: Uuid,
        refresh_token_id: Uuid,
        expires_at: DateTime<Utc>,
        refresh_expires_at: DateTime<Utc>,
    ) -> SessionResult<()>;

    /// Replace the access token id and expiry after a proactive rotation.
    async fn update_access_token(
        &self,
        session_id: Uuid,
        access_token_id: Uuid,
        expires_at: DateTime<Utc>,
    ) -> SessionResult<()>;

    async fn touch(&self, session_id: Uuid, at: DateTime<Utc>) -> SessionResult<()>;

    /// Flip `is_valid` off. Returns `false` when the session was already
    /// invalid or absent.
    async fn mark_invalid(&self, session_id: Uuid) -> SessionResult<bool>;
}

/// In-memory repository for tests and single-process deployments. The
/// durable equivalent is a relational table; the store's isolation level
/// governs the single-session race (read-committed with existence
/// re-checks at minimum).
#[derive(Default)]
pub struct InMemorySessionRepository {
    sessions: DashMap<Uuid, Session>,
}

impl InMemorySessionRepository {
    pub fn new() -> Self {
        Self::default()
    }

    fn update<F>(&self, session_id: Uuid, apply: F) -> SessionResult<()>
    where
        F: FnOnce(&mut Session),
    {
        match self.sessions.get_mut(&session_id) {
            Some(mut session) => {
                apply(&mut session);
                Ok(())
            }
            None => Err(SessionError::NotFound),
        }
    }
}

#[async_trait]
impl SessionRepository for InMemorySessionRepository {
    async fn create(&self, session: &Session) -> SessionResult<Session> {
        self.sessions.insert(session.id, session.clone());
        Ok(session.clone())
    }

    async fn find_by_id(&self, id: Uuid) -> SessionResult<Option<Session>> {
        Ok(self.sessions.get(&id).map(|s| s.clone()))
    }

    async fn find_by_refresh_token_id(&self, token_id: Uuid) -> SessionResult<Option<Session>> {
        Ok(self
            .sessions
            .iter()
            .find(|s| s.refresh_token_id == token_id)
            .map(|s| s.clone()))
    }

    async fn find_by_access_token_id(&self, token_id: Uuid) -> SessionResult<Option<Session>> {
        Ok(self
            .sessions
            .iter()
            .find(|s| s.access_token_id == token_id)
            .map(|s| s.clone()))
    }

    async fn find_valid_by_user(&self, user_id: Uuid) -> SessionResult<Vec<Session>> {
        Ok(self
            .sessions
            .iter()
            .filter(|s| s.user_id == user_id && s.is_valid)
            .map(|s| s.clone())
            .collect())
    }

    async fn update_tokens(
        &self,
        session_id: Uuid,
        access_token_id: Uuid,
        refresh_token_id: Uuid,
        expires_at: DateTime<Utc>,
        refresh_expires_at: DateTime<Utc>,
    ) -> SessionResult<()> {
        self.update(session_id, |s| {
            s.access_token_id = access_token_id;
            s.refresh_token_id = refresh_token_id;
            s.expires_at = expires_at;
            s.refresh_expires_at = refresh_expires_at;
            s.last_activity = Utc::now();
        })
    }

    async fn update_access_token(
        &self,
        session_id: Uuid,
        access_token_id: Uuid,
        expires_at: DateTime<Utc>,
    ) -> SessionResult<()> {
        self.update(session_id, |s| {
            s.access_token_id = access_token_id;
            s.expires_at = expires_at;
            s.last_activity = Utc::now();
        })
    }

    async fn touch(&self, session_id: Uuid, at: DateTime<Utc>) -> SessionResult<()> {
        self.update(session_id, |s| s.last_activity = at)
    }

    async fn mark_invalid(&self, session_id: Uuid) -> SessionResult<bool> {
        match self.sessions.get_mut(&session_id) {
            Some(mut session) if session.is_valid => {
                session.is_valid = false;
                Ok(true)
            }
            Some(_) => Ok(false),
            None => Ok(false),
        }
    }
}
