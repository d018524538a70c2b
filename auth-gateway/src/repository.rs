use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use error_common::Result;
use uuid::Uuid;

use crate::models::{CredentialRecord, PasswordHistoryEntry};

#[async_trait]
pub trait UserRepository: Send + Sync {
    async fn create_user(&self, record: &CredentialRecord) -> Result<CredentialRecord>;

    async fn find_by_id(&self, id: Uuid) -> Result<Option<CredentialRecord>>;

    async fn find_by_username(&self, username: &str) -> Result<Option<CredentialRecord>>;

    async fn update_password(&self, user_id: Uuid, password_hash: &str) -> Result<()>;

    /// Increment the consecutive-failure counter; returns the new count.
    async fn record_failed_attempt(&self, user_id: Uuid) -> Result<u32>;

    /// Reset the counter and clear any lock.
    async fn reset_failed_attempts(&self, user_id: Uuid) -> Result<()>;

    async fn set_lock(&self, user_id: Uuid, until: DateTime<Utc>) -> Result<()>;

    async fn set_totp_secret(&self, user_id: Uuid, encrypted: Option<String>) -> Result<()>;

    async fn add_webauthn_credential(&self, user_id: Uuid, credential: &str) -> Result<()>;

    /// Most recent first.
    async fn password_history(
        &self,
        user_id: Uuid,
        limit: usize,
    ) -> Result<Vec<PasswordHistoryEntry>>;

    /// Append-only; history entries are never deleted.
    async fn append_password_history(&self, entry: &PasswordHistoryEntry) -> Result<()>;
}

/// In-memory repository for tests and development.
#[derive(Default)]
pub struct InMemoryUserRepository {
    users: DashMap<Uuid, CredentialRecord>,
    history: DashMap<Uuid, Vec<PasswordHistoryEntry>>,
}

impl InMemoryUserRepository {
    pub fn new() -> Self {
        Self::default()
    }

    fn update<F>(&self, user_id: Uuid, apply: F) -> Result<()>
    where
        F: FnOnce(&mut CredentialRecord),
    {
        match self.users.get_mut(&user_id) {
            Some(mut record) => {
                apply(&mut record);
                record.updated_at = Utc::now();
                Ok(())
            }
            // Lookups at the orchestrator happen first; a miss here means
            // the record vanished between steps.
            None => Err(error_common::AuthError::Internal(anyhow::anyhow!(
                "user {user_id} disappeared during update"
            ))),
        }
    }
}

#[async_trait]
impl UserRepository for InMemoryUserRepository {
    async fn create_user(&self, record: &CredentialRecord) -> Result<CredentialRecord> {
        self.users.insert(record.id, record.clone());
        Ok(record.clone())
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<CredentialRecord>> {
        Ok(self.users.get(&id).map(|r| r.clone()))
    }

    async fn find_by_username(&self, username: &str) -> Result<Option<CredentialRecord>> {
        Ok(self
            .users
            .iter()
            .find(|r| r.username == username)
            .map(|r| r.clone()))
    }

    async fn update_password(&self, user_id: Uuid, password_hash: &str) -> Result<()> {
        self.update(user_id, |r| r.password_hash = password_hash.to_string())
    }

    async fn record_failed_attempt(&self, user_id: Uuid) -> Result<u32> {
        let mut count = 0;
        self.update(user_id, |r| {
            r.failed_attempts += 1;
            count = r.failed_attempts;
        })?;
        Ok(count)
    }

    async fn reset_failed_attempts(&self, user_id: Uuid) -> Result<()> {
        self.update(user_id, |r| {
            r.failed_attempts = 0;
            r.locked_until = None;
        })
    }

    async fn set_lock(&self, user_id: Uuid, until: DateTime<Utc>) -> Result<()> {
        self.update(user_id, |r| r.locked_until = Some(until))
    }

    async fn set_totp_secret(&self, user_id: Uuid, encrypted: Option<String>) -> Result<()> {
        self.update(user_id, |r| r.totp_secret_enc = encrypted)
    }

    async fn add_webauthn_credential(&self, user_id: Uuid, credential: &str) -> Result<()> {
        self.update(user_id, |r| {
            r.webauthn_credentials.push(credential.to_string())
        })
    }

    async fn password_history(
        &self,
        user_id: Uuid,
        limit: usize,
    ) -> Result<Vec<PasswordHistoryEntry>> {
        Ok(self
            .history
            .get(&user_id)
            .map(|entries| entries.iter().rev().take(limit).cloned().collect())
            .unwrap_or_default())
    }

    async fn append_password_history(&self, entry: &PasswordHistoryEntry) -> Result<()> {
        self.history
            .entry(entry.user_id)
            .or_default()
            .push(entry.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use token_service::Role;

    fn record(username: &str) -> CredentialRecord {
        CredentialRecord {
            id: Uuid::new_v4(),
            username: username.into(),
            password_hash: "hash".into(),
            salt: "salt".into(),
            role: Role::Reception,
            permissions: vec![],
            totp_secret_enc: None,
            webauthn_credentials: vec![],
            failed_attempts: 0,
            locked_until: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn failed_attempt_counter_round_trip() {
        let repo = InMemoryUserRepository::new();
        let user = repo.create_user(&record("reception.iqbal")).await.unwrap();

        assert_eq!(repo.record_failed_attempt(user.id).await.unwrap(), 1);
        assert_eq!(repo.record_failed_attempt(user.id).await.unwrap(), 2);

        repo.reset_failed_attempts(user.id).await.unwrap();
        let reloaded = repo.find_by_id(user.id).await.unwrap().unwrap();
        assert_eq!(reloaded.failed_attempts, 0);
        assert!(reloaded.locked_until.is_none());
    }

    #[tokio::test]
    async fn history_is_append_only_newest_first() {
        let repo = InMemoryUserRepository::new();
        let user = repo.create_user(&record("nurse.holt")).await.unwrap();

        for i in 0..3 {
            repo.append_password_history(&PasswordHistoryEntry {
                user_id: user.id,
                password_hash: format!("hash-{i}"),
                created_at: Utc::now(),
            })
            .await
            .unwrap();
        }

        let history = repo.password_history(user.id, 2).await.unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].password_hash, "hash-2");
    }
}
