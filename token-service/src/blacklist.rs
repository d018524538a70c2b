use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlacklistReason {
    Logout,
    Rotation,
    RefreshRotation,
    SecurityViolation,
    PasswordChange,
}

impl BlacklistReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Logout => "logout",
            Self::Rotation => "rotation",
            Self::RefreshRotation => "refresh_rotation",
            Self::SecurityViolation => "security_violation",
            Self::PasswordChange => "password_change",
        }
    }
}

/// Append-only record: a token id listed here is permanently dead, no
/// matter how valid its signature still is.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlacklistedToken {
    pub token_id: Uuid,
    pub user_id: Uuid,
    pub reason: BlacklistReason,
    pub blacklisted_at: DateTime<Utc>,
}

#[async_trait]
pub trait BlacklistStore: Send + Sync {
    /// Insert an entry. Returns `false` when the token id was already
    /// present; the first reason on record wins.
    async fn insert(&self, entry: BlacklistedToken) -> bool;

    async fn contains(&self, token_id: Uuid) -> bool;
}

/// In-memory store for tests and single-process deployments. A relational
/// table with a primary key on `token_id` fills the same contract.
#[derive(Default)]
pub struct InMemoryBlacklistStore {
    entries: DashMap<Uuid, BlacklistedToken>,
}

impl InMemoryBlacklistStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait]
impl BlacklistStore for InMemoryBlacklistStore {
    async fn insert(&self, entry: BlacklistedToken) -> bool {
        match self.entries.entry(entry.token_id) {
            dashmap::mapref::entry::Entry::Occupied(_) => false,
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                slot.insert(entry);
                true
            }
        }
    }

    async fn contains(&self, token_id: Uuid) -> bool {
        self.entries.contains_key(&token_id)
    }
}
