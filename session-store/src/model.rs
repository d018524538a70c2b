use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Request context captured at session creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionContext {
    pub ip: String,
    pub device_fingerprint: String,
    pub user_agent: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: Uuid,
    pub user_id: Uuid,
    pub access_token_id: Uuid,
    pub refresh_token_id: Uuid,
    pub ip: String,
    pub device_fingerprint: String,
    pub user_agent: String,
    pub created_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub refresh_expires_at: DateTime<Utc>,
    pub is_valid: bool,
}

impl Session {
    /// A session is usable iff it is flagged valid *and* unexpired.
    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        self.is_valid && self.expires_at > now
    }

    /// Whether the refresh window is still open, independent of access
    /// expiry.
    pub fn can_refresh(&self, now: DateTime<Utc>) -> bool {
        self.is_valid && self.refresh_expires_at > now
    }
}
