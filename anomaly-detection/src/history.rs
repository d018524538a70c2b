use async_trait::async_trait;
use chrono::{DateTime, Timelike, Utc};
use dashmap::DashMap;
use device_fingerprint::FingerprintComponents;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

const RETAINED_PER_USER: usize = 20;

/// One successful login, as remembered for behavioral comparison.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginEvent {
    pub user_id: Uuid,
    pub at: DateTime<Utc>,
    pub ip: String,
    pub components: FingerprintComponents,
}

impl LoginEvent {
    pub fn hour(&self) -> u32 {
        self.at.hour()
    }
}

#[async_trait]
pub trait LoginHistoryStore: Send + Sync {
    async fn record(&self, event: LoginEvent);

    /// Most recent first.
    async fn recent(&self, user_id: Uuid, limit: usize) -> Vec<LoginEvent>;
}

#[derive(Default)]
pub struct InMemoryLoginHistory {
    events: DashMap<Uuid, Vec<LoginEvent>>,
}

impl InMemoryLoginHistory {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl LoginHistoryStore for InMemoryLoginHistory {
    async fn record(&self, event: LoginEvent) {
        let mut entry = self.events.entry(event.user_id).or_default();
        entry.insert(0, event);
        entry.truncate(RETAINED_PER_USER);
    }

    async fn recent(&self, user_id: Uuid, limit: usize) -> Vec<LoginEvent> {
        self.events
            .get(&user_id)
            .map(|events| events.iter().take(limit).cloned().collect())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn components(ip: &str) -> FingerprintComponents {
        FingerprintComponents {
            ip: ip.into(),
            user_agent: "Chrome/#".into(),
            accept_language: None,
            accept_encoding: None,
            platform: None,
            mobile: None,
            vendor: None,
        }
    }

    #[tokio::test]
    async fn recent_returns_newest_first() {
        let store = InMemoryLoginHistory::new();
        let user = Uuid::new_v4();

        for i in 0..3 {
            store
                .record(LoginEvent {
                    user_id: user,
                    at: Utc::now(),
                    ip: format!("10.0.0.{i}"),
                    components: components(&format!("10.0.0.{i}")),
                })
                .await;
        }

        let recent = store.recent(user, 2).await;
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].ip, "10.0.0.2");
        assert_eq!(recent[1].ip, "10.0.0.1");
    }
}
