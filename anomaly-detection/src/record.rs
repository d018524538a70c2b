use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnomalyKind {
    LoginBehavior,
    TokenUsage,
}

/// Persisted evidence of a detector firing. Created for every detection
/// whether or not an action was taken; only `resolved` ever changes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnomalyRecord {
    pub id: Uuid,
    pub user_id: Uuid,
    pub kind: AnomalyKind,
    /// Confidence score, 0-100.
    pub confidence: u8,
    pub description: String,
    pub metadata: serde_json::Value,
    pub resolved: bool,
    pub detected_at: DateTime<Utc>,
}

#[async_trait]
pub trait AnomalyStore: Send + Sync {
    async fn record(&self, record: AnomalyRecord);

    async fn unresolved(&self, user_id: Uuid) -> Vec<AnomalyRecord>;

    /// Flip the resolved flag. Returns `false` for unknown ids.
    async fn resolve(&self, record_id: Uuid) -> bool;
}

#[derive(Default)]
pub struct InMemoryAnomalyStore {
    records: DashMap<Uuid, AnomalyRecord>,
}

impl InMemoryAnomalyStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn all(&self) -> Vec<AnomalyRecord> {
        self.records.iter().map(|r| r.clone()).collect()
    }
}

#[async_trait]
impl AnomalyStore for InMemoryAnomalyStore {
    async fn record(&self, record: AnomalyRecord) {
        self.records.insert(record.id, record);
    }

    async fn unresolved(&self, user_id: Uuid) -> Vec<AnomalyRecord> {
        self.records
            .iter()
            .filter(|r| r.user_id == user_id && !r.resolved)
            .map(|r| r.clone())
            .collect()
    }

    async fn resolve(&self, record_id: Uuid) -> bool {
        match self.records.get_mut(&record_id) {
            Some(mut record) => {
                record.resolved = true;
                true
            }
            None => false,
        }
    }
}
