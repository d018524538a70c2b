use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::attributes::FingerprintComponents;
use crate::engine::Fingerprint;

/// How many fingerprints are retained per user. Enough for the anomaly
/// detectors' recent-device comparisons without unbounded growth.
const RETAINED_PER_USER: usize = 10;

/// A fingerprint observed for a user, kept server-side with its plaintext
/// component vector so later similarity checks never fall back to
/// comparing digests.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FingerprintRecord {
    pub user_id: Uuid,
    pub fingerprint: String,
    pub public_hash: String,
    pub components: FingerprintComponents,
    pub generated_at: DateTime<Utc>,
}

impl FingerprintRecord {
    pub fn from_fingerprint(user_id: Uuid, fp: &Fingerprint) -> Self {
        Self {
            user_id,
            fingerprint: fp.fingerprint.clone(),
            public_hash: fp.public_hash.clone(),
            components: fp.components.clone(),
            generated_at: fp.generated_at,
        }
    }
}

#[async_trait]
pub trait FingerprintStore: Send + Sync {
    async fn record(&self, record: FingerprintRecord);

    /// Most recent records first.
    async fn recent(&self, user_id: Uuid, limit: usize) -> Vec<FingerprintRecord>;

    async fn latest(&self, user_id: Uuid) -> Option<FingerprintRecord>;
}

#[derive(Default)]
pub struct InMemoryFingerprintStore {
    records: DashMap<Uuid, Vec<FingerprintRecord>>,
}

impl InMemoryFingerprintStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl FingerprintStore for InMemoryFingerprintStore {
    async fn record(&self, record: FingerprintRecord) {
        let mut entry = self.records.entry(record.user_id).or_default();
        entry.insert(0, record);
        entry.truncate(RETAINED_PER_USER);
    }

    async fn recent(&self, user_id: Uuid, limit: usize) -> Vec<FingerprintRecord> {
        self.records
            .get(&user_id)
            .map(|records| records.iter().take(limit).cloned().collect())
            .unwrap_or_default()
    }

    async fn latest(&self, user_id: Uuid) -> Option<FingerprintRecord> {
        self.records
            .get(&user_id)
            .and_then(|records| records.first().cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attributes::RequestAttributes;
    use crate::engine::{FingerprintConfig, FingerprintEngine};

    #[tokio::test]
    async fn keeps_most_recent_first_and_bounded() {
        let engine =
            FingerprintEngine::new("unit-test-fingerprint-secret", FingerprintConfig::default())
                .unwrap();
        let store = InMemoryFingerprintStore::new();
        let user = Uuid::new_v4();

        for i in 0..15 {
            let fp = engine.generate(&RequestAttributes::new(
                format!("10.0.0.{i}"),
                "Chrome/120.0",
            ));
            store
                .record(FingerprintRecord::from_fingerprint(user, &fp))
                .await;
        }

        let recent = store.recent(user, 50).await;
        assert_eq!(recent.len(), RETAINED_PER_USER);
        assert_eq!(recent[0].components.ip, "10.0.0.14");

        let latest = store.latest(user).await.unwrap();
        assert_eq!(latest.components.ip, "10.0.0.14");
    }

    #[tokio::test]
    async fn unknown_user_is_empty() {
        let store = InMemoryFingerprintStore::new();
        assert!(store.recent(Uuid::new_v4(), 5).await.is_empty());
        assert!(store.latest(Uuid::new_v4()).await.is_none());
    }
}
