use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use device_fingerprint::{weighted_similarity, ComponentWeights, FingerprintComponents};
use uuid::Uuid;

use crate::detectors::{
    device_change, impossible_travel, rapid_refresh, token_fingerprint_drift,
    token_location_drift, unusual_hour, Finding,
};
use crate::geo::GeoIp;
use crate::history::{LoginEvent, LoginHistoryStore};
use crate::record::{AnomalyKind, AnomalyRecord, AnomalyStore};

#[derive(Debug, Clone)]
pub struct AnomalyConfig {
    pub max_speed_kmh: f64,
    pub device_similarity_floor: f64,
    pub rapid_refresh_window: Duration,
    /// Login score above which a security-alert email goes out.
    pub login_alert_threshold: u8,
    /// Token-use score above which the session must be killed.
    pub token_invalidation_threshold: u8,
    /// How many past logins feed the behavioral detectors.
    pub history_depth: usize,
}

impl Default for AnomalyConfig {
    fn default() -> Self {
        Self {
            max_speed_kmh: 800.0,
            device_similarity_floor: 0.9,
            rapid_refresh_window: Duration::minutes(2),
            login_alert_threshold: 70,
            token_invalidation_threshold: 60,
            history_depth: 5,
        }
    }
}

/// Aggregated outcome of one scoring pass. The engine only reports; the
/// orchestrator acts on the flags.
#[derive(Debug, Clone)]
pub struct AnomalyReport {
    pub kind: AnomalyKind,
    /// Additive score over all findings, clamped to 100.
    pub total_score: u8,
    pub findings: Vec<Finding>,
    pub should_alert: bool,
    pub should_invalidate_session: bool,
}

/// Token-refresh context handed in by the orchestrator.
#[derive(Debug, Clone)]
pub struct TokenUsageEvent {
    pub user_id: Uuid,
    pub at: DateTime<Utc>,
    pub ip: String,
    /// IP of the session's previous activity.
    pub previous_ip: String,
    pub last_activity: DateTime<Utc>,
    pub components: FingerprintComponents,
    /// Component vector the session was bound to.
    pub stored_components: FingerprintComponents,
}

pub struct AnomalyEngine {
    geoip: Arc<dyn GeoIp>,
    history: Arc<dyn LoginHistoryStore>,
    store: Arc<dyn AnomalyStore>,
    weights: ComponentWeights,
    config: AnomalyConfig,
}

impl AnomalyEngine {
    pub fn new(
        geoip: Arc<dyn GeoIp>,
        history: Arc<dyn LoginHistoryStore>,
        store: Arc<dyn AnomalyStore>,
        weights: ComponentWeights,
        config: AnomalyConfig,
    ) -> Self {
        Self {
            geoip,
            history,
            store,
            weights,
            config,
        }
    }

    /// Score a successful login against the user's history, persist any
    /// findings, then append the login to history.
    pub async fn score_login(&self, event: &LoginEvent) -> AnomalyReport {
        let recent = self
            .history
            .recent(event.user_id, self.config.history_depth)
            .await;

        let mut findings: Vec<Finding> = Vec::new();

        if let Some(last) = recent.first() {
            if let (Some(prev), Some(cur)) =
                (self.geoip.lookup(&last.ip), self.geoip.lookup(&event.ip))
            {
                findings.extend(impossible_travel(
                    &prev,
                    last.at,
                    &cur,
                    event.at,
                    self.config.max_speed_kmh,
                ));
            }
        }

        let hours: Vec<u32> = recent.iter().map(LoginEvent::hour).collect();
        findings.extend(unusual_hour(&hours, event.hour()));

        let known: Vec<FingerprintComponents> =
            recent.iter().map(|e| e.components.clone()).collect();
        findings.extend(device_change(
            &known,
            &event.components,
            &self.weights,
            self.config.device_similarity_floor,
        ));

        let report = self
            .persist(AnomalyKind::LoginBehavior, event.user_id, findings)
            .await;
        self.history.record(event.clone()).await;
        report
    }

    /// Score a token refresh for drift and replay-like chattiness.
    pub async fn score_token_usage(&self, event: &TokenUsageEvent) -> AnomalyReport {
        let mut findings: Vec<Finding> = Vec::new();

        if let (Some(prev), Some(cur)) = (
            self.geoip.lookup(&event.previous_ip),
            self.geoip.lookup(&event.ip),
        ) {
            findings.extend(token_location_drift(&prev, &cur));
        }

        let similarity =
            weighted_similarity(&event.components, &event.stored_components, &self.weights);
        findings.extend(token_fingerprint_drift(
            similarity,
            self.config.device_similarity_floor,
        ));

        findings.extend(rapid_refresh(
            event.at.signed_duration_since(event.last_activity),
            self.config.rapid_refresh_window,
        ));

        self.persist(AnomalyKind::TokenUsage, event.user_id, findings)
            .await
    }

    async fn persist(
        &self,
        kind: AnomalyKind,
        user_id: Uuid,
        findings: Vec<Finding>,
    ) -> AnomalyReport {
        let total: u32 = findings.iter().map(|f| u32::from(f.score)).sum();
        let total_score = total.min(100) as u8;

        for finding in &findings {
            self.store
                .record(AnomalyRecord {
                    id: Uuid::new_v4(),
                    user_id,
                    kind,
                    confidence: finding.score,
                    description: finding.description.clone(),
                    metadata: finding.metadata.clone(),
                    resolved: false,
                    detected_at: Utc::now(),
                })
                .await;
            tracing::warn!(
                %user_id,
                detector = finding.detector,
                score = finding.score,
                "anomaly detected"
            );
        }

        AnomalyReport {
            kind,
            total_score,
            findings,
            should_alert: kind == AnomalyKind::LoginBehavior
                && total_score > self.config.login_alert_threshold,
            should_invalidate_session: kind == AnomalyKind::TokenUsage
                && total_score > self.config.token_invalidation_threshold,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geo::{GeoLocation, StaticGeoIp};
    use crate::history::InMemoryLoginHistory;
    use crate::record::InMemoryAnomalyStore;

    fn components(ip: &str, ua: &str) -> FingerprintComponents {
        FingerprintComponents {
            ip: ip.into(),
            user_agent: ua.into(),
            accept_language: Some("en-US".into()),
            accept_encoding: Some("gzip".into()),
            platform: None,
            mobile: None,
            vendor: None,
        }
    }

    fn berlin() -> GeoLocation {
        GeoLocation {
            country: "DE".into(),
            city: "Berlin".into(),
            latitude: 52.52,
            longitude: 13.405,
        }
    }

    fn sydney() -> GeoLocation {
        GeoLocation {
            country: "AU".into(),
            city: "Sydney".into(),
            latitude: -33.8688,
            longitude: 151.2093,
        }
    }

    struct Fixture {
        engine: AnomalyEngine,
        store: Arc<InMemoryAnomalyStore>,
    }

    fn fixture() -> Fixture {
        let store = Arc::new(InMemoryAnomalyStore::new());
        let geoip = StaticGeoIp::new()
            .with("203.0.113.7", berlin())
            .with("198.51.100.1", sydney());
        let engine = AnomalyEngine::new(
            Arc::new(geoip),
            Arc::new(InMemoryLoginHistory::new()),
            store.clone(),
            ComponentWeights::default(),
            AnomalyConfig::default(),
        );
        Fixture { engine, store }
    }

    fn login(user: Uuid, ip: &str, ua: &str, at: DateTime<Utc>) -> LoginEvent {
        LoginEvent {
            user_id: user,
            at,
            ip: ip.into(),
            components: components(ip, ua),
        }
    }

    #[tokio::test]
    async fn first_login_is_quiet() {
        let f = fixture();
        let report = f
            .engine
            .score_login(&login(Uuid::new_v4(), "203.0.113.7", "Chrome/#", Utc::now()))
            .await;
        assert_eq!(report.total_score, 0);
        assert!(!report.should_alert);
    }

    #[tokio::test]
    async fn teleporting_login_alerts_and_persists() {
        let f = fixture();
        let user = Uuid::new_v4();
        let now = Utc::now();

        f.engine
            .score_login(&login(user, "203.0.113.7", "Chrome/#", now - Duration::hours(1)))
            .await;
        let report = f
            .engine
            .score_login(&login(user, "198.51.100.1", "curl/#", now))
            .await;

        // Impossible travel (75) plus device change puts this over the
        // alert threshold.
        assert!(report.total_score > 70, "score {}", report.total_score);
        assert!(report.should_alert);
        assert!(!report.should_invalidate_session);
        assert!(!f.store.unresolved(user).await.is_empty());
    }

    #[tokio::test]
    async fn hostile_token_use_demands_invalidation() {
        let f = fixture();
        let user = Uuid::new_v4();
        let now = Utc::now();

        let report = f
            .engine
            .score_token_usage(&TokenUsageEvent {
                user_id: user,
                at: now,
                ip: "198.51.100.1".into(),
                previous_ip: "203.0.113.7".into(),
                last_activity: now - Duration::seconds(20),
                components: components("198.51.100.1", "curl/#"),
                stored_components: components("203.0.113.7", "Chrome/#"),
            })
            .await;

        // Country change (55) + fingerprint drift + rapid refresh (25).
        assert!(report.total_score > 60);
        assert!(report.should_invalidate_session);
        assert!(!report.should_alert);

        let records = f.store.unresolved(user).await;
        assert!(records.iter().all(|r| r.kind == AnomalyKind::TokenUsage));
        assert!(records.len() >= 3);
    }

    #[tokio::test]
    async fn benign_refresh_is_quiet() {
        let f = fixture();
        let now = Utc::now();

        let report = f
            .engine
            .score_token_usage(&TokenUsageEvent {
                user_id: Uuid::new_v4(),
                at: now,
                ip: "203.0.113.7".into(),
                previous_ip: "203.0.113.7".into(),
                last_activity: now - Duration::minutes(14),
                components: components("203.0.113.7", "Chrome/#"),
                stored_components: components("203.0.113.7", "Chrome/#"),
            })
            .await;

        assert_eq!(report.total_score, 0);
        assert!(!report.should_invalidate_session);
    }
}
