use chrono::{DateTime, Duration, Utc};
use hmac::{Hmac, Mac};
use regex::Regex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::attributes::{FingerprintComponents, RequestAttributes};
use crate::error::{FingerprintError, FingerprintResult};

type HmacSha256 = Hmac<Sha256>;

/// Product tokens like `Chrome/120.0.6099.110` churn on every browser
/// update; the version part is wildcarded so a minor upgrade does not look
/// like a new device.
const UA_VERSION_PATTERN: &str = r"([A-Za-z][A-Za-z0-9_-]*)/\d[\d.]*";

/// Per-field weights for plaintext similarity. The hint fields carry small
/// weights so their absence on older browsers costs little.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentWeights {
    pub ip: f64,
    pub user_agent: f64,
    pub accept_language: f64,
    pub accept_encoding: f64,
    pub platform: f64,
    pub mobile: f64,
    pub vendor: f64,
}

impl Default for ComponentWeights {
    fn default() -> Self {
        Self {
            ip: 0.35,
            user_agent: 0.30,
            accept_language: 0.10,
            accept_encoding: 0.05,
            platform: 0.10,
            mobile: 0.05,
            vendor: 0.05,
        }
    }
}

impl ComponentWeights {
    pub fn total(&self) -> f64 {
        self.ip
            + self.user_agent
            + self.accept_language
            + self.accept_encoding
            + self.platform
            + self.mobile
            + self.vendor
    }
}

#[derive(Debug, Clone)]
pub struct FingerprintConfig {
    pub weights: ComponentWeights,
    /// Similarity floor for non-strict validation.
    pub similarity_threshold: f64,
    /// Similarity floor when the caller requests strict matching.
    pub strict_similarity_threshold: f64,
    /// Window during which a (fingerprint, ip) pair may not validate twice.
    pub replay_window: Duration,
}

impl Default for FingerprintConfig {
    fn default() -> Self {
        Self {
            weights: ComponentWeights::default(),
            similarity_threshold: 0.7,
            strict_similarity_threshold: 0.95,
            replay_window: Duration::minutes(5),
        }
    }
}

/// A derived fingerprint: the keyed form, the public hash and the
/// plaintext vector both were computed from.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Fingerprint {
    /// HMAC-SHA256 over the canonical component string, hex. Unforgeable
    /// without the server secret.
    pub fingerprint: String,
    /// Unkeyed SHA-256 over the same string, hex. Safe to hand out.
    pub public_hash: String,
    pub components: FingerprintComponents,
    pub generated_at: DateTime<Utc>,
}

/// Weighted per-field similarity between two plaintext component vectors.
///
/// Each field contributes its full weight on an exact match (including
/// matching absence) and nothing otherwise. Result is normalized to 0..1.
pub fn weighted_similarity(
    a: &FingerprintComponents,
    b: &FingerprintComponents,
    weights: &ComponentWeights,
) -> f64 {
    let total = weights.total();
    if total <= 0.0 {
        return 0.0;
    }

    let mut score = 0.0;
    if a.ip == b.ip {
        score += weights.ip;
    }
    if a.user_agent == b.user_agent {
        score += weights.user_agent;
    }
    if a.accept_language == b.accept_language {
        score += weights.accept_language;
    }
    if a.accept_encoding == b.accept_encoding {
        score += weights.accept_encoding;
    }
    if a.platform == b.platform {
        score += weights.platform;
    }
    if a.mobile == b.mobile {
        score += weights.mobile;
    }
    if a.vendor == b.vendor {
        score += weights.vendor;
    }

    score / total
}

pub struct FingerprintEngine {
    secret: Vec<u8>,
    config: FingerprintConfig,
    version_re: Regex,
    /// (client fingerprint, ip) pairs that validated recently, for replay
    /// rejection. Swept lazily on access.
    pub(crate) replay_markers: dashmap::DashMap<(String, String), DateTime<Utc>>,
}

impl FingerprintEngine {
    pub fn new(secret: &str, config: FingerprintConfig) -> FingerprintResult<Self> {
        if secret.len() < 16 {
            return Err(FingerprintError::Configuration(
                "fingerprint secret must be at least 16 characters".into(),
            ));
        }
        let version_re = Regex::new(UA_VERSION_PATTERN)
            .map_err(|e| FingerprintError::Configuration(e.to_string()))?;

        Ok(Self {
            secret: secret.as_bytes().to_vec(),
            config,
            version_re,
            replay_markers: dashmap::DashMap::new(),
        })
    }

    pub fn config(&self) -> &FingerprintConfig {
        &self.config
    }

    /// Derive the fingerprint for a request. Deterministic for identical
    /// attributes within a process (the secret is fixed at construction).
    pub fn generate(&self, attributes: &RequestAttributes) -> Fingerprint {
        let components = self.components(attributes);
        let canonical = components.canonical();

        Fingerprint {
            fingerprint: self.keyed_digest(&canonical),
            public_hash: hex::encode(Sha256::digest(canonical.as_bytes())),
            components,
            generated_at: Utc::now(),
        }
    }

    /// Similarity of a request against a stored component vector, using the
    /// engine's configured weights.
    pub fn similarity(&self, a: &FingerprintComponents, b: &FingerprintComponents) -> f64 {
        weighted_similarity(a, b, &self.config.weights)
    }

    pub fn normalize_user_agent(&self, user_agent: &str) -> String {
        self.version_re.replace_all(user_agent, "$1/#").to_string()
    }

    fn components(&self, attributes: &RequestAttributes) -> FingerprintComponents {
        FingerprintComponents {
            ip: attributes.ip.clone(),
            user_agent: self.normalize_user_agent(&attributes.user_agent),
            accept_language: attributes.accept_language.clone(),
            accept_encoding: attributes.accept_encoding.clone(),
            platform: attributes.client_hints.platform.clone(),
            mobile: attributes.client_hints.mobile.clone(),
            vendor: attributes.client_hints.vendor.clone(),
        }
    }

    fn keyed_digest(&self, canonical: &str) -> String {
        // new_from_slice accepts any key length for HMAC.
        let mut mac = match HmacSha256::new_from_slice(&self.secret) {
            Ok(mac) => mac,
            Err(_) => return String::new(),
        };
        mac.update(canonical.as_bytes());
        hex::encode(mac.finalize().into_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attributes::ClientHints;

    fn engine() -> FingerprintEngine {
        FingerprintEngine::new("unit-test-fingerprint-secret", FingerprintConfig::default())
            .unwrap()
    }

    fn attrs() -> RequestAttributes {
        RequestAttributes::new(
            "203.0.113.7",
            "Mozilla/5.0 (Windows NT 10.0) Chrome/120.0.6099.110 Safari/537.36",
        )
        .accept_language("de-DE,de;q=0.9")
        .accept_encoding("gzip, br")
        .client_hints(ClientHints {
            platform: Some("Windows".into()),
            mobile: Some("?0".into()),
            vendor: None,
        })
    }

    #[test]
    fn identical_attributes_produce_identical_fingerprints() {
        let e = engine();
        let a = e.generate(&attrs());
        let b = e.generate(&attrs());
        assert_eq!(a.fingerprint, b.fingerprint);
        assert_eq!(a.public_hash, b.public_hash);
        assert_ne!(a.fingerprint, a.public_hash);
    }

    #[test]
    fn different_secrets_produce_different_keyed_digests() {
        let a = engine().generate(&attrs());
        let other =
            FingerprintEngine::new("another-fingerprint-secret!!", FingerprintConfig::default())
                .unwrap();
        let b = other.generate(&attrs());

        assert_ne!(a.fingerprint, b.fingerprint);
        // The unkeyed hash only depends on the components.
        assert_eq!(a.public_hash, b.public_hash);
    }

    #[test]
    fn browser_minor_upgrade_does_not_change_fingerprint() {
        let e = engine();
        let before = e.generate(&attrs());

        let mut upgraded = attrs();
        upgraded.user_agent =
            "Mozilla/5.0 (Windows NT 10.0) Chrome/120.0.6099.224 Safari/537.36".into();
        let after = e.generate(&upgraded);

        assert_eq!(before.fingerprint, after.fingerprint);
    }

    #[test]
    fn ua_normalization_wildcards_versions() {
        let e = engine();
        assert_eq!(
            e.normalize_user_agent("Chrome/120.0.6099.110 Safari/537.36"),
            "Chrome/# Safari/#"
        );
    }

    #[test]
    fn changed_ip_alone_drops_similarity_below_one() {
        let e = engine();
        let home = e.generate(&attrs());

        let mut roaming = attrs();
        roaming.ip = "198.51.100.23".into();
        let away = e.generate(&roaming);

        let similarity = e.similarity(&away.components, &home.components);
        assert!(similarity < 1.0);
        // Everything but the ip still matches.
        let expected = 1.0 - e.config().weights.ip / e.config().weights.total();
        assert!((similarity - expected).abs() < 1e-9);
    }

    #[test]
    fn absent_hints_only_cost_their_own_weight() {
        let e = engine();
        let full = e.generate(&attrs());

        let mut bare = attrs();
        bare.client_hints = ClientHints::default();
        let sparse = e.generate(&bare);

        let similarity = e.similarity(&sparse.components, &full.components);
        let weights = &e.config().weights;
        // vendor was None on both sides, so only platform and mobile differ.
        let expected = 1.0 - (weights.platform + weights.mobile) / weights.total();
        assert!((similarity - expected).abs() < 1e-9);
        assert!(similarity >= e.config().similarity_threshold);
    }

    #[test]
    fn rejects_short_secret() {
        assert!(FingerprintEngine::new("short", FingerprintConfig::default()).is_err());
    }
}
