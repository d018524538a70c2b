use auth_crypto::constant_time::ct_eq_str;
use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::attributes::RequestAttributes;
use crate::engine::FingerprintEngine;
use crate::store::FingerprintRecord;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationReason {
    /// Client echoed the freshly computed HMAC fingerprint.
    ExactMatch,
    /// Weighted component similarity against a stored record cleared the
    /// threshold.
    SimilarityMatch,
    /// Client echoed the stored fingerprint value.
    StoredMatch,
    Mismatch,
    /// Same (fingerprint, ip) pair validated within the replay window.
    Replay,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FingerprintValidation {
    pub valid: bool,
    /// 0..1 against the stored record; 1.0 on an exact fresh match.
    pub similarity: f64,
    pub reason: ValidationReason,
    /// Set when the client appears to be synthesizing a fingerprint (e.g.
    /// sending the public hash instead of echoing the HMAC value), or on
    /// replay. Suspicious does not imply invalid.
    pub suspicious: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionCheckClassification {
    Normal,
    /// IP changed and similarity is low: treat as stolen-fingerprint reuse.
    /// Callers must invalidate the session immediately.
    PossibleSessionHijack,
}

#[derive(Debug, Clone)]
pub struct SessionCheck {
    pub validation: FingerprintValidation,
    pub classification: SessionCheckClassification,
}

impl FingerprintEngine {
    /// Validate a client-supplied fingerprint against the freshly computed
    /// one and an optional stored record.
    pub fn validate(
        &self,
        attributes: &RequestAttributes,
        client_value: &str,
        stored: Option<&FingerprintRecord>,
        strict: bool,
    ) -> FingerprintValidation {
        // The replay guard only concerns clients echoing a fingerprint; an
        // absent client value validates purely by similarity and carries
        // nothing to replay.
        if !client_value.is_empty() && self.is_recent_replay(client_value, &attributes.ip) {
            tracing::warn!(ip = %attributes.ip, "fingerprint replay within window rejected");
            return FingerprintValidation {
                valid: false,
                similarity: 0.0,
                reason: ValidationReason::Replay,
                suspicious: true,
            };
        }

        let fresh = self.generate(attributes);
        let threshold = if strict {
            self.config().strict_similarity_threshold
        } else {
            self.config().similarity_threshold
        };

        // A client holding only the public hash is trying to synthesize the
        // fingerprint rather than echo it.
        let suspicious = ct_eq_str(client_value, &fresh.public_hash)
            || stored.is_some_and(|s| ct_eq_str(client_value, &s.public_hash));

        let stored_similarity =
            stored.map(|s| self.similarity(&fresh.components, &s.components));

        let (valid, reason, similarity) = if ct_eq_str(client_value, &fresh.fingerprint) {
            (true, ValidationReason::ExactMatch, 1.0)
        } else if stored_similarity.is_some_and(|s| s >= threshold) {
            (
                true,
                ValidationReason::SimilarityMatch,
                stored_similarity.unwrap_or(0.0),
            )
        } else if stored.is_some_and(|s| ct_eq_str(client_value, &s.fingerprint)) {
            (
                true,
                ValidationReason::StoredMatch,
                stored_similarity.unwrap_or(0.0),
            )
        } else {
            (
                false,
                ValidationReason::Mismatch,
                stored_similarity.unwrap_or(0.0),
            )
        };

        if valid && !client_value.is_empty() {
            self.mark_validated(client_value, &attributes.ip);
        }

        FingerprintValidation {
            valid,
            similarity,
            reason,
            suspicious,
        }
    }

    /// Session-aware validation: additionally classifies the combination of
    /// an IP change with low similarity as a possible hijack.
    pub fn validate_for_session(
        &self,
        attributes: &RequestAttributes,
        client_value: &str,
        stored: &FingerprintRecord,
        session_ip: &str,
    ) -> SessionCheck {
        let validation = self.validate(attributes, client_value, Some(stored), false);

        let ip_changed = attributes.ip != session_ip;
        let classification =
            if ip_changed && validation.similarity < self.config().similarity_threshold {
                SessionCheckClassification::PossibleSessionHijack
            } else {
                SessionCheckClassification::Normal
            };

        if classification == SessionCheckClassification::PossibleSessionHijack {
            tracing::warn!(
                session_ip,
                request_ip = %attributes.ip,
                similarity = validation.similarity,
                "possible session hijack detected"
            );
        }

        SessionCheck {
            validation,
            classification,
        }
    }

    fn is_recent_replay(&self, client_value: &str, ip: &str) -> bool {
        let window = self.config().replay_window;
        let now = Utc::now();
        self.replay_markers
            .retain(|_, seen| now.signed_duration_since(*seen) < window);
        self.replay_markers
            .contains_key(&(client_value.to_string(), ip.to_string()))
    }

    fn mark_validated(&self, client_value: &str, ip: &str) {
        self.replay_markers
            .insert((client_value.to_string(), ip.to_string()), Utc::now());
    }
}
