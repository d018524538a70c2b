//! Behavioral anomaly scoring for authentication events.
//!
//! Detectors are pure functions over an event plus recorded history; their
//! scores are additive per event. Detection is advisory: every firing
//! persists an [`AnomalyRecord`] for audit, and the report tells the caller
//! whether policy thresholds were crossed (alert the user, kill the
//! session) — the caller performs those actions, never this crate.

pub mod detectors;
pub mod engine;
pub mod geo;
pub mod history;
pub mod record;

pub use detectors::Finding;
pub use engine::{AnomalyConfig, AnomalyEngine, AnomalyReport, TokenUsageEvent};
pub use geo::{haversine_km, GeoIp, GeoLocation, StaticGeoIp};
pub use history::{InMemoryLoginHistory, LoginEvent, LoginHistoryStore};
pub use record::{AnomalyKind, AnomalyRecord, AnomalyStore, InMemoryAnomalyStore};
