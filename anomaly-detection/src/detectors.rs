use chrono::{DateTime, Duration, Utc};
use device_fingerprint::{weighted_similarity, ComponentWeights, FingerprintComponents};
use serde::Serialize;
use serde_json::json;

use crate::geo::{haversine_km, GeoLocation};

/// One detector firing. Scores are additive per event.
#[derive(Debug, Clone, Serialize)]
pub struct Finding {
    pub detector: &'static str,
    pub score: u8,
    pub description: String,
    pub metadata: serde_json::Value,
}

/// Physically implausible travel between the last known and the current
/// login location. Score 45-75 scaled by how far the implied speed
/// overshoots the threshold.
pub fn impossible_travel(
    prev_location: &GeoLocation,
    prev_at: DateTime<Utc>,
    current_location: &GeoLocation,
    current_at: DateTime<Utc>,
    max_speed_kmh: f64,
) -> Option<Finding> {
    let elapsed = current_at.signed_duration_since(prev_at);
    if elapsed > Duration::hours(24) || elapsed < Duration::zero() {
        return None;
    }

    let distance_km = haversine_km(prev_location, current_location);
    // Clamp to one minute so back-to-back logins don't divide by zero.
    let elapsed_hours = (elapsed.num_seconds() as f64 / 3600.0).max(1.0 / 60.0);
    let speed_kmh = distance_km / elapsed_hours;

    if speed_kmh <= max_speed_kmh {
        return None;
    }

    let overshoot = speed_kmh / max_speed_kmh - 1.0;
    let score = (45.0 + overshoot * 30.0).clamp(45.0, 75.0) as u8;

    Some(Finding {
        detector: "impossible_travel",
        score,
        description: format!(
            "login from {} implies {:.0} km/h from {}",
            current_location.city, speed_kmh, prev_location.city
        ),
        metadata: json!({
            "distance_km": distance_km.round(),
            "elapsed_hours": elapsed_hours,
            "speed_kmh": speed_kmh.round(),
        }),
    })
}

/// Login at an hour far from the user's typical hours. Typical hours are
/// those occurring more than once among the last five logins; a login two
/// or more hours from the nearest typical hour scores 15-35 by distance.
pub fn unusual_hour(recent_hours: &[u32], current_hour: u32) -> Option<Finding> {
    let typical: Vec<u32> = (0..24)
        .filter(|h| recent_hours.iter().filter(|r| *r == h).count() > 1)
        .collect();
    if typical.is_empty() {
        return None;
    }

    let distance = typical
        .iter()
        .map(|&h| circular_hour_distance(h, current_hour))
        .min()?;
    if distance < 2 {
        return None;
    }

    let score = (15 + (distance - 2) * 2).min(35) as u8;
    Some(Finding {
        detector: "unusual_hour",
        score,
        description: format!(
            "login at hour {current_hour}, {distance}h from nearest typical hour"
        ),
        metadata: json!({ "typical_hours": typical, "distance": distance }),
    })
}

/// No recent fingerprint within 90% similarity of the current one.
/// Score 20-40, inversely scaled by the best similarity found.
pub fn device_change(
    recent: &[FingerprintComponents],
    current: &FingerprintComponents,
    weights: &ComponentWeights,
    similarity_floor: f64,
) -> Option<Finding> {
    if recent.is_empty() {
        return None;
    }

    let best = recent
        .iter()
        .map(|known| weighted_similarity(current, known, weights))
        .fold(0.0_f64, f64::max);
    if best >= similarity_floor {
        return None;
    }

    let score = (20.0 + (similarity_floor - best) / similarity_floor * 20.0).clamp(20.0, 40.0) as u8;
    Some(Finding {
        detector: "device_change",
        score,
        description: format!("no known device above {best:.2} similarity"),
        metadata: json!({ "best_similarity": best }),
    })
}

/// Location drift at token-refresh time: a country change scores 55, a
/// same-country move of more than 100 km scores 35.
pub fn token_location_drift(
    previous: &GeoLocation,
    current: &GeoLocation,
) -> Option<Finding> {
    if previous.country != current.country {
        return Some(Finding {
            detector: "token_location_drift",
            score: 55,
            description: format!(
                "token used from {} after activity in {}",
                current.country, previous.country
            ),
            metadata: json!({ "from": previous.country, "to": current.country }),
        });
    }

    let distance_km = haversine_km(previous, current);
    if previous.city != current.city && distance_km > 100.0 {
        return Some(Finding {
            detector: "token_location_drift",
            score: 35,
            description: format!(
                "token used {:.0} km from previous city {}",
                distance_km, previous.city
            ),
            metadata: json!({ "distance_km": distance_km.round() }),
        });
    }

    None
}

/// Fingerprint similarity below 90% at token-refresh time, score 20-50.
pub fn token_fingerprint_drift(similarity: f64, similarity_floor: f64) -> Option<Finding> {
    if similarity >= similarity_floor {
        return None;
    }
    let score =
        (20.0 + (similarity_floor - similarity) / similarity_floor * 30.0).clamp(20.0, 50.0) as u8;
    Some(Finding {
        detector: "token_fingerprint_drift",
        score,
        description: format!("fingerprint similarity {similarity:.2} at token use"),
        metadata: json!({ "similarity": similarity }),
    })
}

/// Refresh arriving unusually soon after the previous activity: an
/// abnormally chatty client, typical of scripted token replay. Scores 25.
pub fn rapid_refresh(elapsed: Duration, window: Duration) -> Option<Finding> {
    if elapsed >= window || elapsed < Duration::zero() {
        return None;
    }
    Some(Finding {
        detector: "rapid_refresh",
        score: 25,
        description: format!("refresh {}s after previous activity", elapsed.num_seconds()),
        metadata: json!({ "elapsed_seconds": elapsed.num_seconds() }),
    })
}

fn circular_hour_distance(a: u32, b: u32) -> u32 {
    let diff = a.abs_diff(b);
    diff.min(24 - diff)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn berlin() -> GeoLocation {
        GeoLocation {
            country: "DE".into(),
            city: "Berlin".into(),
            latitude: 52.52,
            longitude: 13.405,
        }
    }

    fn munich() -> GeoLocation {
        GeoLocation {
            country: "DE".into(),
            city: "Munich".into(),
            latitude: 48.1351,
            longitude: 11.582,
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

    #[test]
    fn berlin_to_sydney_in_an_hour_is_impossible() {
        let now = Utc::now();
        let finding =
            impossible_travel(&berlin(), now - Duration::hours(1), &sydney(), now, 800.0)
                .unwrap();
        assert_eq!(finding.score, 75, "far over threshold saturates the band");
    }

    #[test]
    fn slightly_over_threshold_scores_low_band() {
        let now = Utc::now();
        // ~880 km/h: 10% overshoot puts the score just above the floor.
        let finding = impossible_travel(
            &berlin(),
            now - Duration::minutes((584.0 / 880.0 * 60.0) as i64),
            &munich(),
            now,
            800.0,
        );
        if let Some(f) = finding {
            assert!(f.score >= 45 && f.score <= 50, "got {}", f.score);
        }
    }

    #[test]
    fn old_travel_outside_window_ignored() {
        let now = Utc::now();
        assert!(impossible_travel(
            &berlin(),
            now - Duration::hours(30),
            &sydney(),
            now,
            800.0
        )
        .is_none());
    }

    #[test]
    fn plausible_travel_ignored() {
        let now = Utc::now();
        assert!(impossible_travel(
            &berlin(),
            now - Duration::hours(8),
            &munich(),
            now,
            800.0
        )
        .is_none());
    }

    #[test]
    fn unusual_hour_fires_far_from_typical() {
        // 9 twice and 10 twice are typical; 3am is 6 hours away.
        let finding = unusual_hour(&[9, 9, 10, 10, 14], 3).unwrap();
        assert_eq!(finding.detector, "unusual_hour");
        assert!(finding.score >= 15 && finding.score <= 35);
    }

    #[test]
    fn near_typical_hour_is_fine() {
        assert!(unusual_hour(&[9, 9, 10, 10, 14], 10).is_none());
        assert!(unusual_hour(&[9, 9, 10, 10, 14], 11).is_none());
    }

    #[test]
    fn no_typical_hours_no_detection() {
        assert!(unusual_hour(&[1, 5, 9, 13, 17], 3).is_none());
    }

    #[test]
    fn hour_distance_wraps_midnight() {
        assert_eq!(circular_hour_distance(23, 1), 2);
        assert_eq!(circular_hour_distance(0, 12), 12);
    }

    #[test]
    fn device_change_fires_for_unknown_device() {
        let weights = ComponentWeights::default();
        let known = vec![components("203.0.113.7", "Chrome/#")];
        let current = components("198.51.100.1", "curl/#");

        let finding = device_change(&known, &current, &weights, 0.9).unwrap();
        assert!(finding.score >= 20 && finding.score <= 40);
    }

    #[test]
    fn known_device_is_quiet() {
        let weights = ComponentWeights::default();
        let known = vec![components("203.0.113.7", "Chrome/#")];
        let current = components("203.0.113.7", "Chrome/#");
        assert!(device_change(&known, &current, &weights, 0.9).is_none());
        assert!(device_change(&[], &current, &weights, 0.9).is_none());
    }

    #[test]
    fn country_change_scores_55() {
        let finding = token_location_drift(&berlin(), &sydney()).unwrap();
        assert_eq!(finding.score, 55);
    }

    #[test]
    fn long_domestic_move_scores_35() {
        let finding = token_location_drift(&berlin(), &munich()).unwrap();
        assert_eq!(finding.score, 35);
    }

    #[test]
    fn same_city_is_quiet() {
        assert!(token_location_drift(&berlin(), &berlin()).is_none());
    }

    #[test]
    fn fingerprint_drift_band() {
        assert!(token_fingerprint_drift(0.95, 0.9).is_none());
        let low = token_fingerprint_drift(0.0, 0.9).unwrap();
        assert_eq!(low.score, 50);
        let mild = token_fingerprint_drift(0.85, 0.9).unwrap();
        assert!(mild.score >= 20 && mild.score < 25);
    }

    #[test]
    fn rapid_refresh_window() {
        assert!(rapid_refresh(Duration::seconds(30), Duration::minutes(2)).is_some());
        assert!(rapid_refresh(Duration::minutes(3), Duration::minutes(2)).is_none());
    }
}
