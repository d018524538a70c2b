use std::collections::HashMap;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeoLocation {
    pub country: String,
    pub city: String,
    pub latitude: f64,
    pub longitude: f64,
}

/// GeoIP lookup seam. Accuracy of the underlying data source is explicitly
/// out of scope; an unknown IP simply disables location-based detectors.
pub trait GeoIp: Send + Sync {
    fn lookup(&self, ip: &str) -> Option<GeoLocation>;
}

/// Fixed-table lookup for tests and development.
#[derive(Default)]
pub struct StaticGeoIp {
    entries: HashMap<String, GeoLocation>,
}

impl StaticGeoIp {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, ip: impl Into<String>, location: GeoLocation) -> Self {
        self.entries.insert(ip.into(), location);
        self
    }
}

impl GeoIp for StaticGeoIp {
    fn lookup(&self, ip: &str) -> Option<GeoLocation> {
        self.entries.get(ip).cloned()
    }
}

/// Great-circle distance between two locations in kilometers (haversine,
/// WGS84 mean radius).
pub fn haversine_km(a: &GeoLocation, b: &GeoLocation) -> f64 {
    const EARTH_RADIUS_KM: f64 = 6371.0;

    let lat1_rad = a.latitude.to_radians();
    let lat2_rad = b.latitude.to_radians();
    let delta_lat = (b.latitude - a.latitude).to_radians();
    let delta_lon = (b.longitude - a.longitude).to_radians();

    let h = (delta_lat / 2.0).sin().powi(2)
        + lat1_rad.cos() * lat2_rad.cos() * (delta_lon / 2.0).sin().powi(2);
    let c = 2.0 * h.sqrt().atan2((1.0 - h).sqrt());

    EARTH_RADIUS_KM * c
}

#[cfg(test)]
mod tests {
    use super::*;

    pub(crate) fn berlin() -> GeoLocation {
        GeoLocation {
            country: "DE".into(),
            city: "Berlin".into(),
            latitude: 52.52,
            longitude: 13.405,
        }
    }

    pub(crate) fn sydney() -> GeoLocation {
        GeoLocation {
            country: "AU".into(),
            city: "Sydney".into(),
            latitude: -33.8688,
            longitude: 151.2093,
        }
    }

    #[test]
    fn berlin_to_sydney_distance() {
        let km = haversine_km(&berlin(), &sydney());
        assert!((km - 16_000.0).abs() < 150.0, "got {km}");
    }

    #[test]
    fn zero_distance_to_self() {
        assert!(haversine_km(&berlin(), &berlin()) < 1e-6);
    }

    #[test]
    fn static_lookup() {
        let geo = StaticGeoIp::new().with("203.0.113.7", berlin());
        assert_eq!(geo.lookup("203.0.113.7"), Some(berlin()));
        assert_eq!(geo.lookup("198.51.100.1"), None);
    }
}
