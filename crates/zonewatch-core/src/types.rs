//! Shared value types.
//!
//! Fixes, zones and Wi-Fi sightings are plain immutable values handed in by
//! the caller. The core never owns the zone list; it is supplied fresh on
//! every resolution call.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::geometry::great_circle_distance;

/// Location name reported while inside the home zone.
pub const HOME: &str = "home";

/// Location name reported when no zone matches.
pub const NOT_HOME: &str = "not_home";

/// Location name reported before anything is known.
pub const UNKNOWN: &str = "unknown";

/// Entity id of the home zone on the backend.
pub const HOME_ZONE_ID: &str = "zone.home";

/// A single location observation.
///
/// `accuracy_meters` is the 1-sigma radius reported by the provider. It may be
/// zero or NaN when the provider has no estimate; scoring clamps it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocationFix {
    /// Latitude in degrees (WGS84).
    pub latitude: f64,

    /// Longitude in degrees (WGS84).
    pub longitude: f64,

    /// Horizontal accuracy radius in meters.
    pub accuracy_meters: f64,

    /// Ground speed, if the provider measured one.
    #[serde(default)]
    pub speed_mps: Option<f64>,

    /// Accuracy of `speed_mps`, if known.
    #[serde(default)]
    pub speed_accuracy_mps: Option<f64>,

    /// Bearing in degrees, if known.
    #[serde(default)]
    pub bearing_degrees: Option<f64>,

    /// Monotonic instant the fix was taken, on the tracker's clock.
    #[serde(default)]
    pub captured_at: Duration,
}

impl LocationFix {
    /// Create a fix with no speed or bearing reading.
    #[must_use]
    pub const fn new(latitude: f64, longitude: f64, accuracy_meters: f64) -> Self {
        Self {
            latitude,
            longitude,
            accuracy_meters,
            speed_mps: None,
            speed_accuracy_mps: None,
            bearing_degrees: None,
            captured_at: Duration::ZERO,
        }
    }

    /// Attach a measured speed.
    #[must_use]
    pub fn with_speed(mut self, speed_mps: f64) -> Self {
        self.speed_mps = Some(speed_mps);
        self
    }

    /// Attach a bearing.
    #[must_use]
    pub fn with_bearing(mut self, bearing_degrees: f64) -> Self {
        self.bearing_degrees = Some(bearing_degrees);
        self
    }

    /// Attach the monotonic capture instant.
    #[must_use]
    pub fn with_captured_at(mut self, captured_at: Duration) -> Self {
        self.captured_at = captured_at;
        self
    }

    /// Accuracy usable as a Gaussian sigma: non-finite or non-positive values
    /// fall back to `floor`.
    #[must_use]
    pub fn sigma(&self, floor: f64) -> f64 {
        if self.accuracy_meters.is_finite() && self.accuracy_meters > 0.0 {
            self.accuracy_meters
        } else {
            floor
        }
    }

    /// Whether the provider supplied a usable (non-zero) speed.
    #[must_use]
    pub fn has_speed(&self) -> bool {
        self.speed_mps.is_some_and(|s| s != 0.0)
    }

    /// Great-circle distance to another fix, in meters.
    #[must_use]
    pub fn distance_to(&self, other: &Self) -> f64 {
        great_circle_distance(self.latitude, self.longitude, other.latitude, other.longitude)
    }
}

/// A named circular geofence as published by the backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[schema(example = json!({
    "id": "zone.home",
    "name": "Home",
    "latitude": 52.3731,
    "longitude": 4.8922,
    "radius_meters": 100.0
}))]
pub struct Zone {
    /// Backend entity id, e.g. `zone.home`.
    pub id: String,

    /// Friendly name reported for this zone.
    pub name: String,

    /// Center latitude in degrees.
    pub latitude: f64,

    /// Center longitude in degrees.
    pub longitude: f64,

    /// Radius in meters.
    pub radius_meters: f64,
}

impl Zone {
    /// Create a zone.
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        latitude: f64,
        longitude: f64,
        radius_meters: f64,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            latitude,
            longitude,
            radius_meters,
        }
    }

    /// Whether this is the backend's home zone.
    #[must_use]
    pub fn is_home(&self) -> bool {
        self.id == HOME_ZONE_ID
    }

    /// Name under which this zone is reported (`home` for the home zone).
    #[must_use]
    pub fn reported_name(&self) -> &str {
        if self.is_home() {
            HOME
        } else {
            &self.name
        }
    }

    /// Whether `name` is how this zone gets reported.
    #[must_use]
    pub fn matches_name(&self, name: &str) -> bool {
        self.name == name || (self.is_home() && name == HOME)
    }

    /// Distance in meters from the zone center to a point.
    #[must_use]
    pub fn distance_to(&self, latitude: f64, longitude: f64) -> f64 {
        great_circle_distance(self.latitude, self.longitude, latitude, longitude)
    }
}

/// A zone that survived scoring against one fix.
#[derive(Debug, Clone, PartialEq)]
pub struct ZoneScore {
    /// The scored zone.
    pub zone: Zone,

    /// Overlap score in `[0, 1]`.
    pub score: f64,

    /// Distance from the zone center to the fix, in meters.
    pub distance_meters: f64,
}

impl ZoneScore {
    /// How far the fix sits outside the zone boundary (negative when inside).
    #[must_use]
    pub fn boundary_gap(&self) -> f64 {
        self.distance_meters - self.zone.radius_meters
    }
}

/// One access point seen in a Wi-Fi scan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct WifiSighting {
    /// Network SSID as reported by the platform (may be quoted).
    pub ssid: String,

    /// Access point BSSID.
    pub bssid: String,

    /// Signal level in dBm.
    #[serde(default)]
    pub signal_dbm: Option<i32>,
}

impl WifiSighting {
    /// Create a sighting without signal information.
    pub fn new(ssid: impl Into<String>, bssid: impl Into<String>) -> Self {
        Self {
            ssid: ssid.into(),
            bssid: bssid.into(),
            signal_dbm: None,
        }
    }

    /// SSID with the platform's surrounding quotes removed.
    #[must_use]
    pub fn normalized_ssid(&self) -> &str {
        self.ssid
            .strip_prefix('"')
            .and_then(|s| s.strip_suffix('"'))
            .unwrap_or(&self.ssid)
    }
}
