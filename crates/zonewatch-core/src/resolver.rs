//! Resolution policy: scored zones plus the previously reported name become
//! the next reported name.
//!
//! Staying in the same zone is always allowed. Any transition to a
//! different name requires a fix at least as accurate as the entry gate;
//! otherwise the device is reported as `not_home`. This keeps weak fixes from
//! convincing the system that the user entered somewhere new.

use tracing::{debug, info};

use crate::scoring::{best_zone, score_zones, ScoringParams};
use crate::types::{LocationFix, Zone, NOT_HOME};

/// Default accuracy above which zone transitions are refused, in meters.
pub const DEFAULT_ENTRY_ACCURACY_GATE_M: f64 = 200.0;

/// Turns fixes into reported location names.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Resolver {
    scoring: ScoringParams,
    entry_accuracy_gate_meters: f64,
}

impl Default for Resolver {
    fn default() -> Self {
        Self::new(ScoringParams::default(), DEFAULT_ENTRY_ACCURACY_GATE_M)
    }
}

impl Resolver {
    /// Create a resolver with explicit tunables.
    #[must_use]
    pub const fn new(scoring: ScoringParams, entry_accuracy_gate_meters: f64) -> Self {
        Self {
            scoring,
            entry_accuracy_gate_meters,
        }
    }

    /// Scoring tunables in use.
    #[must_use]
    pub const fn scoring(&self) -> &ScoringParams {
        &self.scoring
    }

    /// Name of the best-scoring zone with no hysteresis applied.
    #[must_use]
    pub fn nearest_name(&self, fix: &LocationFix, zones: &[Zone]) -> String {
        let scores = score_zones(fix, zones, &self.scoring);
        best_zone(&scores).map_or_else(
            || NOT_HOME.to_string(),
            |best| best.zone.reported_name().to_string(),
        )
    }

    /// Resolve the name to report for `fix`, given what was reported last.
    #[must_use]
    pub fn resolve(&self, previous: Option<&str>, fix: &LocationFix, zones: &[Zone]) -> String {
        let nearest = self.nearest_name(fix, zones);

        let Some(previous) = previous else {
            debug!(resolved = %nearest, "First observation");
            return nearest;
        };
        if nearest == previous {
            return nearest;
        }

        if fix.accuracy_meters > self.entry_accuracy_gate_meters {
            info!(
                previous,
                nearest = %nearest,
                accuracy_m = fix.accuracy_meters,
                "Fix too coarse for a zone change, reporting not_home"
            );
            return NOT_HOME.to_string();
        }

        info!(previous, resolved = %nearest, "Zone transition");
        nearest
    }
}

/// Resolve with default tunables.
#[must_use]
pub fn resolve_location_name(previous: Option<&str>, fix: &LocationFix, zones: &[Zone]) -> String {
    Resolver::default().resolve(previous, fix, zones)
}

/// Map a reported name back to its zone id.
#[must_use]
pub fn zone_id_for_name<'a>(name: &str, zones: &'a [Zone]) -> Option<&'a str> {
    zones
        .iter()
        .find(|zone| zone.matches_name(name))
        .map(|zone| zone.id.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::HOME;

    #[test]
    fn test_not_home_when_no_zones() {
        let fix = LocationFix::new(0.0, 0.0, 50.0);
        assert_eq!(resolve_location_name(None, &fix, &[]), "not_home");
    }

    #[test]
    fn test_home_when_inside_home_zone() {
        let fix = LocationFix::new(31.2304, 121.4737, 30.0);
        let home = Zone::new("zone.home", "home_zone", 31.2304, 121.4737, 100.0);
        assert_eq!(resolve_location_name(None, &fix, &[home]), HOME);
    }

    #[test]
    fn test_stays_in_same_zone_regardless_of_accuracy() {
        let fix = LocationFix::new(48.8566, 2.3522, 100.0);
        let work = Zone::new("zone.work", "work", 48.8566, 2.3522, 150.0);
        assert_eq!(resolve_location_name(Some("work"), &fix, &[work.clone()]), "work");

        let coarse = LocationFix::new(48.8566, 2.3522, 450.0);
        assert_eq!(resolve_location_name(Some("work"), &coarse, &[work]), "work");
    }

    #[test]
    fn test_coarse_fix_blocks_zone_change() {
        let fix = LocationFix::new(34.0522, -118.2437, 300.0);
        let park = Zone::new("zone.park", "park", 34.0522, -118.2437, 200.0);
        assert_eq!(resolve_location_name(Some("home"), &fix, &[park.clone()]), "not_home");

        // The same fix is accepted on first observation.
        assert_eq!(resolve_location_name(None, &fix, &[park]), "park");
    }

    #[test]
    fn test_accuracy_exactly_at_gate_is_allowed() {
        let fix = LocationFix::new(34.0522, -118.2437, 200.0);
        let park = Zone::new("zone.park", "park", 34.0522, -118.2437, 200.0);
        assert_eq!(resolve_location_name(Some("home"), &fix, &[park]), "park");
    }

    #[test]
    fn test_exit_with_good_accuracy_is_allowed() {
        let fix = LocationFix::new(10.0, 10.0, 15.0);
        let far = Zone::new("zone.home", "Home", 10.1, 10.0, 100.0);
        assert_eq!(resolve_location_name(Some("home"), &fix, &[far]), "not_home");
    }

    #[test]
    fn test_centered_zone_beats_offset_smaller_zone() {
        let fix = LocationFix::new(37.4220, -122.0841, 30.0);
        let zones = [
            Zone::new("zone.a", "A", 37.4220 + 0.00025, -122.0841, 40.0),
            Zone::new("zone.b", "B", 37.4220, -122.0841, 80.0),
        ];
        assert_eq!(resolve_location_name(Some("A"), &fix, &zones), "B");
        assert_eq!(resolve_location_name(None, &fix, &zones), "B");
        assert_eq!(resolve_location_name(Some("home"), &fix, &zones), "B");
    }

    #[test]
    fn test_prefers_larger_zone_when_equidistant() {
        let fix = LocationFix::new(0.0, 0.0, 500.0);
        let zones = [
            Zone::new("zone.a", "A", 0.0018, 0.0, 50.0),
            Zone::new("zone.b", "B", -0.0018, 0.0, 30.0),
        ];
        assert_eq!(resolve_location_name(None, &fix, &zones), "A");
    }

    #[test]
    fn test_prefers_closer_zone_when_both_contained() {
        let fix = LocationFix::new(0.0, 0.0, 500.0);
        let near_large = [
            Zone::new("zone.small_far", "small_far", 0.0035, 0.0, 20.0),
            Zone::new("zone.large_near", "large_near", -0.0009, 0.0, 50.0),
        ];
        assert_eq!(resolve_location_name(None, &fix, &near_large), "large_near");

        let near_small = [
            Zone::new("zone.small_near", "small_near", -0.0009, 0.0, 20.0),
            Zone::new("zone.large_far", "large_far", 0.0035, 0.0, 50.0),
        ];
        assert_eq!(resolve_location_name(None, &fix, &near_small), "small_near");
    }

    #[test]
    fn test_resolution_is_a_fixed_point() {
        let zones = [
            Zone::new("zone.home", "Home", 0.0, 0.0, 80.0),
            Zone::new("zone.gym", "gym", 0.0012, 0.0, 60.0),
        ];
        for (lat, accuracy) in [(0.0, 20.0), (0.0011, 35.0), (0.004, 60.0), (0.0006, 350.0)] {
            let fix = LocationFix::new(lat, 0.0, accuracy);
            let first = resolve_location_name(None, &fix, &zones);
            let again = resolve_location_name(Some(&first), &fix, &zones);
            assert_eq!(first, again);
        }
    }

    #[test]
    fn test_custom_gate() {
        let resolver = Resolver::new(ScoringParams::default(), 50.0);
        let fix = LocationFix::new(0.0, 0.0, 80.0);
        let zone = Zone::new("zone.shop", "shop", 0.0, 0.0, 100.0);
        assert_eq!(resolver.resolve(Some("home"), &fix, &[zone]), "not_home");
    }

    #[test]
    fn test_zone_id_for_name() {
        let zones = [
            Zone::new("zone.home", "Casa", 0.0, 0.0, 80.0),
            Zone::new("zone.gym", "gym", 0.0012, 0.0, 60.0),
        ];
        assert_eq!(zone_id_for_name("home", &zones), Some("zone.home"));
        assert_eq!(zone_id_for_name("gym", &zones), Some("zone.gym"));
        assert_eq!(zone_id_for_name("not_home", &zones), None);
    }
}

#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    fn zones_strategy(lat: f64, lon: f64) -> impl Strategy<Value = Vec<Zone>> {
        prop::collection::vec(
            (-0.01f64..=0.01, -0.01f64..=0.01, 0.0f64..=2_000.0),
            0..5,
        )
        .prop_map(move |offsets| {
            offsets
                .into_iter()
                .enumerate()
                .map(|(i, (d_lat, d_lon, radius))| {
                    let id = if i == 0 {
                        crate::types::HOME_ZONE_ID.to_string()
                    } else {
                        format!("zone.place_{i}")
                    };
                    Zone::new(id, format!("place_{i}"), lat + d_lat, lon + d_lon, radius)
                })
                .collect()
        })
    }

    fn scenario_strategy() -> impl Strategy<Value = (LocationFix, Vec<Zone>, Option<String>)> {
        (-60.0f64..=60.0, -179.0f64..=179.0)
            .prop_flat_map(|(lat, lon)| {
                (
                    Just(LocationFix::new(lat, lon, 0.0)),
                    prop_oneof![
                        Just(0.0),
                        Just(f64::NAN),
                        1.0f64..=150.0,
                        150.0f64..=400.0,
                        1e4f64..=1e7,
                    ],
                    zones_strategy(lat, lon),
                    prop::option::of(prop_oneof![
                        Just(NOT_HOME.to_string()),
                        Just(crate::types::HOME.to_string()),
                        Just("place_1".to_string()),
                        Just("place_9".to_string()),
                    ]),
                )
            })
            .prop_map(|(fix, accuracy, zones, previous)| {
                let fix = LocationFix::new(fix.latitude, fix.longitude, accuracy);
                (fix, zones, previous)
            })
    }

    proptest! {
        /// Feeding a resolved name back in with the same fix reproduces it.
        #[test]
        fn prop_resolution_is_a_fixed_point((fix, zones, previous) in scenario_strategy()) {
            let resolver = Resolver::default();
            let first = resolver.resolve(previous.as_deref(), &fix, &zones);
            let second = resolver.resolve(Some(&first), &fix, &zones);
            prop_assert_eq!(first, second);
        }

        /// A resolved name is `not_home` or one the zones report.
        #[test]
        fn prop_resolution_names_a_known_place((fix, zones, previous) in scenario_strategy()) {
            let name = resolve_location_name(previous.as_deref(), &fix, &zones);
            prop_assert!(
                name == NOT_HOME || zones.iter().any(|zone| zone.reported_name() == name),
                "unexpected name {name}"
            );
        }
    }
}
