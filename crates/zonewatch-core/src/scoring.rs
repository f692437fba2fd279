//! Zone scoring.
//!
//! Each candidate zone is scored against a fix with two overlap signals:
//!
//! - the share of the fix's Gaussian disk mass that falls inside the zone, and
//! - the share of the zone's area covered by the plain accuracy circle.
//!
//! The score is the larger of the two, clamped to `[0, 1]`. Zones with no
//! overlap under either signal are dropped rather than scored zero.

use std::cmp::Ordering;

use tracing::debug;

use crate::geometry::{
    circle_intersection_area, gaussian_disk_mass, intersect_weighted_mass, uniform_disk_area,
    DEFAULT_TOLERANCE,
};
use crate::types::{LocationFix, Zone, ZoneScore};

/// Default accuracy floor applied to unusable accuracy readings, in meters.
pub const DEFAULT_MIN_ACCURACY_M: f64 = 1.0;

/// Tunables for scoring.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoringParams {
    /// Sigma used when the fix accuracy is non-finite or non-positive.
    pub min_accuracy_meters: f64,
    /// Absolute tolerance of the overlap integral.
    pub tolerance: f64,
}

impl Default for ScoringParams {
    fn default() -> Self {
        Self {
            min_accuracy_meters: DEFAULT_MIN_ACCURACY_M,
            tolerance: DEFAULT_TOLERANCE,
        }
    }
}

/// Score one zone against a fix. Returns `None` when there is no overlap.
#[must_use]
pub fn score_zone(fix: &LocationFix, zone: &Zone, params: &ScoringParams) -> Option<ZoneScore> {
    let sigma = fix.sigma(params.min_accuracy_meters);
    let gaussian_radius = sigma;
    let total_mass = gaussian_disk_mass(gaussian_radius, sigma);

    let mass_inside = intersect_weighted_mass(
        zone.latitude,
        zone.longitude,
        zone.radius_meters,
        fix.latitude,
        fix.longitude,
        gaussian_radius,
        sigma,
        params.tolerance,
    );
    let distance = zone.distance_to(fix.latitude, fix.longitude);
    let area_inside = circle_intersection_area(distance, zone.radius_meters, gaussian_radius);

    if mass_inside <= 0.0 && area_inside <= 0.0 {
        return None;
    }

    let zone_area = uniform_disk_area(zone.radius_meters);
    let gaussian_ratio = if total_mass > 0.0 {
        mass_inside / total_mass
    } else {
        0.0
    };
    let uniform_ratio = if zone_area > 0.0 {
        area_inside / zone_area
    } else {
        0.0
    };
    let score = gaussian_ratio.max(uniform_ratio).clamp(0.0, 1.0);

    debug!(
        zone_id = %zone.id,
        distance_m = distance,
        gaussian_ratio,
        uniform_ratio,
        score,
        "Scored zone"
    );

    Some(ZoneScore {
        zone: zone.clone(),
        score,
        distance_meters: distance,
    })
}

/// Score every zone, dropping those without overlap.
#[must_use]
pub fn score_zones(fix: &LocationFix, zones: &[Zone], params: &ScoringParams) -> Vec<ZoneScore> {
    zones
        .iter()
        .filter_map(|zone| score_zone(fix, zone, params))
        .collect()
}

/// Ordering where the better candidate compares as `Less`: higher score
/// first, then the smaller `distance - radius`.
#[must_use]
pub fn rank(a: &ZoneScore, b: &ZoneScore) -> Ordering {
    b.score
        .total_cmp(&a.score)
        .then_with(|| a.boundary_gap().total_cmp(&b.boundary_gap()))
}

/// Pick the best candidate. Among exact ties the first listed zone wins.
#[must_use]
pub fn best_zone(scores: &[ZoneScore]) -> Option<&ZoneScore> {
    scores
        .iter()
        .reduce(|best, candidate| {
            if rank(candidate, best) == Ordering::Less {
                candidate
            } else {
                best
            }
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params() -> ScoringParams {
        ScoringParams::default()
    }

    #[test]
    fn test_centered_fix_scores_one() {
        let fix = LocationFix::new(31.2304, 121.4737, 30.0);
        let zone = Zone::new("zone.home", "home_zone", 31.2304, 121.4737, 100.0);
        let scored = score_zone(&fix, &zone, &params()).unwrap();
        assert!((scored.score - 1.0).abs() < 1e-12);
        assert_eq!(scored.distance_meters, 0.0);
    }

    #[test]
    fn test_far_zone_is_excluded() {
        let fix = LocationFix::new(0.0, 0.0, 30.0);
        let zone = Zone::new("zone.far", "far", 0.05, 0.0, 100.0);
        assert!(score_zone(&fix, &zone, &params()).is_none());
        assert!(score_zones(&fix, &[zone], &params()).is_empty());
    }

    #[test]
    fn test_partial_overlap_score() {
        // Zone ~28 m north with radius 40; gaussian share dominates.
        let fix = LocationFix::new(37.4220, -122.0841, 30.0);
        let zone = Zone::new("zone.a", "A", 37.4220 + 0.00025, -122.0841, 40.0);
        let scored = score_zone(&fix, &zone, &params()).unwrap();
        assert!((scored.score - 0.693_73).abs() < 1e-4);
        assert!((scored.distance_meters - 27.8).abs() < 0.1);
    }

    #[test]
    fn test_invalid_accuracy_is_clamped() {
        let zone = Zone::new("zone.a", "A", 0.0, 0.0, 20.0);
        for accuracy in [0.0, -5.0, f64::NAN, f64::INFINITY] {
            let fix = LocationFix::new(0.0, 0.0, accuracy);
            let scored = score_zone(&fix, &zone, &params()).unwrap();
            assert!((scored.score - 1.0).abs() < 1e-12);
        }
    }

    #[test]
    fn test_scores_stay_in_unit_interval() {
        let zones = [
            Zone::new("zone.a", "A", 0.0, 0.0, 0.0),
            Zone::new("zone.b", "B", 0.0002, 0.0, 5.0),
            Zone::new("zone.c", "C", -0.001, 0.0005, 150.0),
            Zone::new("zone.d", "D", 0.003, 0.0, 400.0),
        ];
        for accuracy in [0.5, 3.0, 30.0, 250.0, 900.0] {
            let fix = LocationFix::new(0.0, 0.0, accuracy);
            for scored in score_zones(&fix, &zones, &params()) {
                assert!((0.0..=1.0).contains(&scored.score), "{scored:?}");
            }
        }
    }

    #[test]
    fn test_zero_radius_zone_is_excluded() {
        let fix = LocationFix::new(0.0, 0.0, 10.0);
        let zone = Zone::new("zone.point", "point", 0.0, 0.0, 0.0);
        // Neither signal has positive overlap for a point zone.
        assert!(score_zone(&fix, &zone, &params()).is_none());
    }

    #[test]
    fn test_best_zone_prefers_higher_score() {
        let fix = LocationFix::new(0.0, 0.0, 30.0);
        let zones = [
            Zone::new("zone.a", "A", 0.0002, 0.0, 50.0),
            Zone::new("zone.b", "B", -0.0002, 0.0, 30.0),
        ];
        let scores = score_zones(&fix, &zones, &params());
        assert_eq!(scores.len(), 2);
        assert_eq!(best_zone(&scores).unwrap().zone.id, "zone.a");
    }

    #[test]
    fn test_tie_break_prefers_larger_equidistant_zone() {
        let fix = LocationFix::new(0.0, 0.0, 500.0);
        let zones = [
            Zone::new("zone.b", "B", -0.0018, 0.0, 30.0),
            Zone::new("zone.a", "A", 0.0018, 0.0, 50.0),
        ];
        let scores = score_zones(&fix, &zones, &params());
        assert!(scores.iter().all(|s| s.score == 1.0));
        assert_eq!(best_zone(&scores).unwrap().zone.name, "A");
    }

    #[test]
    fn test_best_zone_of_empty_list() {
        assert!(best_zone(&[]).is_none());
    }
}
