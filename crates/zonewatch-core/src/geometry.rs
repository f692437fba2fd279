//! Geometry and probability kernel.
//!
//! A fix is modelled as an isotropic 2-D Gaussian with standard deviation
//! `sigma` (the reported accuracy), truncated at a radius. A zone is a uniform
//! disk. Everything here is a pure function of its arguments.
//!
//! The Gaussian disk mass is the Rayleigh CDF `1 - exp(-r^2 / 2 sigma^2)`.
//! At `r = sigma` this is about 39.35%, not the 68% of the 1-D normal.
//!
//! Precondition violations (`sigma <= 0`, negative radii) panic: callers are
//! expected to clamp noisy input before reaching this module.

use std::f64::consts::PI;

/// Equatorial radius used by the local planar projection, in meters.
pub const EQUATORIAL_RADIUS_M: f64 = 6_378_137.0;

/// Mean earth radius used for great-circle distances, in meters.
pub const MEAN_EARTH_RADIUS_M: f64 = 6_371_008.8;

/// Default absolute tolerance of the adaptive quadrature.
pub const DEFAULT_TOLERANCE: f64 = 1e-9;

/// Hard recursion cap for the adaptive quadrature.
const MAX_SIMPSON_DEPTH: u32 = 32;

/// Tightest tolerance accepted by configuration. Below this the budget is
/// lost in floating-point roundoff.
pub const MIN_TOLERANCE: f64 = 1e-15;

/// Loosest tolerance accepted by configuration.
pub const MAX_TOLERANCE: f64 = 1e-3;

/// Probability mass of a Gaussian within `radius` of its own center.
///
/// # Panics
///
/// Panics if `radius < 0` or `sigma <= 0`.
#[must_use]
pub fn gaussian_disk_mass(radius: f64, sigma: f64) -> f64 {
    assert!(radius >= 0.0, "gaussian radius must be non-negative, got {radius}");
    assert!(sigma > 0.0, "sigma must be positive, got {sigma}");
    let x = radius * radius / (2.0 * sigma * sigma);
    1.0 - (-x).exp()
}

/// Area of a uniform disk, in square meters.
///
/// # Panics
///
/// Panics if `radius < 0`.
#[must_use]
pub fn uniform_disk_area(radius: f64) -> f64 {
    assert!(radius >= 0.0, "disk radius must be non-negative, got {radius}");
    PI * radius * radius
}

/// Project `(lat, lon)` into meters on a plane tangent at `(ref_lat, ref_lon)`.
///
/// Equirectangular; only valid for short distances.
#[must_use]
pub fn to_local_meters(lat: f64, lon: f64, ref_lat: f64, ref_lon: f64) -> (f64, f64) {
    let d_lat = (lat - ref_lat).to_radians();
    let d_lon = (lon - ref_lon).to_radians();
    let x = EQUATORIAL_RADIUS_M * d_lon * ref_lat.to_radians().cos();
    let y = EQUATORIAL_RADIUS_M * d_lat;
    (x, y)
}

/// Haversine distance between two WGS84 points, in meters.
#[must_use]
pub fn great_circle_distance(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let phi1 = lat1.to_radians();
    let phi2 = lat2.to_radians();
    let d_phi = phi2 - phi1;
    let d_lambda = (lon2 - lon1).to_radians();

    let a = (d_phi / 2.0).sin().powi(2) + phi1.cos() * phi2.cos() * (d_lambda / 2.0).sin().powi(2);
    2.0 * MEAN_EARTH_RADIUS_M * a.min(1.0).sqrt().asin()
}

/// A uniform disk on the local plane.
#[derive(Debug, Clone, Copy)]
struct Disk {
    x: f64,
    y: f64,
    radius: f64,
}

/// A truncated isotropic Gaussian on the local plane.
#[derive(Debug, Clone, Copy)]
struct GaussianDisk {
    x: f64,
    y: f64,
    sigma: f64,
    radius: f64,
}

/// Gaussian probability mass that falls inside a uniform zone disk.
///
/// The Gaussian is centered at `(gaussian_lat, gaussian_lon)` and truncated at
/// `gaussian_radius`; the zone disk is centered at `(zone_lat, zone_lon)`.
/// The result is a probability mass clamped to `[0, 1]`.
///
/// # Panics
///
/// Panics if either radius is negative or `sigma <= 0`.
#[allow(clippy::too_many_arguments)]
#[must_use]
pub fn intersect_weighted_mass(
    zone_lat: f64,
    zone_lon: f64,
    zone_radius: f64,
    gaussian_lat: f64,
    gaussian_lon: f64,
    gaussian_radius: f64,
    sigma: f64,
    tolerance: f64,
) -> f64 {
    assert!(zone_radius >= 0.0, "zone radius must be non-negative, got {zone_radius}");
    assert!(
        gaussian_radius >= 0.0,
        "gaussian radius must be non-negative, got {gaussian_radius}"
    );
    assert!(sigma > 0.0, "sigma must be positive, got {sigma}");

    // The Gaussian center is the projection origin.
    let (x, y) = to_local_meters(zone_lat, zone_lon, gaussian_lat, gaussian_lon);
    let zone = Disk {
        x,
        y,
        radius: zone_radius,
    };
    let gaussian = GaussianDisk {
        x: 0.0,
        y: 0.0,
        sigma,
        radius: gaussian_radius,
    };
    planar_weighted_mass(zone, gaussian, tolerance)
}

fn planar_weighted_mass(zone: Disk, gaussian: GaussianDisk, tolerance: f64) -> f64 {
    let d = (zone.x - gaussian.x).hypot(zone.y - gaussian.y);
    let inv_sigma2 = 1.0 / (gaussian.sigma * gaussian.sigma);

    if d == 0.0 {
        let cut = gaussian.radius.min(zone.radius);
        return 1.0 - (-cut * cut * 0.5 * inv_sigma2).exp();
    }

    let integrand = |r: f64| {
        let theta = arc_inside(r, d, zone.radius);
        if theta == 0.0 {
            return 0.0;
        }
        (theta / (2.0 * PI)) * inv_sigma2 * (-0.5 * r * r * inv_sigma2).exp() * r
    };

    adaptive_simpson(integrand, 0.0, gaussian.radius, tolerance).clamp(0.0, 1.0)
}

/// Angular width of the circle of radius `r` (around the Gaussian center)
/// that lies inside a disk of radius `zone_radius` whose center is `d` away.
fn arc_inside(r: f64, d: f64, zone_radius: f64) -> f64 {
    if r + d <= zone_radius {
        return 2.0 * PI;
    }
    if r >= d + zone_radius || d >= r + zone_radius {
        return 0.0;
    }
    let cos_half = ((r * r + d * d - zone_radius * zone_radius) / (2.0 * r * d)).clamp(-1.0, 1.0);
    2.0 * cos_half.acos()
}

/// Integrate `f` over `[a, b]` with adaptive Simpson quadrature.
pub fn adaptive_simpson<F>(f: F, a: f64, b: f64, tolerance: f64) -> f64
where
    F: Fn(f64) -> f64,
{
    let fa = f(a);
    let fb = f(b);
    let fm = f(0.5 * (a + b));
    let whole = simpson(a, b, fa, fb, fm);
    refine(&f, Panel { a, b, fa, fb, fm, whole }, tolerance, 0)
}

/// One Simpson panel with its cached samples.
#[derive(Debug, Clone, Copy)]
struct Panel {
    a: f64,
    b: f64,
    fa: f64,
    fb: f64,
    fm: f64,
    whole: f64,
}

fn refine<F>(f: &F, p: Panel, tolerance: f64, depth: u32) -> f64
where
    F: Fn(f64) -> f64,
{
    let m = 0.5 * (p.a + p.b);
    let flm = f(0.5 * (p.a + m));
    let frm = f(0.5 * (m + p.b));
    let left = simpson(p.a, m, p.fa, p.fm, flm);
    let right = simpson(m, p.b, p.fm, p.fb, frm);
    let delta = left + right - p.whole;

    // Never ask for more than the panel sum can represent.
    let budget = tolerance.max(f64::EPSILON * (left.abs() + right.abs()));
    if delta.abs() <= 15.0 * budget || depth >= MAX_SIMPSON_DEPTH {
        return left + right + delta / 15.0;
    }

    let half = tolerance / 2.0;
    refine(
        f,
        Panel {
            a: p.a,
            b: m,
            fa: p.fa,
            fb: p.fm,
            fm: flm,
            whole: left,
        },
        half,
        depth + 1,
    ) + refine(
        f,
        Panel {
            a: m,
            b: p.b,
            fa: p.fm,
            fb: p.fb,
            fm: frm,
            whole: right,
        },
        half,
        depth + 1,
    )
}

fn simpson(a: f64, b: f64, fa: f64, fb: f64, fm: f64) -> f64 {
    (b - a) * (fa + 4.0 * fm + fb) / 6.0
}

/// Closed-form area of intersection of two plain circles, in square meters.
///
/// The result is symmetric in the two radii and lies in `[0, π·min(r)²]`.
#[must_use]
pub fn circle_intersection_area(distance: f64, radius_a: f64, radius_b: f64) -> f64 {
    if distance >= radius_a + radius_b {
        return 0.0;
    }

    let small = radius_a.min(radius_b);
    let large = radius_a.max(radius_b);
    let small_disk = PI * small * small;
    if distance + small <= large {
        return small_disk;
    }

    let d2 = distance * distance;
    let s2 = small * small;
    let l2 = large * large;

    let cos_small = ((d2 + s2 - l2) / (2.0 * distance * small)).clamp(-1.0, 1.0);
    let cos_large = ((d2 + l2 - s2) / (2.0 * distance * large)).clamp(-1.0, 1.0);
    let kite = (-distance + small + large)
        * (distance + small - large)
        * (distance - small + large)
        * (distance + small + large);

    // Cancellation near internal tangency can leave the disk bounds.
    (s2 * cos_small.acos() + l2 * cos_large.acos() - 0.5 * kite.max(0.0).sqrt())
        .clamp(0.0, small_disk)
}
