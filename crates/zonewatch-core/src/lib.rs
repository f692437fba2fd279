//! # zonewatch-core
//!
//! Core logic for the zonewatch geofencing system.
//!
//! This crate provides:
//! - Probabilistic zone scoring for noisy location fixes
//! - Zone resolution with hysteresis and an accuracy gate
//! - Wi-Fi leave protection and fast entry
//! - Fix tracking with an adaptive poll schedule
//! - Configuration management
//!
//! ## Architecture
//!
//! The crate is organized into the following modules:
//!
//! - [`geometry`] - Disk areas, Gaussian disk mass, overlap integrals
//! - [`scoring`] - Per-zone scores and tie-break ordering
//! - [`resolver`] - Reported location name from scores and the last report
//! - [`leave_protection`] - Wi-Fi anchored rules that suppress zone exits
//! - [`tracker`] - Last two fixes, speed inference, poll cadence
//! - [`cycle`] - A full fix-to-report step for every tracked user
//! - [`zones`] - Zone sources with last-good caching
//! - [`clock`] - Monotonic clocks
//! - [`config`] - Application configuration loading, saving, and validation
//! - [`error`] - Unified error types for the crate
//! - [`types`] - Shared value types and OpenAPI schemas

#![forbid(unsafe_code)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![warn(missing_docs)]

pub mod clock;
pub mod config;
pub mod cycle;
pub mod error;
pub mod geometry;
pub mod leave_protection;
pub mod resolver;
pub mod scoring;
pub mod tracker;
pub mod types;
pub mod zones;

// Re-export primary types for convenience
pub use crate::clock::{ManualClock, MonotonicClock, SystemClock};
pub use crate::config::{
    ConfigError, ResolverConfig, SchedulerConfig, ServerConfig, UserConfig, ZonewatchConfig,
};
pub use crate::cycle::{CycleReport, LocationCycle, SessionReport, UserSession};
pub use crate::error::{Result, ZonewatchError};
pub use crate::geometry::{
    adaptive_simpson, circle_intersection_area, gaussian_disk_mass, great_circle_distance,
    intersect_weighted_mass, uniform_disk_area,
};
pub use crate::leave_protection::{
    is_sticky, GeofenceFunctions, LeaveProtectionConfig, LeaveProtectionRule, WifiAnchors,
};
pub use crate::resolver::{resolve_location_name, zone_id_for_name, Resolver};
pub use crate::scoring::{best_zone, score_zone, score_zones, ScoringParams};
pub use crate::tracker::{FixTracker, Observation, Schedule, Scheduler, TrackedFix};
pub use crate::types::{
    LocationFix, WifiSighting, Zone, ZoneScore, HOME, HOME_ZONE_ID, NOT_HOME, UNKNOWN,
};
pub use crate::zones::{
    CachedZoneSource, StaticZoneSource, ZoneCache, ZoneSource, ZoneSourceError,
};
