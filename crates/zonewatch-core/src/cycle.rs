//! One location cycle: fix in, per-user reported names and next poll out.
//!
//! A planned cycle runs the whole tracker step under one lock, so the change
//! check, the slot update and the schedule all see the same state.

use std::time::Duration;

use serde::Serialize;
use tracing::{debug, info};
use utoipa::ToSchema;

use crate::clock::MonotonicClock;
use crate::config::UserConfig;
use crate::leave_protection::LeaveProtectionConfig;
use crate::resolver::{zone_id_for_name, Resolver};
use crate::tracker::{FixTracker, Observation, Schedule};
use crate::types::{LocationFix, WifiSighting, Zone};

/// What one user was last reported as.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct UserSession {
    /// Backend user id.
    pub user_id: String,
    /// Display name.
    pub user_name: String,
    /// Zone id last reported, if the name maps to a zone.
    pub location_id: Option<String>,
    /// Name last reported.
    pub location_name: Option<String>,
}

impl UserSession {
    /// Session with nothing reported yet.
    pub fn new(user_id: impl Into<String>, user_name: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            user_name: user_name.into(),
            location_id: None,
            location_name: None,
        }
    }

    fn report(&mut self, name: &str, zones: &[Zone]) {
        self.location_id = zone_id_for_name(name, zones).map(str::to_string);
        self.location_name = Some(name.to_string());
    }
}

impl From<&UserConfig> for UserSession {
    fn from(user: &UserConfig) -> Self {
        Self::new(&user.user_id, &user.user_name)
    }
}

/// Outcome for one user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct SessionReport {
    /// Backend user id.
    pub user_id: String,
    /// Name reported before this cycle.
    pub previous: Option<String>,
    /// Name the resolution policy chose.
    pub resolved: String,
    /// Name actually reported.
    pub reported: String,
    /// Whether leave protection kept the previous name.
    pub held: bool,
}

/// Outcome of a planned cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CycleReport {
    /// Whether the fix was accepted or counted as unchanged.
    pub observation: Observation,
    /// Per-user outcomes; empty when the fix was ignored.
    pub sessions: Vec<SessionReport>,
    /// Cadence after this cycle.
    pub schedule: Schedule,
}

/// Drives resolution, leave protection and the tracker for a set of users.
#[derive(Debug)]
pub struct LocationCycle<'a, C> {
    tracker: &'a FixTracker<C>,
    resolver: Resolver,
    leave_protection: &'a LeaveProtectionConfig,
}

impl<'a, C: MonotonicClock> LocationCycle<'a, C> {
    /// Cycle over `tracker` with the given policy.
    pub const fn new(
        tracker: &'a FixTracker<C>,
        resolver: Resolver,
        leave_protection: &'a LeaveProtectionConfig,
    ) -> Self {
        Self {
            tracker,
            resolver,
            leave_protection,
        }
    }

    /// Scheduled poll. Sessions are only updated if the fix is accepted.
    pub fn planned<F>(
        &self,
        fix: LocationFix,
        sessions: &mut [UserSession],
        mut zones_for: F,
        wifi: &[WifiSighting],
    ) -> CycleReport
    where
        F: FnMut(&UserSession) -> Vec<Zone>,
    {
        let mut tracker = self.tracker.lock();

        if !tracker.has_location_change(&fix) && tracker.previous().is_some() {
            tracker.ignore_location();
            let ignore_count = tracker.current().map_or(0, |c| c.ignore_count);
            debug!(ignore_count, "Location unchanged, skipping report");
            return CycleReport {
                observation: Observation::Ignored { ignore_count },
                sessions: Vec::new(),
                schedule: tracker.schedule(),
            };
        }

        let accepted = tracker.update_location(fix);
        let reports = sessions
            .iter_mut()
            .map(|session| {
                let zones = zones_for(session);
                self.resolve_session(session, &accepted.fix, &zones, wifi)
            })
            .collect();

        CycleReport {
            observation: Observation::Accepted,
            sessions: reports,
            schedule: tracker.schedule(),
        }
    }

    /// User-requested poll. Resolves and reports without touching cadence.
    pub fn manual<F>(
        &self,
        fix: &LocationFix,
        sessions: &mut [UserSession],
        mut zones_for: F,
        wifi: &[WifiSighting],
    ) -> Vec<SessionReport>
    where
        F: FnMut(&UserSession) -> Vec<Zone>,
    {
        sessions
            .iter_mut()
            .map(|session| {
                let zones = zones_for(session);
                self.resolve_session(session, fix, &zones, wifi)
            })
            .collect()
    }

    /// Wi-Fi scan hook: move users straight into a zone whose anchor network
    /// is visible. The zone center becomes the tracker's current fix.
    pub fn fast_enter<F>(
        &self,
        sessions: &mut [UserSession],
        mut zones_for: F,
        scan: &[WifiSighting],
    ) -> Vec<SessionReport>
    where
        F: FnMut(&UserSession) -> Vec<Zone>,
    {
        let mut reports = Vec::new();

        for session in sessions.iter_mut() {
            let Some(rule) = self.leave_protection.fast_enter_rule(
                &session.user_id,
                session.location_id.as_deref(),
                scan,
            ) else {
                continue;
            };
            let zones = zones_for(session);
            let Some(zone) = zones.iter().find(|zone| zone.id == rule.zone_id) else {
                debug!(zone_id = %rule.zone_id, "Fast-enter zone not on backend");
                continue;
            };

            let fix = LocationFix::new(zone.latitude, zone.longitude, zone.radius_meters)
                .with_captured_at(self.tracker.now());
            self.tracker.update_location(fix);

            let previous = session.location_name.clone();
            let name = zone.reported_name().to_string();
            session.location_id = Some(zone.id.clone());
            session.location_name = Some(name.clone());
            info!(user_id = %session.user_id, zone_id = %zone.id, "Fast-entered zone");

            reports.push(SessionReport {
                user_id: session.user_id.clone(),
                previous,
                resolved: name.clone(),
                reported: name,
                held: false,
            });
        }

        reports
    }

    /// Instant to retry at after reporting failed.
    pub fn retry_instant(&self) -> Duration {
        self.tracker.retry_instant()
    }

    fn resolve_session(
        &self,
        session: &mut UserSession,
        fix: &LocationFix,
        zones: &[Zone],
        wifi: &[WifiSighting],
    ) -> SessionReport {
        let previous = session.location_name.clone();
        let resolved = self.resolver.resolve(previous.as_deref(), fix, zones);
        let held = self.leave_protection.is_sticky(
            previous.as_deref(),
            &resolved,
            &session.user_id,
            zones,
            wifi,
        );

        let reported = match (&previous, held) {
            (Some(previous), true) => {
                info!(
                    user_id = %session.user_id,
                    previous = %previous,
                    resolved = %resolved,
                    "Leave protection held zone"
                );
                previous.clone()
            }
            _ => {
                session.report(&resolved, zones);
                resolved.clone()
            }
        };

        SessionReport {
            user_id: session.user_id.clone(),
            previous,
            resolved,
            reported,
            held,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::leave_protection::LeaveProtectionRule;
    use crate::tracker::Scheduler;

    fn zones() -> Vec<Zone> {
        vec![
            Zone::new("zone.home", "Casa", 0.0, 0.0, 80.0),
            Zone::new("zone.office", "office", 0.01, 0.0, 120.0),
        ]
    }

    fn protection() -> LeaveProtectionConfig {
        LeaveProtectionConfig {
            enabled: true,
            rules: vec![LeaveProtectionRule::new("home wifi", "zone.home").with_ssid("HomeNet")],
        }
    }

    fn tracker() -> (FixTracker<ManualClock>, ManualClock) {
        let clock = ManualClock::new();
        (
            FixTracker::with_clock(clock.clone(), Scheduler::default()),
            clock,
        )
    }

    #[test]
    fn test_planned_cycle_reports_every_session() {
        let (tracker, _) = tracker();
        let protection = protection();
        let cycle = LocationCycle::new(&tracker, Resolver::default(), &protection);
        let mut sessions = vec![UserSession::new("u1", "Alex"), UserSession::new("u2", "Sam")];

        let report = cycle.planned(
            LocationFix::new(0.0, 0.0, 20.0),
            &mut sessions,
            |_| zones(),
            &[],
        );

        assert_eq!(report.observation, Observation::Accepted);
        assert_eq!(report.sessions.len(), 2);
        assert!(report.sessions.iter().all(|s| s.reported == "home"));
        assert_eq!(sessions[0].location_id.as_deref(), Some("zone.home"));
        assert_eq!(sessions[1].location_name.as_deref(), Some("home"));
        assert_eq!(report.schedule.interval_minutes, 2);
    }

    #[test]
    fn test_unchanged_fix_is_ignored_once_warm() {
        let (tracker, clock) = tracker();
        let protection = protection();
        let cycle = LocationCycle::new(&tracker, Resolver::default(), &protection);
        let mut sessions = vec![UserSession::new("u1", "Alex")];
        let fix = LocationFix::new(0.0, 0.0, 20.0);

        cycle.planned(fix.clone(), &mut sessions, |_| zones(), &[]);
        clock.advance(Duration::from_secs(120));
        let second = cycle.planned(fix.clone(), &mut sessions, |_| zones(), &[]);
        assert_eq!(second.observation, Observation::Accepted);

        clock.advance(Duration::from_secs(300));
        let third = cycle.planned(fix, &mut sessions, |_| zones(), &[]);
        assert_eq!(third.observation, Observation::Ignored { ignore_count: 1 });
        assert!(third.sessions.is_empty());
        assert_eq!(third.schedule.interval_minutes, 10);
    }

    #[test]
    fn test_leave_protection_holds_previous_name() {
        let (tracker, _) = tracker();
        let protection = protection();
        let cycle = LocationCycle::new(&tracker, Resolver::default(), &protection);
        let mut sessions = vec![UserSession::new("u1", "Alex")];

        cycle.planned(LocationFix::new(0.0, 0.0, 20.0), &mut sessions, |_| zones(), &[]);

        let scan = [WifiSighting::new("\"HomeNet\"", "00:11:22:33:44:55")];
        let report = cycle.planned(
            LocationFix::new(0.004, 0.0, 15.0),
            &mut sessions,
            |_| zones(),
            &scan,
        );

        let outcome = &report.sessions[0];
        assert_eq!(outcome.previous.as_deref(), Some("home"));
        assert_eq!(outcome.resolved, "not_home");
        assert_eq!(outcome.reported, "home");
        assert!(outcome.held);
        assert_eq!(sessions[0].location_name.as_deref(), Some("home"));
    }

    #[test]
    fn test_leaving_without_anchor_network() {
        let (tracker, _) = tracker();
        let protection = protection();
        let cycle = LocationCycle::new(&tracker, Resolver::default(), &protection);
        let mut sessions = vec![UserSession::new("u1", "Alex")];

        cycle.planned(LocationFix::new(0.0, 0.0, 20.0), &mut sessions, |_| zones(), &[]);
        let report = cycle.planned(
            LocationFix::new(0.01, 0.0, 15.0),
            &mut sessions,
            |_| zones(),
            &[],
        );

        assert_eq!(report.sessions[0].reported, "office");
        assert!(!report.sessions[0].held);
        assert_eq!(sessions[0].location_id.as_deref(), Some("zone.office"));
    }

    #[test]
    fn test_not_home_clears_location_id() {
        let (tracker, _) = tracker();
        let protection = LeaveProtectionConfig::default();
        let cycle = LocationCycle::new(&tracker, Resolver::default(), &protection);
        let mut sessions = vec![UserSession::new("u1", "Alex")];

        cycle.planned(LocationFix::new(0.0, 0.0, 20.0), &mut sessions, |_| zones(), &[]);
        cycle.planned(LocationFix::new(0.5, 0.0, 20.0), &mut sessions, |_| zones(), &[]);

        assert_eq!(sessions[0].location_name.as_deref(), Some("not_home"));
        assert_eq!(sessions[0].location_id, None);
    }

    #[test]
    fn test_per_user_zone_lists() {
        let (tracker, _) = tracker();
        let protection = protection();
        let cycle = LocationCycle::new(&tracker, Resolver::default(), &protection);
        let mut sessions = vec![UserSession::new("u1", "Alex"), UserSession::new("u2", "Sam")];

        let report = cycle.planned(
            LocationFix::new(0.0, 0.0, 20.0),
            &mut sessions,
            |session| {
                if session.user_id == "u1" {
                    zones()
                } else {
                    Vec::new()
                }
            },
            &[],
        );

        assert_eq!(report.sessions[0].reported, "home");
        assert_eq!(report.sessions[1].reported, "not_home");
    }

    #[test]
    fn test_manual_cycle_leaves_tracker_alone() {
        let (tracker, _) = tracker();
        let protection = protection();
        let cycle = LocationCycle::new(&tracker, Resolver::default(), &protection);
        let mut sessions = vec![UserSession::new("u1", "Alex")];

        let reports = cycle.manual(
            &LocationFix::new(0.01, 0.0, 20.0),
            &mut sessions,
            |_| zones(),
            &[],
        );

        assert_eq!(reports[0].reported, "office");
        assert!(tracker.current().is_none());
    }

    #[test]
    fn test_fast_enter_moves_user_into_zone() {
        let (tracker, clock) = tracker();
        let protection = protection();
        let cycle = LocationCycle::new(&tracker, Resolver::default(), &protection);
        let mut sessions = vec![UserSession::new("u1", "Alex")];
        let scan = [WifiSighting::new("HomeNet", "00:11:22:33:44:55")];
        clock.advance(Duration::from_secs(42));

        let reports = cycle.fast_enter(&mut sessions, |_| zones(), &scan);
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].reported, "home");
        assert_eq!(sessions[0].location_id.as_deref(), Some("zone.home"));
        let current = tracker.current().unwrap();
        assert_eq!(current.fix.accuracy_meters, 80.0);
        assert_eq!(current.fix.captured_at, Duration::from_secs(42));

        // Already home: nothing to do.
        assert!(cycle.fast_enter(&mut sessions, |_| zones(), &scan).is_empty());
    }

    #[test]
    fn test_fast_enter_needs_zone_on_backend() {
        let (tracker, _) = tracker();
        let protection = protection();
        let cycle = LocationCycle::new(&tracker, Resolver::default(), &protection);
        let mut sessions = vec![UserSession::new("u1", "Alex")];
        let scan = [WifiSighting::new("HomeNet", "x")];

        assert!(cycle.fast_enter(&mut sessions, |_| Vec::new(), &scan).is_empty());
        assert!(sessions[0].location_name.is_none());
    }

    #[test]
    fn test_session_from_user_config() {
        let session = UserSession::from(&UserConfig::new("u9", "Kim"));
        assert_eq!(session.user_id, "u9");
        assert!(session.location_name.is_none());
    }

    #[test]
    fn test_retry_instant() {
        let (tracker, clock) = tracker();
        let protection = protection();
        let cycle = LocationCycle::new(&tracker, Resolver::default(), &protection);
        clock.advance(Duration::from_secs(10));
        assert_eq!(cycle.retry_instant(), Duration::from_secs(70));
    }
}
