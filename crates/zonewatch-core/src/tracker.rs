//! Fix tracker and adaptive poll scheduler.
//!
//! The tracker keeps two slots, `previous` and `current`. A fix that moved
//! (on a ~11 m grid) replaces `current`; a fix that did not is counted as
//! ignored. The poll interval grows while the position stays put and shrinks
//! with speed.
//!
//! All slot access goes through one mutex. Use [`FixTracker::lock`] or
//! [`FixTracker::observe`] to make a change check and the following update a
//! single critical section.

use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tracing::debug;

use crate::clock::{MonotonicClock, SystemClock};
use crate::types::LocationFix;

/// Poll interval while the tracker has fewer than two fixes, in minutes.
const WARMUP_INTERVAL_MIN: u64 = 2;

/// Scheduling bounds shared by every tracker cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Scheduler {
    /// Minimum lead time between now and the next poll.
    pub min_lead: Duration,
    /// Delay before retrying after a failed report.
    pub error_retry: Duration,
}

impl Default for Scheduler {
    fn default() -> Self {
        Self {
            min_lead: Duration::from_secs(30),
            error_retry: Duration::from_secs(60),
        }
    }
}

impl Scheduler {
    /// Scheduler with explicit bounds.
    #[must_use]
    pub const fn new(min_lead: Duration, error_retry: Duration) -> Self {
        Self {
            min_lead,
            error_retry,
        }
    }

    /// Earliest instant a poll may be scheduled for.
    #[must_use]
    pub fn earliest(&self, now: Duration) -> Duration {
        now + self.min_lead
    }

    /// Instant to retry at after reporting to the backend failed.
    #[must_use]
    pub fn retry_instant(&self, now: Duration) -> Duration {
        now + self.error_retry
    }
}

/// A fix accepted by the tracker.
#[derive(Debug, Clone, PartialEq)]
pub struct TrackedFix {
    /// The fix, with speed filled in when it was inferred.
    pub fix: LocationFix,
    /// Monotonic time the fix was accepted.
    pub created_at: Duration,
    /// How many unchanged fixes were seen since.
    pub ignore_count: u32,
}

#[derive(Debug, Default)]
struct Slots {
    previous: Option<TrackedFix>,
    current: Option<TrackedFix>,
}

/// What [`FixTracker::observe`] did with a fix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Observation {
    /// The fix moved and became `current`.
    Accepted,
    /// The fix did not move; `current` was kept.
    Ignored {
        /// Ignore count after this fix.
        ignore_count: u32,
    },
}

/// Snapshot of the schedule after an observation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Schedule {
    /// Interval the cadence logic asked for.
    pub interval_minutes: u64,
    /// Monotonic instant of the next poll.
    pub next_poll_at: Duration,
}

/// Tracks the last two accepted fixes and derives the polling cadence.
#[derive(Debug)]
pub struct FixTracker<C = SystemClock> {
    clock: C,
    scheduler: Scheduler,
    slots: Mutex<Slots>,
}

impl FixTracker<SystemClock> {
    /// Tracker on the process monotonic clock.
    #[must_use]
    pub fn new(scheduler: Scheduler) -> Self {
        Self::with_clock(SystemClock::new(), scheduler)
    }
}

impl Default for FixTracker<SystemClock> {
    fn default() -> Self {
        Self::new(Scheduler::default())
    }
}

impl<C: MonotonicClock> FixTracker<C> {
    /// Tracker on an explicit clock.
    pub fn with_clock(clock: C, scheduler: Scheduler) -> Self {
        Self {
            clock,
            scheduler,
            slots: Mutex::new(Slots::default()),
        }
    }

    /// Current monotonic time.
    pub fn now(&self) -> Duration {
        self.clock.now()
    }

    /// Scheduling bounds.
    pub const fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    /// Hold the tracker for a whole fix-processing cycle.
    pub fn lock(&self) -> TrackerGuard<'_, C> {
        TrackerGuard {
            slots: self.slots.lock().unwrap_or_else(PoisonError::into_inner),
            clock: &self.clock,
            scheduler: &self.scheduler,
        }
    }

    /// Accept the fix if it moved, otherwise count it as ignored.
    ///
    /// A fix is also accepted while there is no previous fix yet, so the
    /// tracker always fills both slots before it starts stretching the cadence.
    pub fn observe(&self, fix: LocationFix) -> (Observation, Schedule) {
        let mut guard = self.lock();
        let observation = if guard.has_location_change(&fix) || guard.previous().is_none() {
            guard.update_location(fix);
            Observation::Accepted
        } else {
            guard.ignore_location();
            Observation::Ignored {
                ignore_count: guard.current().map_or(0, |c| c.ignore_count),
            }
        };
        let schedule = guard.schedule();
        (observation, schedule)
    }

    /// See [`TrackerGuard::has_location_change`].
    pub fn has_location_change(&self, fix: &LocationFix) -> bool {
        self.lock().has_location_change(fix)
    }

    /// See [`TrackerGuard::update_location`].
    pub fn update_location(&self, fix: LocationFix) -> TrackedFix {
        self.lock().update_location(fix)
    }

    /// See [`TrackerGuard::ignore_location`].
    pub fn ignore_location(&self) {
        self.lock().ignore_location();
    }

    /// See [`TrackerGuard::next_poll_interval`].
    pub fn next_poll_interval(&self) -> u64 {
        self.lock().next_poll_interval()
    }

    /// See [`TrackerGuard::next_poll_instant`].
    pub fn next_poll_instant(&self) -> Duration {
        self.lock().next_poll_instant()
    }

    /// Instant to retry at after a failed report.
    pub fn retry_instant(&self) -> Duration {
        self.scheduler.retry_instant(self.clock.now())
    }

    /// Most recent accepted fix.
    pub fn current(&self) -> Option<TrackedFix> {
        self.lock().current().cloned()
    }

    /// Accepted fix before the current one.
    pub fn previous(&self) -> Option<TrackedFix> {
        self.lock().previous().cloned()
    }
}

/// Exclusive access to the tracker slots.
pub struct TrackerGuard<'a, C> {
    slots: MutexGuard<'a, Slots>,
    clock: &'a C,
    scheduler: &'a Scheduler,
}

impl<C: MonotonicClock> TrackerGuard<'_, C> {
    /// Most recent accepted fix.
    #[must_use]
    pub fn current(&self) -> Option<&TrackedFix> {
        self.slots.current.as_ref()
    }

    /// Accepted fix before the current one.
    #[must_use]
    pub fn previous(&self) -> Option<&TrackedFix> {
        self.slots.previous.as_ref()
    }

    /// Whether `fix` lands on a different ~11 m grid cell than `current`.
    #[must_use]
    pub fn has_location_change(&self, fix: &LocationFix) -> bool {
        let Some(current) = &self.slots.current else {
            return true;
        };
        let moved = grid_cell(&current.fix) != grid_cell(fix);
        debug!(
            from_lat = current.fix.latitude,
            from_lon = current.fix.longitude,
            to_lat = fix.latitude,
            to_lon = fix.longitude,
            moved,
            "Checked location change"
        );
        moved
    }

    /// Make `fix` current, inferring speed from the previous fix if needed.
    pub fn update_location(&mut self, mut fix: LocationFix) -> TrackedFix {
        let now = self.clock.now();

        if !fix.has_speed() {
            if let Some(current) = &self.slots.current {
                let elapsed_secs = now.saturating_sub(current.created_at).as_secs();
                if elapsed_secs > 0 {
                    let seconds = elapsed_secs as f64;
                    let distance = current.fix.distance_to(&fix);
                    fix.speed_mps = Some(distance / seconds);
                    fix.speed_accuracy_mps = Some(fix.accuracy_meters / seconds);
                    debug!(
                        distance_m = distance,
                        elapsed_secs,
                        speed_mps = distance / seconds,
                        "Inferred speed"
                    );
                }
            }
        }

        let tracked = TrackedFix {
            fix,
            created_at: now,
            ignore_count: 0,
        };
        self.slots.previous = self.slots.current.replace(tracked.clone());
        tracked
    }

    /// Count an unchanged fix against `current`.
    pub fn ignore_location(&mut self) {
        if let Some(current) = &mut self.slots.current {
            current.ignore_count += 1;
        }
    }

    /// Minutes until the next poll should happen.
    #[must_use]
    pub fn next_poll_interval(&self) -> u64 {
        let (Some(_), Some(current)) = (&self.slots.previous, &self.slots.current) else {
            return WARMUP_INTERVAL_MIN;
        };

        match u64::from(current.ignore_count) {
            0 => {}
            count @ 1..=5 => return count * 10,
            count => return 50 + (count - 5) * 15,
        }

        let speed = current.fix.speed_mps.unwrap_or(0.0);
        interval_for_speed(speed)
    }

    /// Monotonic instant of the next poll, never sooner than the minimum lead.
    #[must_use]
    pub fn next_poll_instant(&self) -> Duration {
        self.schedule().next_poll_at
    }

    /// Interval and instant together.
    #[must_use]
    pub fn schedule(&self) -> Schedule {
        let now = self.clock.now();
        let base = self.slots.current.as_ref().map_or(now, |c| c.created_at);
        let interval_minutes = self.next_poll_interval();
        let wished = base + Duration::from_secs(interval_minutes * 60);
        let next_poll_at = wished.max(self.scheduler.earliest(now));
        debug!(interval_minutes, ?next_poll_at, ?now, "Scheduled next poll");
        Schedule {
            interval_minutes,
            next_poll_at,
        }
    }
}

/// Speed bands: roughly still, walking to 30 km/h, to 50 km/h, faster.
fn interval_for_speed(speed_mps: f64) -> u64 {
    if speed_mps < 0.5 {
        5
    } else if speed_mps < 8.33 {
        3
    } else if speed_mps < 13.89 {
        2
    } else {
        1
    }
}

/// Coordinates printed to four decimals. Formatting rounds the exact binary
/// value, so `53.60595` (stored just below the tie) stays in cell `53.6059`.
fn grid_cell(fix: &LocationFix) -> (String, String) {
    (
        format!("{:.4}", fix.latitude),
        format!("{:.4}", fix.longitude),
    )
}
