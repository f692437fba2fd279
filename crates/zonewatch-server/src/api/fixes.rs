//! Fix processing and scheduling API endpoints.
//!
//! These endpoints drive the process-wide tracker. A planned fix goes
//! through the whole cycle: change check, tracker update, per-user resolution
//! with leave protection, and the next poll instant. A manual fix only
//! resolves; it does not disturb the cadence.

use std::time::Duration;

use axum::extract::State;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use zonewatch_core::{
    LocationCycle, Observation, SessionReport, WifiSighting, Zone, ZoneCache, ZoneSourceError,
    ZonewatchError,
};

use crate::api::error::{ApiError, ApiResult, ErrorResponse};
use crate::api::zones::{validate_zones, FixInput};
use crate::state::{AppState, SharedState};

/// Creates the fixes router with all endpoints.
pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/", post(submit_fix))
        .route("/manual", post(submit_manual_fix))
}

/// Creates the Wi-Fi router.
pub fn wifi_router() -> Router<SharedState> {
    Router::new().route("/scan", post(submit_wifi_scan))
}

/// Creates the schedule router.
pub fn schedule_router() -> Router<SharedState> {
    Router::new().route("/", get(get_schedule))
}

// ============================================================================
// Request/Response Types
// ============================================================================

/// A fix together with the context needed to resolve it.
#[derive(Debug, Clone, Deserialize, ToSchema)]
#[schema(example = json!({
    "fix": { "latitude": 52.3731, "longitude": 4.8922, "accuracy_meters": 25.0 },
    "zones": [{ "id": "zone.home", "name": "Home", "latitude": 52.3731, "longitude": 4.8922, "radius_meters": 100.0 }],
    "wifi": []
}))]
pub struct FixRequest {
    /// The new fix.
    pub fix: FixInput,

    /// Zones from the backend. Omit when the backend could not be reached to
    /// reuse the last uploaded list.
    #[serde(default)]
    pub zones: Option<Vec<Zone>>,

    /// Current Wi-Fi scan.
    #[serde(default)]
    pub wifi: Vec<WifiSighting>,
}

/// Outcome of a planned fix.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[schema(example = json!({
    "accepted": true,
    "ignore_count": 0,
    "interval_minutes": 5,
    "next_poll_in_secs": 300,
    "sessions": [{
        "user_id": "8d2f0b8e",
        "previous": "home",
        "resolved": "not_home",
        "reported": "home",
        "held": true
    }]
}))]
pub struct FixResponse {
    /// Whether the fix moved and was reported.
    pub accepted: bool,

    /// Unchanged fixes seen since the last accepted one.
    pub ignore_count: u32,

    /// Poll interval chosen by the cadence logic.
    pub interval_minutes: u64,

    /// Seconds until the device should poll again.
    pub next_poll_in_secs: u64,

    /// Per-user outcomes; empty when the fix was ignored.
    pub sessions: Vec<SessionReport>,
}

/// Wi-Fi scan for fast entry.
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct WifiScanRequest {
    /// Zones from the backend; omitted to reuse the last uploaded list.
    #[serde(default)]
    pub zones: Option<Vec<Zone>>,

    /// Visible networks.
    #[serde(default)]
    pub wifi: Vec<WifiSighting>,
}

/// Per-user outcomes of a manual fix or Wi-Fi scan.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct SessionsResponse {
    /// One entry per user that was resolved or moved.
    pub sessions: Vec<SessionReport>,
}

/// Current polling cadence.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[schema(example = json!({
    "interval_minutes": 10,
    "next_poll_in_secs": 540,
    "ignore_count": 1,
    "has_fix": true,
    "retry_in_secs": 60
}))]
pub struct ScheduleResponse {
    /// Poll interval chosen by the cadence logic.
    pub interval_minutes: u64,

    /// Seconds until the device should poll again.
    pub next_poll_in_secs: u64,

    /// Unchanged fixes seen since the last accepted one.
    pub ignore_count: u32,

    /// Whether any fix has been accepted yet.
    pub has_fix: bool,

    /// Seconds to wait after a failed report.
    pub retry_in_secs: u64,
}

fn seconds_until(at: Duration, now: Duration) -> u64 {
    at.saturating_sub(now).as_secs()
}

/// Run `work` against the state on the blocking pool. Scoring integrates
/// numerically per zone and user, which must not stall the async workers.
async fn with_state_blocking<T, F>(state: SharedState, work: F) -> ApiResult<T>
where
    F: FnOnce(&mut AppState) -> ApiResult<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(move || work(&mut state.blocking_write()))
        .await
        .map_err(|err| ApiError::InternalError {
            error_code: "cycle_failed".to_string(),
            message: "Tracking cycle did not complete".to_string(),
            details: Some(err.to_string()),
        })?
}

/// The request's zone list, or the cached one when the client sent none.
fn zones_for_request(cache: &ZoneCache, uploaded: Option<Vec<Zone>>) -> ApiResult<Vec<Zone>> {
    let fetched = match uploaded {
        Some(zones) => {
            validate_zones(&zones)?;
            Ok(zones)
        }
        None => Err(ZoneSourceError::unavailable("request carried no zone list")),
    };
    cache
        .settle(fetched)
        .map_err(|err| ZonewatchError::from(err).into())
}

// ============================================================================
// Handlers
// ============================================================================

/// Process a scheduled fix.
#[utoipa::path(
    post,
    path = "/api/fixes",
    tag = "tracking",
    operation_id = "submitFix",
    summary = "Submit a scheduled fix",
    description = "Runs one tracking cycle. A fix on the same ~11 m grid cell as \
        the last accepted one is counted as unchanged and stretches the poll \
        interval; otherwise every tracked user is resolved and leave protection \
        applied. Poll again after `next_poll_in_secs`.",
    request_body = FixRequest,
    responses(
        (status = 200, description = "Cycle completed", body = FixResponse),
        (status = 400, description = "Invalid fix or zone", body = ErrorResponse),
        (status = 503, description = "No zone list uploaded yet", body = ErrorResponse)
    )
)]
pub async fn submit_fix(
    State(state): State<SharedState>,
    Json(request): Json<FixRequest>,
) -> ApiResult<Json<FixResponse>> {
    let fix = request.fix.validate()?;

    let response = with_state_blocking(state, move |app| {
        let AppState {
            config,
            tracker,
            sessions,
            zones,
            ..
        } = app;
        let zones = zones_for_request(zones, request.zones)?;

        let fix = fix.with_captured_at(tracker.now());
        let cycle =
            LocationCycle::new(tracker, config.resolver.resolver(), &config.leave_protection);
        let report = cycle.planned(fix, sessions, |_| zones.clone(), &request.wifi);

        let (accepted, ignore_count) = match report.observation {
            Observation::Accepted => (true, 0),
            Observation::Ignored { ignore_count } => (false, ignore_count),
        };

        Ok(FixResponse {
            accepted,
            ignore_count,
            interval_minutes: report.schedule.interval_minutes,
            next_poll_in_secs: seconds_until(report.schedule.next_poll_at, tracker.now()),
            sessions: report.sessions,
        })
    })
    .await?;

    Ok(Json(response))
}

/// Process a user-requested fix.
#[utoipa::path(
    post,
    path = "/api/fixes/manual",
    tag = "tracking",
    operation_id = "submitManualFix",
    summary = "Submit a manual fix",
    description = "Resolves and reports every tracked user without touching the \
        poll cadence.",
    request_body = FixRequest,
    responses(
        (status = 200, description = "Users resolved", body = SessionsResponse),
        (status = 400, description = "Invalid fix or zone", body = ErrorResponse),
        (status = 503, description = "No zone list uploaded yet", body = ErrorResponse)
    )
)]
pub async fn submit_manual_fix(
    State(state): State<SharedState>,
    Json(request): Json<FixRequest>,
) -> ApiResult<Json<SessionsResponse>> {
    let fix = request.fix.validate()?;

    let sessions = with_state_blocking(state, move |app| {
        let AppState {
            config,
            tracker,
            sessions,
            zones,
            ..
        } = app;
        let zones = zones_for_request(zones, request.zones)?;

        let fix = fix.with_captured_at(tracker.now());
        let cycle =
            LocationCycle::new(tracker, config.resolver.resolver(), &config.leave_protection);
        Ok(cycle.manual(&fix, sessions, |_| zones.clone(), &request.wifi))
    })
    .await?;

    Ok(Json(SessionsResponse { sessions }))
}

/// Fast-enter zones from a Wi-Fi scan.
#[utoipa::path(
    post,
    path = "/api/wifi/scan",
    tag = "tracking",
    operation_id = "submitWifiScan",
    summary = "Submit a Wi-Fi scan",
    description = "Moves users straight into a zone when a network anchored to it \
        by a fast-enter rule is visible.",
    request_body = WifiScanRequest,
    responses(
        (status = 200, description = "Users that entered a zone", body = SessionsResponse),
        (status = 400, description = "Invalid zone", body = ErrorResponse),
        (status = 503, description = "No zone list uploaded yet", body = ErrorResponse)
    )
)]
pub async fn submit_wifi_scan(
    State(state): State<SharedState>,
    Json(request): Json<WifiScanRequest>,
) -> ApiResult<Json<SessionsResponse>> {
    let sessions = with_state_blocking(state, move |app| {
        let AppState {
            config,
            tracker,
            sessions,
            zones,
            ..
        } = app;
        let zones = zones_for_request(zones, request.zones)?;

        let cycle =
            LocationCycle::new(tracker, config.resolver.resolver(), &config.leave_protection);
        Ok(cycle.fast_enter(sessions, |_| zones.clone(), &request.wifi))
    })
    .await?;

    Ok(Json(SessionsResponse { sessions }))
}

/// Get the current polling cadence.
#[utoipa::path(
    get,
    path = "/api/schedule",
    tag = "tracking",
    operation_id = "getSchedule",
    summary = "Get poll schedule",
    description = "Returns the current poll interval and when the next poll is due.",
    responses(
        (status = 200, description = "Current schedule", body = ScheduleResponse)
    )
)]
pub async fn get_schedule(State(state): State<SharedState>) -> Json<ScheduleResponse> {
    let state_guard = state.read().await;
    let tracker = &state_guard.tracker;
    let now = tracker.now();

    let guard = tracker.lock();
    let schedule = guard.schedule();
    let current = guard.current();

    Json(ScheduleResponse {
        interval_minutes: schedule.interval_minutes,
        next_poll_in_secs: seconds_until(schedule.next_poll_at, now),
        ignore_count: current.map_or(0, |c| c.ignore_count),
        has_fix: current.is_some(),
        retry_in_secs: seconds_until(tracker.retry_instant(), now),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seconds_until_saturates() {
        assert_eq!(seconds_until(Duration::from_secs(90), Duration::from_secs(30)), 60);
        assert_eq!(seconds_until(Duration::from_secs(30), Duration::from_secs(90)), 0);
    }

    #[test]
    fn test_zones_for_request_falls_back_to_upload() {
        let cache = ZoneCache::new(true);
        let err = zones_for_request(&cache, None).unwrap_err();
        assert!(matches!(err, ApiError::ServiceUnavailable { .. }));

        let home = Zone::new("zone.home", "Home", 0.0, 0.0, 80.0);
        zones_for_request(&cache, Some(vec![home.clone()])).unwrap();
        assert_eq!(zones_for_request(&cache, None).unwrap(), vec![home]);

        let bad = Zone::new("zone.bad", "bad", 0.0, 0.0, -1.0);
        assert!(matches!(
            zones_for_request(&cache, Some(vec![bad])),
            Err(ApiError::BadRequest { .. })
        ));
    }

    #[test]
    fn test_zone_cache_can_be_disabled() {
        let cache = ZoneCache::new(false);
        zones_for_request(&cache, Some(Vec::new())).unwrap();
        assert!(zones_for_request(&cache, None).is_err());
    }

    #[tokio::test]
    async fn test_cycle_work_runs_off_the_request_thread() {
        use zonewatch_core::ZonewatchConfig;

        let state = AppState::new(ZonewatchConfig::default(), None).shared();
        let request_thread = std::thread::current().id();

        let worker_thread = with_state_blocking(state.clone(), |app| {
            app.sessions.clear();
            Ok(std::thread::current().id())
        })
        .await
        .unwrap();
        assert_ne!(worker_thread, request_thread);

        // The write guard is released once the work returns.
        assert!(state.try_write().is_ok());
    }

    #[tokio::test]
    async fn test_cycle_errors_pass_through() {
        use zonewatch_core::ZonewatchConfig;

        let state = AppState::new(ZonewatchConfig::default(), None).shared();
        let result: ApiResult<()> =
            with_state_blocking(state, |app| zones_for_request(&app.zones, None).map(|_| ())).await;
        assert!(matches!(result, Err(ApiError::ServiceUnavailable { .. })));
    }

    #[test]
    fn test_fix_request_defaults() {
        let json = r#"{"fix": {"latitude": 1.0, "longitude": 2.0, "accuracy_meters": 5.0}}"#;
        let request: FixRequest = serde_json::from_str(json).unwrap();
        assert!(request.zones.is_none());
        assert!(request.wifi.is_empty());
    }
}
