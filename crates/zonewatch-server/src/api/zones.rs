//! Zone resolution API endpoints.
//!
//! Stateless views over the core resolution pipeline. Clients post a fix and
//! the zone list they fetched from the backend; the server never stores zones.
//!
//! All inputs are validated here so that the geometry kernel only ever sees
//! finite coordinates and non-negative radii.

use axum::extract::State;
use axum::routing::post;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use zonewatch_core::{
    best_zone, score_zones, zone_id_for_name, LocationFix, WifiSighting, Zone, ZoneScore,
};

use crate::api::error::{ApiError, ApiResult, ErrorResponse};
use crate::state::SharedState;

/// Creates the zones router with all endpoints.
pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/score", post(score))
        .route("/resolve", post(resolve))
        .route("/sticky", post(sticky))
}

// ============================================================================
// Request/Response Types
// ============================================================================

/// A location fix as sent by a device.
#[derive(Debug, Clone, Deserialize, Serialize, ToSchema)]
#[schema(example = json!({
    "latitude": 52.3731,
    "longitude": 4.8922,
    "accuracy_meters": 25.0,
    "speed_mps": 1.4
}))]
pub struct FixInput {
    /// Latitude in degrees.
    #[schema(example = 52.3731, minimum = -90, maximum = 90)]
    pub latitude: f64,

    /// Longitude in degrees.
    #[schema(example = 4.8922, minimum = -180, maximum = 180)]
    pub longitude: f64,

    /// Horizontal accuracy in meters. Zero means unknown.
    #[schema(example = 25.0)]
    #[serde(default)]
    pub accuracy_meters: f64,

    /// Measured ground speed in m/s.
    #[schema(example = 1.4)]
    #[serde(default)]
    pub speed_mps: Option<f64>,

    /// Accuracy of the measured speed in m/s.
    #[serde(default)]
    pub speed_accuracy_mps: Option<f64>,

    /// Bearing in degrees.
    #[serde(default)]
    pub bearing_degrees: Option<f64>,
}

impl FixInput {
    /// Check ranges and convert into a core fix.
    ///
    /// # Errors
    ///
    /// Returns a 400 error describing the first invalid field.
    pub fn validate(&self) -> ApiResult<LocationFix> {
        check_coordinates("fix", self.latitude, self.longitude)?;
        if !self.accuracy_meters.is_finite() {
            return Err(invalid_fix("accuracy_meters must be a finite number"));
        }
        if let Some(speed) = self.speed_mps {
            if !speed.is_finite() || speed < 0.0 {
                return Err(invalid_fix("speed_mps must be a non-negative number"));
            }
        }

        let mut fix = LocationFix::new(self.latitude, self.longitude, self.accuracy_meters);
        if let Some(speed) = self.speed_mps {
            fix = fix.with_speed(speed);
        }
        if let Some(bearing) = self.bearing_degrees {
            fix = fix.with_bearing(bearing);
        }
        fix.speed_accuracy_mps = self.speed_accuracy_mps;
        Ok(fix)
    }
}

fn invalid_fix(message: &str) -> ApiError {
    ApiError::bad_request("invalid_fix", message)
}

fn check_coordinates(what: &str, latitude: f64, longitude: f64) -> ApiResult<()> {
    if !latitude.is_finite() || !(-90.0..=90.0).contains(&latitude) {
        return Err(ApiError::bad_request(
            &format!("invalid_{what}"),
            format!("{what} latitude must be within [-90, 90]"),
        ));
    }
    if !longitude.is_finite() || !(-180.0..=180.0).contains(&longitude) {
        return Err(ApiError::bad_request(
            &format!("invalid_{what}"),
            format!("{what} longitude must be within [-180, 180]"),
        ));
    }
    Ok(())
}

/// Reject zones the geometry kernel cannot handle.
///
/// # Errors
///
/// Returns a 400 error naming the first invalid zone.
pub fn validate_zones(zones: &[Zone]) -> ApiResult<()> {
    for zone in zones {
        check_coordinates("zone", zone.latitude, zone.longitude)?;
        if !zone.radius_meters.is_finite() || zone.radius_meters < 0.0 {
            return Err(ApiError::bad_request(
                "invalid_zone",
                format!("zone '{}' radius must be a non-negative number", zone.id),
            ));
        }
    }
    Ok(())
}

/// Request to score zones against a fix.
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct ScoreRequest {
    /// The fix to score.
    pub fix: FixInput,

    /// Candidate zones.
    #[serde(default)]
    pub zones: Vec<Zone>,
}

/// One scored candidate.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[schema(example = json!({
    "zone_id": "zone.home",
    "name": "Home",
    "score": 0.93,
    "distance_meters": 12.4,
    "boundary_gap_meters": -87.6
}))]
pub struct ScoredZone {
    /// Backend zone id.
    pub zone_id: String,

    /// Zone name.
    pub name: String,

    /// Overlap score in [0, 1].
    pub score: f64,

    /// Distance from zone center to fix.
    pub distance_meters: f64,

    /// Distance minus radius; negative when the fix is inside.
    pub boundary_gap_meters: f64,
}

impl From<&ZoneScore> for ScoredZone {
    fn from(scored: &ZoneScore) -> Self {
        Self {
            zone_id: scored.zone.id.clone(),
            name: scored.zone.name.clone(),
            score: scored.score,
            distance_meters: scored.distance_meters,
            boundary_gap_meters: scored.boundary_gap(),
        }
    }
}

/// Scored candidates, best first.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ScoreResponse {
    /// Zones with any overlap, best first.
    pub candidates: Vec<ScoredZone>,

    /// Id of the winning zone, if any.
    pub best_zone_id: Option<String>,
}

/// Request to resolve a location name.
#[derive(Debug, Clone, Deserialize, ToSchema)]
#[schema(example = json!({
    "previous": "home",
    "fix": { "latitude": 52.3731, "longitude": 4.8922, "accuracy_meters": 25.0 },
    "zones": [{ "id": "zone.home", "name": "Home", "latitude": 52.3731, "longitude": 4.8922, "radius_meters": 100.0 }]
}))]
pub struct ResolveRequest {
    /// Name reported last time, if any.
    #[serde(default)]
    pub previous: Option<String>,

    /// The new fix.
    pub fix: FixInput,

    /// Candidate zones.
    #[serde(default)]
    pub zones: Vec<Zone>,
}

/// Resolved location.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[schema(example = json!({ "location_name": "home", "zone_id": "zone.home" }))]
pub struct ResolveResponse {
    /// Name to report.
    pub location_name: String,

    /// Zone id for that name, if it is a zone.
    pub zone_id: Option<String>,
}

/// Request to evaluate leave protection.
#[derive(Debug, Clone, Deserialize, ToSchema)]
#[schema(example = json!({
    "previous": "home",
    "resolved": "not_home",
    "user_id": "8d2f0b8e",
    "zones": [{ "id": "zone.home", "name": "Home", "latitude": 52.3731, "longitude": 4.8922, "radius_meters": 100.0 }],
    "wifi": [{ "ssid": "\"HomeNet\"", "bssid": "a4:2b:b0:11:22:33" }]
}))]
pub struct StickyRequest {
    /// Name reported last time.
    #[serde(default)]
    pub previous: Option<String>,

    /// Name the resolver chose now.
    pub resolved: String,

    /// User whose rules apply.
    pub user_id: String,

    /// Zone list used for the resolution.
    #[serde(default)]
    pub zones: Vec<Zone>,

    /// Current Wi-Fi scan.
    #[serde(default)]
    pub wifi: Vec<WifiSighting>,
}

/// Leave protection verdict.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[schema(example = json!({ "sticky": true, "location_name": "home" }))]
pub struct StickyResponse {
    /// Whether the change is suppressed.
    pub sticky: bool,

    /// Name to report after applying the verdict.
    pub location_name: String,
}

// ============================================================================
// Handlers
// ============================================================================

/// Score zones against a fix.
#[utoipa::path(
    post,
    path = "/api/zones/score",
    tag = "zones",
    operation_id = "scoreZones",
    summary = "Score candidate zones",
    description = "Scores every zone by how much of the fix's probability mass or \
        the zone's area overlaps. Zones without any overlap are omitted.",
    request_body = ScoreRequest,
    responses(
        (status = 200, description = "Scored candidates", body = ScoreResponse),
        (status = 400, description = "Invalid fix or zone", body = ErrorResponse)
    )
)]
pub async fn score(
    State(state): State<SharedState>,
    Json(request): Json<ScoreRequest>,
) -> ApiResult<Json<ScoreResponse>> {
    let fix = request.fix.validate()?;
    validate_zones(&request.zones)?;

    let resolver = state.read().await.config.resolver.resolver();
    let mut scores = score_zones(&fix, &request.zones, resolver.scoring());
    let best_zone_id = best_zone(&scores).map(|best| best.zone.id.clone());
    scores.sort_by(zonewatch_core::scoring::rank);

    Ok(Json(ScoreResponse {
        candidates: scores.iter().map(ScoredZone::from).collect(),
        best_zone_id,
    }))
}

/// Resolve the location name for a fix.
#[utoipa::path(
    post,
    path = "/api/zones/resolve",
    tag = "zones",
    operation_id = "resolveLocation",
    summary = "Resolve location name",
    description = "Applies hysteresis and the entry accuracy gate: staying put is \
        always allowed, any change needs an accurate enough fix.",
    request_body = ResolveRequest,
    responses(
        (status = 200, description = "Resolved location", body = ResolveResponse),
        (status = 400, description = "Invalid fix or zone", body = ErrorResponse)
    )
)]
pub async fn resolve(
    State(state): State<SharedState>,
    Json(request): Json<ResolveRequest>,
) -> ApiResult<Json<ResolveResponse>> {
    let fix = request.fix.validate()?;
    validate_zones(&request.zones)?;

    let resolver = state.read().await.config.resolver.resolver();
    let location_name = resolver.resolve(request.previous.as_deref(), &fix, &request.zones);
    let zone_id = zone_id_for_name(&location_name, &request.zones).map(str::to_string);

    Ok(Json(ResolveResponse {
        location_name,
        zone_id,
    }))
}

/// Evaluate leave protection for a zone change.
#[utoipa::path(
    post,
    path = "/api/zones/sticky",
    tag = "zones",
    operation_id = "checkSticky",
    summary = "Check leave protection",
    description = "Reports whether a zone change should be suppressed because a \
        Wi-Fi network anchored to the previous zone is still visible.",
    request_body = StickyRequest,
    responses(
        (status = 200, description = "Verdict", body = StickyResponse),
        (status = 400, description = "Invalid zone", body = ErrorResponse)
    )
)]
pub async fn sticky(
    State(state): State<SharedState>,
    Json(request): Json<StickyRequest>,
) -> ApiResult<Json<StickyResponse>> {
    validate_zones(&request.zones)?;

    let state_guard = state.read().await;
    let sticky = state_guard.config.leave_protection.is_sticky(
        request.previous.as_deref(),
        &request.resolved,
        &request.user_id,
        &request.zones,
        &request.wifi,
    );
    let location_name = match (sticky, request.previous) {
        (true, Some(previous)) => previous,
        _ => request.resolved,
    };

    Ok(Json(StickyResponse {
        sticky,
        location_name,
    }))
}
