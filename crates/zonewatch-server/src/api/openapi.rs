//! OpenAPI document generation for the zonewatch API.
//!
//! The document is served at `/api/openapi.json`, rendered by Swagger UI
//! at `/docs`, and written to disk by the `gen-openapi` binary for client
//! generation.

use axum::Json;
use utoipa::OpenApi;
use zonewatch_core::{
    GeofenceFunctions, LeaveProtectionConfig, LeaveProtectionRule, ResolverConfig,
    SchedulerConfig, ServerConfig, SessionReport, UserConfig, WifiSighting, Zone,
    ZonewatchConfig,
};

use super::config::UpdateLeaveProtectionResponse;
use super::error::ErrorResponse;
use super::fixes::{
    FixRequest, FixResponse, ScheduleResponse, SessionsResponse, WifiScanRequest,
};
use super::health::HealthResponse;
use super::zones::{
    FixInput, ResolveRequest, ResolveResponse, ScoreRequest, ScoreResponse, ScoredZone,
    StickyRequest, StickyResponse,
};

/// Serve the OpenAPI document as JSON.
pub async fn get_openapi_doc() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}

/// Returns the OpenAPI document as pretty JSON.
///
/// # Errors
///
/// Returns an error if the document cannot be serialized.
pub fn get_openapi_json() -> Result<String, serde_json::Error> {
    ApiDoc::openapi().to_pretty_json()
}

/// Main OpenAPI document structure for zonewatch.
#[derive(OpenApi)]
#[openapi(
    info(
        title = "zonewatch API",
        version = "0.1.0",
        description = r#"
# zonewatch API

zonewatch decides which named zone a device is in from noisy location fixes
and tells the device when to poll next.

## Overview

1. **Zone resolution**: Zones are scored by how much of the fix's uncertainty
   disk overlaps them. Staying in a zone is always allowed; entering or leaving
   one needs a fix of 200 m accuracy or better.
2. **Leave protection**: A zone exit is held back while a Wi-Fi network tied
   to that zone is still visible. Fast-enter rules do the opposite and move a
   user into a zone as soon as its network shows up.
3. **Adaptive polling**: The poll interval shrinks with speed and grows while
   the position stays the same.

## Typical device loop

- `POST /api/fixes` with every scheduled fix, then sleep `next_poll_in_secs`.
- `POST /api/wifi/scan` whenever the platform delivers new scan results.
- `POST /api/fixes/manual` when the user asks for an immediate update.
"#,
        license(name = "MIT", url = "https://opensource.org/licenses/MIT")
    ),
    servers(
        (url = "/", description = "Local zonewatch server")
    ),
    tags(
        (
            name = "system",
            description = "Health checks and system status"
        ),
        (
            name = "zones",
            description = "Stateless zone scoring, resolution and leave protection checks"
        ),
        (
            name = "tracking",
            description = "Fix processing against the server's tracker and poll scheduling"
        ),
        (
            name = "config",
            description = "Configuration including leave protection rules"
        )
    ),
    paths(
        // Health endpoints
        super::health::health_check,
        // Zone endpoints
        super::zones::score,
        super::zones::resolve,
        super::zones::sticky,
        // Tracking endpoints
        super::fixes::submit_fix,
        super::fixes::submit_manual_fix,
        super::fixes::submit_wifi_scan,
        super::fixes::get_schedule,
        // Config endpoints
        super::config::get_config,
        super::config::update_leave_protection,
    ),
    components(
        schemas(
            // Error types
            ErrorResponse,
            // Health types
            HealthResponse,
            // Zone types
            Zone,
            WifiSighting,
            FixInput,
            ScoreRequest,
            ScoredZone,
            ScoreResponse,
            ResolveRequest,
            ResolveResponse,
            StickyRequest,
            StickyResponse,
            // Tracking types
            FixRequest,
            FixResponse,
            WifiScanRequest,
            SessionsResponse,
            SessionReport,
            ScheduleResponse,
            // Config types
            ZonewatchConfig,
            ResolverConfig,
            SchedulerConfig,
            ServerConfig,
            UserConfig,
            LeaveProtectionConfig,
            LeaveProtectionRule,
            GeofenceFunctions,
            UpdateLeaveProtectionResponse,
        )
    )
)]
pub struct ApiDoc;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_openapi_spec_generation() {
        let doc = ApiDoc::openapi();
        assert_eq!(doc.info.title, "zonewatch API");
        assert!(doc.paths.paths.contains_key("/api/fixes"));
        assert!(doc.paths.paths.contains_key("/api/zones/resolve"));
    }

    #[test]
    fn test_openapi_json_serialization() {
        let json = get_openapi_json().unwrap();
        assert!(json.contains("\"openapi\":"));
        assert!(json.contains("\"zonewatch API\""));
    }
}
