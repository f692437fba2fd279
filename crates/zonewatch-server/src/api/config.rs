//! Configuration API endpoints.
//!
//! Provides endpoints for reading the active configuration and replacing the
//! Wi-Fi leave protection rules.

use axum::extract::State;
use axum::routing::{get, put};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tracing::info;
use utoipa::ToSchema;
use zonewatch_core::{LeaveProtectionConfig, ZonewatchConfig};

use crate::api::error::{ApiResult, ErrorResponse};
use crate::state::SharedState;

/// Creates the config router with all endpoints.
pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/", get(get_config))
        .route("/leave-protection", put(update_leave_protection))
}

// ============================================================================
// Request/Response Types
// ============================================================================

/// Response after updating leave protection.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct UpdateLeaveProtectionResponse {
    /// Whether the update was successful.
    pub success: bool,

    /// Whether the change was written to disk.
    pub persisted: bool,

    /// Updated settings.
    pub leave_protection: LeaveProtectionConfig,
}

// ============================================================================
// Handlers
// ============================================================================

/// Get current configuration.
#[utoipa::path(
    get,
    path = "/api/config",
    tag = "config",
    operation_id = "getConfig",
    summary = "Get current configuration",
    description = "Returns the active configuration including resolver tunables, \
        scheduling bounds, leave protection rules and tracked users.",
    responses(
        (status = 200, description = "Configuration retrieved", body = ZonewatchConfig)
    )
)]
pub async fn get_config(State(state): State<SharedState>) -> Json<ZonewatchConfig> {
    Json(state.read().await.config.clone())
}

/// Replace leave protection settings.
#[utoipa::path(
    put,
    path = "/api/config/leave-protection",
    tag = "config",
    operation_id = "updateLeaveProtection",
    summary = "Update leave protection",
    description = "Replaces the leave protection switch and rules. Rules need a \
        zone id and well-formed BSSIDs. Persisted when the server was started \
        with a configuration file.",
    request_body = LeaveProtectionConfig,
    responses(
        (status = 200, description = "Leave protection updated", body = UpdateLeaveProtectionResponse),
        (status = 422, description = "Invalid rules", body = ErrorResponse),
        (status = 500, description = "Configuration could not be saved", body = ErrorResponse)
    )
)]
pub async fn update_leave_protection(
    State(state): State<SharedState>,
    Json(request): Json<LeaveProtectionConfig>,
) -> ApiResult<Json<UpdateLeaveProtectionResponse>> {
    let mut state_guard = state.write().await;

    let mut updated = state_guard.config.clone();
    updated.leave_protection = request;
    updated.validate()?;

    let previous = std::mem::replace(&mut state_guard.config, updated);
    if let Err(err) = state_guard.save_config() {
        state_guard.config = previous;
        return Err(err.into());
    }

    info!(
        enabled = state_guard.config.leave_protection.enabled,
        rules = state_guard.config.leave_protection.rules.len(),
        "Leave protection updated"
    );

    Ok(Json(UpdateLeaveProtectionResponse {
        success: true,
        persisted: state_guard.config_path.is_some(),
        leave_protection: state_guard.config.leave_protection.clone(),
    }))
}
