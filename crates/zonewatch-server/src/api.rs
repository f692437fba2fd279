//! HTTP API routes and handlers.
//!
//! This module contains all HTTP endpoint implementations organized by domain:
//! - `zones` - Stateless scoring, resolution and leave protection checks
//! - `fixes` - Fix processing against the server's tracker and scheduling
//! - `config` - Configuration management
//! - `health` - Service health checks
//! - `error` - API error types
//! - `openapi` - OpenAPI document generation

use axum::routing::get;
use axum::Router;
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::state::SharedState;

pub mod config;
pub mod error;
pub mod fixes;
pub mod health;
pub mod openapi;
pub mod zones;

// Re-export commonly used types
pub use error::{ApiError, ApiResult, ErrorResponse};

// Re-export OpenAPI utilities for the gen-openapi binary
pub use openapi::{get_openapi_json, ApiDoc};

/// Creates the combined API router with all endpoints.
///
/// # Route Structure
///
/// ```text
/// /health                  - Health check
/// /docs                    - Swagger UI
/// /api
/// ├── /zones/score         - Score candidate zones
/// ├── /zones/resolve       - Resolve location name
/// ├── /zones/sticky        - Leave protection check
/// ├── /fixes               - Scheduled fix cycle
/// ├── /fixes/manual        - Manual fix, cadence untouched
/// ├── /wifi/scan           - Fast entry from a Wi-Fi scan
/// ├── /schedule            - Current poll schedule
/// ├── /config              - Configuration management
/// └── /openapi.json        - OpenAPI document
/// ```
pub fn create_router(state: SharedState) -> Router {
    Router::new()
        .nest("/health", health::router())
        .nest(
            "/api",
            Router::new()
                .route("/openapi.json", get(openapi::get_openapi_doc))
                .nest("/zones", zones::router())
                .nest("/fixes", fixes::router())
                .nest("/wifi", fixes::wifi_router())
                .nest("/schedule", fixes::schedule_router())
                .nest("/config", config::router()),
        )
        .merge(SwaggerUi::new("/docs").url("/docs/openapi.json", ApiDoc::openapi()))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
