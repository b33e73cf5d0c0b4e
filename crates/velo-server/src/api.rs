//! HTTP API routes and handlers.
//!
//! This module contains all HTTP endpoint implementations organized by domain:
//! - `stations` - Station browsing and per-dock availability
//! - `reservations` - Bike holds and cancellation
//! - `rentals` - Rent, return, and damage reports
//! - `riders` - Rider views: active rental, history, billing
//! - `operator` - Fleet administration
//! - `health` - Service health checks
//! - `error` - API error types
//! - `openapi` - OpenAPI specification generation

use axum::routing::get;
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::state::SharedState;

pub mod error;
pub mod health;
pub mod openapi;
pub mod operator;
pub mod rentals;
pub mod reservations;
pub mod riders;
pub mod stations;

// Re-export commonly used types
#[allow(unused_imports)]
pub use error::{ApiError, ApiResult, ErrorResponse};

// Re-export OpenAPI utilities for the gen-openapi binary
#[allow(unused_imports)]
pub use openapi::get_openapi_json;

/// Creates the combined API router with all endpoints.
///
/// # Route Structure
///
/// ```text
/// /health                          - Health check
/// /api
/// ├── /stations                    - Station list and snapshots
/// ├── /reservations                - Place and cancel holds
/// ├── /rentals                     - Rent, return, damage
/// ├── /riders/{user_id}/...        - Active rental/reservation, rides, billing
/// ├── /operator                    - Stations, bikes, repairs, damage reports
/// └── /openapi.json                - OpenAPI specification
/// /swagger-ui                      - Interactive API documentation
/// ```
pub fn create_router(state: SharedState) -> Router {
    Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", openapi::ApiDoc::openapi()))
        .nest("/health", health::router())
        .nest(
            "/api",
            Router::new()
                // OpenAPI spec at /api/openapi.json
                .route("/openapi.json", get(openapi::get_openapi_spec))
                // Station browsing
                .nest("/stations", stations::router())
                // Reservation holds
                .nest("/reservations", reservations::router())
                // Rental lifecycle
                .nest("/rentals", rentals::router())
                // Rider views
                .nest("/riders", riders::router())
                // Fleet administration
                .nest("/operator", operator::router()),
        )
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
