//! Reservation API endpoints.
//!
//! A reservation holds a docked bike for its rider for a limited window
//! (longer for higher loyalty tiers). Holds expire lazily: any request
//! touching a lapsed hold releases it first, so no background job is
//! needed for correctness.

use axum::extract::State;
use axum::routing::post;
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use velo_core::types::{BikeId, ReservationId, StationId, UserId};

use crate::api::error::{ApiError, ApiResult};
use crate::state::SharedState;

/// Creates the reservations router with all endpoints.
pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/", post(reserve_bike))
        .route("/cancel", post(cancel_reservation))
}

// ============================================================================
// Request/Response Types
// ============================================================================

/// Request body for placing a reservation.
#[derive(Debug, Clone, Deserialize, ToSchema)]
#[schema(example = json!({
    "user_id": "maya.chen",
    "station_id": "7b6e1a90-3c6f-4f0a-9be3-0f6d56a3c001",
    "bike_id": "2f0c2a61-8a1c-4f0a-8f57-3f4d56a3c002"
}))]
pub struct ReserveRequest {
    /// Rider placing the hold.
    pub user_id: String,
    /// Station where the bike is docked.
    pub station_id: StationId,
    /// Bike to hold.
    pub bike_id: BikeId,
}

/// Response after successfully placing a reservation.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[schema(example = json!({
    "reservation_id": "b1a2c3d4-0000-4000-8000-000000000001",
    "bike_id": "2f0c2a61-8a1c-4f0a-8f57-3f4d56a3c002",
    "expires_at": "2026-08-29T17:45:00Z"
}))]
pub struct ReserveResponse {
    /// The new reservation.
    pub reservation_id: ReservationId,
    /// The held bike.
    pub bike_id: BikeId,
    /// When the hold lapses.
    pub expires_at: DateTime<Utc>,
}

/// Request body for cancelling a reservation.
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct CancelReservationRequest {
    /// Rider cancelling their hold.
    pub user_id: String,
    /// Station named when the hold was placed.
    pub station_id: StationId,
    /// The held bike.
    pub bike_id: BikeId,
}

/// Response after cancelling a reservation.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CancelReservationResponse {
    /// Always true on success.
    pub cancelled: bool,
}

/// Parse and validate a rider id from a request body.
pub(crate) fn parse_user(raw: &str) -> ApiResult<UserId> {
    UserId::parse(raw).map_err(|err| ApiError::BadRequest {
        error_code: "invalid_user_id".to_string(),
        message: err.to_string(),
    })
}

// ============================================================================
// Handlers
// ============================================================================

/// Place a hold on an available bike.
#[utoipa::path(
    post,
    path = "/reservations",
    tag = "reservations",
    operation_id = "reserveBike",
    summary = "Reserve a bike",
    description = "Places a hold on an available docked bike. The hold \
        window depends on the rider's loyalty tier (15 minutes by default). \
        A rider can hold at most one bike at a time; a second attempt \
        returns 409 with the existing hold's details.",
    request_body = ReserveRequest,
    responses(
        (status = 200, description = "Bike reserved", body = ReserveResponse),
        (status = 404, description = "Station or bike not found"),
        (status = 409, description = "Rider already holds a reservation"),
        (status = 422, description = "Bike is not available")
    )
)]
pub async fn reserve_bike(
    State(state): State<SharedState>,
    Json(request): Json<ReserveRequest>,
) -> ApiResult<Json<ReserveResponse>> {
    let user = parse_user(&request.user_id)?;

    let mut state_guard = state.write().await;
    let reservation = state_guard
        .fleet
        .reserve_bike(user, request.station_id, request.bike_id)?;
    state_guard.publish_events();

    Ok(Json(ReserveResponse {
        reservation_id: reservation.id,
        bike_id: reservation.bike,
        expires_at: reservation.expires_at,
    }))
}

/// Cancel the rider's hold.
#[utoipa::path(
    post,
    path = "/reservations/cancel",
    tag = "reservations",
    operation_id = "cancelReservation",
    summary = "Cancel a reservation",
    description = "Releases the rider's hold, returning the bike to the \
        available pool. Cancelling a hold that no longer exists (expired, \
        already cancelled, or never placed) returns 404; retries therefore \
        converge on the same answer.",
    request_body = CancelReservationRequest,
    responses(
        (status = 200, description = "Reservation cancelled", body = CancelReservationResponse),
        (status = 404, description = "No matching reservation")
    )
)]
pub async fn cancel_reservation(
    State(state): State<SharedState>,
    Json(request): Json<CancelReservationRequest>,
) -> ApiResult<Json<CancelReservationResponse>> {
    let user = parse_user(&request.user_id)?;

    let mut state_guard = state.write().await;
    state_guard
        .fleet
        .cancel_reservation(&user, request.station_id, request.bike_id)?;
    state_guard.publish_events();

    Ok(Json(CancelReservationResponse { cancelled: true }))
}
