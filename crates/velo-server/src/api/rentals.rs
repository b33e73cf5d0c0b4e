//! Rental lifecycle API endpoints.
//!
//! Rent undocks a bike (directly or by converting the rider's
//! reservation), return docks it and settles the charge, and a damage
//! report ends the trip with the bike routed to maintenance instead.
//! Each rider has at most one trip in progress.

use axum::extract::State;
use axum::routing::post;
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use velo_core::types::{BikeId, Cents, DamageReportId, DockId, RentalId, StationId};
use velo_core::{DamageReceipt, RentalReceipt, ReturnReceipt, TripCharge};

use crate::api::error::ApiResult;
use crate::api::reservations::parse_user;
use crate::state::SharedState;

/// Creates the rentals router with all endpoints.
pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/", post(rent_bike))
        .route("/return", post(return_bike))
        .route("/damage", post(report_damage))
}

// ============================================================================
// Request/Response Types
// ============================================================================

/// Request body for renting a bike.
#[derive(Debug, Clone, Deserialize, ToSchema)]
#[schema(example = json!({
    "user_id": "maya.chen",
    "station_id": "7b6e1a90-3c6f-4f0a-9be3-0f6d56a3c001",
    "bike_id": "2f0c2a61-8a1c-4f0a-8f57-3f4d56a3c002"
}))]
pub struct RentRequest {
    /// Rider starting the trip.
    pub user_id: String,
    /// Station where the bike is docked.
    pub station_id: StationId,
    /// Bike to undock.
    pub bike_id: BikeId,
}

/// Response after successfully renting a bike.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct RentResponse {
    /// The new rental.
    pub rental_id: RentalId,
    /// The undocked bike.
    pub bike_id: BikeId,
    /// Trip start time.
    pub started_at: DateTime<Utc>,
}

impl From<RentalReceipt> for RentResponse {
    fn from(receipt: RentalReceipt) -> Self {
        Self {
            rental_id: receipt.rental_id,
            bike_id: receipt.bike,
            started_at: receipt.started_at,
        }
    }
}

/// Request body for returning a bike.
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct ReturnRequest {
    /// Rider ending the trip.
    pub user_id: String,
    /// Destination station.
    pub station_id: StationId,
    /// Empty dock to place the bike in.
    pub dock_id: DockId,
}

/// Response after returning a bike: the completed rental and its charge.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[schema(example = json!({
    "rental_id": "c1a2b3d4-0000-4000-8000-000000000002",
    "charge": {
        "billed_minutes": 12,
        "base_cents": 180,
        "discount_pct": 5,
        "discounted_cents": 171,
        "flex_applied_cents": 100,
        "total_cents": 71
    },
    "flex_credited_cents": null,
    "tier_changed_to": null
}))]
pub struct ReturnResponse {
    /// The completed rental.
    pub rental_id: RentalId,
    /// Full pricing breakdown.
    pub charge: TripCharge,
    /// Flex dollars credited for refilling a low-occupancy station, if any.
    #[schema(nullable)]
    pub flex_credited_cents: Option<Cents>,
    /// The rider's new loyalty tier, when this trip triggered a promotion.
    #[schema(nullable)]
    pub tier_changed_to: Option<velo_core::types::LoyaltyTier>,
}

impl From<ReturnReceipt> for ReturnResponse {
    fn from(receipt: ReturnReceipt) -> Self {
        Self {
            rental_id: receipt.rental_id,
            charge: receipt.charge,
            flex_credited_cents: receipt.flex_credited_cents,
            tier_changed_to: receipt.tier_change.map(|c| c.new),
        }
    }
}

/// Request body for reporting damage mid-trip.
#[derive(Debug, Clone, Deserialize, ToSchema)]
#[schema(example = json!({
    "user_id": "maya.chen",
    "bike_id": "2f0c2a61-8a1c-4f0a-8f57-3f4d56a3c002",
    "description": "Rear brake lever unresponsive"
}))]
pub struct DamageRequest {
    /// Rider filing the report.
    pub user_id: String,
    /// The rented bike.
    pub bike_id: BikeId,
    /// Description of the damage. Required, max 1000 characters.
    #[schema(min_length = 1, max_length = 1000)]
    pub description: String,
}

/// Response after a damage report ends the rental.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct DamageResponse {
    /// The recorded damage report.
    pub report_id: DamageReportId,
    /// The rental the report ended.
    pub rental_id: RentalId,
    /// Pricing breakdown for the partial trip.
    pub charge: TripCharge,
    /// The rider's new loyalty tier, when this trip triggered a promotion.
    #[schema(nullable)]
    pub tier_changed_to: Option<velo_core::types::LoyaltyTier>,
}

impl From<DamageReceipt> for DamageResponse {
    fn from(receipt: DamageReceipt) -> Self {
        Self {
            report_id: receipt.report_id,
            rental_id: receipt.rental_id,
            charge: receipt.charge,
            tier_changed_to: receipt.tier_change.map(|c| c.new),
        }
    }
}

// ============================================================================
// Handlers
// ============================================================================

/// Rent a bike.
#[utoipa::path(
    post,
    path = "/rentals",
    tag = "rentals",
    operation_id = "rentBike",
    summary = "Rent a bike",
    description = "Undocks a bike and starts the trip clock. Converts the \
        rider's reservation when they hold one on this bike; a bike held \
        by a different rider cannot be rented. When two riders race for \
        the same bike, at most one rent succeeds.",
    request_body = RentRequest,
    responses(
        (status = 200, description = "Rental started", body = RentResponse),
        (status = 404, description = "Station or bike not found"),
        (status = 409, description = "Rider already has an active rental, or lost a race for the bike"),
        (status = 422, description = "Bike is not rentable")
    )
)]
pub async fn rent_bike(
    State(state): State<SharedState>,
    Json(request): Json<RentRequest>,
) -> ApiResult<Json<RentResponse>> {
    let user = parse_user(&request.user_id)?;

    let mut state_guard = state.write().await;
    let receipt = state_guard
        .fleet
        .rent_bike(user, request.station_id, request.bike_id)?;
    state_guard.publish_events();

    Ok(Json(receipt.into()))
}

/// Return a bike.
#[utoipa::path(
    post,
    path = "/rentals/return",
    tag = "rentals",
    operation_id = "returnBike",
    summary = "Return a bike",
    description = "Docks the rider's rented bike at an empty dock and \
        settles the trip: duration is billed in round-up minutes (minimum \
        one), the loyalty-tier discount applies, then any flex-dollar \
        balance offsets the remainder. Returning to a station under 25% \
        occupancy earns a flex-dollar reward. A retried return gets 404, \
        and the trip is never billed twice.",
    request_body = ReturnRequest,
    responses(
        (status = 200, description = "Rental completed", body = ReturnResponse),
        (status = 404, description = "No active rental, or station/dock not found"),
        (status = 422, description = "Dock is occupied or station is out of service")
    )
)]
pub async fn return_bike(
    State(state): State<SharedState>,
    Json(request): Json<ReturnRequest>,
) -> ApiResult<Json<ReturnResponse>> {
    let user = parse_user(&request.user_id)?;

    let mut state_guard = state.write().await;
    let receipt = state_guard
        .fleet
        .return_bike(&user, request.station_id, request.dock_id)?;
    state_guard.publish_events();

    Ok(Json(receipt.into()))
}

/// Report damage, ending the rental.
#[utoipa::path(
    post,
    path = "/rentals/damage",
    tag = "rentals",
    operation_id = "reportDamage",
    summary = "Report bike damage",
    description = "Ends the rider's rental with a damage report. The trip \
        is billed for the elapsed time exactly as a return would be, but \
        the bike goes to maintenance instead of back into circulation and \
        stays there until an operator repairs it.",
    request_body = DamageRequest,
    responses(
        (status = 200, description = "Damage recorded, rental ended", body = DamageResponse),
        (status = 400, description = "Missing description or wrong bike"),
        (status = 404, description = "No active rental")
    )
)]
pub async fn report_damage(
    State(state): State<SharedState>,
    Json(request): Json<DamageRequest>,
) -> ApiResult<Json<DamageResponse>> {
    let user = parse_user(&request.user_id)?;

    let mut state_guard = state.write().await;
    let receipt = state_guard
        .fleet
        .report_damage(&user, request.bike_id, request.description)?;
    state_guard.publish_events();

    Ok(Json(receipt.into()))
}
