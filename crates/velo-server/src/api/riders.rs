//! Rider account API endpoints.
//!
//! Read-side views of a rider's state: the trip or hold in progress,
//! ride history with filters, and the billing view (completed trips
//! plus the flex-dollar ledger).

use axum::extract::{Path, Query, State};
use axum::routing::get;
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use utoipa::IntoParams;

use velo_core::types::RentalStatus;
use velo_core::{BillingHistory, Rental, Reservation, RideHistoryFilter};

use crate::api::error::{ApiError, ApiResult};
use crate::api::reservations::parse_user;
use crate::state::SharedState;

/// Creates the riders router with all endpoints.
pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/{user_id}/rental", get(get_active_rental))
        .route("/{user_id}/reservation", get(get_active_reservation))
        .route("/{user_id}/rides", get(get_ride_history))
        .route("/{user_id}/billing", get(get_billing_history))
}

/// Query parameters for the ride-history endpoint.
#[derive(Debug, Clone, Deserialize, IntoParams)]
pub struct RideHistoryQuery {
    /// Only trips starting at or after this instant (RFC 3339).
    #[param(example = "2026-08-01T00:00:00Z")]
    pub from: Option<DateTime<Utc>>,
    /// Only trips starting before this instant (RFC 3339).
    #[param(example = "2026-09-01T00:00:00Z")]
    pub to: Option<DateTime<Utc>>,
    /// Only trips with this status.
    pub status: Option<RentalStatus>,
}

// ============================================================================
// Handlers
// ============================================================================

/// Get the rider's trip in progress.
#[utoipa::path(
    get,
    path = "/riders/{user_id}/rental",
    tag = "riders",
    operation_id = "getUserActiveRental",
    summary = "Get the rider's active rental",
    params(
        ("user_id" = String, Path, description = "Rider id")
    ),
    responses(
        (status = 200, description = "Active rental", body = Rental),
        (status = 404, description = "Rider has no trip in progress")
    )
)]
pub async fn get_active_rental(
    State(state): State<SharedState>,
    Path(user_id): Path<String>,
) -> ApiResult<Json<Rental>> {
    let user = parse_user(&user_id)?;
    let state_guard = state.read().await;
    state_guard
        .fleet
        .active_rental(&user)
        .map(Json)
        .ok_or_else(|| ApiError::NotFound {
            error_code: "no_active_rental".to_string(),
            message: format!("rider {user} has no trip in progress"),
        })
}

/// Get the rider's live reservation.
#[utoipa::path(
    get,
    path = "/riders/{user_id}/reservation",
    tag = "riders",
    operation_id = "getUserActiveReservation",
    summary = "Get the rider's active reservation",
    description = "Returns the rider's hold if one is live. A hold whose \
        window has run out is released by this request and reported as \
        absent.",
    params(
        ("user_id" = String, Path, description = "Rider id")
    ),
    responses(
        (status = 200, description = "Active reservation", body = Reservation),
        (status = 404, description = "Rider has no live reservation")
    )
)]
pub async fn get_active_reservation(
    State(state): State<SharedState>,
    Path(user_id): Path<String>,
) -> ApiResult<Json<Reservation>> {
    let user = parse_user(&user_id)?;
    // Write access: a lapsed hold is released here.
    let mut state_guard = state.write().await;
    let reservation = state_guard.fleet.active_reservation(&user)?;
    state_guard.publish_events();
    reservation.map(Json).ok_or_else(|| ApiError::NotFound {
        error_code: "no_active_reservation".to_string(),
        message: format!("rider {user} has no live reservation"),
    })
}

/// Get the rider's ride history.
#[utoipa::path(
    get,
    path = "/riders/{user_id}/rides",
    tag = "riders",
    operation_id = "getRideHistory",
    summary = "Get the rider's ride history",
    description = "Returns the rider's trips oldest first, optionally \
        filtered by start-time window and status. Includes the trip in \
        progress unless filtered out.",
    params(
        ("user_id" = String, Path, description = "Rider id"),
        RideHistoryQuery
    ),
    responses(
        (status = 200, description = "Ride history retrieved", body = [Rental]),
        (status = 400, description = "Invalid rider id or filter")
    )
)]
pub async fn get_ride_history(
    State(state): State<SharedState>,
    Path(user_id): Path<String>,
    Query(query): Query<RideHistoryQuery>,
) -> ApiResult<Json<Vec<Rental>>> {
    let user = parse_user(&user_id)?;
    let filter = RideHistoryFilter {
        from: query.from,
        to: query.to,
        status: query.status,
    };
    let state_guard = state.read().await;
    Ok(Json(state_guard.fleet.ride_history(&user, &filter)))
}

/// Get the rider's billing history.
#[utoipa::path(
    get,
    path = "/riders/{user_id}/billing",
    tag = "riders",
    operation_id = "getBillingHistory",
    summary = "Get the rider's billing history",
    description = "Returns completed trips with their charges, every \
        flex-dollar ledger row with its running balance, and the current \
        balance.",
    params(
        ("user_id" = String, Path, description = "Rider id")
    ),
    responses(
        (status = 200, description = "Billing history retrieved", body = BillingHistory),
        (status = 400, description = "Invalid rider id")
    )
)]
pub async fn get_billing_history(
    State(state): State<SharedState>,
    Path(user_id): Path<String>,
) -> ApiResult<Json<BillingHistory>> {
    let user = parse_user(&user_id)?;
    let state_guard = state.read().await;
    Ok(Json(state_guard.fleet.billing_history(&user)))
}
