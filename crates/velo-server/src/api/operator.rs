//! Fleet operator API endpoints.
//!
//! Station and bike administration: commissioning stations, adding and
//! retiring bikes, repairs, manual rebalancing moves, and the damage
//! report queue. These sit under `/api/operator` so a gateway can apply
//! operator-only authentication to the whole subtree.

use axum::extract::{Path, State};
use axum::routing::{delete, get, post, put};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use velo_core::types::{BikeClass, BikeId, GeoPoint, StationId, StationStatus};
use velo_core::DamageReport;

use crate::api::error::ApiResult;
use crate::state::SharedState;

/// Creates the operator router with all endpoints.
pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/stations", post(add_station))
        .route("/stations/{station_id}", delete(remove_station))
        .route("/stations/{station_id}/status", put(set_station_status))
        .route("/bikes", post(add_bike))
        .route("/bikes/{bike_id}", delete(remove_bike))
        .route("/bikes/{bike_id}/repair", post(repair_bike))
        .route("/bikes/{bike_id}/move", post(move_bike))
        .route("/damage-reports", get(list_damage_reports))
}

// ============================================================================
// Request/Response Types
// ============================================================================

/// Request body for commissioning a station.
#[derive(Debug, Clone, Deserialize, ToSchema)]
#[schema(example = json!({
    "name": "Pioneer Square",
    "address": "700 SW 6th Ave",
    "location": { "lat": 45.5189, "lon": -122.6786 },
    "capacity": 16
}))]
pub struct AddStationRequest {
    /// Display name.
    pub name: String,
    /// Street address.
    pub address: String,
    /// Geographic location.
    pub location: GeoPoint,
    /// Number of docks. Must be positive.
    #[schema(minimum = 1)]
    pub capacity: usize,
}

/// Response after commissioning a station.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct AddStationResponse {
    /// The new station.
    pub station_id: StationId,
}

/// Request body for changing a station's status.
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct SetStationStatusRequest {
    /// New operational status.
    pub status: StationStatus,
}

/// Request body for adding a bike to the fleet.
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct AddBikeRequest {
    /// Station to dock the new bike at.
    pub station_id: StationId,
    /// Bike class.
    pub class: BikeClass,
}

/// Response after adding a bike.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct AddBikeResponse {
    /// The new bike.
    pub bike_id: BikeId,
}

/// Request body for repairing a maintenance bike.
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct RepairBikeRequest {
    /// Station to re-dock an undocked bike at. Ignored for a bike that
    /// went to maintenance while docked.
    #[schema(nullable)]
    pub station_id: Option<StationId>,
}

/// Request body for manually moving a bike between stations.
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct MoveBikeRequest {
    /// Destination station. Must have a free dock.
    pub station_id: StationId,
}

/// Generic acknowledgement for operator actions.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct OperatorAck {
    /// Always true on success.
    pub ok: bool,
}

// ============================================================================
// Handlers
// ============================================================================

/// Commission a new station.
#[utoipa::path(
    post,
    path = "/operator/stations",
    tag = "operator",
    operation_id = "addStation",
    summary = "Commission a station",
    request_body = AddStationRequest,
    responses(
        (status = 200, description = "Station created", body = AddStationResponse),
        (status = 400, description = "Invalid name or capacity")
    )
)]
pub async fn add_station(
    State(state): State<SharedState>,
    Json(request): Json<AddStationRequest>,
) -> ApiResult<Json<AddStationResponse>> {
    let mut state_guard = state.write().await;
    let station_id = state_guard.fleet.add_station(
        request.name,
        request.address,
        request.location,
        request.capacity,
    )?;
    Ok(Json(AddStationResponse { station_id }))
}

/// Decommission an empty station.
#[utoipa::path(
    delete,
    path = "/operator/stations/{station_id}",
    tag = "operator",
    operation_id = "removeStation",
    summary = "Decommission a station",
    description = "Removes a station. Every dock must be empty; move or \
        retire the bikes first.",
    params(
        ("station_id" = StationId, Path, description = "Station to remove")
    ),
    responses(
        (status = 200, description = "Station removed", body = OperatorAck),
        (status = 404, description = "Station not found"),
        (status = 400, description = "Station still has docked bikes")
    )
)]
pub async fn remove_station(
    State(state): State<SharedState>,
    Path(station_id): Path<StationId>,
) -> ApiResult<Json<OperatorAck>> {
    let mut state_guard = state.write().await;
    state_guard.fleet.remove_station(station_id)?;
    Ok(Json(OperatorAck { ok: true }))
}

/// Open or close a station.
#[utoipa::path(
    put,
    path = "/operator/stations/{station_id}/status",
    tag = "operator",
    operation_id = "setStationStatus",
    summary = "Set a station's status",
    description = "An out-of-service station rejects new reservations, \
        rents, and returns; bikes already docked there stay put.",
    params(
        ("station_id" = StationId, Path, description = "Station to update")
    ),
    request_body = SetStationStatusRequest,
    responses(
        (status = 200, description = "Status updated", body = OperatorAck),
        (status = 404, description = "Station not found")
    )
)]
pub async fn set_station_status(
    State(state): State<SharedState>,
    Path(station_id): Path<StationId>,
    Json(request): Json<SetStationStatusRequest>,
) -> ApiResult<Json<OperatorAck>> {
    let mut state_guard = state.write().await;
    state_guard
        .fleet
        .set_station_status(station_id, request.status)?;
    Ok(Json(OperatorAck { ok: true }))
}

/// Add a bike to the fleet.
#[utoipa::path(
    post,
    path = "/operator/bikes",
    tag = "operator",
    operation_id = "addBike",
    summary = "Add a bike",
    request_body = AddBikeRequest,
    responses(
        (status = 200, description = "Bike added", body = AddBikeResponse),
        (status = 404, description = "Station not found"),
        (status = 422, description = "Station has no free dock")
    )
)]
pub async fn add_bike(
    State(state): State<SharedState>,
    Json(request): Json<AddBikeRequest>,
) -> ApiResult<Json<AddBikeResponse>> {
    let mut state_guard = state.write().await;
    let bike_id = state_guard
        .fleet
        .add_bike(request.station_id, request.class)?;
    Ok(Json(AddBikeResponse { bike_id }))
}

/// Retire a bike from the fleet.
#[utoipa::path(
    delete,
    path = "/operator/bikes/{bike_id}",
    tag = "operator",
    operation_id = "removeBike",
    summary = "Retire a bike",
    description = "Removes a bike that is available or in maintenance. A \
        reserved or on-trip bike cannot be retired.",
    params(
        ("bike_id" = BikeId, Path, description = "Bike to retire")
    ),
    responses(
        (status = 200, description = "Bike removed", body = OperatorAck),
        (status = 404, description = "Bike not found"),
        (status = 422, description = "Bike is reserved or on a trip")
    )
)]
pub async fn remove_bike(
    State(state): State<SharedState>,
    Path(bike_id): Path<BikeId>,
) -> ApiResult<Json<OperatorAck>> {
    let mut state_guard = state.write().await;
    state_guard.fleet.remove_bike(bike_id)?;
    Ok(Json(OperatorAck { ok: true }))
}

/// Return a repaired bike to service.
#[utoipa::path(
    post,
    path = "/operator/bikes/{bike_id}/repair",
    tag = "operator",
    operation_id = "repairBike",
    summary = "Repair a bike",
    description = "Marks a maintenance bike available again. A bike left \
        undocked by a mid-trip damage report needs a destination station \
        with a free dock.",
    params(
        ("bike_id" = BikeId, Path, description = "Bike to repair")
    ),
    request_body = RepairBikeRequest,
    responses(
        (status = 200, description = "Bike back in service", body = OperatorAck),
        (status = 404, description = "Bike or station not found"),
        (status = 422, description = "Bike is not in maintenance, or no free dock")
    )
)]
pub async fn repair_bike(
    State(state): State<SharedState>,
    Path(bike_id): Path<BikeId>,
    Json(request): Json<RepairBikeRequest>,
) -> ApiResult<Json<OperatorAck>> {
    let mut state_guard = state.write().await;
    state_guard.fleet.repair_bike(bike_id, request.station_id)?;
    Ok(Json(OperatorAck { ok: true }))
}

/// Manually move a bike to another station.
#[utoipa::path(
    post,
    path = "/operator/bikes/{bike_id}/move",
    tag = "operator",
    operation_id = "moveBike",
    summary = "Move a bike",
    description = "Rebalancing move of an available docked bike to a free \
        dock at another station.",
    params(
        ("bike_id" = BikeId, Path, description = "Bike to move")
    ),
    request_body = MoveBikeRequest,
    responses(
        (status = 200, description = "Bike moved", body = OperatorAck),
        (status = 404, description = "Bike or station not found"),
        (status = 422, description = "Bike is not available, or no free dock")
    )
)]
pub async fn move_bike(
    State(state): State<SharedState>,
    Path(bike_id): Path<BikeId>,
    Json(request): Json<MoveBikeRequest>,
) -> ApiResult<Json<OperatorAck>> {
    let mut state_guard = state.write().await;
    state_guard.fleet.move_bike(bike_id, request.station_id)?;
    Ok(Json(OperatorAck { ok: true }))
}

/// List all damage reports.
#[utoipa::path(
    get,
    path = "/operator/damage-reports",
    tag = "operator",
    operation_id = "listDamageReports",
    summary = "List damage reports",
    description = "Every rider-filed damage report, oldest first. Reports \
        are kept after repair for pattern analysis.",
    responses(
        (status = 200, description = "Reports retrieved", body = [DamageReport])
    )
)]
pub async fn list_damage_reports(State(state): State<SharedState>) -> Json<Vec<DamageReport>> {
    let state_guard = state.read().await;
    Json(state_guard.fleet.damage_reports())
}
