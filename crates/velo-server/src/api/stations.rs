//! Station browsing API endpoints.
//!
//! Riders use these to find a bike: the map view lists every station with
//! availability counts, and the detail view shows each dock and the bike
//! in it. Viewing a station releases lapsed reservation holds there, so
//! the counts never include a hold the clock has already run out on.

use axum::extract::{Path, State};
use axum::routing::get;
use axum::{Json, Router};

use velo_core::types::StationId;
use velo_core::{StationSnapshot, StationSummary};

use crate::api::error::ApiResult;
use crate::state::SharedState;

/// Creates the stations router with all endpoints.
pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/", get(list_stations))
        .route("/{station_id}", get(get_station))
}

/// List all stations with availability counts.
#[utoipa::path(
    get,
    path = "/stations",
    tag = "stations",
    operation_id = "listStations",
    summary = "List all stations",
    description = "Returns every station with its capacity, docked-bike \
        count, and number of bikes currently rentable. Sorted by name.",
    responses(
        (status = 200, description = "Stations retrieved", body = [StationSummary])
    )
)]
pub async fn list_stations(State(state): State<SharedState>) -> Json<Vec<StationSummary>> {
    let state_guard = state.read().await;
    Json(state_guard.fleet.list_stations())
}

/// Get a station's full dock-by-dock snapshot.
#[utoipa::path(
    get,
    path = "/stations/{station_id}",
    tag = "stations",
    operation_id = "getStationSnapshot",
    summary = "Get a station snapshot",
    description = "Returns the station's docks and the bike in each, with \
        per-bike status. Lapsed reservation holds at the station are \
        released before the snapshot is taken.",
    params(
        ("station_id" = StationId, Path, description = "Station to inspect")
    ),
    responses(
        (status = 200, description = "Snapshot retrieved", body = StationSnapshot),
        (status = 404, description = "Station not found")
    )
)]
pub async fn get_station(
    State(state): State<SharedState>,
    Path(station_id): Path<StationId>,
) -> ApiResult<Json<StationSnapshot>> {
    // Write access: taking a snapshot can release lapsed holds.
    let mut state_guard = state.write().await;
    let snapshot = state_guard.fleet.station_snapshot(station_id)?;
    state_guard.publish_events();
    Ok(Json(snapshot))
}
