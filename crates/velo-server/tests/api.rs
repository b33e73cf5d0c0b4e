//! End-to-end API tests over an in-memory fleet.

use axum_test::TestServer;
use serde_json::{json, Value};

use velo_core::VeloConfig;
use velo_server::api::create_router;
use velo_server::state::AppState;

fn server() -> TestServer {
    let state = AppState::in_memory(VeloConfig::default()).shared();
    TestServer::new(create_router(state)).expect("test server")
}

/// Create a station with `capacity` docks, returning its id.
async fn add_station(server: &TestServer, name: &str, capacity: usize) -> String {
    let response = server
        .post("/api/operator/stations")
        .json(&json!({
            "name": name,
            "address": "1 Test St",
            "location": { "lat": 45.5, "lon": -122.6 },
            "capacity": capacity,
        }))
        .await;
    response.assert_status_ok();
    response.json::<Value>()["station_id"]
        .as_str()
        .expect("station_id")
        .to_string()
}

/// Dock a new bike at the station, returning its id.
async fn add_bike(server: &TestServer, station_id: &str) -> String {
    let response = server
        .post("/api/operator/bikes")
        .json(&json!({ "station_id": station_id, "class": "standard" }))
        .await;
    response.assert_status_ok();
    response.json::<Value>()["bike_id"]
        .as_str()
        .expect("bike_id")
        .to_string()
}

/// First empty dock id at the station.
async fn free_dock(server: &TestServer, station_id: &str) -> String {
    let response = server.get(&format!("/api/stations/{station_id}")).await;
    response.assert_status_ok();
    response.json::<Value>()["docks"]
        .as_array()
        .expect("docks")
        .iter()
        .find(|d| d["bike"].is_null())
        .and_then(|d| d["dock_id"].as_str())
        .expect("free dock")
        .to_string()
}

#[tokio::test]
async fn health_reports_fleet_size() {
    let server = server();
    let station = add_station(&server, "Alpha", 4).await;
    add_bike(&server, &station).await;

    let response = server.get("/health").await;
    response.assert_status_ok();
    let body = response.json::<Value>();
    assert_eq!(body["status"], "ok");
    assert_eq!(body["stations"], 1);
    assert_eq!(body["bikes"], 1);
}

#[tokio::test]
async fn station_listing_and_snapshot() {
    let server = server();
    let station = add_station(&server, "Alpha", 4).await;
    add_bike(&server, &station).await;

    let listing = server.get("/api/stations").await;
    listing.assert_status_ok();
    let stations = listing.json::<Vec<Value>>();
    assert_eq!(stations.len(), 1);
    assert_eq!(stations[0]["capacity"], 4);
    assert_eq!(stations[0]["docked"], 1);
    assert_eq!(stations[0]["available"], 1);

    let snapshot = server.get(&format!("/api/stations/{station}")).await;
    snapshot.assert_status_ok();
    let body = snapshot.json::<Value>();
    assert_eq!(body["docks"].as_array().unwrap().len(), 4);

    let missing = server
        .get("/api/stations/00000000-0000-4000-8000-000000000000")
        .await;
    missing.assert_status_not_found();
}

#[tokio::test]
async fn full_rental_round_trip() {
    let server = server();
    let station = add_station(&server, "Alpha", 4).await;
    let bike = add_bike(&server, &station).await;

    // Reserve, then rent against the reservation.
    let reserve = server
        .post("/api/reservations")
        .json(&json!({ "user_id": "maya.chen", "station_id": station, "bike_id": bike }))
        .await;
    reserve.assert_status_ok();

    let rent = server
        .post("/api/rentals")
        .json(&json!({ "user_id": "maya.chen", "station_id": station, "bike_id": bike }))
        .await;
    rent.assert_status_ok();

    let active = server.get("/api/riders/maya.chen/rental").await;
    active.assert_status_ok();
    assert_eq!(active.json::<Value>()["bike"], bike.as_str());

    // Return to an empty dock; zero-duration trips still bill one minute.
    let dock = free_dock(&server, &station).await;
    let ret = server
        .post("/api/rentals/return")
        .json(&json!({ "user_id": "maya.chen", "station_id": station, "dock_id": dock }))
        .await;
    ret.assert_status_ok();
    let body = ret.json::<Value>();
    assert_eq!(body["charge"]["billed_minutes"], 1);
    assert_eq!(body["charge"]["base_cents"], 15);
    // Station held 0 of 4 bikes before docking: reward applies.
    assert_eq!(body["flex_credited_cents"], 100);

    // The trip shows up in history and billing.
    let rides = server.get("/api/riders/maya.chen/rides").await;
    rides.assert_status_ok();
    assert_eq!(rides.json::<Vec<Value>>().len(), 1);

    let billing = server.get("/api/riders/maya.chen/billing").await;
    billing.assert_status_ok();
    let billing = billing.json::<Value>();
    assert_eq!(billing["trips"].as_array().unwrap().len(), 1);
    assert_eq!(billing["flex_balance_cents"], 100);
}

#[tokio::test]
async fn second_reservation_conflicts_with_details() {
    let server = server();
    let station = add_station(&server, "Alpha", 4).await;
    let first = add_bike(&server, &station).await;
    let second = add_bike(&server, &station).await;

    server
        .post("/api/reservations")
        .json(&json!({ "user_id": "maya.chen", "station_id": station, "bike_id": first }))
        .await
        .assert_status_ok();

    let conflict = server
        .post("/api/reservations")
        .json(&json!({ "user_id": "maya.chen", "station_id": station, "bike_id": second }))
        .await;
    conflict.assert_status(axum::http::StatusCode::CONFLICT);
    let body = conflict.json::<Value>();
    assert_eq!(body["error"], "ALREADY_RESERVED");
    assert_eq!(body["details"]["bike_id"], first.as_str());
    assert!(body["details"]["expires_at"].is_string());
}

#[tokio::test]
async fn racing_rents_have_one_winner() {
    let server = server();
    let station = add_station(&server, "Alpha", 4).await;
    let bike = add_bike(&server, &station).await;

    let rent = |user: &str| {
        server
            .post("/api/rentals")
            .json(&json!({ "user_id": user, "station_id": station, "bike_id": bike }))
    };
    let (a, b) = tokio::join!(rent("rider.a"), rent("rider.b"));

    let winners = [&a, &b]
        .iter()
        .filter(|r| r.status_code().is_success())
        .count();
    assert_eq!(winners, 1);
    let loser = if a.status_code().is_success() { &b } else { &a };
    assert_eq!(
        loser.status_code(),
        axum::http::StatusCode::UNPROCESSABLE_ENTITY
    );
}

#[tokio::test]
async fn damage_report_routes_bike_to_maintenance() {
    let server = server();
    let station = add_station(&server, "Alpha", 4).await;
    let bike = add_bike(&server, &station).await;

    server
        .post("/api/rentals")
        .json(&json!({ "user_id": "maya.chen", "station_id": station, "bike_id": bike }))
        .await
        .assert_status_ok();

    let damage = server
        .post("/api/rentals/damage")
        .json(&json!({
            "user_id": "maya.chen",
            "bike_id": bike,
            "description": "Chain slipped off mid-ride",
        }))
        .await;
    damage.assert_status_ok();
    let body = damage.json::<Value>();
    assert_eq!(body["charge"]["billed_minutes"], 1);

    // Bike is gone from the available pool.
    let listing = server.get("/api/stations").await;
    assert_eq!(listing.json::<Vec<Value>>()[0]["available"], 0);

    // Report is queued for the operator.
    let reports = server.get("/api/operator/damage-reports").await;
    reports.assert_status_ok();
    let reports = reports.json::<Vec<Value>>();
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0]["bike"], bike.as_str());

    // Repair re-docks it at the station.
    let repair = server
        .post(&format!("/api/operator/bikes/{bike}/repair"))
        .json(&json!({ "station_id": station }))
        .await;
    repair.assert_status_ok();
    let listing = server.get("/api/stations").await;
    assert_eq!(listing.json::<Vec<Value>>()[0]["available"], 1);
}

#[tokio::test]
async fn invalid_user_id_is_rejected() {
    let server = server();
    let station = add_station(&server, "Alpha", 4).await;
    let bike = add_bike(&server, &station).await;

    let response = server
        .post("/api/reservations")
        .json(&json!({ "user_id": "!!", "station_id": station, "bike_id": bike }))
        .await;
    response.assert_status_bad_request();
    assert_eq!(response.json::<Value>()["error"], "invalid_user_id");
}

#[tokio::test]
async fn rider_views_for_idle_rider_return_not_found() {
    let server = server();

    server
        .get("/api/riders/idle.rider/rental")
        .await
        .assert_status_not_found();
    server
        .get("/api/riders/idle.rider/reservation")
        .await
        .assert_status_not_found();

    // History and billing are empty rather than missing.
    let rides = server.get("/api/riders/idle.rider/rides").await;
    rides.assert_status_ok();
    assert!(rides.json::<Vec<Value>>().is_empty());

    let billing = server.get("/api/riders/idle.rider/billing").await;
    billing.assert_status_ok();
    assert_eq!(billing.json::<Value>()["flex_balance_cents"], 0);
}

#[tokio::test]
async fn out_of_service_station_rejects_new_rentals() {
    let server = server();
    let station = add_station(&server, "Alpha", 4).await;
    let bike = add_bike(&server, &station).await;

    server
        .put(&format!("/api/operator/stations/{station}/status"))
        .json(&json!({ "status": "out_of_service" }))
        .await
        .assert_status_ok();

    let rent = server
        .post("/api/rentals")
        .json(&json!({ "user_id": "maya.chen", "station_id": station, "bike_id": bike }))
        .await;
    rent.assert_status(axum::http::StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(rent.json::<Value>()["error"], "STATION_OUT_OF_SERVICE");
}

#[tokio::test]
async fn openapi_spec_is_served() {
    let server = server();
    let response = server.get("/api/openapi.json").await;
    response.assert_status_ok();
    let spec = response.json::<Value>();
    assert_eq!(spec["info"]["title"], "velo API");
    assert!(spec["paths"]["/rentals/return"].is_object());
}
