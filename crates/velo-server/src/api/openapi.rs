//! OpenAPI specification generation for the velo API.
//!
//! This module generates an OpenAPI 3.0 specification that is consumed by
//! the rider and operator front ends for typed client generation.

use axum::Json;
use utoipa::OpenApi;

use velo_core::types::{
    BikeClass, BikeId, BikeStatus, DamageReportId, DockId, GeoPoint, LoyaltyTier, RentalId,
    RentalStatus, ReservationId, StationId, StationStatus,
};
use velo_core::{
    BikeView, BillingHistory, DamageReport, DockView, FlexTransaction, FlexTransactionKind,
    Rental, Reservation, StationSnapshot, StationSummary, TripCharge,
};

// Import all the handler modules to reference their types
use super::error::ErrorResponse;
use super::health::HealthResponse;
use super::operator::{
    AddBikeRequest, AddBikeResponse, AddStationRequest, AddStationResponse, MoveBikeRequest,
    OperatorAck, RepairBikeRequest, SetStationStatusRequest,
};
use super::rentals::{
    DamageRequest, DamageResponse, RentRequest, RentResponse, ReturnRequest, ReturnResponse,
};
use super::reservations::{
    CancelReservationRequest, CancelReservationResponse, ReserveRequest, ReserveResponse,
};

/// Serve the OpenAPI specification as JSON.
///
/// This endpoint is available at `/api/openapi.json` and returns the
/// complete OpenAPI 3.0 specification for the velo API.
pub async fn get_openapi_spec() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}

/// Returns the OpenAPI specification as a string (for writing to file).
/// Used by the gen-openapi binary.
#[allow(dead_code)]
pub fn get_openapi_json() -> String {
    ApiDoc::openapi()
        .to_pretty_json()
        .expect("Failed to serialize OpenAPI spec")
}

/// Main OpenAPI document structure for velo.
#[derive(OpenApi)]
#[openapi(
    info(
        title = "velo API",
        version = "0.1.0",
        description = r#"
# velo API

velo runs a city bike-share fleet: stations of docks, standard and
electric bikes, reservations, rentals, per-minute pricing, and a loyalty
program.

## Overview

1. **Stations**: Browse stations and per-dock availability
2. **Reservations**: Hold a bike for a tier-dependent window before walking over
3. **Rentals**: Rent, return, and report damage; trips bill per round-up minute
4. **Loyalty**: Completed trips earn tier discounts, longer holds, and flex-dollar rewards

## Billing

Trip charges are computed at return time: duration rounds up to whole
minutes (minimum one), the rider's tier discount applies, then any
flex-dollar balance offsets the remainder down to zero. Returning a bike
to a station under 25% occupancy earns a flex-dollar credit.

## Errors

Errors share one JSON body: `error` (machine-readable code), `message`,
and optional `details`. A `500 PERSISTENCE_ERROR` from a state-changing
endpoint means the change was applied but saving the fleet snapshot
failed; re-read current state (e.g. the rider's active rental) before
retrying, since the retry may answer `ALREADY_RENTING` or
`NO_ACTIVE_RENTAL` for an operation that did take effect.

## Operators

Endpoints under `/api/operator` manage the physical fleet (stations,
bikes, repairs, rebalancing) and are expected to sit behind operator
authentication at the gateway.
"#,
        license(name = "MIT", url = "https://opensource.org/licenses/MIT")
    ),
    servers(
        (url = "/", description = "Local velo server")
    ),
    tags(
        (
            name = "system",
            description = "Health checks and system status"
        ),
        (
            name = "stations",
            description = "Station browsing and per-dock availability"
        ),
        (
            name = "reservations",
            description = "Bike holds with tier-dependent expiry windows"
        ),
        (
            name = "rentals",
            description = "Rental lifecycle: rent, return, damage reports"
        ),
        (
            name = "riders",
            description = "Rider views: active rental, history, billing"
        ),
        (
            name = "operator",
            description = "Fleet administration: stations, bikes, repairs"
        )
    ),
    paths(
        // Health endpoints
        super::health::health_check,
        // Station endpoints
        super::stations::list_stations,
        super::stations::get_station,
        // Reservation endpoints
        super::reservations::reserve_bike,
        super::reservations::cancel_reservation,
        // Rental endpoints
        super::rentals::rent_bike,
        super::rentals::return_bike,
        super::rentals::report_damage,
        // Rider endpoints
        super::riders::get_active_rental,
        super::riders::get_active_reservation,
        super::riders::get_ride_history,
        super::riders::get_billing_history,
        // Operator endpoints
        super::operator::add_station,
        super::operator::remove_station,
        super::operator::set_station_status,
        super::operator::add_bike,
        super::operator::remove_bike,
        super::operator::repair_bike,
        super::operator::move_bike,
        super::operator::list_damage_reports,
    ),
    components(
        schemas(
            // Error types
            ErrorResponse,
            // Health types
            HealthResponse,
            // Core ids and enums
            StationId,
            DockId,
            BikeId,
            ReservationId,
            RentalId,
            DamageReportId,
            BikeClass,
            BikeStatus,
            StationStatus,
            RentalStatus,
            LoyaltyTier,
            GeoPoint,
            // Station types
            StationSummary,
            StationSnapshot,
            DockView,
            BikeView,
            // Reservation types
            Reservation,
            ReserveRequest,
            ReserveResponse,
            CancelReservationRequest,
            CancelReservationResponse,
            // Rental types
            Rental,
            TripCharge,
            RentRequest,
            RentResponse,
            ReturnRequest,
            ReturnResponse,
            DamageRequest,
            DamageResponse,
            DamageReport,
            // Rider types
            BillingHistory,
            FlexTransaction,
            FlexTransactionKind,
            // Operator types
            AddStationRequest,
            AddStationResponse,
            SetStationStatusRequest,
            AddBikeRequest,
            AddBikeResponse,
            RepairBikeRequest,
            MoveBikeRequest,
            OperatorAck,
        )
    )
)]
pub struct ApiDoc;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_openapi_spec_generation() {
        let spec = ApiDoc::openapi();
        assert_eq!(spec.info.title, "velo API");
        assert!(!spec.paths.paths.is_empty());
    }

    #[test]
    fn test_openapi_json_serialization() {
        let json = get_openapi_json();
        assert!(json.contains("\"openapi\":"));
        assert!(json.contains("\"velo API\""));
    }
}
