//! API error types and response handling.
//!
//! This module provides a unified error type for all API handlers
//! with automatic conversion to appropriate HTTP responses.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use velo_core::VeloError;

/// Result type alias for API handlers.
pub type ApiResult<T> = Result<T, ApiError>;

/// Unified API error type.
///
/// Each variant maps to a specific HTTP status code and produces a
/// consistent JSON error response.
#[derive(Debug, Clone)]
pub enum ApiError {
    /// 400 Bad Request - Invalid input from client.
    BadRequest {
        /// Machine-readable error code.
        error_code: String,
        /// Human-readable error message.
        message: String,
    },

    /// 404 Not Found - Resource does not exist.
    NotFound {
        /// Machine-readable error code.
        error_code: String,
        /// Human-readable error message.
        message: String,
    },

    /// 409 Conflict - A competing operation holds the resource.
    Conflict {
        /// Machine-readable error code.
        error_code: String,
        /// Human-readable error message.
        message: String,
        /// Conflict specifics (e.g. the existing reservation and its
        /// expiry), so clients can present the blocking state.
        details: Option<serde_json::Value>,
    },

    /// 422 Unprocessable Entity - The entity exists but cannot accept
    /// the operation in its current state.
    InvalidState {
        /// Machine-readable error code.
        error_code: String,
        /// Human-readable error message.
        message: String,
    },

    /// 500 Internal Server Error - Unexpected server-side error.
    ///
    /// A `PERSISTENCE_ERROR` from a state-changing endpoint means the
    /// change was applied in memory but the snapshot save failed; the
    /// client should re-read current state before retrying, since the
    /// retry may answer `ALREADY_RENTING` or `NO_ACTIVE_RENTAL` for an
    /// operation that did take effect.
    InternalError {
        /// Machine-readable error code.
        error_code: String,
        /// Human-readable error message.
        message: String,
        /// Optional details (not exposed to client in production).
        details: Option<String>,
    },
}

/// Standard JSON error response body.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[schema(example = json!({
    "error": "bike_not_available",
    "message": "bike is not available (status: on_trip)",
    "details": null
}))]
pub struct ErrorResponse {
    /// Machine-readable error code (e.g., "bike_not_available").
    #[schema(example = "bike_not_available")]
    pub error: String,

    /// Human-readable error message.
    #[schema(example = "bike is not available (status: on_trip)")]
    pub message: String,

    /// Optional additional details for debugging.
    #[schema(nullable)]
    pub details: Option<serde_json::Value>,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_response) = match self {
            Self::BadRequest { error_code, message } => (
                StatusCode::BAD_REQUEST,
                ErrorResponse {
                    error: error_code,
                    message,
                    details: None,
                },
            ),

            Self::NotFound { error_code, message } => (
                StatusCode::NOT_FOUND,
                ErrorResponse {
                    error: error_code,
                    message,
                    details: None,
                },
            ),

            Self::Conflict {
                error_code,
                message,
                details,
            } => (
                StatusCode::CONFLICT,
                ErrorResponse {
                    error: error_code,
                    message,
                    details,
                },
            ),

            Self::InvalidState { error_code, message } => (
                StatusCode::UNPROCESSABLE_ENTITY,
                ErrorResponse {
                    error: error_code,
                    message,
                    details: None,
                },
            ),

            Self::InternalError {
                error_code,
                message,
                details,
            } => {
                // Log internal errors
                tracing::error!(
                    error_code = %error_code,
                    message = %message,
                    details = ?details,
                    "Internal server error"
                );

                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ErrorResponse {
                        error: error_code,
                        message,
                        details: details.map(|d| serde_json::json!(d)),
                    },
                )
            }
        };

        (status, Json(error_response)).into_response()
    }
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::BadRequest { message, .. } => write!(f, "Bad Request: {message}"),
            Self::NotFound { message, .. } => write!(f, "Not Found: {message}"),
            Self::Conflict { message, .. } => write!(f, "Conflict: {message}"),
            Self::InvalidState { message, .. } => write!(f, "Invalid State: {message}"),
            Self::InternalError { message, .. } => write!(f, "Internal Error: {message}"),
        }
    }
}

impl std::error::Error for ApiError {}

/// Convert from velo_core errors. The HTTP class comes straight from
/// [`VeloError::http_status_code`], so the engine's taxonomy cannot drift
/// from the wire mapping; only the conflict details are extracted here.
impl From<VeloError> for ApiError {
    fn from(err: VeloError) -> Self {
        let error_code = err.error_code().to_string();
        let message = err.to_string();

        // Conflict specifics so clients can present the blocking state.
        let details = match &err {
            VeloError::AlreadyReserved {
                reservation,
                bike,
                expires_at,
            } => Some(serde_json::json!({
                "reservation_id": reservation,
                "bike_id": bike,
                "expires_at": expires_at,
            })),
            VeloError::AlreadyRenting { rental, bike } => Some(serde_json::json!({
                "rental_id": rental,
                "bike_id": bike,
            })),
            _ => None,
        };

        match err.http_status_code() {
            400 => Self::BadRequest { error_code, message },
            404 => Self::NotFound { error_code, message },
            409 => Self::Conflict {
                error_code,
                message,
                details,
            },
            422 => Self::InvalidState { error_code, message },
            _ => Self::InternalError {
                error_code,
                message,
                details: None,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use velo_core::types::BikeId;

    #[test]
    fn test_bad_request_error() {
        let err = ApiError::BadRequest {
            error_code: "test_error".to_string(),
            message: "Test message".to_string(),
        };
        assert!(err.to_string().contains("Bad Request"));
    }

    #[test]
    fn test_error_response_serialization() {
        let response = ErrorResponse {
            error: "test_error".to_string(),
            message: "Test message".to_string(),
            details: None,
        };
        let json = serde_json::to_string(&response).unwrap();
        assert!(json.contains("test_error"));
    }

    #[test]
    fn test_not_found_maps_to_404() {
        let err = ApiError::from(VeloError::BikeNotFound(BikeId::new()));
        assert!(matches!(err, ApiError::NotFound { .. }));
    }

    #[test]
    fn test_no_active_rental_maps_to_404() {
        let err = ApiError::from(VeloError::NoActiveRental);
        assert!(matches!(err, ApiError::NotFound { .. }));
    }

    #[test]
    fn test_validation_maps_to_400() {
        let err = ApiError::from(VeloError::Validation("bad input".into()));
        assert!(matches!(err, ApiError::BadRequest { .. }));
    }

    #[test]
    fn test_http_class_follows_core_status_codes() {
        use velo_core::types::{BikeStatus, DockId, RentalId, StationId};

        let errors = vec![
            VeloError::Validation("bad input".into()),
            VeloError::StationNotFound(StationId::new()),
            VeloError::ReservationNotFound,
            VeloError::NoActiveRental,
            VeloError::TransitionConflict {
                bike: BikeId::new(),
                expected: BikeStatus::Available,
                actual: BikeStatus::OnTrip,
            },
            VeloError::AlreadyRenting {
                rental: RentalId::new(),
                bike: BikeId::new(),
            },
            VeloError::BikeNotAvailable {
                bike: BikeId::new(),
                status: BikeStatus::Maintenance,
            },
            VeloError::StationOutOfService(StationId::new()),
            VeloError::DockOccupied(DockId::new()),
            VeloError::StationFull(StationId::new()),
            VeloError::Persistence("disk full".into()),
        ];

        for err in errors {
            let expected = err.http_status_code();
            let status = ApiError::from(err).into_response().status();
            assert_eq!(status.as_u16(), expected);
        }
    }

    #[test]
    fn test_already_reserved_carries_details() {
        let err = ApiError::from(VeloError::AlreadyReserved {
            reservation: velo_core::types::ReservationId::new(),
            bike: BikeId::new(),
            expires_at: chrono::Utc::now(),
        });
        match err {
            ApiError::Conflict { details, .. } => assert!(details.is_some()),
            other => panic!("expected conflict, got {other:?}"),
        }
    }
}
