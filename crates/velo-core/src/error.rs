//! Unified error types for the velo core library.
//!
//! The taxonomy follows four classes:
//!
//! - **Not found**: station/bike/dock/reservation/rental absent
//! - **Conflict**: an optimistic state transition lost a race; safe to retry
//!   after refreshing
//! - **Invalid state**: a business precondition failed (already reserved,
//!   already renting, bike not available, station out of service, dock
//!   occupied); retrying without a state change cannot succeed
//! - **Validation / persistence**: malformed input or storage failure
//!
//! Each variant carries the data a caller needs to act on the failure, and
//! the helpers [`VeloError::http_status_code`] / [`VeloError::error_code`]
//! keep the HTTP mapping in one place.

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::types::{
    BikeId, BikeStatus, DockId, RentalId, ReservationId, StationId,
};

/// The unified error type for all velo operations.
#[derive(Debug, Clone, Error)]
pub enum VeloError {
    // =========================================================================
    // NOT FOUND
    // =========================================================================
    /// No station with the given id exists.
    #[error("Station not found: {0}")]
    StationNotFound(StationId),

    /// No bike with the given id exists.
    #[error("Bike not found: {0}")]
    BikeNotFound(BikeId),

    /// No dock with the given id exists.
    #[error("Dock not found: {0}")]
    DockNotFound(DockId),

    /// No matching active reservation exists for this user.
    #[error("No active reservation found")]
    ReservationNotFound,

    /// The user has no active rental. Also the stable terminal answer when a
    /// return or damage report is retried after already completing.
    #[error("No active rental found")]
    NoActiveRental,

    // =========================================================================
    // CONFLICT (lost race - safe to retry after refresh)
    // =========================================================================
    /// A compare-and-set transition found the bike in a different state than
    /// expected. Another request won the race; refresh and retry.
    #[error("Transition conflict on bike {bike}: expected {expected:?}, found {actual:?}")]
    TransitionConflict {
        /// Bike whose transition was rejected.
        bike: BikeId,
        /// Status the caller expected.
        expected: BikeStatus,
        /// Status actually recorded.
        actual: BikeStatus,
    },

    // =========================================================================
    // INVALID STATE (business precondition violated)
    // =========================================================================
    /// The user already holds a non-expired reservation. Carries the existing
    /// hold so the caller can present it.
    #[error("User already holds an active reservation on bike {bike} (expires {expires_at})")]
    AlreadyReserved {
        /// The existing reservation.
        reservation: ReservationId,
        /// Bike the existing reservation holds.
        bike: BikeId,
        /// When the existing hold lapses.
        expires_at: DateTime<Utc>,
    },

    /// The user already has a trip in progress.
    #[error("User already has an active rental ({rental}) on bike {bike}")]
    AlreadyRenting {
        /// The active rental.
        rental: RentalId,
        /// Bike currently out with the user.
        bike: BikeId,
    },

    /// The bike cannot be reserved or rented in its current state. Includes
    /// the case of a bike reserved by a different user.
    #[error("Bike {bike} is not available (status: {status:?})")]
    BikeNotAvailable {
        /// The requested bike.
        bike: BikeId,
        /// Its current status.
        status: BikeStatus,
    },

    /// The station is closed by an operator.
    #[error("Station {0} is out of service")]
    StationOutOfService(StationId),

    /// The target dock already holds a bike.
    #[error("Dock {0} is occupied")]
    DockOccupied(DockId),

    /// The station has no free dock for this bike.
    #[error("Station {0} has no free dock")]
    StationFull(StationId),

    // =========================================================================
    // VALIDATION / PERSISTENCE
    // =========================================================================
    /// Malformed or inconsistent input.
    #[error("Validation failed: {0}")]
    Validation(String),

    /// The configuration file could not be parsed.
    #[error("Failed to parse configuration: {0}")]
    ConfigParse(String),

    /// The configuration was parsed but contains invalid values.
    #[error("Configuration validation failed: {0}")]
    ConfigValidation(String),

    /// Reading or writing persisted state failed.
    #[error("Persistence error: {0}")]
    Persistence(String),
}

/// A specialized [`Result`] type for velo operations.
pub type Result<T> = std::result::Result<T, VeloError>;

impl VeloError {
    /// Returns `true` if the resource named by the request does not exist.
    #[inline]
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::StationNotFound(_)
                | Self::BikeNotFound(_)
                | Self::DockNotFound(_)
                | Self::ReservationNotFound
                | Self::NoActiveRental
        )
    }

    /// Returns `true` if a business precondition was violated.
    ///
    /// These must surface to the caller; retrying without a state change
    /// cannot change the outcome.
    #[inline]
    #[must_use]
    pub const fn is_invalid_state(&self) -> bool {
        matches!(
            self,
            Self::AlreadyReserved { .. }
                | Self::AlreadyRenting { .. }
                | Self::BikeNotAvailable { .. }
                | Self::StationOutOfService(_)
                | Self::DockOccupied(_)
                | Self::StationFull(_)
        )
    }

    /// Returns `true` if an automatic retry is safe.
    ///
    /// Only lost-race conflicts and transient persistence failures qualify.
    #[inline]
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::TransitionConflict { .. } | Self::Persistence(_))
    }

    /// Returns an HTTP-appropriate status code for this error.
    #[inline]
    #[must_use]
    pub const fn http_status_code(&self) -> u16 {
        match self {
            Self::Validation(_) => 400,

            Self::StationNotFound(_)
            | Self::BikeNotFound(_)
            | Self::DockNotFound(_)
            | Self::ReservationNotFound
            | Self::NoActiveRental => 404,

            // Lost races and competing holds are conflicts; an entity in
            // the wrong lifecycle state is unprocessable.
            Self::TransitionConflict { .. }
            | Self::AlreadyReserved { .. }
            | Self::AlreadyRenting { .. } => 409,

            Self::BikeNotAvailable { .. }
            | Self::StationOutOfService(_)
            | Self::DockOccupied(_)
            | Self::StationFull(_) => 422,

            Self::ConfigParse(_) | Self::ConfigValidation(_) | Self::Persistence(_) => 500,
        }
    }

    /// Returns a machine-readable error code for API responses.
    #[inline]
    #[must_use]
    pub const fn error_code(&self) -> &'static str {
        match self {
            Self::StationNotFound(_) => "STATION_NOT_FOUND",
            Self::BikeNotFound(_) => "BIKE_NOT_FOUND",
            Self::DockNotFound(_) => "DOCK_NOT_FOUND",
            Self::ReservationNotFound => "RESERVATION_NOT_FOUND",
            Self::NoActiveRental => "NO_ACTIVE_RENTAL",
            Self::TransitionConflict { .. } => "CONFLICT",
            Self::AlreadyReserved { .. } => "ALREADY_RESERVED",
            Self::AlreadyRenting { .. } => "ALREADY_RENTING",
            Self::BikeNotAvailable { .. } => "BIKE_NOT_AVAILABLE",
            Self::StationOutOfService(_) => "STATION_OUT_OF_SERVICE",
            Self::DockOccupied(_) => "DOCK_OCCUPIED",
            Self::StationFull(_) => "STATION_FULL",
            Self::Validation(_) => "VALIDATION_ERROR",
            Self::ConfigParse(_) => "CONFIG_PARSE_ERROR",
            Self::ConfigValidation(_) => "CONFIG_VALIDATION_ERROR",
            Self::Persistence(_) => "PERSISTENCE_ERROR",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_classification() {
        assert!(VeloError::StationNotFound(StationId::new()).is_not_found());
        assert!(VeloError::BikeNotFound(BikeId::new()).is_not_found());
        assert!(VeloError::ReservationNotFound.is_not_found());
        assert!(VeloError::NoActiveRental.is_not_found());
        assert!(!VeloError::ReservationNotFound.is_invalid_state());
    }

    #[test]
    fn test_invalid_state_classification() {
        let err = VeloError::BikeNotAvailable {
            bike: BikeId::new(),
            status: BikeStatus::OnTrip,
        };
        assert!(err.is_invalid_state());
        assert!(!err.is_retryable());
        assert!(VeloError::DockOccupied(DockId::new()).is_invalid_state());
        assert!(VeloError::StationOutOfService(StationId::new()).is_invalid_state());
    }

    #[test]
    fn test_only_conflicts_and_persistence_are_retryable() {
        let conflict = VeloError::TransitionConflict {
            bike: BikeId::new(),
            expected: BikeStatus::Available,
            actual: BikeStatus::Reserved,
        };
        assert!(conflict.is_retryable());
        assert!(VeloError::Persistence("disk full".into()).is_retryable());

        assert!(!VeloError::NoActiveRental.is_retryable());
        assert!(!VeloError::Validation("bad".into()).is_retryable());
        let already = VeloError::AlreadyRenting {
            rental: RentalId::new(),
            bike: BikeId::new(),
        };
        assert!(!already.is_retryable());
    }

    #[test]
    fn test_http_status_codes() {
        assert_eq!(VeloError::Validation("bad".into()).http_status_code(), 400);
        assert_eq!(VeloError::NoActiveRental.http_status_code(), 404);
        assert_eq!(
            VeloError::DockOccupied(DockId::new()).http_status_code(),
            422
        );
        assert_eq!(
            VeloError::TransitionConflict {
                bike: BikeId::new(),
                expected: BikeStatus::Available,
                actual: BikeStatus::OnTrip,
            }
            .http_status_code(),
            409
        );
        assert_eq!(
            VeloError::Persistence("disk".into()).http_status_code(),
            500
        );
    }

    #[test]
    fn test_error_codes_are_stable() {
        assert_eq!(VeloError::ReservationNotFound.error_code(), "RESERVATION_NOT_FOUND");
        assert_eq!(
            VeloError::BikeNotAvailable {
                bike: BikeId::new(),
                status: BikeStatus::Maintenance,
            }
            .error_code(),
            "BIKE_NOT_AVAILABLE"
        );
    }

    #[test]
    fn test_display_messages_name_the_entity() {
        let bike = BikeId::new();
        let err = VeloError::BikeNotFound(bike);
        assert!(err.to_string().contains(&bike.to_string()));
    }

    #[test]
    fn test_error_is_send_and_sync() {
        fn assert_send<T: Send>() {}
        fn assert_sync<T: Sync>() {}

        assert_send::<VeloError>();
        assert_sync::<VeloError>();
    }
}
