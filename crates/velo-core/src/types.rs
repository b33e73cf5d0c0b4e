//! Shared identifier and domain types.
//!
//! Identifiers are thin uuid newtypes so a `BikeId` can never be passed where
//! a `DockId` is expected. Rider ids come from the external auth layer as
//! strings and are validated at the API boundary via [`UserId::parse`].

use std::fmt;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::error::{Result, VeloError};

/// Money amount in integer cents. All billing arithmetic stays in integers
/// to keep cost computation deterministic.
pub type Cents = i64;

macro_rules! define_id {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord,
            Serialize, Deserialize, ToSchema,
        )]
        #[serde(transparent)]
        pub struct $name(pub Uuid);

        impl $name {
            /// Generate a fresh random id.
            #[must_use]
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                self.0.fmt(f)
            }
        }
    };
}

define_id!(
    /// Identifier of a docking station.
    StationId
);
define_id!(
    /// Identifier of a single dock slot at a station.
    DockId
);
define_id!(
    /// Identifier of a bike in the fleet.
    BikeId
);
define_id!(
    /// Identifier of a reservation hold.
    ReservationId
);
define_id!(
    /// Identifier of a rental (one trip).
    RentalId
);
define_id!(
    /// Identifier of a damage report.
    DamageReportId
);

/// Allowed rider id format: the auth layer issues opaque account names.
static USER_ID_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9][A-Za-z0-9_.-]{2,63}$").expect("valid regex"));

/// Rider identifier issued by the (external) auth layer.
///
/// The core never creates these; it only validates their shape.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(transparent)]
pub struct UserId(String);

impl UserId {
    /// Validate and wrap a rider id.
    ///
    /// # Errors
    ///
    /// Returns [`VeloError::Validation`] if the id is not 3-64 characters of
    /// `[A-Za-z0-9_.-]` starting with an alphanumeric.
    pub fn parse(raw: &str) -> Result<Self> {
        if USER_ID_RE.is_match(raw) {
            Ok(Self(raw.to_string()))
        } else {
            Err(VeloError::Validation(format!(
                "invalid user id '{raw}': expected 3-64 characters of [A-Za-z0-9_.-]"
            )))
        }
    }

    /// The raw id string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Bike hardware class, which determines the per-minute rate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum BikeClass {
    /// Pedal-only bike.
    Standard,
    /// Electric-assist bike.
    EBike,
}

/// Lifecycle state of a bike.
///
/// Transitions are accepted only through the inventory store's
/// compare-and-set, so a bike is always in exactly one of these states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum BikeStatus {
    /// Docked and free to reserve or rent.
    Available,
    /// Held by a reservation, still docked.
    Reserved,
    /// Out with a rider.
    OnTrip,
    /// Unavailable pending operator repair.
    Maintenance,
}

/// Operational state of a station.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum StationStatus {
    /// Open for reservations, rentals, and returns.
    Active,
    /// Closed by an operator; blocks new reservations and rentals.
    OutOfService,
}

/// Lifecycle state of a rental.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum RentalStatus {
    /// Trip in progress.
    Active,
    /// Returned normally.
    Completed,
    /// Ended by a damage report.
    Damaged,
}

/// Rider loyalty tier, derived from cumulative completed trips.
///
/// Ordering follows promotion order, so `Gold > Bronze`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, ToSchema,
)]
#[serde(rename_all = "snake_case")]
pub enum LoyaltyTier {
    /// No tier yet.
    None,
    /// First tier.
    Bronze,
    /// Second tier.
    Silver,
    /// Third tier.
    Gold,
    /// Top tier.
    Platinum,
}

/// Geographic coordinate of a station.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct GeoPoint {
    /// Latitude in degrees.
    pub lat: f64,
    /// Longitude in degrees.
    pub lon: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_id_accepts_typical_account_names() {
        assert!(UserId::parse("rider-42").is_ok());
        assert!(UserId::parse("a.b_c").is_ok());
        assert!(UserId::parse("U123456").is_ok());
    }

    #[test]
    fn test_user_id_rejects_malformed_input() {
        assert!(UserId::parse("").is_err());
        assert!(UserId::parse("ab").is_err());
        assert!(UserId::parse("-leading-dash").is_err());
        assert!(UserId::parse("has spaces").is_err());
        assert!(UserId::parse(&"x".repeat(65)).is_err());
    }

    #[test]
    fn test_ids_are_distinct_types_with_stable_display() {
        let bike = BikeId::new();
        let parsed: BikeId = serde_json::from_str(&serde_json::to_string(&bike).unwrap()).unwrap();
        assert_eq!(bike, parsed);
        assert_eq!(bike.to_string(), bike.0.to_string());
    }

    #[test]
    fn test_tier_ordering_matches_promotion_order() {
        assert!(LoyaltyTier::None < LoyaltyTier::Bronze);
        assert!(LoyaltyTier::Bronze < LoyaltyTier::Silver);
        assert!(LoyaltyTier::Silver < LoyaltyTier::Gold);
        assert!(LoyaltyTier::Gold < LoyaltyTier::Platinum);
    }

    #[test]
    fn test_bike_status_serializes_snake_case() {
        assert_eq!(
            serde_json::to_string(&BikeStatus::OnTrip).unwrap(),
            "\"on_trip\""
        );
        assert_eq!(
            serde_json::to_string(&BikeClass::EBike).unwrap(),
            "\"e_bike\""
        );
    }
}
