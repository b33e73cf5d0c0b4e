//! # velo-core
//!
//! Core engine for the velo city bike-share fleet.
//!
//! This crate provides:
//! - Station, dock, and bike inventory with guarded state transitions
//! - Reservation holds with lazy expiry
//! - Rental lifecycle (rent, return, damage reports)
//! - Per-minute pricing with loyalty discounts and flex-dollar offsets
//! - Loyalty tiers and the flex-dollar ledger
//! - Persistent storage for fleet state
//!
//! ## Architecture
//!
//! The crate is organized into the following modules:
//!
//! - [`fleet`] - The engine: atomic operations over the whole fleet
//! - [`inventory`] - Stations, docks, bikes, and compare-and-set transitions
//! - [`reservation`] - Reservation holds and expiry
//! - [`rental`] - Rental records, ride history, and damage reports
//! - [`pricing`] - Trip charge computation
//! - [`loyalty`] - Loyalty tiers and the flex-dollar ledger
//! - [`events`] - Typed domain events for downstream notification
//! - [`config`] - Pricing/loyalty/reward configuration loading and validation
//! - [`storage`] - Persistent storage for fleet state using JSON files
//! - [`clock`] - Time source abstraction (manual clock for tests)
//! - [`error`] - Unified error types for the crate
//! - [`types`] - Shared ids, enums, and OpenAPI schemas

#![forbid(unsafe_code)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![warn(missing_docs)]

pub mod clock;
pub mod config;
pub mod error;
pub mod events;
pub mod fleet;
pub mod inventory;
pub mod loyalty;
pub mod pricing;
pub mod rental;
pub mod reservation;
pub mod storage;
pub mod types;

// Re-export primary types for convenience
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{
    LoyaltyConfig, PricingConfig, ReservationConfig, RewardConfig, TierBand, VeloConfig,
};
pub use error::{Result, VeloError};
pub use events::{EventOutbox, FleetEvent};
pub use fleet::{
    BillingHistory, DamageReceipt, Fleet, FleetState, RentalReceipt, ReturnReceipt,
    StationSummary, MAX_DAMAGE_DESCRIPTION_LENGTH,
};
pub use inventory::{
    Bike, BikeView, Dock, DockPlacement, DockView, Inventory, Station, StationSnapshot,
};
pub use loyalty::{FlexTransaction, FlexTransactionKind, LoyaltyAccount, LoyaltyLedger, TierChange};
pub use pricing::{billable_minutes, compute_charge, TripCharge};
pub use rental::{DamageReport, Rental, RentalLog, RideHistoryFilter};
pub use reservation::{Reservation, ReservationBook};
pub use storage::Storage;
pub use types::{
    BikeClass, BikeId, BikeStatus, Cents, DamageReportId, DockId, GeoPoint, LoyaltyTier,
    RentalId, RentalStatus, ReservationId, StationId, StationStatus, UserId,
};
