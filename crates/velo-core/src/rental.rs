//! Rental records and ride/billing history.
//!
//! Rentals are append-mostly: a row is created at rent time, mutated exactly
//! once at completion (return or damage report), and immutable afterwards.
//! Damage reports are plain append-only rows for operator follow-up.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use utoipa::ToSchema;

use crate::error::{Result, VeloError};
use crate::pricing::TripCharge;
use crate::types::{
    BikeClass, BikeId, DamageReportId, DockId, RentalId, RentalStatus, StationId, UserId,
};

/// One trip, from undock to dock (or damage report).
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Rental {
    /// Rental id.
    pub id: RentalId,
    /// Rider.
    pub user: UserId,
    /// Bike out on the trip.
    pub bike: BikeId,
    /// Bike class at rent time, fixed for billing.
    pub bike_class: BikeClass,
    /// Station the trip started from.
    pub start_station: StationId,
    /// Dock the bike left.
    pub start_dock: DockId,
    /// Trip start.
    pub start_time: DateTime<Utc>,
    /// Station the trip ended at; `None` while active or after a mid-trip
    /// damage report.
    pub end_station: Option<StationId>,
    /// Dock the bike was returned to; `None` while active.
    pub end_dock: Option<DockId>,
    /// Trip end; `None` while active.
    pub end_time: Option<DateTime<Utc>>,
    /// Lifecycle status.
    pub status: RentalStatus,
    /// Pricing breakdown; `None` until completed.
    pub charge: Option<TripCharge>,
}

impl Rental {
    /// Whether the trip is still in progress.
    #[must_use]
    pub const fn is_active(&self) -> bool {
        matches!(self.status, RentalStatus::Active)
    }
}

/// A rider-filed damage report.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct DamageReport {
    /// Report id.
    pub id: DamageReportId,
    /// Rental the report ended.
    pub rental: RentalId,
    /// Damaged bike.
    pub bike: BikeId,
    /// Reporting rider.
    pub user: UserId,
    /// Station the bike was at, when known. A mid-trip report has none.
    pub station: Option<StationId>,
    /// Rider's description of the damage.
    pub description: String,
    /// When the report was filed.
    pub reported_at: DateTime<Utc>,
}

/// Filters for ride-history queries. All fields optional; absent means
/// unfiltered.
#[derive(Debug, Clone, Copy, Default)]
pub struct RideHistoryFilter {
    /// Only trips starting at or after this instant.
    pub from: Option<DateTime<Utc>>,
    /// Only trips starting before this instant.
    pub to: Option<DateTime<Utc>>,
    /// Only trips with this status.
    pub status: Option<RentalStatus>,
}

/// All rentals plus the active-rental index and damage reports.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct RentalLog {
    rentals: HashMap<RentalId, Rental>,
    active_by_user: HashMap<UserId, RentalId>,
    /// Insertion order, for stable history listings.
    order: Vec<RentalId>,
    damage_reports: Vec<DamageReport>,
}

impl RentalLog {
    /// Create an empty log.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The user's active rental, if any.
    #[must_use]
    pub fn active_for_user(&self, user: &UserId) -> Option<&Rental> {
        self.active_by_user
            .get(user)
            .and_then(|id| self.rentals.get(id))
    }

    /// Fetch a rental.
    #[must_use]
    pub fn get(&self, id: RentalId) -> Option<&Rental> {
        self.rentals.get(&id)
    }

    /// Open a rental at trip start. The caller has already verified the user
    /// holds no other active rental.
    pub fn open(
        &mut self,
        user: UserId,
        bike: BikeId,
        bike_class: BikeClass,
        start_station: StationId,
        start_dock: DockId,
        start_time: DateTime<Utc>,
    ) -> RentalId {
        let id = RentalId::new();
        let rental = Rental {
            id,
            user: user.clone(),
            bike,
            bike_class,
            start_station,
            start_dock,
            start_time,
            end_station: None,
            end_dock: None,
            end_time: None,
            status: RentalStatus::Active,
            charge: None,
        };
        self.rentals.insert(id, rental);
        self.active_by_user.insert(user, id);
        self.order.push(id);
        id
    }

    /// Complete a rental exactly once. `end_station`/`end_dock` are `None`
    /// for a mid-trip damage report.
    ///
    /// # Errors
    ///
    /// Returns [`VeloError::NoActiveRental`] if the rental does not exist or
    /// is already completed - the stable terminal answer for retries.
    pub fn complete(
        &mut self,
        id: RentalId,
        end_station: Option<StationId>,
        end_dock: Option<DockId>,
        end_time: DateTime<Utc>,
        status: RentalStatus,
        charge: TripCharge,
    ) -> Result<()> {
        let rental = self.rentals.get_mut(&id).ok_or(VeloError::NoActiveRental)?;
        if !rental.is_active() {
            return Err(VeloError::NoActiveRental);
        }
        rental.end_station = end_station;
        rental.end_dock = end_dock;
        rental.end_time = Some(end_time);
        rental.status = status;
        rental.charge = Some(charge);
        self.active_by_user.remove(&rental.user);
        Ok(())
    }

    /// The user's trips, oldest first, with optional filters.
    #[must_use]
    pub fn history(&self, user: &UserId, filter: &RideHistoryFilter) -> Vec<&Rental> {
        self.order
            .iter()
            .filter_map(|id| self.rentals.get(id))
            .filter(|r| r.user == *user)
            .filter(|r| filter.from.map_or(true, |from| r.start_time >= from))
            .filter(|r| filter.to.map_or(true, |to| r.start_time < to))
            .filter(|r| filter.status.map_or(true, |s| r.status == s))
            .collect()
    }

    /// The user's completed (billed) trips, oldest first.
    #[must_use]
    pub fn billed(&self, user: &UserId) -> Vec<&Rental> {
        self.order
            .iter()
            .filter_map(|id| self.rentals.get(id))
            .filter(|r| r.user == *user && !r.is_active())
            .collect()
    }

    /// Append a damage report row.
    pub fn add_damage_report(&mut self, report: DamageReport) {
        self.damage_reports.push(report);
    }

    /// All damage reports, oldest first.
    #[must_use]
    pub fn damage_reports(&self) -> &[DamageReport] {
        &self.damage_reports
    }
}
