//! The fleet engine: rental lifecycle orchestration over the inventory.
//!
//! Every public operation here is a single atomic unit. Callers serialize
//! access (the server wraps the engine in a `RwLock`), and inside each
//! operation all validation happens against authoritative state before the
//! first mutation; the bike's compare-and-set transition is the commit
//! point. A failed operation leaves every entity exactly as it found it.
//!
//! Pricing and loyalty updates are pure local computation and run inside
//! the same transaction boundary; nothing here performs network I/O.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use utoipa::ToSchema;

use crate::clock::Clock;
use crate::config::VeloConfig;
use crate::error::{Result, VeloError};
use crate::events::{EventOutbox, FleetEvent};
use crate::inventory::{DockPlacement, Inventory, StationSnapshot};
use crate::loyalty::{FlexTransaction, LoyaltyLedger, TierChange};
use crate::pricing::{self, TripCharge};
use crate::rental::{DamageReport, Rental, RentalLog, RideHistoryFilter};
use crate::reservation::{Reservation, ReservationBook};
use crate::storage::Storage;
use crate::types::{
    BikeClass, BikeId, BikeStatus, Cents, DamageReportId, DockId, GeoPoint, RentalId,
    RentalStatus, StationId, StationStatus, UserId,
};

/// Maximum accepted damage-report description length, in characters.
pub const MAX_DAMAGE_DESCRIPTION_LENGTH: usize = 1000;

/// The persisted portion of the engine: everything except config, clock,
/// and the undelivered event buffer.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct FleetState {
    /// Stations, docks, and bikes.
    pub inventory: Inventory,
    /// Active reservation holds.
    pub reservations: ReservationBook,
    /// Rentals and damage reports.
    pub rentals: RentalLog,
    /// Loyalty accounts and the flex-dollar ledger.
    pub loyalty: LoyaltyLedger,
}

/// Confirmation returned by a successful rent.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct RentalReceipt {
    /// The new rental.
    pub rental_id: RentalId,
    /// The undocked bike.
    pub bike: BikeId,
    /// Trip start time.
    pub started_at: DateTime<Utc>,
}

/// Confirmation returned by a successful return.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ReturnReceipt {
    /// The completed rental.
    pub rental_id: RentalId,
    /// Full pricing breakdown.
    pub charge: TripCharge,
    /// Flex dollars credited for refilling a low-occupancy station, if any.
    pub flex_credited_cents: Option<Cents>,
    /// Loyalty tier change produced by this trip, if any.
    pub tier_change: Option<TierChange>,
}

/// Confirmation returned by a damage report.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct DamageReceipt {
    /// The recorded report.
    pub report_id: DamageReportId,
    /// The rental the report ended.
    pub rental_id: RentalId,
    /// Pricing breakdown for the partial trip.
    pub charge: TripCharge,
    /// Loyalty tier change produced by this trip, if any.
    pub tier_change: Option<TierChange>,
}

/// Compact per-station listing for the map view.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct StationSummary {
    /// Station id.
    pub station_id: StationId,
    /// Display name.
    pub name: String,
    /// Operational status.
    pub status: StationStatus,
    /// Geographic location.
    pub location: GeoPoint,
    /// Total dock capacity.
    pub capacity: usize,
    /// Bikes currently docked.
    pub docked: usize,
    /// Docked bikes currently rentable.
    pub available: usize,
}

/// A rider's billing view: completed trips plus the flex-dollar ledger.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct BillingHistory {
    /// Completed (billed) trips, oldest first.
    pub trips: Vec<Rental>,
    /// Flex-dollar ledger rows, oldest first.
    pub flex_transactions: Vec<FlexTransaction>,
    /// Current flex-dollar balance.
    pub flex_balance_cents: Cents,
}

/// The fleet engine.
pub struct Fleet {
    state: FleetState,
    outbox: EventOutbox,
    config: VeloConfig,
    clock: Arc<dyn Clock>,
    storage: Option<Storage>,
}

impl Fleet {
    /// Create an in-memory engine (no persistence). Used by tests and
    /// ephemeral deployments.
    #[must_use]
    pub fn new(config: VeloConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            state: FleetState::default(),
            outbox: EventOutbox::new(),
            config,
            clock,
            storage: None,
        }
    }

    /// Create an engine backed by `storage`, loading the previous snapshot
    /// if one exists.
    ///
    /// # Errors
    ///
    /// Returns an error if an existing snapshot cannot be read or parsed.
    pub fn with_storage(
        config: VeloConfig,
        clock: Arc<dyn Clock>,
        storage: Storage,
    ) -> Result<Self> {
        let state = storage.load_fleet()?.unwrap_or_default();
        info!(
            stations = state.inventory.stations().count(),
            bikes = state.inventory.bikes().count(),
            "fleet state loaded"
        );
        Ok(Self {
            state,
            outbox: EventOutbox::new(),
            config,
            clock,
            storage: Some(storage),
        })
    }

    /// The active configuration.
    #[must_use]
    pub const fn config(&self) -> &VeloConfig {
        &self.config
    }

    /// Take all pending domain events, oldest first.
    pub fn drain_events(&mut self) -> Vec<FleetEvent> {
        self.outbox.drain()
    }

    /// Fleet size as `(stations, bikes)`, on-trip bikes included.
    #[must_use]
    pub fn counts(&self) -> (usize, usize) {
        (
            self.state.inventory.stations().count(),
            self.state.inventory.bikes().count(),
        )
    }

    // =========================================================================
    // Reservations
    // =========================================================================

    /// Place a reservation hold on an available bike.
    ///
    /// The hold window depends on the rider's loyalty tier. Any lapsed hold
    /// (the rider's own or one on the requested bike) is released first.
    ///
    /// # Errors
    ///
    /// See [`ReservationBook::reserve`].
    pub fn reserve_bike(
        &mut self,
        user: UserId,
        station: StationId,
        bike: BikeId,
    ) -> Result<Reservation> {
        let now = self.clock.now();
        self.expire_for_user(&user, now)?;
        self.expire_for_bike(bike, now)?;

        let tier = self.state.loyalty.tier(&user);
        let hold = Duration::minutes(
            self.config
                .loyalty
                .hold_minutes(tier, self.config.reservations.default_hold_minutes),
        );
        let reservation = self.state.reservations.reserve(
            &mut self.state.inventory,
            user,
            station,
            bike,
            now,
            hold,
        )?;
        debug!(
            reservation = %reservation.id,
            bike = %bike,
            expires_at = %reservation.expires_at,
            "reservation created"
        );
        self.persist()?;
        Ok(reservation)
    }

    /// Cancel the rider's hold on a bike.
    ///
    /// A hold that already lapsed is released first, so a retried cancel
    /// gets the stable [`VeloError::ReservationNotFound`] answer.
    ///
    /// # Errors
    ///
    /// See [`ReservationBook::cancel`].
    pub fn cancel_reservation(
        &mut self,
        user: &UserId,
        station: StationId,
        bike: BikeId,
    ) -> Result<()> {
        let now = self.clock.now();
        self.expire_for_bike(bike, now)?;
        self.state
            .reservations
            .cancel(&mut self.state.inventory, user, station, bike)?;
        self.persist()
    }

    /// The rider's live reservation, after lazy expiry.
    ///
    /// # Errors
    ///
    /// Propagates inventory errors from releasing a lapsed hold.
    pub fn active_reservation(&mut self, user: &UserId) -> Result<Option<Reservation>> {
        let now = self.clock.now();
        let released = self.expire_for_user(user, now)?;
        if released {
            self.persist()?;
        }
        Ok(self.state.reservations.for_user(user).cloned())
    }

    /// Release every lapsed hold. Called by the optional periodic sweeper;
    /// correctness never depends on it.
    ///
    /// # Errors
    ///
    /// Propagates inventory or persistence errors.
    pub fn sweep_expired_reservations(&mut self) -> Result<usize> {
        let now = self.clock.now();
        let released = self
            .state
            .reservations
            .release_all_lapsed(&mut self.state.inventory, now)?;
        let count = released.len();
        for reservation in released {
            self.outbox.push(FleetEvent::ReservationExpired {
                reservation: reservation.id,
                user: reservation.user,
                bike: reservation.bike,
            });
        }
        if count > 0 {
            info!(count, "expired reservations released");
            self.persist()?;
        }
        Ok(count)
    }

    // =========================================================================
    // Rentals
    // =========================================================================

    /// Rent (undock) a bike, either directly or by converting the rider's
    /// reservation.
    ///
    /// Reservation ownership gates direct rent: a bike held by a different
    /// rider is `BikeNotAvailable` even though it is physically docked.
    ///
    /// # Errors
    ///
    /// - [`VeloError::AlreadyRenting`] if the rider has a trip in progress
    /// - [`VeloError::StationOutOfService`] / [`VeloError::Validation`] for
    ///   station mismatches
    /// - [`VeloError::BikeNotAvailable`] if the bike is not rentable by this
    ///   rider
    /// - [`VeloError::TransitionConflict`] if a racing request undocked the
    ///   bike first; at most one of two simultaneous rents can succeed
    pub fn rent_bike(
        &mut self,
        user: UserId,
        station: StationId,
        bike: BikeId,
    ) -> Result<RentalReceipt> {
        let now = self.clock.now();
        // Lazy expiry before anything reads the reservation state.
        self.expire_for_bike(bike, now)?;

        if let Some(active) = self.state.rentals.active_for_user(&user) {
            return Err(VeloError::AlreadyRenting {
                rental: active.id,
                bike: active.bike,
            });
        }
        if self.state.inventory.station(station)?.status == StationStatus::OutOfService {
            return Err(VeloError::StationOutOfService(station));
        }

        let bike_row = self.state.inventory.bike(bike)?;
        let class = bike_row.class;
        let status = bike_row.status;
        // Status first: an undocked on-trip bike is "not available", not a
        // malformed request.
        let start_dock = bike_row.dock.ok_or(VeloError::BikeNotAvailable {
            bike,
            status,
        })?;
        if self.state.inventory.station_of_bike(bike)? != Some(station) {
            return Err(VeloError::Validation(format!(
                "bike {bike} is not docked at station {station}"
            )));
        }

        match status {
            BikeStatus::Available => {
                self.state.inventory.apply_transition(
                    bike,
                    BikeStatus::Available,
                    BikeStatus::OnTrip,
                    DockPlacement::Undock,
                )?;
            }
            BikeStatus::Reserved => {
                let owned = self
                    .state
                    .reservations
                    .for_bike(bike)
                    .filter(|r| r.user == user)
                    .map(|r| r.id);
                let Some(reservation_id) = owned else {
                    return Err(VeloError::BikeNotAvailable { bike, status });
                };
                self.state.inventory.apply_transition(
                    bike,
                    BikeStatus::Reserved,
                    BikeStatus::OnTrip,
                    DockPlacement::Undock,
                )?;
                self.state
                    .reservations
                    .consume(&mut self.state.inventory, reservation_id);
            }
            BikeStatus::OnTrip | BikeStatus::Maintenance => {
                return Err(VeloError::BikeNotAvailable { bike, status });
            }
        }

        let rental_id = self
            .state
            .rentals
            .open(user, bike, class, station, start_dock, now);
        self.state.inventory.set_bike_rental(bike, Some(rental_id));
        info!(rental = %rental_id, bike = %bike, station = %station, "rental started");
        self.persist()?;
        Ok(RentalReceipt {
            rental_id,
            bike,
            started_at: now,
        })
    }

    /// Return (dock) the rider's rented bike, completing the rental.
    ///
    /// Computes the charge (round-up minutes, tier discount, flex offset),
    /// credits the low-occupancy reward when the destination qualifies, and
    /// updates trip count and tier - all inside this one transaction.
    ///
    /// # Errors
    ///
    /// - [`VeloError::NoActiveRental`] if the rider has no trip in progress;
    ///   also the stable answer when a completed return is retried
    /// - [`VeloError::StationOutOfService`] / [`VeloError::DockOccupied`] /
    ///   [`VeloError::Validation`] for an unusable target dock
    pub fn return_bike(
        &mut self,
        user: &UserId,
        station: StationId,
        dock: DockId,
    ) -> Result<ReturnReceipt> {
        let now = self.clock.now();
        let rental = self
            .state
            .rentals
            .active_for_user(user)
            .ok_or(VeloError::NoActiveRental)?;
        let rental_id = rental.id;
        let bike = rental.bike;
        let class = rental.bike_class;
        let start_time = rental.start_time;

        if self.state.inventory.station(station)?.status == StationStatus::OutOfService {
            return Err(VeloError::StationOutOfService(station));
        }
        let dock_row = self.state.inventory.dock(dock)?;
        if dock_row.station != station {
            return Err(VeloError::Validation(format!(
                "dock {dock} does not belong to station {station}"
            )));
        }
        if dock_row.bike.is_some() {
            return Err(VeloError::DockOccupied(dock));
        }

        let (docked, capacity) = self.state.inventory.occupancy(station)?;
        let charge = self.charge_for(user, now - start_time, class);

        // Commit point: dock the bike. Everything above was read-only.
        self.state.inventory.apply_transition(
            bike,
            BikeStatus::OnTrip,
            BikeStatus::Available,
            DockPlacement::DockAt(dock),
        )?;
        self.state.inventory.set_bike_rental(bike, None);

        let (tier_change, flex_credited) =
            self.settle_trip(user, rental_id, &charge, Some((station, docked, capacity)), now)?;

        self.state.rentals.complete(
            rental_id,
            Some(station),
            Some(dock),
            now,
            RentalStatus::Completed,
            charge,
        )?;
        info!(
            rental = %rental_id,
            bike = %bike,
            station = %station,
            total_cents = charge.total_cents,
            "rental completed"
        );
        self.persist()?;
        Ok(ReturnReceipt {
            rental_id,
            charge,
            flex_credited_cents: flex_credited,
            tier_change,
        })
    }

    /// End the rider's rental with a damage report.
    ///
    /// Bills identically to a return for the elapsed time, but the bike goes
    /// to maintenance (undocked, where the rider left it) instead of back
    /// into circulation, and no low-occupancy reward applies.
    ///
    /// # Errors
    ///
    /// - [`VeloError::NoActiveRental`] if the rider has no trip in progress
    /// - [`VeloError::Validation`] if `bike` is not the rented bike or the
    ///   description is empty/oversized
    pub fn report_damage(
        &mut self,
        user: &UserId,
        bike: BikeId,
        description: String,
    ) -> Result<DamageReceipt> {
        let now = self.clock.now();
        let description = description.trim().to_string();
        if description.is_empty() {
            return Err(VeloError::Validation(
                "damage description cannot be empty".into(),
            ));
        }
        if description.chars().count() > MAX_DAMAGE_DESCRIPTION_LENGTH {
            return Err(VeloError::Validation(format!(
                "damage description exceeds {MAX_DAMAGE_DESCRIPTION_LENGTH} characters"
            )));
        }

        let rental = self
            .state
            .rentals
            .active_for_user(user)
            .ok_or(VeloError::NoActiveRental)?;
        if rental.bike != bike {
            return Err(VeloError::Validation(format!(
                "active rental {} is on bike {}, not {bike}",
                rental.id, rental.bike
            )));
        }
        let rental_id = rental.id;
        let class = rental.bike_class;
        let start_time = rental.start_time;

        let charge = self.charge_for(user, now - start_time, class);

        self.state.inventory.apply_transition(
            bike,
            BikeStatus::OnTrip,
            BikeStatus::Maintenance,
            DockPlacement::Keep,
        )?;
        self.state.inventory.set_bike_rental(bike, None);

        let (tier_change, _) = self.settle_trip(user, rental_id, &charge, None, now)?;

        let report = DamageReport {
            id: DamageReportId::new(),
            rental: rental_id,
            bike,
            user: user.clone(),
            station: None,
            description,
            reported_at: now,
        };
        let report_id = report.id;
        self.state.rentals.add_damage_report(report);
        self.outbox.push(FleetEvent::DamageReported {
            report: report_id,
            bike,
            user: user.clone(),
        });

        self.state
            .rentals
            .complete(rental_id, None, None, now, RentalStatus::Damaged, charge)?;
        info!(report = %report_id, rental = %rental_id, bike = %bike, "damage reported");
        self.persist()?;
        Ok(DamageReceipt {
            report_id,
            rental_id,
            charge,
            tier_change,
        })
    }

    /// The rider's trip in progress, if any.
    #[must_use]
    pub fn active_rental(&self, user: &UserId) -> Option<Rental> {
        self.state.rentals.active_for_user(user).cloned()
    }

    /// The rider's trips, oldest first, with optional filters.
    #[must_use]
    pub fn ride_history(&self, user: &UserId, filter: &RideHistoryFilter) -> Vec<Rental> {
        self.state
            .rentals
            .history(user, filter)
            .into_iter()
            .cloned()
            .collect()
    }

    /// The rider's billing view: completed trips plus the flex ledger.
    #[must_use]
    pub fn billing_history(&self, user: &UserId) -> BillingHistory {
        BillingHistory {
            trips: self
                .state
                .rentals
                .billed(user)
                .into_iter()
                .cloned()
                .collect(),
            flex_transactions: self
                .state
                .loyalty
                .transactions(user)
                .into_iter()
                .cloned()
                .collect(),
            flex_balance_cents: self.state.loyalty.balance(user),
        }
    }

    // =========================================================================
    // Station views
    // =========================================================================

    /// Full station view with docks and bikes. Lapsed holds on bikes at the
    /// station are released first, so the view never shows a stale hold.
    ///
    /// # Errors
    ///
    /// Returns [`VeloError::StationNotFound`] for an unknown station.
    pub fn station_snapshot(&mut self, station: StationId) -> Result<StationSnapshot> {
        let now = self.clock.now();
        let lapsed: Vec<BikeId> = self
            .state
            .inventory
            .bikes()
            .filter(|b| b.status == BikeStatus::Reserved)
            .filter(|b| {
                self.state
                    .reservations
                    .for_bike(b.id)
                    .is_some_and(|r| r.station == station && r.is_expired(now))
            })
            .map(|b| b.id)
            .collect();
        let mut released_any = false;
        for bike in lapsed {
            released_any |= self.expire_for_bike(bike, now)?;
        }
        if released_any {
            self.persist()?;
        }
        self.state.inventory.snapshot(station)
    }

    /// Compact listing of all stations for the map view.
    #[must_use]
    pub fn list_stations(&self) -> Vec<StationSummary> {
        let mut stations: Vec<StationSummary> = self
            .state
            .inventory
            .stations()
            .filter_map(|station| {
                let snapshot = self.state.inventory.snapshot(station.id).ok()?;
                Some(StationSummary {
                    station_id: snapshot.station_id,
                    name: snapshot.name,
                    status: snapshot.status,
                    location: snapshot.location,
                    capacity: snapshot.capacity,
                    docked: snapshot.docked,
                    available: snapshot.available,
                })
            })
            .collect();
        stations.sort_by(|a, b| a.name.cmp(&b.name));
        stations
    }

    // =========================================================================
    // Operator actions
    // =========================================================================

    /// Create a station with `capacity` empty docks.
    ///
    /// # Errors
    ///
    /// Returns [`VeloError::Validation`] for a zero capacity or blank name.
    pub fn add_station(
        &mut self,
        name: String,
        address: String,
        location: GeoPoint,
        capacity: usize,
    ) -> Result<StationId> {
        if capacity == 0 {
            return Err(VeloError::Validation("capacity must be positive".into()));
        }
        if name.trim().is_empty() {
            return Err(VeloError::Validation("station name cannot be empty".into()));
        }
        let id = self
            .state
            .inventory
            .add_station(name, address, location, capacity);
        self.persist()?;
        Ok(id)
    }

    /// Remove an empty station.
    ///
    /// # Errors
    ///
    /// See [`Inventory::remove_station`].
    pub fn remove_station(&mut self, station: StationId) -> Result<()> {
        self.state.inventory.remove_station(station)?;
        self.persist()
    }

    /// Open or close a station.
    ///
    /// # Errors
    ///
    /// See [`Inventory::set_station_status`].
    pub fn set_station_status(&mut self, station: StationId, status: StationStatus) -> Result<()> {
        self.state.inventory.set_station_status(station, status)?;
        info!(station = %station, ?status, "station status changed");
        self.persist()
    }

    /// Add a new bike into a free dock.
    ///
    /// # Errors
    ///
    /// See [`Inventory::add_bike`].
    pub fn add_bike(&mut self, station: StationId, class: BikeClass) -> Result<BikeId> {
        let id = self.state.inventory.add_bike(station, class)?;
        self.persist()?;
        Ok(id)
    }

    /// Logically remove a bike from the fleet.
    ///
    /// # Errors
    ///
    /// See [`Inventory::remove_bike`].
    pub fn remove_bike(&mut self, bike: BikeId) -> Result<()> {
        self.state.inventory.remove_bike(bike)?;
        self.persist()
    }

    /// Return a maintenance bike to service.
    ///
    /// # Errors
    ///
    /// See [`Inventory::repair_bike`].
    pub fn repair_bike(&mut self, bike: BikeId, station: Option<StationId>) -> Result<()> {
        self.state.inventory.repair_bike(bike, station)?;
        info!(bike = %bike, "bike repaired");
        self.persist()
    }

    /// Manually move an available docked bike to another station.
    ///
    /// # Errors
    ///
    /// See [`Inventory::move_bike`].
    pub fn move_bike(&mut self, bike: BikeId, to_station: StationId) -> Result<()> {
        self.state.inventory.move_bike(bike, to_station)?;
        self.persist()
    }

    /// All damage reports, oldest first.
    #[must_use]
    pub fn damage_reports(&self) -> Vec<DamageReport> {
        self.state.rentals.damage_reports().to_vec()
    }

    // =========================================================================
    // Internals
    // =========================================================================

    /// Release the user's hold if lapsed, emitting the expiry event.
    fn expire_for_user(&mut self, user: &UserId, now: DateTime<Utc>) -> Result<bool> {
        let released = self.state.reservations.release_lapsed_for_user(
            &mut self.state.inventory,
            user,
            now,
        )?;
        Ok(self.note_expired(released))
    }

    /// Release the hold on a bike if lapsed, emitting the expiry event.
    fn expire_for_bike(&mut self, bike: BikeId, now: DateTime<Utc>) -> Result<bool> {
        let released = self.state.reservations.release_lapsed_for_bike(
            &mut self.state.inventory,
            bike,
            now,
        )?;
        Ok(self.note_expired(released))
    }

    fn note_expired(&mut self, released: Option<Reservation>) -> bool {
        match released {
            Some(reservation) => {
                debug!(reservation = %reservation.id, bike = %reservation.bike, "hold lapsed");
                self.outbox.push(FleetEvent::ReservationExpired {
                    reservation: reservation.id,
                    user: reservation.user,
                    bike: reservation.bike,
                });
                true
            }
            None => false,
        }
    }

    /// Price a trip with the rider's current tier discount and flex balance.
    fn charge_for(&self, user: &UserId, elapsed: Duration, class: BikeClass) -> TripCharge {
        let tier = self.state.loyalty.tier(user);
        let discount = self.config.loyalty.discount_pct(tier);
        let balance = self.state.loyalty.balance(user);
        pricing::compute_charge(elapsed, class, &self.config.pricing, discount, balance)
    }

    /// Ledger side of ending a trip: flex debit, trip count/tier, and - for
    /// returns to a qualifying station - the low-occupancy reward credit.
    ///
    /// `destination` is `(station, docked_before, capacity)`; `None` for a
    /// damage report.
    fn settle_trip(
        &mut self,
        user: &UserId,
        rental_id: RentalId,
        charge: &TripCharge,
        destination: Option<(StationId, usize, usize)>,
        now: DateTime<Utc>,
    ) -> Result<(Option<TierChange>, Option<Cents>)> {
        if charge.flex_applied_cents > 0 {
            self.state.loyalty.debit(
                user,
                charge.flex_applied_cents,
                format!("applied to rental {rental_id}"),
                now,
            )?;
        }

        let tier_change = self
            .state
            .loyalty
            .record_completed_trip(user, &self.config.loyalty);
        if let Some(change) = tier_change {
            self.outbox.push(FleetEvent::TierChanged {
                user: user.clone(),
                old: change.old,
                new: change.new,
            });
        }

        let mut flex_credited = None;
        if let Some((station, docked_before, capacity)) = destination {
            let credit = self.config.rewards.credit_cents;
            #[allow(clippy::cast_precision_loss)]
            let occupancy_before = if capacity == 0 {
                1.0
            } else {
                docked_before as f64 / capacity as f64
            };
            if credit > 0 && occupancy_before < self.config.rewards.low_occupancy_threshold {
                let balance = self.state.loyalty.credit(
                    user,
                    credit,
                    format!("low-occupancy return at station {station}"),
                    now,
                )?;
                self.outbox.push(FleetEvent::FlexDollarsCredited {
                    user: user.clone(),
                    amount_cents: credit,
                    balance_cents: balance,
                    station,
                });
                flex_credited = Some(credit);
            }
        }

        Ok((tier_change, flex_credited))
    }

    fn persist(&self) -> Result<()> {
        if let Some(storage) = &self.storage {
            storage.save_fleet(&self.state)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::types::LoyaltyTier;

    struct Harness {
        fleet: Fleet,
        clock: Arc<ManualClock>,
        station: StationId,
        bike: BikeId,
    }

    fn harness() -> Harness {
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let mut fleet = Fleet::new(VeloConfig::default(), clock.clone());
        let station = fleet
            .add_station(
                "Civic Center".into(),
                "100 Main St".into(),
                GeoPoint { lat: 45.5, lon: -122.6 },
                4,
            )
            .unwrap();
        let bike = fleet.add_bike(station, BikeClass::Standard).unwrap();
        Harness { fleet, clock, station, bike }
    }

    fn rider(n: u32) -> UserId {
        UserId::parse(&format!("rider-{n}")).unwrap()
    }

    fn free_dock(fleet: &mut Fleet, station: StationId) -> DockId {
        fleet
            .station_snapshot(station)
            .unwrap()
            .docks
            .into_iter()
            .find(|d| d.bike.is_none())
            .map(|d| d.dock_id)
            .expect("free dock")
    }

    #[test]
    fn test_reserve_then_rent_converts_reservation() {
        let mut h = harness();
        let user = rider(1);
        let reservation = h.fleet.reserve_bike(user.clone(), h.station, h.bike).unwrap();
        assert_eq!(
            reservation.expires_at,
            reservation.created_at + Duration::minutes(15)
        );

        let receipt = h.fleet.rent_bike(user.clone(), h.station, h.bike).unwrap();
        assert_eq!(receipt.bike, h.bike);
        assert!(h.fleet.active_reservation(&user).unwrap().is_none());
        let rental = h.fleet.active_rental(&user).unwrap();
        assert_eq!(rental.bike, h.bike);
    }

    #[test]
    fn test_direct_rent_blocked_by_other_users_reservation() {
        let mut h = harness();
        h.fleet.reserve_bike(rider(1), h.station, h.bike).unwrap();

        let err = h.fleet.rent_bike(rider(2), h.station, h.bike).unwrap_err();
        assert!(matches!(err, VeloError::BikeNotAvailable { .. }));
    }

    #[test]
    fn test_stale_reservation_does_not_bypass_expiry() {
        let mut h = harness();
        let user = rider(1);
        h.fleet.reserve_bike(user.clone(), h.station, h.bike).unwrap();

        // At t+16min the 15-minute hold has lapsed. The holder's rent must
        // not ride the stale reservation: it is released on access, after
        // which the bike is plain available - so the rent succeeds as a
        // direct rent, and a rival could equally have taken it.
        h.clock.advance(Duration::minutes(16));
        let receipt = h.fleet.rent_bike(user.clone(), h.station, h.bike).unwrap();
        assert_eq!(receipt.bike, h.bike);

        let events = h.fleet.drain_events();
        assert!(events
            .iter()
            .any(|e| matches!(e, FleetEvent::ReservationExpired { .. })));
    }

    #[test]
    fn test_lapsed_hold_frees_bike_for_any_rider() {
        let mut h = harness();
        h.fleet.reserve_bike(rider(1), h.station, h.bike).unwrap();
        h.clock.advance(Duration::minutes(16));

        // A different rider can rent once the hold lapses.
        let receipt = h.fleet.rent_bike(rider(2), h.station, h.bike).unwrap();
        assert_eq!(receipt.bike, h.bike);
    }

    #[test]
    fn test_second_rent_of_same_bike_fails() {
        let mut h = harness();
        h.fleet.rent_bike(rider(1), h.station, h.bike).unwrap();

        let err = h.fleet.rent_bike(rider(2), h.station, h.bike).unwrap_err();
        assert!(matches!(
            err,
            VeloError::BikeNotAvailable { status: BikeStatus::OnTrip, .. }
                | VeloError::Validation(_)
        ));
    }

    #[test]
    fn test_one_active_rental_per_user() {
        let mut h = harness();
        let second_bike = h.fleet.add_bike(h.station, BikeClass::EBike).unwrap();
        let user = rider(1);
        h.fleet.rent_bike(user.clone(), h.station, h.bike).unwrap();

        let err = h.fleet.rent_bike(user, h.station, second_bike).unwrap_err();
        assert!(matches!(err, VeloError::AlreadyRenting { .. }));
    }

    #[test]
    fn test_return_bills_rounded_minutes() {
        let mut h = harness();
        let user = rider(1);
        h.fleet.rent_bike(user.clone(), h.station, h.bike).unwrap();
        h.clock.advance(Duration::minutes(12));

        let dock = free_dock(&mut h.fleet, h.station);
        let receipt = h.fleet.return_bike(&user, h.station, dock).unwrap();
        assert_eq!(receipt.charge.billed_minutes, 12);
        assert_eq!(receipt.charge.total_cents, 12 * 15);
        assert!(h.fleet.active_rental(&user).is_none());

        let history = h.fleet.ride_history(&user, &RideHistoryFilter::default());
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].status, RentalStatus::Completed);
    }

    #[test]
    fn test_return_is_not_double_applied_on_retry() {
        let mut h = harness();
        let user = rider(1);
        h.fleet.rent_bike(user.clone(), h.station, h.bike).unwrap();
        h.clock.advance(Duration::minutes(5));

        let dock = free_dock(&mut h.fleet, h.station);
        h.fleet.return_bike(&user, h.station, dock).unwrap();
        let billing = h.fleet.billing_history(&user);
        let trips_after_first = billing.trips.len();
        let balance_after_first = billing.flex_balance_cents;

        // Retried return: stable terminal error, no double credit or count.
        let err = h.fleet.return_bike(&user, h.station, dock).unwrap_err();
        assert!(matches!(err, VeloError::NoActiveRental));
        let billing = h.fleet.billing_history(&user);
        assert_eq!(billing.trips.len(), trips_after_first);
        assert_eq!(billing.flex_balance_cents, balance_after_first);
    }

    #[test]
    fn test_low_occupancy_return_credits_flex_dollars() {
        let mut h = harness();
        let user = rider(1);
        // Station has 4 docks and 1 bike; after the rent it holds 0 of 4,
        // so occupancy before the return (0%) is under the 25% threshold.
        h.fleet.rent_bike(user.clone(), h.station, h.bike).unwrap();
        h.clock.advance(Duration::minutes(3));

        let dock = free_dock(&mut h.fleet, h.station);
        let receipt = h.fleet.return_bike(&user, h.station, dock).unwrap();
        assert_eq!(receipt.flex_credited_cents, Some(100));

        let billing = h.fleet.billing_history(&user);
        assert_eq!(billing.flex_balance_cents, 100);
        let credit_row = billing
            .flex_transactions
            .iter()
            .find(|t| t.amount_cents > 0)
            .expect("credit row");
        assert_eq!(credit_row.amount_cents, 100);
        assert_eq!(credit_row.balance_after_cents, 100);

        let events = h.fleet.drain_events();
        assert!(events
            .iter()
            .any(|e| matches!(e, FleetEvent::FlexDollarsCredited { amount_cents: 100, .. })));
    }

    #[test]
    fn test_well_stocked_return_earns_no_credit() {
        let mut h = harness();
        // Fill the station to 3 of 4 before renting: occupancy before the
        // return is 2/4 = 50%, over the threshold.
        h.fleet.add_bike(h.station, BikeClass::Standard).unwrap();
        h.fleet.add_bike(h.station, BikeClass::Standard).unwrap();
        let user = rider(1);
        h.fleet.rent_bike(user.clone(), h.station, h.bike).unwrap();

        let dock = free_dock(&mut h.fleet, h.station);
        let receipt = h.fleet.return_bike(&user, h.station, dock).unwrap();
        assert_eq!(receipt.flex_credited_cents, None);
    }

    #[test]
    fn test_flex_dollars_offset_next_trip() {
        let mut h = harness();
        let user = rider(1);
        // First trip earns the 100-cent low-occupancy credit.
        h.fleet.rent_bike(user.clone(), h.station, h.bike).unwrap();
        h.clock.advance(Duration::minutes(2));
        let dock = free_dock(&mut h.fleet, h.station);
        h.fleet.return_bike(&user, h.station, dock).unwrap();
        assert_eq!(h.fleet.billing_history(&user).flex_balance_cents, 100);

        // Second trip: 4 minutes standard = 60 cents, fully covered.
        h.fleet.rent_bike(user.clone(), h.station, h.bike).unwrap();
        h.clock.advance(Duration::minutes(4));
        let dock = free_dock(&mut h.fleet, h.station);
        let receipt = h.fleet.return_bike(&user, h.station, dock).unwrap();
        assert_eq!(receipt.charge.flex_applied_cents, 60);
        assert_eq!(receipt.charge.total_cents, 0);
        // 100 earned - 60 spent + 100 earned again on this return.
        assert_eq!(h.fleet.billing_history(&user).flex_balance_cents, 140);
    }

    #[test]
    fn test_damage_report_ends_rental_into_maintenance() {
        let mut h = harness();
        let user = rider(1);
        h.fleet.rent_bike(user.clone(), h.station, h.bike).unwrap();
        h.clock.advance(Duration::minutes(5));

        let receipt = h
            .fleet
            .report_damage(&user, h.bike, "front brake cable snapped".into())
            .unwrap();
        assert_eq!(receipt.charge.billed_minutes, 5);
        assert!(h.fleet.active_rental(&user).is_none());

        let history = h.fleet.ride_history(&user, &RideHistoryFilter::default());
        assert_eq!(history[0].status, RentalStatus::Damaged);

        // The bike is out of circulation: nobody can reserve or rent it.
        let err = h.fleet.reserve_bike(rider(2), h.station, h.bike).unwrap_err();
        assert!(matches!(err, VeloError::Validation(_) | VeloError::BikeNotAvailable { .. }));

        let reports = h.fleet.damage_reports();
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].bike, h.bike);

        // Operator repair returns it to service at a station.
        h.fleet.repair_bike(h.bike, Some(h.station)).unwrap();
        h.fleet.reserve_bike(rider(2), h.station, h.bike).unwrap();
    }

    #[test]
    fn test_damage_report_requires_the_rented_bike() {
        let mut h = harness();
        let other = h.fleet.add_bike(h.station, BikeClass::EBike).unwrap();
        let user = rider(1);
        h.fleet.rent_bike(user.clone(), h.station, h.bike).unwrap();

        assert!(matches!(
            h.fleet.report_damage(&user, other, "bent wheel".into()),
            Err(VeloError::Validation(_))
        ));
    }

    #[test]
    fn test_damage_description_limit_counts_characters_not_bytes() {
        let mut h = harness();
        let user = rider(1);
        h.fleet.rent_bike(user.clone(), h.station, h.bike).unwrap();

        // 600 characters, 1200 bytes: within the limit.
        let multibyte = "é".repeat(600);
        h.fleet.report_damage(&user, h.bike, multibyte).unwrap();

        let user = rider(2);
        let bike = h.fleet.add_bike(h.station, BikeClass::Standard).unwrap();
        h.fleet.rent_bike(user.clone(), h.station, bike).unwrap();
        assert!(matches!(
            h.fleet.report_damage(&user, bike, "x".repeat(1001)),
            Err(VeloError::Validation(_))
        ));
    }

    #[test]
    fn test_reserve_cancel_round_trip_restores_state() {
        let mut h = harness();
        let user = rider(1);
        let before = h.fleet.station_snapshot(h.station).unwrap();

        h.fleet.reserve_bike(user.clone(), h.station, h.bike).unwrap();
        h.fleet.cancel_reservation(&user, h.station, h.bike).unwrap();

        let after = h.fleet.station_snapshot(h.station).unwrap();
        assert_eq!(before.available, after.available);
        assert!(h.fleet.active_reservation(&user).unwrap().is_none());

        // Retried cancel reports the stable terminal state.
        assert!(matches!(
            h.fleet.cancel_reservation(&user, h.station, h.bike),
            Err(VeloError::ReservationNotFound)
        ));
    }

    #[test]
    fn test_out_of_service_station_blocks_rent_and_return() {
        let mut h = harness();
        let user = rider(1);
        h.fleet.rent_bike(user.clone(), h.station, h.bike).unwrap();
        h.fleet
            .set_station_status(h.station, StationStatus::OutOfService)
            .unwrap();

        let dock = h
            .fleet
            .station_snapshot(h.station)
            .unwrap()
            .docks[0]
            .dock_id;
        assert!(matches!(
            h.fleet.return_bike(&user, h.station, dock),
            Err(VeloError::StationOutOfService(_))
        ));

        h.fleet
            .set_station_status(h.station, StationStatus::Active)
            .unwrap();
        h.fleet.return_bike(&user, h.station, dock).unwrap();
    }

    #[test]
    fn test_tier_promotion_extends_hold_window() {
        let mut h = harness();
        let user = rider(1);

        // Complete 30 one-minute trips to reach gold.
        for _ in 0..30 {
            h.fleet.rent_bike(user.clone(), h.station, h.bike).unwrap();
            h.clock.advance(Duration::minutes(1));
            let dock = free_dock(&mut h.fleet, h.station);
            h.fleet.return_bike(&user, h.station, dock).unwrap();
        }

        let events = h.fleet.drain_events();
        let promotions: Vec<_> = events
            .iter()
            .filter_map(|e| match e {
                FleetEvent::TierChanged { new, .. } => Some(*new),
                _ => None,
            })
            .collect();
        assert_eq!(
            promotions,
            vec![LoyaltyTier::Bronze, LoyaltyTier::Silver, LoyaltyTier::Gold]
        );

        // Gold riders get the 25-minute hold window.
        let reservation = h.fleet.reserve_bike(user, h.station, h.bike).unwrap();
        assert_eq!(
            reservation.expires_at - reservation.created_at,
            Duration::minutes(25)
        );
    }

    #[test]
    fn test_tier_discount_applies_at_return() {
        let mut h = harness();
        let user = rider(1);
        // Reach bronze (5 trips, 5% discount).
        for _ in 0..5 {
            h.fleet.rent_bike(user.clone(), h.station, h.bike).unwrap();
            h.clock.advance(Duration::minutes(1));
            let dock = free_dock(&mut h.fleet, h.station);
            h.fleet.return_bike(&user, h.station, dock).unwrap();
        }
        // Spend down the accumulated low-occupancy credits first.
        let balance = h.fleet.billing_history(&user).flex_balance_cents;
        assert!(balance > 0);

        h.fleet.rent_bike(user.clone(), h.station, h.bike).unwrap();
        h.clock.advance(Duration::minutes(20));
        let dock = free_dock(&mut h.fleet, h.station);
        let receipt = h.fleet.return_bike(&user, h.station, dock).unwrap();
        // 20 min * 15 = 300; 5% off -> 285; flex applied on top.
        assert_eq!(receipt.charge.base_cents, 300);
        assert_eq!(receipt.charge.discount_pct, 5);
        assert_eq!(receipt.charge.discounted_cents, 285);
        assert_eq!(
            receipt.charge.total_cents,
            (285 - balance.min(285)).max(0)
        );
    }

    #[test]
    fn test_returning_to_foreign_dock_is_rejected() {
        let mut h = harness();
        let other = h
            .fleet
            .add_station(
                "East Side".into(),
                "200 East Ave".into(),
                GeoPoint { lat: 45.51, lon: -122.59 },
                2,
            )
            .unwrap();
        let user = rider(1);
        h.fleet.rent_bike(user.clone(), h.station, h.bike).unwrap();

        // A dock id from another station cannot be used with this station.
        let foreign_dock = free_dock(&mut h.fleet, other);
        assert!(matches!(
            h.fleet.return_bike(&user, h.station, foreign_dock),
            Err(VeloError::Validation(_))
        ));

        // Returning to the other station at its own dock is fine.
        let receipt = h.fleet.return_bike(&user, other, foreign_dock).unwrap();
        assert_eq!(receipt.rental_id, h.fleet.ride_history(&user, &RideHistoryFilter::default())[0].id);
    }

    #[test]
    fn test_persisted_fleet_survives_restart() {
        let dir = tempfile::tempdir().unwrap();
        let storage = Storage::new(dir.path().to_path_buf());
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let user = rider(1);

        let station;
        let bike;
        {
            let mut fleet =
                Fleet::with_storage(VeloConfig::default(), clock.clone(), storage.clone())
                    .unwrap();
            station = fleet
                .add_station(
                    "Riverside".into(),
                    "5 River Rd".into(),
                    GeoPoint { lat: 0.0, lon: 0.0 },
                    2,
                )
                .unwrap();
            bike = fleet.add_bike(station, BikeClass::Standard).unwrap();
            fleet.rent_bike(user.clone(), station, bike).unwrap();
        }

        let mut reloaded =
            Fleet::with_storage(VeloConfig::default(), clock, storage).unwrap();
        let active = reloaded.active_rental(&user).expect("rental survived");
        assert_eq!(active.bike, bike);
        let snapshot = reloaded.station_snapshot(station).unwrap();
        assert_eq!(snapshot.docked, 0);
    }

    #[test]
    fn test_sweeper_releases_lapsed_holds() {
        let mut h = harness();
        h.fleet.reserve_bike(rider(1), h.station, h.bike).unwrap();
        assert_eq!(h.fleet.sweep_expired_reservations().unwrap(), 0);

        h.clock.advance(Duration::minutes(16));
        assert_eq!(h.fleet.sweep_expired_reservations().unwrap(), 1);
        let snapshot = h.fleet.station_snapshot(h.station).unwrap();
        assert_eq!(snapshot.available, 1);
    }
}
