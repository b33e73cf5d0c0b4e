//! Station, dock, and bike inventory - the single source of truth.
//!
//! Every bike state change goes through [`Inventory::apply_transition`], a
//! compare-and-set keyed on the bike's recorded status. A mismatch returns
//! [`VeloError::TransitionConflict`] instead of overwriting, so two racing
//! transitions on the same bike can never both succeed regardless of how the
//! caller serializes access. Dock placement is validated in the same step:
//! only one bike can claim an empty dock.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::error::{Result, VeloError};
use crate::types::{
    BikeClass, BikeId, BikeStatus, DockId, GeoPoint, RentalId, ReservationId, StationId,
    StationStatus,
};

/// A docking station.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Station {
    /// Station id.
    pub id: StationId,
    /// Display name.
    pub name: String,
    /// Street address.
    pub address: String,
    /// Geographic location.
    pub location: GeoPoint,
    /// Operational status; `OutOfService` blocks reservations and rentals.
    pub status: StationStatus,
    /// Dock ids belonging to this station. Capacity = `docks.len()`.
    pub docks: Vec<DockId>,
}

/// A single dock slot. Holds zero or one bike; dock identity is stable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Dock {
    /// Dock id.
    pub id: DockId,
    /// Owning station.
    pub station: StationId,
    /// Docked bike, if any.
    pub bike: Option<BikeId>,
}

/// A bike in the fleet.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Bike {
    /// Bike id.
    pub id: BikeId,
    /// Hardware class.
    pub class: BikeClass,
    /// Current lifecycle status.
    pub status: BikeStatus,
    /// Dock holding the bike; `None` while on trip (or in maintenance after
    /// a mid-trip damage report).
    pub dock: Option<DockId>,
    /// Active reservation holding the bike, when `Reserved`.
    pub reservation: Option<ReservationId>,
    /// Active rental, when `OnTrip`.
    pub rental: Option<RentalId>,
}

/// Where a transition leaves the bike physically.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DockPlacement {
    /// Leave the dock linkage untouched.
    Keep,
    /// Remove the bike from its dock (rent).
    Undock,
    /// Place the bike into the given empty dock (return).
    DockAt(DockId),
}

/// Read-only view of one dock in a snapshot.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct DockView {
    /// Dock id.
    pub dock_id: DockId,
    /// Docked bike, if any.
    pub bike: Option<BikeView>,
}

/// Read-only view of one bike in a snapshot.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct BikeView {
    /// Bike id.
    pub bike_id: BikeId,
    /// Hardware class.
    pub class: BikeClass,
    /// Current status.
    pub status: BikeStatus,
}

/// Read-only station snapshot consumed by the map/dashboard layer.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct StationSnapshot {
    /// Station id.
    pub station_id: StationId,
    /// Display name.
    pub name: String,
    /// Street address.
    pub address: String,
    /// Geographic location.
    pub location: GeoPoint,
    /// Operational status.
    pub status: StationStatus,
    /// Total dock capacity.
    pub capacity: usize,
    /// Bikes currently docked.
    pub docked: usize,
    /// Docked bikes currently rentable.
    pub available: usize,
    /// Per-dock detail.
    pub docks: Vec<DockView>,
}

/// Durable record of stations, docks, and bikes.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct Inventory {
    stations: HashMap<StationId, Station>,
    docks: HashMap<DockId, Dock>,
    bikes: HashMap<BikeId, Bike>,
}

impl Inventory {
    /// Create an empty inventory.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    // =========================================================================
    // Lookups
    // =========================================================================

    /// Fetch a station.
    ///
    /// # Errors
    ///
    /// Returns [`VeloError::StationNotFound`] if absent.
    pub fn station(&self, id: StationId) -> Result<&Station> {
        self.stations
            .get(&id)
            .ok_or(VeloError::StationNotFound(id))
    }

    /// Fetch a bike.
    ///
    /// # Errors
    ///
    /// Returns [`VeloError::BikeNotFound`] if absent.
    pub fn bike(&self, id: BikeId) -> Result<&Bike> {
        self.bikes.get(&id).ok_or(VeloError::BikeNotFound(id))
    }

    /// Fetch a dock.
    ///
    /// # Errors
    ///
    /// Returns [`VeloError::DockNotFound`] if absent.
    pub fn dock(&self, id: DockId) -> Result<&Dock> {
        self.docks.get(&id).ok_or(VeloError::DockNotFound(id))
    }

    /// All stations, unordered.
    pub fn stations(&self) -> impl Iterator<Item = &Station> {
        self.stations.values()
    }

    /// All bikes, unordered.
    pub fn bikes(&self) -> impl Iterator<Item = &Bike> {
        self.bikes.values()
    }

    /// The station a bike is docked at, if docked.
    ///
    /// # Errors
    ///
    /// Returns [`VeloError::BikeNotFound`] for an unknown bike.
    pub fn station_of_bike(&self, bike: BikeId) -> Result<Option<StationId>> {
        let bike = self.bike(bike)?;
        Ok(bike
            .dock
            .and_then(|dock| self.docks.get(&dock))
            .map(|dock| dock.station))
    }

    /// Currently empty dock ids at a station, used for return placement.
    ///
    /// # Errors
    ///
    /// Returns [`VeloError::StationNotFound`] for an unknown station.
    pub fn free_docks(&self, station: StationId) -> Result<Vec<DockId>> {
        let station = self.station(station)?;
        Ok(station
            .docks
            .iter()
            .filter(|id| self.docks.get(id).is_some_and(|d| d.bike.is_none()))
            .copied()
            .collect())
    }

    /// Docked-bike count and capacity for a station.
    ///
    /// # Errors
    ///
    /// Returns [`VeloError::StationNotFound`] for an unknown station.
    pub fn occupancy(&self, station: StationId) -> Result<(usize, usize)> {
        let station = self.station(station)?;
        let docked = station
            .docks
            .iter()
            .filter(|id| self.docks.get(id).is_some_and(|d| d.bike.is_some()))
            .count();
        Ok((docked, station.docks.len()))
    }

    /// Full read-only view of a station with its docks and bikes.
    ///
    /// # Errors
    ///
    /// Returns [`VeloError::StationNotFound`] for an unknown station.
    pub fn snapshot(&self, id: StationId) -> Result<StationSnapshot> {
        let station = self.station(id)?;
        let docks: Vec<DockView> = station
            .docks
            .iter()
            .filter_map(|dock_id| self.docks.get(dock_id))
            .map(|dock| DockView {
                dock_id: dock.id,
                bike: dock.bike.and_then(|bike_id| {
                    self.bikes.get(&bike_id).map(|bike| BikeView {
                        bike_id: bike.id,
                        class: bike.class,
                        status: bike.status,
                    })
                }),
            })
            .collect();

        let docked = docks.iter().filter(|d| d.bike.is_some()).count();
        let available = docks
            .iter()
            .filter(|d| {
                d.bike
                    .as_ref()
                    .is_some_and(|b| b.status == BikeStatus::Available)
            })
            .count();

        Ok(StationSnapshot {
            station_id: station.id,
            name: station.name.clone(),
            address: station.address.clone(),
            location: station.location,
            status: station.status,
            capacity: station.docks.len(),
            docked,
            available,
            docks,
        })
    }

    // =========================================================================
    // State transitions
    // =========================================================================

    /// Compare-and-set a bike's status, optionally moving it in or out of a
    /// dock in the same atomic step.
    ///
    /// The transition is accepted only if the bike's recorded status equals
    /// `from`; otherwise nothing changes and the caller gets a conflict.
    ///
    /// # Errors
    ///
    /// - [`VeloError::BikeNotFound`] for an unknown bike
    /// - [`VeloError::TransitionConflict`] if the recorded status is not `from`
    /// - [`VeloError::DockNotFound`] / [`VeloError::DockOccupied`] for an
    ///   invalid `DockAt` placement
    pub fn apply_transition(
        &mut self,
        bike_id: BikeId,
        from: BikeStatus,
        to: BikeStatus,
        placement: DockPlacement,
    ) -> Result<()> {
        let actual = self.bike(bike_id)?.status;
        if actual != from {
            return Err(VeloError::TransitionConflict {
                bike: bike_id,
                expected: from,
                actual,
            });
        }

        // Validate the dock side before touching anything, so a failed
        // transition leaves no partial mutation.
        if let DockPlacement::DockAt(dock_id) = placement {
            let dock = self.dock(dock_id)?;
            if dock.bike.is_some() {
                return Err(VeloError::DockOccupied(dock_id));
            }
        }

        match placement {
            DockPlacement::Keep => {}
            DockPlacement::Undock => {
                let old_dock = self
                    .bikes
                    .get(&bike_id)
                    .and_then(|b| b.dock)
                    .ok_or(VeloError::BikeNotAvailable {
                        bike: bike_id,
                        status: actual,
                    })?;
                if let Some(dock) = self.docks.get_mut(&old_dock) {
                    dock.bike = None;
                }
                if let Some(bike) = self.bikes.get_mut(&bike_id) {
                    bike.dock = None;
                }
            }
            DockPlacement::DockAt(dock_id) => {
                if let Some(dock) = self.docks.get_mut(&dock_id) {
                    dock.bike = Some(bike_id);
                }
                if let Some(bike) = self.bikes.get_mut(&bike_id) {
                    bike.dock = Some(dock_id);
                }
            }
        }

        if let Some(bike) = self.bikes.get_mut(&bike_id) {
            bike.status = to;
        }
        Ok(())
    }

    /// Set or clear a bike's reservation reference.
    pub fn set_bike_reservation(&mut self, bike: BikeId, reservation: Option<ReservationId>) {
        if let Some(bike) = self.bikes.get_mut(&bike) {
            bike.reservation = reservation;
        }
    }

    /// Set or clear a bike's active-rental reference.
    pub fn set_bike_rental(&mut self, bike: BikeId, rental: Option<RentalId>) {
        if let Some(bike) = self.bikes.get_mut(&bike) {
            bike.rental = rental;
        }
    }

    // =========================================================================
    // Operator actions
    // =========================================================================

    /// Create a station with `capacity` empty docks.
    pub fn add_station(
        &mut self,
        name: String,
        address: String,
        location: GeoPoint,
        capacity: usize,
    ) -> StationId {
        let id = StationId::new();
        let docks: Vec<DockId> = (0..capacity).map(|_| DockId::new()).collect();
        for dock_id in &docks {
            self.docks.insert(
                *dock_id,
                Dock {
                    id: *dock_id,
                    station: id,
                    bike: None,
                },
            );
        }
        self.stations.insert(
            id,
            Station {
                id,
                name,
                address,
                location,
                status: StationStatus::Active,
                docks,
            },
        );
        id
    }

    /// Remove an empty station and its docks.
    ///
    /// # Errors
    ///
    /// Returns [`VeloError::StationNotFound`] for an unknown station, or
    /// [`VeloError::Validation`] while any dock still holds a bike.
    pub fn remove_station(&mut self, id: StationId) -> Result<()> {
        let station = self.station(id)?;
        if station
            .docks
            .iter()
            .any(|d| self.docks.get(d).is_some_and(|d| d.bike.is_some()))
        {
            return Err(VeloError::Validation(format!(
                "station {id} still has docked bikes"
            )));
        }
        let docks = station.docks.clone();
        for dock in docks {
            self.docks.remove(&dock);
        }
        self.stations.remove(&id);
        Ok(())
    }

    /// Set a station's operational status.
    ///
    /// # Errors
    ///
    /// Returns [`VeloError::StationNotFound`] for an unknown station.
    pub fn set_station_status(&mut self, id: StationId, status: StationStatus) -> Result<()> {
        let station = self
            .stations
            .get_mut(&id)
            .ok_or(VeloError::StationNotFound(id))?;
        station.status = status;
        Ok(())
    }

    /// Add a new bike into a free dock at a station.
    ///
    /// # Errors
    ///
    /// Returns [`VeloError::StationNotFound`] for an unknown station or
    /// [`VeloError::StationFull`] when no dock is free.
    pub fn add_bike(&mut self, station: StationId, class: BikeClass) -> Result<BikeId> {
        let dock_id = *self
            .free_docks(station)?
            .first()
            .ok_or(VeloError::StationFull(station))?;
        let id = BikeId::new();
        self.bikes.insert(
            id,
            Bike {
                id,
                class,
                status: BikeStatus::Available,
                dock: Some(dock_id),
                reservation: None,
                rental: None,
            },
        );
        if let Some(dock) = self.docks.get_mut(&dock_id) {
            dock.bike = Some(id);
        }
        Ok(id)
    }

    /// Logically remove a bike from the fleet.
    ///
    /// Only docked bikes that are not held or out on a trip can be removed.
    ///
    /// # Errors
    ///
    /// Returns [`VeloError::BikeNotFound`] for an unknown bike, or
    /// [`VeloError::BikeNotAvailable`] if the bike is reserved or on a trip.
    pub fn remove_bike(&mut self, id: BikeId) -> Result<()> {
        let bike = self.bike(id)?;
        if !matches!(bike.status, BikeStatus::Available | BikeStatus::Maintenance) {
            return Err(VeloError::BikeNotAvailable {
                bike: id,
                status: bike.status,
            });
        }
        let dock = bike.dock;
        if let Some(dock_id) = dock {
            if let Some(dock) = self.docks.get_mut(&dock_id) {
                dock.bike = None;
            }
        }
        self.bikes.remove(&id);
        Ok(())
    }

    /// Operator repair: return a maintenance bike to service.
    ///
    /// A bike damaged mid-trip carries no dock, so the repair names the
    /// station where the operator re-docks it. A bike already docked is
    /// repaired in place and `station` is ignored.
    ///
    /// # Errors
    ///
    /// Returns [`VeloError::TransitionConflict`] if the bike is not in
    /// maintenance, [`VeloError::StationFull`] when the target station has no
    /// free dock, or [`VeloError::Validation`] when an undocked repair names
    /// no station.
    pub fn repair_bike(&mut self, id: BikeId, station: Option<StationId>) -> Result<()> {
        let bike = self.bike(id)?;
        let placement = if bike.dock.is_some() {
            DockPlacement::Keep
        } else {
            let station = station.ok_or_else(|| {
                VeloError::Validation(format!("bike {id} is undocked; repair must name a station"))
            })?;
            let dock = *self
                .free_docks(station)?
                .first()
                .ok_or(VeloError::StationFull(station))?;
            DockPlacement::DockAt(dock)
        };
        self.apply_transition(id, BikeStatus::Maintenance, BikeStatus::Available, placement)
    }

    /// Operator rebalancing: move an available docked bike to another station.
    ///
    /// # Errors
    ///
    /// Returns [`VeloError::BikeNotAvailable`] unless the bike is docked and
    /// available, or [`VeloError::StationFull`] when the target has no free
    /// dock.
    pub fn move_bike(&mut self, id: BikeId, to_station: StationId) -> Result<()> {
        let bike = self.bike(id)?;
        if bike.status != BikeStatus::Available || bike.dock.is_none() {
            return Err(VeloError::BikeNotAvailable {
                bike: id,
                status: bike.status,
            });
        }
        let target = *self
            .free_docks(to_station)?
            .first()
            .ok_or(VeloError::StationFull(to_station))?;

        self.apply_transition(id, BikeStatus::Available, BikeStatus::Available, DockPlacement::Undock)?;
        self.apply_transition(
            id,
            BikeStatus::Available,
            BikeStatus::Available,
            DockPlacement::DockAt(target),
        )
    }

    /// Verify the dock<->bike inverse maps agree. Used by tests.
    #[must_use]
    pub fn invariants_hold(&self) -> bool {
        let docks_consistent = self.docks.values().all(|dock| match dock.bike {
            None => true,
            Some(bike_id) => self
                .bikes
                .get(&bike_id)
                .is_some_and(|bike| bike.dock == Some(dock.id)),
        });
        let bikes_consistent = self.bikes.values().all(|bike| match bike.dock {
            Some(dock) => self
                .docks
                .get(&dock)
                .is_some_and(|d| d.bike == Some(bike.id)),
            None => matches!(bike.status, BikeStatus::OnTrip | BikeStatus::Maintenance),
        });
        docks_consistent && bikes_consistent
    }
}
