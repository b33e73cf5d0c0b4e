//! Reservation holds and their lifecycle.
//!
//! A reservation is a time-bounded exclusive claim on a bike. Expiry is
//! lazy: there is no timer thread, and every path that reads or writes a
//! reservation calls [`ReservationBook::release_lapsed_for_user`] /
//! [`ReservationBook::release_lapsed_for_bike`] first, so a lapsed hold is
//! released back to available exactly as if the rider had cancelled it. An
//! optional sweep ([`ReservationBook::release_all_lapsed`]) exists for UI
//! freshness only; correctness never depends on it.

use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::error::{Result, VeloError};
use crate::inventory::{DockPlacement, Inventory};
use crate::types::{BikeId, BikeStatus, ReservationId, StationId, StationStatus, UserId};

/// An active reservation hold.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Reservation {
    /// Reservation id.
    pub id: ReservationId,
    /// Rider holding the reservation.
    pub user: UserId,
    /// Held bike.
    pub bike: BikeId,
    /// Station the bike is docked at.
    pub station: StationId,
    /// When the hold was created.
    pub created_at: DateTime<Utc>,
    /// When the hold lapses.
    pub expires_at: DateTime<Utc>,
}

impl Reservation {
    /// Whether the hold has lapsed at `now`. Pure; the single definition of
    /// expiry for the whole system.
    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

/// All reservation holds, indexed by user and by bike.
///
/// Invariants: at most one active reservation per user system-wide, and at
/// most one per bike.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct ReservationBook {
    by_id: HashMap<ReservationId, Reservation>,
    by_user: HashMap<UserId, ReservationId>,
    by_bike: HashMap<BikeId, ReservationId>,
}

impl ReservationBook {
    /// Create an empty book.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The user's active reservation, without expiry evaluation. Callers go
    /// through the lapse-releasing paths first.
    #[must_use]
    pub fn for_user(&self, user: &UserId) -> Option<&Reservation> {
        self.by_user.get(user).and_then(|id| self.by_id.get(id))
    }

    /// The reservation holding a bike, without expiry evaluation.
    #[must_use]
    pub fn for_bike(&self, bike: BikeId) -> Option<&Reservation> {
        self.by_bike.get(&bike).and_then(|id| self.by_id.get(id))
    }

    /// Release the user's reservation if it has lapsed, transitioning the
    /// bike back to available. Returns the released reservation.
    ///
    /// # Errors
    ///
    /// Propagates inventory errors from the release transition.
    pub fn release_lapsed_for_user(
        &mut self,
        inventory: &mut Inventory,
        user: &UserId,
        now: DateTime<Utc>,
    ) -> Result<Option<Reservation>> {
        let Some(reservation) = self.for_user(user) else {
            return Ok(None);
        };
        if !reservation.is_expired(now) {
            return Ok(None);
        }
        let id = reservation.id;
        self.release(inventory, id).map(Some)
    }

    /// Release the reservation holding `bike` if it has lapsed.
    ///
    /// # Errors
    ///
    /// Propagates inventory errors from the release transition.
    pub fn release_lapsed_for_bike(
        &mut self,
        inventory: &mut Inventory,
        bike: BikeId,
        now: DateTime<Utc>,
    ) -> Result<Option<Reservation>> {
        let Some(reservation) = self.for_bike(bike) else {
            return Ok(None);
        };
        if !reservation.is_expired(now) {
            return Ok(None);
        }
        let id = reservation.id;
        self.release(inventory, id).map(Some)
    }

    /// Release every lapsed hold. Liveness/UX optimization for dashboards;
    /// returns the released reservations for event emission.
    ///
    /// # Errors
    ///
    /// Propagates the first inventory error encountered.
    pub fn release_all_lapsed(
        &mut self,
        inventory: &mut Inventory,
        now: DateTime<Utc>,
    ) -> Result<Vec<Reservation>> {
        let lapsed: Vec<ReservationId> = self
            .by_id
            .values()
            .filter(|r| r.is_expired(now))
            .map(|r| r.id)
            .collect();
        let mut released = Vec::with_capacity(lapsed.len());
        for id in lapsed {
            released.push(self.release(inventory, id)?);
        }
        Ok(released)
    }

    /// Create a hold on an available bike.
    ///
    /// # Errors
    ///
    /// - [`VeloError::AlreadyReserved`] if the user already holds a live
    ///   reservation (with its details, so the caller can present it)
    /// - [`VeloError::StationOutOfService`] for a closed station
    /// - [`VeloError::Validation`] if the bike is not docked at `station`
    /// - [`VeloError::BikeNotAvailable`] unless the bike is available
    /// - [`VeloError::TransitionConflict`] if a racing request moved the bike
    ///   first
    pub fn reserve(
        &mut self,
        inventory: &mut Inventory,
        user: UserId,
        station: StationId,
        bike: BikeId,
        now: DateTime<Utc>,
        hold: Duration,
    ) -> Result<Reservation> {
        if let Some(existing) = self.for_user(&user) {
            return Err(VeloError::AlreadyReserved {
                reservation: existing.id,
                bike: existing.bike,
                expires_at: existing.expires_at,
            });
        }

        if inventory.station(station)?.status == StationStatus::OutOfService {
            return Err(VeloError::StationOutOfService(station));
        }
        if inventory.station_of_bike(bike)? != Some(station) {
            return Err(VeloError::Validation(format!(
                "bike {bike} is not docked at station {station}"
            )));
        }

        let status = inventory.bike(bike)?.status;
        if status != BikeStatus::Available {
            return Err(VeloError::BikeNotAvailable { bike, status });
        }

        inventory.apply_transition(
            bike,
            BikeStatus::Available,
            BikeStatus::Reserved,
            DockPlacement::Keep,
        )?;

        let reservation = Reservation {
            id: ReservationId::new(),
            user: user.clone(),
            bike,
            station,
            created_at: now,
            expires_at: now + hold,
        };
        inventory.set_bike_reservation(bike, Some(reservation.id));
        self.by_user.insert(user, reservation.id);
        self.by_bike.insert(bike, reservation.id);
        self.by_id.insert(reservation.id, reservation.clone());
        Ok(reservation)
    }

    /// Cancel the user's hold on a bike, returning it to available.
    ///
    /// # Errors
    ///
    /// Returns [`VeloError::ReservationNotFound`] if no matching active
    /// reservation owned by this user exists - also the stable answer for a
    /// retried cancel.
    pub fn cancel(
        &mut self,
        inventory: &mut Inventory,
        user: &UserId,
        station: StationId,
        bike: BikeId,
    ) -> Result<()> {
        let matches = self.for_bike(bike).is_some_and(|r| {
            r.user == *user && r.station == station
        });
        if !matches {
            return Err(VeloError::ReservationNotFound);
        }
        let id = self
            .by_bike
            .get(&bike)
            .copied()
            .ok_or(VeloError::ReservationNotFound)?;
        self.release(inventory, id)?;
        Ok(())
    }

    /// Drop the book entry for a reservation being converted into a rental.
    /// The bike's status transition is the caller's responsibility.
    pub fn consume(&mut self, inventory: &mut Inventory, id: ReservationId) {
        if let Some(reservation) = self.by_id.remove(&id) {
            self.by_user.remove(&reservation.user);
            self.by_bike.remove(&reservation.bike);
            inventory.set_bike_reservation(reservation.bike, None);
        }
    }

    /// Release a hold: bike back to available, records removed.
    fn release(&mut self, inventory: &mut Inventory, id: ReservationId) -> Result<Reservation> {
        let reservation = self
            .by_id
            .get(&id)
            .cloned()
            .ok_or(VeloError::ReservationNotFound)?;
        inventory.apply_transition(
            reservation.bike,
            BikeStatus::Reserved,
            BikeStatus::Available,
            DockPlacement::Keep,
        )?;
        inventory.set_bike_reservation(reservation.bike, None);
        self.by_id.remove(&id);
        self.by_user.remove(&reservation.user);
        self.by_bike.remove(&reservation.bike);
        Ok(reservation)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{BikeClass, GeoPoint};

    fn seeded() -> (Inventory, ReservationBook, StationId, BikeId, UserId) {
        let mut inv = Inventory::new();
        let station = inv.add_station(
            "Harbor".into(),
            "5 Harbor Way".into(),
            GeoPoint { lat: 47.6, lon: -122.3 },
            4,
        );
        let bike = inv.add_bike(station, BikeClass::Standard).unwrap();
        (inv, ReservationBook::new(), station, bike, UserId::parse("rider-1").unwrap())
    }

    fn hold() -> Duration {
        Duration::minutes(15)
    }

    #[test]
    fn test_reserve_marks_bike_reserved_and_stamps_expiry() {
        let (mut inv, mut book, station, bike, user) = seeded();
        let now = Utc::now();
        let reservation = book
            .reserve(&mut inv, user.clone(), station, bike, now, hold())
            .unwrap();

        assert_eq!(reservation.expires_at, now + Duration::minutes(15));
        assert_eq!(inv.bike(bike).unwrap().status, BikeStatus::Reserved);
        assert_eq!(inv.bike(bike).unwrap().reservation, Some(reservation.id));
        assert_eq!(book.for_user(&user).unwrap().id, reservation.id);
    }

    #[test]
    fn test_second_reservation_by_same_user_reports_existing_hold() {
        let (mut inv, mut book, station, bike, user) = seeded();
        let other = inv.add_bike(station, BikeClass::EBike).unwrap();
        let now = Utc::now();
        let first = book
            .reserve(&mut inv, user.clone(), station, bike, now, hold())
            .unwrap();

        let err = book
            .reserve(&mut inv, user, station, other, now, hold())
            .unwrap_err();
        match err {
            VeloError::AlreadyReserved { reservation, bike: held, expires_at } => {
                assert_eq!(reservation, first.id);
                assert_eq!(held, bike);
                assert_eq!(expires_at, first.expires_at);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_reserving_a_reserved_bike_fails_for_other_user() {
        let (mut inv, mut book, station, bike, user) = seeded();
        let now = Utc::now();
        book.reserve(&mut inv, user, station, bike, now, hold()).unwrap();

        let rival = UserId::parse("rider-2").unwrap();
        assert!(matches!(
            book.reserve(&mut inv, rival, station, bike, now, hold()),
            Err(VeloError::BikeNotAvailable { .. })
        ));
    }

    #[test]
    fn test_cancel_restores_pre_reservation_state() {
        let (mut inv, mut book, station, bike, user) = seeded();
        let now = Utc::now();
        book.reserve(&mut inv, user.clone(), station, bike, now, hold())
            .unwrap();
        book.cancel(&mut inv, &user, station, bike).unwrap();

        let bike_row = inv.bike(bike).unwrap();
        assert_eq!(bike_row.status, BikeStatus::Available);
        assert_eq!(bike_row.reservation, None);
        assert!(book.for_user(&user).is_none());
        assert!(book.for_bike(bike).is_none());
    }

    #[test]
    fn test_cancel_twice_reports_not_found() {
        let (mut inv, mut book, station, bike, user) = seeded();
        let now = Utc::now();
        book.reserve(&mut inv, user.clone(), station, bike, now, hold())
            .unwrap();
        book.cancel(&mut inv, &user, station, bike).unwrap();
        assert!(matches!(
            book.cancel(&mut inv, &user, station, bike),
            Err(VeloError::ReservationNotFound)
        ));
    }

    #[test]
    fn test_cancel_by_non_owner_reports_not_found() {
        let (mut inv, mut book, station, bike, user) = seeded();
        let now = Utc::now();
        book.reserve(&mut inv, user, station, bike, now, hold()).unwrap();

        let rival = UserId::parse("rider-2").unwrap();
        assert!(matches!(
            book.cancel(&mut inv, &rival, station, bike),
            Err(VeloError::ReservationNotFound)
        ));
        assert_eq!(inv.bike(bike).unwrap().status, BikeStatus::Reserved);
    }

    #[test]
    fn test_lapsed_hold_released_on_access() {
        let (mut inv, mut book, station, bike, user) = seeded();
        let now = Utc::now();
        book.reserve(&mut inv, user.clone(), station, bike, now, hold())
            .unwrap();

        // One second before expiry: still held.
        let almost = now + Duration::minutes(15) - Duration::seconds(1);
        assert!(book
            .release_lapsed_for_bike(&mut inv, bike, almost)
            .unwrap()
            .is_none());

        // At t+16min the hold has lapsed; access releases it.
        let later = now + Duration::minutes(16);
        let released = book
            .release_lapsed_for_bike(&mut inv, bike, later)
            .unwrap()
            .expect("hold should lapse");
        assert_eq!(released.user, user);
        assert_eq!(inv.bike(bike).unwrap().status, BikeStatus::Available);
        assert!(book.for_user(&user).is_none());
    }

    #[test]
    fn test_sweep_releases_only_lapsed_holds() {
        let (mut inv, mut book, station, bike, user) = seeded();
        let fresh_bike = inv.add_bike(station, BikeClass::EBike).unwrap();
        let now = Utc::now();
        book.reserve(&mut inv, user, station, bike, now, hold()).unwrap();
        let rider2 = UserId::parse("rider-2").unwrap();
        book.reserve(
            &mut inv,
            rider2,
            station,
            fresh_bike,
            now + Duration::minutes(10),
            hold(),
        )
        .unwrap();

        let released = book
            .release_all_lapsed(&mut inv, now + Duration::minutes(16))
            .unwrap();
        assert_eq!(released.len(), 1);
        assert_eq!(released[0].bike, bike);
        assert_eq!(inv.bike(fresh_bike).unwrap().status, BikeStatus::Reserved);
    }

    #[test]
    fn test_reserve_rejected_at_out_of_service_station() {
        let (mut inv, mut book, station, bike, user) = seeded();
        inv.set_station_status(station, StationStatus::OutOfService).unwrap();
        assert!(matches!(
            book.reserve(&mut inv, user, station, bike, Utc::now(), hold()),
            Err(VeloError::StationOutOfService(_))
        ));
    }

    #[test]
    fn test_reserve_rejects_bike_docked_elsewhere() {
        let (mut inv, mut book, _station, bike, user) = seeded();
        let other = inv.add_station(
            "North".into(),
            "1 North Ave".into(),
            GeoPoint { lat: 48.0, lon: -122.0 },
            2,
        );
        assert!(matches!(
            book.reserve(&mut inv, user, other, bike, Utc::now(), hold()),
            Err(VeloError::Validation(_))
        ));
    }
}
