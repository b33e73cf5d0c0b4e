//! Typed event outbox.
//!
//! The engine records notable state changes here instead of broadcasting
//! through ambient channels; the presentation layer drains the outbox and
//! decides how to notify riders and operators.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use crate::types::{
    BikeId, Cents, DamageReportId, LoyaltyTier, ReservationId, StationId, UserId,
};

/// A domain event emitted by the fleet engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FleetEvent {
    /// A rider's loyalty tier changed at rental completion.
    TierChanged {
        /// Rider whose tier changed.
        user: UserId,
        /// Previous tier.
        old: LoyaltyTier,
        /// New tier.
        new: LoyaltyTier,
    },

    /// Flex dollars were credited for a low-occupancy return.
    FlexDollarsCredited {
        /// Rider credited.
        user: UserId,
        /// Credit amount in cents.
        amount_cents: Cents,
        /// Balance after the credit.
        balance_cents: Cents,
        /// Station the return refilled.
        station: StationId,
    },

    /// A rider reported damage mid-rental.
    DamageReported {
        /// The recorded report.
        report: DamageReportId,
        /// Damaged bike, now in maintenance.
        bike: BikeId,
        /// Reporting rider.
        user: UserId,
    },

    /// A lapsed reservation hold was released back to available.
    ReservationExpired {
        /// The expired reservation.
        reservation: ReservationId,
        /// Rider who held it.
        user: UserId,
        /// Bike released.
        bike: BikeId,
    },
}

/// FIFO buffer of pending events.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct EventOutbox {
    events: VecDeque<FleetEvent>,
}

impl EventOutbox {
    /// Create an empty outbox.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an event.
    pub fn push(&mut self, event: FleetEvent) {
        self.events.push_back(event);
    }

    /// Take all pending events, oldest first.
    pub fn drain(&mut self) -> Vec<FleetEvent> {
        self.events.drain(..).collect()
    }

    /// Number of undelivered events.
    #[must_use]
    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// Whether the outbox is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}
