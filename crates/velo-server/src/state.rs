//! Application state shared across handlers.

use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::info;
use velo_core::clock::SystemClock;
use velo_core::{Fleet, FleetEvent, Storage, VeloConfig};

/// Shared application state. Handlers take `state.read()` for queries and
/// `state.write()` for fleet mutations; the engine's compare-and-set
/// transitions keep bike state consistent regardless of lock granularity.
pub type SharedState = Arc<RwLock<AppState>>;

/// Application state: the fleet engine.
pub struct AppState {
    /// The fleet engine.
    pub fleet: Fleet,
}

impl AppState {
    /// Create application state for production: configuration from the
    /// default path, fleet state from the default storage location.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration or persisted state cannot be
    /// loaded.
    pub fn new() -> anyhow::Result<Self> {
        let config = VeloConfig::load_or_default(&VeloConfig::default_path())?;
        let storage = Storage::default_location()?;
        let fleet = Fleet::with_storage(config, Arc::new(SystemClock), storage)?;
        Ok(Self { fleet })
    }

    /// In-memory state with the given configuration. Used by tests.
    #[must_use]
    pub fn in_memory(config: VeloConfig) -> Self {
        Self {
            fleet: Fleet::new(config, Arc::new(SystemClock)),
        }
    }

    /// Wrap the state for sharing across handlers.
    #[must_use]
    pub fn shared(self) -> SharedState {
        Arc::new(RwLock::new(self))
    }

    /// Drain pending domain events and publish them.
    ///
    /// Currently this logs each event; a queue-backed publisher can slot in
    /// here without touching the handlers.
    pub fn publish_events(&mut self) {
        for event in self.fleet.drain_events() {
            match &event {
                FleetEvent::TierChanged { user, old, new } => {
                    info!(user = %user, ?old, ?new, "event: tier changed");
                }
                FleetEvent::FlexDollarsCredited {
                    user,
                    amount_cents,
                    balance_cents,
                    station,
                } => {
                    info!(
                        user = %user,
                        amount_cents,
                        balance_cents,
                        station = %station,
                        "event: flex dollars credited"
                    );
                }
                FleetEvent::DamageReported { report, bike, user } => {
                    info!(report = %report, bike = %bike, user = %user, "event: damage reported");
                }
                FleetEvent::ReservationExpired { reservation, user, bike } => {
                    info!(
                        reservation = %reservation,
                        user = %user,
                        bike = %bike,
                        "event: reservation expired"
                    );
                }
            }
        }
    }
}
