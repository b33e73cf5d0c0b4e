//! # velo-server
//!
//! HTTP server for the velo bike-share fleet engine.
//!
//! This binary provides:
//! - REST API for stations, reservations, rentals, and billing
//! - OpenAPI documentation via Swagger UI
//! - Structured logging to file and stdout
//! - A background sweeper that releases lapsed reservation holds
//!
//! ## Running
//!
//! ```bash
//! # Development
//! cargo run --package velo-server
//!
//! # Production
//! VELO_ENV=production ./velo-server
//! ```

#![forbid(unsafe_code)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]

use std::net::SocketAddr;
use std::time::Duration;

use tokio::net::TcpListener;
use tracing::{info, warn};

use velo_server::api;
use velo_server::logging;
use velo_server::state::{AppState, SharedState};

/// How often the background sweeper releases lapsed reservation holds.
/// Expiry is enforced lazily on every request path; the sweeper only keeps
/// availability counts fresh for riders who are not interacting.
const SWEEP_INTERVAL: Duration = Duration::from_secs(60);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let is_production = std::env::var("VELO_ENV").is_ok_and(|v| v == "production");
    logging::init(is_production)?;

    info!("Starting velo-server");

    let state = AppState::new()?.shared();

    tokio::spawn(sweep_loop(state.clone()));

    let app = api::create_router(state);

    let port = std::env::var("VELO_PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(3000);
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(addr).await?;

    info!("Listening on {}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}

/// Periodically release lapsed reservation holds.
async fn sweep_loop(state: SharedState) {
    let mut interval = tokio::time::interval(SWEEP_INTERVAL);
    loop {
        interval.tick().await;
        let mut state_guard = state.write().await;
        match state_guard.fleet.sweep_expired_reservations() {
            Ok(0) => {}
            Ok(count) => {
                info!(count, "sweeper released lapsed holds");
                state_guard.publish_events();
            }
            Err(err) => warn!(error = %err, "reservation sweep failed"),
        }
    }
}
