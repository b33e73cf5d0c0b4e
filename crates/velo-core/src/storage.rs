//! Persistent storage for fleet state.
//!
//! The whole fleet (stations, docks, bikes, reservations, rentals, loyalty
//! accounts, ledger rows, damage reports) persists as one JSON document,
//! rewritten after each mutating operation and reloaded on start.

use std::path::PathBuf;

use crate::error::{Result, VeloError};
use crate::fleet::FleetState;

/// Storage backend for velo data.
#[derive(Debug, Clone)]
pub struct Storage {
    data_dir: PathBuf,
}

impl Storage {
    /// Create a storage instance rooted at `data_dir`.
    #[must_use]
    pub fn new(data_dir: PathBuf) -> Self {
        Self { data_dir }
    }

    /// The default storage location.
    ///
    /// On Linux deployments: `/var/lib/velo/`.
    /// Elsewhere: the platform data dir.
    ///
    /// # Errors
    ///
    /// Returns an error if no data directory can be determined.
    pub fn default_location() -> Result<Self> {
        #[cfg(target_os = "linux")]
        {
            Ok(Self::new(PathBuf::from("/var/lib/velo")))
        }
        #[cfg(not(target_os = "linux"))]
        {
            let dirs = directories::ProjectDirs::from("", "", "velo").ok_or_else(|| {
                VeloError::Persistence("cannot determine data directory".into())
            })?;
            Ok(Self::new(dirs.data_dir().to_path_buf()))
        }
    }

    /// Load persisted fleet state, if any exists.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load_fleet(&self) -> Result<Option<FleetState>> {
        let path = self.fleet_path();
        if !path.exists() {
            return Ok(None);
        }
        let content = std::fs::read_to_string(&path)
            .map_err(|e| VeloError::Persistence(format!("read {}: {e}", path.display())))?;
        let state = serde_json::from_str(&content)
            .map_err(|e| VeloError::Persistence(format!("parse {}: {e}", path.display())))?;
        Ok(Some(state))
    }

    /// Persist the fleet state, replacing any previous snapshot.
    ///
    /// Writes to a sibling temp file first and renames, so a crash mid-write
    /// never corrupts the last good snapshot.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory or file cannot be written.
    pub fn save_fleet(&self, state: &FleetState) -> Result<()> {
        std::fs::create_dir_all(&self.data_dir).map_err(|e| {
            VeloError::Persistence(format!("mkdir {}: {e}", self.data_dir.display()))
        })?;
        let path = self.fleet_path();
        let tmp = path.with_extension("json.tmp");
        let content = serde_json::to_string_pretty(state)
            .map_err(|e| VeloError::Persistence(format!("serialize fleet state: {e}")))?;
        std::fs::write(&tmp, content)
            .map_err(|e| VeloError::Persistence(format!("write {}: {e}", tmp.display())))?;
        std::fs::rename(&tmp, &path)
            .map_err(|e| VeloError::Persistence(format!("rename {}: {e}", path.display())))?;
        Ok(())
    }

    fn fleet_path(&self) -> PathBuf {
        self.data_dir.join("fleet.json")
    }
}
