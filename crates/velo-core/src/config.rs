//! Application configuration management.
//!
//! All product constants live here rather than in code: per-minute rates by
//! bike class, loyalty tier bands with their discounts and hold windows, the
//! low-occupancy reward rule, and the default reservation hold window.
//! Thresholds and percentages are deliberately configuration, pending product
//! clarification of the exact values.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Result, VeloError};
use crate::types::{BikeClass, Cents, LoyaltyTier};

/// Main application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VeloConfig {
    /// Per-minute pricing by bike class.
    pub pricing: PricingConfig,

    /// Loyalty tier bands, discounts, and hold windows.
    pub loyalty: LoyaltyConfig,

    /// Low-occupancy return reward rule.
    pub rewards: RewardConfig,

    /// Reservation hold settings.
    pub reservations: ReservationConfig,
}

/// Per-minute rates in cents by bike class.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PricingConfig {
    /// Rate for standard bikes, cents per billed minute.
    pub standard_cents_per_minute: Cents,

    /// Rate for e-bikes, cents per billed minute. Must exceed the standard
    /// rate.
    pub ebike_cents_per_minute: Cents,
}

impl PricingConfig {
    /// The per-minute rate for a bike class.
    #[must_use]
    pub const fn rate_for(&self, class: BikeClass) -> Cents {
        match class {
            BikeClass::Standard => self.standard_cents_per_minute,
            BikeClass::EBike => self.ebike_cents_per_minute,
        }
    }
}

impl Default for PricingConfig {
    fn default() -> Self {
        Self {
            standard_cents_per_minute: 15,
            ebike_cents_per_minute: 25,
        }
    }
}

/// One loyalty tier band.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TierBand {
    /// The tier this band grants.
    pub tier: LoyaltyTier,

    /// Minimum completed trips to hold this tier.
    pub min_trips: u32,

    /// Percentage discount on the base trip cost (0-100).
    pub discount_pct: u8,

    /// Reservation hold window for riders at this tier, in minutes.
    pub hold_minutes: i64,
}

/// Loyalty tier bands in ascending trip-count order.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoyaltyConfig {
    /// Tier bands; a rider holds the highest band whose `min_trips` their
    /// trip count meets.
    pub bands: Vec<TierBand>,
}

impl LoyaltyConfig {
    /// The tier a rider with `trips` completed trips holds.
    #[must_use]
    pub fn tier_for(&self, trips: u32) -> LoyaltyTier {
        self.bands
            .iter()
            .filter(|band| trips >= band.min_trips)
            .map(|band| band.tier)
            .max()
            .unwrap_or(LoyaltyTier::None)
    }

    /// The discount percentage for a tier. Untiered riders get none.
    #[must_use]
    pub fn discount_pct(&self, tier: LoyaltyTier) -> u8 {
        self.bands
            .iter()
            .find(|band| band.tier == tier)
            .map_or(0, |band| band.discount_pct)
    }

    /// The reservation hold window for a tier, falling back to the default.
    #[must_use]
    pub fn hold_minutes(&self, tier: LoyaltyTier, default_minutes: i64) -> i64 {
        self.bands
            .iter()
            .find(|band| band.tier == tier)
            .map_or(default_minutes, |band| band.hold_minutes)
    }
}

impl Default for LoyaltyConfig {
    fn default() -> Self {
        Self {
            bands: vec![
                TierBand {
                    tier: LoyaltyTier::Bronze,
                    min_trips: 5,
                    discount_pct: 5,
                    hold_minutes: 15,
                },
                TierBand {
                    tier: LoyaltyTier::Silver,
                    min_trips: 15,
                    discount_pct: 10,
                    hold_minutes: 20,
                },
                TierBand {
                    tier: LoyaltyTier::Gold,
                    min_trips: 30,
                    discount_pct: 15,
                    hold_minutes: 25,
                },
                TierBand {
                    tier: LoyaltyTier::Platinum,
                    min_trips: 50,
                    discount_pct: 20,
                    hold_minutes: 30,
                },
            ],
        }
    }
}

/// Flex-dollar reward for returning bikes to under-occupied stations.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RewardConfig {
    /// A return earns the credit when the destination station's occupancy
    /// (docked bikes / capacity), measured before docking, is strictly below
    /// this fraction.
    pub low_occupancy_threshold: f64,

    /// Flat credit per qualifying return, in cents.
    pub credit_cents: Cents,
}

impl Default for RewardConfig {
    fn default() -> Self {
        Self {
            low_occupancy_threshold: 0.25,
            credit_cents: 100,
        }
    }
}

/// Reservation hold settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReservationConfig {
    /// Default hold window in minutes for riders without a tier band.
    pub default_hold_minutes: i64,
}

impl Default for ReservationConfig {
    fn default() -> Self {
        Self {
            default_hold_minutes: 15,
        }
    }
}

impl Default for VeloConfig {
    fn default() -> Self {
        Self {
            pricing: PricingConfig::default(),
            loyalty: LoyaltyConfig::default(),
            rewards: RewardConfig::default(),
            reservations: ReservationConfig::default(),
        }
    }
}

impl VeloConfig {
    /// Load configuration from `path`, or fall back to defaults if the file
    /// does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read, parsed, or
    /// validated.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        let config = if path.exists() {
            let content = std::fs::read_to_string(path)
                .map_err(|e| VeloError::Persistence(format!("read {}: {e}", path.display())))?;
            toml::from_str(&content).map_err(|e| VeloError::ConfigParse(e.to_string()))?
        } else {
            Self::default()
        };
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| VeloError::Persistence(format!("mkdir {}: {e}", parent.display())))?;
        }
        let content =
            toml::to_string_pretty(self).map_err(|e| VeloError::ConfigParse(e.to_string()))?;
        std::fs::write(path, content)
            .map_err(|e| VeloError::Persistence(format!("write {}: {e}", path.display())))?;
        Ok(())
    }

    /// The default configuration file path.
    ///
    /// On Linux deployments: `/etc/velo/config.toml`.
    /// Elsewhere: the platform config dir.
    #[must_use]
    pub fn default_path() -> PathBuf {
        #[cfg(target_os = "linux")]
        {
            PathBuf::from("/etc/velo/config.toml")
        }
        #[cfg(not(target_os = "linux"))]
        {
            directories::ProjectDirs::from("", "", "velo")
                .map(|dirs| dirs.config_dir().join("config.toml"))
                .unwrap_or_else(|| PathBuf::from("./velo-config.toml"))
        }
    }

    /// Check that the configuration is internally consistent.
    ///
    /// # Errors
    ///
    /// Returns [`VeloError::ConfigValidation`] describing the first problem.
    pub fn validate(&self) -> Result<()> {
        if self.pricing.standard_cents_per_minute <= 0 {
            return Err(VeloError::ConfigValidation(
                "pricing.standard_cents_per_minute must be positive".into(),
            ));
        }
        if self.pricing.ebike_cents_per_minute <= self.pricing.standard_cents_per_minute {
            return Err(VeloError::ConfigValidation(
                "pricing.ebike_cents_per_minute must exceed the standard rate".into(),
            ));
        }
        if !(0.0..=1.0).contains(&self.rewards.low_occupancy_threshold) {
            return Err(VeloError::ConfigValidation(
                "rewards.low_occupancy_threshold must be within [0, 1]".into(),
            ));
        }
        if self.rewards.credit_cents < 0 {
            return Err(VeloError::ConfigValidation(
                "rewards.credit_cents must not be negative".into(),
            ));
        }
        if self.reservations.default_hold_minutes <= 0 {
            return Err(VeloError::ConfigValidation(
                "reservations.default_hold_minutes must be positive".into(),
            ));
        }

        let mut last_trips = 0u32;
        for band in &self.loyalty.bands {
            if band.discount_pct > 100 {
                return Err(VeloError::ConfigValidation(format!(
                    "loyalty band {:?}: discount_pct must be at most 100",
                    band.tier
                )));
            }
            if band.hold_minutes <= 0 {
                return Err(VeloError::ConfigValidation(format!(
                    "loyalty band {:?}: hold_minutes must be positive",
                    band.tier
                )));
            }
            if band.min_trips < last_trips {
                return Err(VeloError::ConfigValidation(
                    "loyalty bands must be in ascending min_trips order".into(),
                ));
            }
            last_trips = band.min_trips;
        }
        Ok(())
    }
}
