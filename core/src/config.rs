//! Deployment parameters
//!
//! Loaded from TOML, e.g.
//!
//! ```toml
//! [clock]
//! epoch_start = "2026-01-05T00:00:00Z"
//! epoch_duration_secs = 604800
//!
//! [staking]
//! pool_address = "staking-pool"
//! staked_asset = "BOND"
//! reward_asset = "REWARD"
//! reward_vault = "community-vault"
//! total_reward_per_epoch = 100000
//! epochs_count = 25
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use thiserror::Error;

use crate::clock::{DEFAULT_EPOCH_DURATION, DEFAULT_JUNIOR_WINDOW};
use crate::{Address, Amount, AssetId};

/// Default senior:junior capital cap
pub const DEFAULT_SENIOR_RATIO: Amount = 5;

/// Default distance between a reward epoch and the staking epoch it settles
pub const DEFAULT_REWARD_EPOCH_OFFSET: u64 = 1;

/// Default inactivity threshold for the emergency withdrawal (epochs)
pub const DEFAULT_EMERGENCY_EPOCHS: u64 = 10;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Invalid value: {0}")]
    InvalidValue(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClockConfig {
    pub epoch_start: DateTime<Utc>,

    #[serde(default = "default_epoch_duration")]
    pub epoch_duration_secs: u64,

    #[serde(default = "default_junior_window")]
    pub junior_window_secs: u64,
}

impl ClockConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.epoch_duration_secs == 0 {
            return Err(ConfigError::InvalidValue(
                "epoch_duration_secs must be > 0".to_string(),
            ));
        }
        if self.junior_window_secs >= self.epoch_duration_secs {
            return Err(ConfigError::InvalidValue(format!(
                "junior_window_secs ({}) must be shorter than the epoch ({})",
                self.junior_window_secs, self.epoch_duration_secs
            )));
        }
        if self.epoch_start.timestamp() < 0 {
            return Err(ConfigError::InvalidValue(
                "epoch_start predates the unix epoch".to_string(),
            ));
        }
        Ok(())
    }
}

/// Flexible staking pool parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StakingConfig {
    /// Account holding staked funds
    pub pool_address: Address,

    pub staked_asset: AssetId,

    pub reward_asset: AssetId,

    /// Account the rewards are drawn from (must approve the pool)
    pub reward_vault: Address,

    pub total_reward_per_epoch: Amount,

    /// Number of reward epochs
    pub epochs_count: u64,

    #[serde(default = "default_reward_epoch_offset")]
    pub reward_epoch_offset: u64,

    #[serde(default = "default_emergency_epochs")]
    pub emergency_withdraw_epochs: u64,
}

impl StakingConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.epochs_count == 0 {
            return Err(ConfigError::InvalidValue(
                "epochs_count must be > 0".to_string(),
            ));
        }
        if self.staked_asset == self.reward_asset {
            return Err(ConfigError::InvalidValue(
                "staked_asset and reward_asset must differ".to_string(),
            ));
        }
        Ok(())
    }
}

/// Tranches pool parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranchesConfig {
    pub pool_address: Address,

    pub staked_asset: AssetId,

    pub reward_asset: AssetId,

    pub reward_vault: Address,

    pub rewards_per_epoch: Amount,

    /// Senior capital allowed per unit of junior capital
    #[serde(default = "default_senior_ratio")]
    pub senior_ratio: Amount,
}

impl TranchesConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.senior_ratio == 0 {
            return Err(ConfigError::InvalidValue(
                "senior_ratio must be > 0".to_string(),
            ));
        }
        Ok(())
    }
}

/// Complete deployment file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProtocolConfig {
    pub clock: ClockConfig,

    #[serde(default)]
    pub staking: Option<StakingConfig>,

    #[serde(default)]
    pub tranches: Option<TranchesConfig>,
}

impl ProtocolConfig {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path)?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        let config: ProtocolConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.clock.validate()?;
        if let Some(staking) = &self.staking {
            staking.validate()?;
        }
        if let Some(tranches) = &self.tranches {
            tranches.validate()?;
        }
        Ok(())
    }
}

fn default_epoch_duration() -> u64 {
    DEFAULT_EPOCH_DURATION
}

fn default_junior_window() -> u64 {
    DEFAULT_JUNIOR_WINDOW
}

fn default_senior_ratio() -> Amount {
    DEFAULT_SENIOR_RATIO
}

fn default_reward_epoch_offset() -> u64 {
    DEFAULT_REWARD_EPOCH_OFFSET
}

fn default_emergency_epochs() -> u64 {
    DEFAULT_EMERGENCY_EPOCHS
}
