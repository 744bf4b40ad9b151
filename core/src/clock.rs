//! Epoch clock
//!
//! Maps wall-clock time onto epoch indices and the within-epoch decay
//! multiplier. Epoch 0 is the pre-launch period: every timestamp at or before
//! `epoch_start` belongs to it and all derived quantities are zero/false.

use serde::{Deserialize, Serialize};

use crate::config::{ClockConfig, ConfigError};
use crate::math::BASE_MULTIPLIER;
use crate::{Amount, EpochId, Timestamp};

/// Default epoch length (7 days)
pub const DEFAULT_EPOCH_DURATION: u64 = 7 * 86400;

/// Default junior deposit window at the start of each epoch (24 hours)
pub const DEFAULT_JUNIOR_WINDOW: u64 = 86400;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EpochClock {
    epoch_start: Timestamp,
    epoch_duration: u64,
    junior_window: u64,
}

impl EpochClock {
    pub fn new(epoch_start: Timestamp, epoch_duration: u64) -> Self {
        Self {
            epoch_start,
            epoch_duration: epoch_duration.max(1),
            junior_window: DEFAULT_JUNIOR_WINDOW.min(epoch_duration),
        }
    }

    pub fn with_junior_window(mut self, junior_window: u64) -> Self {
        self.junior_window = junior_window.min(self.epoch_duration);
        self
    }

    pub fn from_config(config: &ClockConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let epoch_start = Timestamp::try_from(config.epoch_start.timestamp()).map_err(|_| {
            ConfigError::InvalidValue(format!(
                "epoch_start {} predates the unix epoch",
                config.epoch_start
            ))
        })?;
        Ok(Self::new(epoch_start, config.epoch_duration_secs)
            .with_junior_window(config.junior_window_secs))
    }

    pub fn epoch_start(&self) -> Timestamp {
        self.epoch_start
    }

    pub fn epoch_duration(&self) -> u64 {
        self.epoch_duration
    }

    pub fn junior_window(&self) -> u64 {
        self.junior_window
    }

    /// Epoch containing `now`.
    pub fn current_epoch(&self, now: Timestamp) -> EpochId {
        if now <= self.epoch_start {
            return 0;
        }
        (now - self.epoch_start) / self.epoch_duration + 1
    }

    /// Timestamp at which `epoch` starts. Epoch 0 has no start of its own.
    pub fn epoch_start_of(&self, epoch: EpochId) -> Timestamp {
        if epoch == 0 {
            return 0;
        }
        self.epoch_start
            .saturating_add((epoch - 1).saturating_mul(self.epoch_duration))
    }

    /// Fraction of the current epoch still ahead of `now`, scaled by
    /// [`BASE_MULTIPLIER`].
    pub fn decay_multiplier(&self, now: Timestamp) -> Amount {
        let epoch = self.current_epoch(now);
        if epoch == 0 {
            return 0;
        }
        let epoch_end = self.epoch_start_of(epoch).saturating_add(self.epoch_duration);
        let time_left = epoch_end.saturating_sub(now);
        Amount::from(time_left) * BASE_MULTIPLIER / Amount::from(self.epoch_duration)
    }

    /// True during the first `junior_window` seconds of every epoch.
    pub fn is_junior_period(&self, now: Timestamp) -> bool {
        let epoch = self.current_epoch(now);
        if epoch == 0 {
            return false;
        }
        now - self.epoch_start_of(epoch) < self.junior_window
    }
}
