//! Staking pool error types

use epoch_core::{Amount, ConfigError, EpochId, LedgerError, Role};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StakingError {
    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    #[error("Insufficient balance: requested {requested}, available {available}")]
    InsufficientBalance { requested: Amount, available: Amount },

    #[error("Epoch {epoch} has not elapsed yet (current epoch is {current})")]
    EpochNotElapsed { epoch: EpochId, current: EpochId },

    #[error("Epoch {epoch} is beyond the reward schedule of {epochs_count} epochs")]
    EpochBeyondSchedule { epoch: EpochId, epochs_count: u64 },

    #[error("Harvest out of order: expected epoch {expected}, requested {requested}")]
    OutOfOrder { expected: EpochId, requested: EpochId },

    #[error("Emergency withdraw locked: {elapsed} epochs since last success, {required} required")]
    EmergencyLocked { elapsed: u64, required: u64 },

    #[error("Nothing to withdraw")]
    NothingToWithdraw,

    #[error("Unauthorized: {account} lacks role {role}")]
    Unauthorized { role: Role, account: String },
}

impl From<ConfigError> for StakingError {
    fn from(err: ConfigError) -> Self {
        StakingError::InvalidConfig(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, StakingError>;
