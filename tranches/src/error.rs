//! Tranches pool error types

use epoch_core::{Amount, ConfigError, EpochId, LedgerError, Role};
use thiserror::Error;

use crate::tranche::Tranche;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TranchesError {
    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    #[error("Staking has not started yet")]
    EpochNotStarted,

    #[error("Junior deposits are closed for epoch {epoch}")]
    JuniorWindowClosed { epoch: EpochId },

    #[error("Senior deposits open after the junior window of epoch {epoch}")]
    JuniorWindowOpen { epoch: EpochId },

    #[error("Senior limit reached: {staked} staked + {requested} requested exceeds {limit}")]
    SeniorLimitReached {
        requested: Amount,
        staked: Amount,
        limit: Amount,
    },

    #[error("Epoch {epoch} is not finalized (current epoch is {current})")]
    EpochNotFinalized { epoch: EpochId, current: EpochId },

    #[error("Results for epoch {epoch} can only be posted in the junior window of epoch {next}")]
    PostingWindowClosed { epoch: EpochId, next: EpochId },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Results already posted for epoch {epoch}")]
    ResultsAlreadyPosted { epoch: EpochId },

    #[error("Results not posted for epoch {epoch}")]
    ResultsNotPosted { epoch: EpochId },

    #[error("Results {results} do not match staked principal {staked}")]
    ConservationViolated { results: Amount, staked: Amount },

    #[error("Nothing to withdraw from the {tranche} tranche of epoch {epoch}")]
    NothingToWithdraw { epoch: EpochId, tranche: Tranche },

    #[error("Unauthorized: {account} lacks role {role}")]
    Unauthorized { role: Role, account: String },
}

impl From<ConfigError> for TranchesError {
    fn from(err: ConfigError) -> Self {
        TranchesError::InvalidConfig(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, TranchesError>;
