//! Tranche sides and per-epoch records

use serde::{Deserialize, Serialize};
use std::fmt;

use epoch_core::{Amount, CheckpointSeries, EpochId, LedgerError};

/// Risk side of the pool. Junior capital absorbs losses first and is
/// rewarded with the upside; senior capital is capped relative to junior.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tranche {
    Junior,
    Senior,
}

impl fmt::Display for Tranche {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Tranche::Junior => write!(f, "junior"),
            Tranche::Senior => write!(f, "senior"),
        }
    }
}

/// One value per tranche.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrancheSides<T> {
    pub junior: T,
    pub senior: T,
}

impl<T> TrancheSides<T> {
    pub fn new(junior: T, senior: T) -> Self {
        Self { junior, senior }
    }

    pub fn get(&self, tranche: Tranche) -> &T {
        match tranche {
            Tranche::Junior => &self.junior,
            Tranche::Senior => &self.senior,
        }
    }

    pub fn get_mut(&mut self, tranche: Tranche) -> &mut T {
        match tranche {
            Tranche::Junior => &mut self.junior,
            Tranche::Senior => &mut self.senior,
        }
    }
}

impl TrancheSides<Amount> {
    pub fn total(&self) -> Result<Amount, LedgerError> {
        self.junior
            .checked_add(self.senior)
            .ok_or(LedgerError::Overflow)
    }

    pub fn add(&mut self, tranche: Tranche, amount: Amount) -> Result<(), LedgerError> {
        let side = self.get_mut(tranche);
        *side = side.checked_add(amount).ok_or(LedgerError::Overflow)?;
        Ok(())
    }
}

/// Pool-wide record of an epoch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EpochData {
    pub posted_results: bool,
    /// Nominal principal per tranche
    pub staked: TrancheSides<Amount>,
    /// Principal per tranche after the epoch's gains and losses
    pub results: TrancheSides<Amount>,
    /// Time-weighted principal per tranche, the reward key
    pub weighted: TrancheSides<Amount>,
    /// Reward shared by the epoch's stakers, fixed when results are posted
    pub reward_budget: Amount,
}

/// A user's position in one tranche for one epoch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrancheBalance {
    /// Principal still in the pool; zeroed on withdrawal
    pub balance: Amount,
    pub series: CheckpointSeries,
}

impl TrancheBalance {
    /// Time-weighted stake for `epoch`.
    pub fn weighted(&self, epoch: EpochId) -> Result<Amount, LedgerError> {
        self.series.balance_at(epoch)
    }
}

/// A user's positions for one epoch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserHistory {
    pub sides: TrancheSides<TrancheBalance>,
    pub rewards_claimed: TrancheSides<bool>,
}
