//! Checkpoint ledger
//!
//! Every (owner, asset) pair owns an append-only series of balance
//! checkpoints sorted by epoch. A deposit writes at most two entries: one for
//! the current epoch carrying the time-weighted multiplier of the fresh
//! deposits, and a lookahead entry for the next epoch at the full multiplier.
//! Only the tail of a series is ever rewritten, so any epoch strictly before
//! the current one is immutable history and can be queried by binary search.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::error::{LedgerError, Result};
use crate::math::{apply_multiplier, compute_new_multiplier, mul_div, BASE_MULTIPLIER};
use crate::{Address, Amount, AssetId, EpochId};

/// Balance snapshot of one owner for one epoch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub epoch_id: EpochId,
    pub multiplier: Amount,
    pub start_balance: Amount,
    pub new_deposits: Amount,
}

impl Checkpoint {
    pub fn new(epoch_id: EpochId, multiplier: Amount, start_balance: Amount, new_deposits: Amount) -> Self {
        Self {
            epoch_id,
            multiplier,
            start_balance,
            new_deposits,
        }
    }

    /// Nominal balance held during the epoch.
    pub fn balance(&self) -> Result<Amount> {
        self.start_balance
            .checked_add(self.new_deposits)
            .ok_or(LedgerError::Overflow)
    }

    /// Time-weighted balance for the epoch.
    pub fn effective_balance(&self) -> Result<Amount> {
        apply_multiplier(self.balance()?, self.multiplier)
    }
}

/// Ordered checkpoints of a single (owner, asset) pair.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckpointSeries {
    checkpoints: Vec<Checkpoint>,
}

impl CheckpointSeries {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn checkpoints(&self) -> &[Checkpoint] {
        &self.checkpoints
    }

    pub fn len(&self) -> usize {
        self.checkpoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.checkpoints.is_empty()
    }

    pub fn last(&self) -> Option<&Checkpoint> {
        self.checkpoints.last()
    }

    /// Record a deposit of `amount` made in `epoch` at `multiplier`.
    ///
    /// `balance_after` is the owner's nominal balance once the deposit is
    /// applied; it becomes the start balance of the lookahead checkpoint.
    pub fn record_deposit(
        &mut self,
        epoch: EpochId,
        multiplier: Amount,
        amount: Amount,
        balance_after: Amount,
    ) -> Result<()> {
        if amount == 0 {
            return Err(LedgerError::InvalidAmount("deposit amount must be > 0".to_string()));
        }
        let next_epoch = epoch.checked_add(1).ok_or(LedgerError::Overflow)?;

        let Some(last) = self.checkpoints.last().copied() else {
            self.checkpoints
                .push(Checkpoint::new(epoch, multiplier, 0, amount));
            self.checkpoints
                .push(Checkpoint::new(next_epoch, BASE_MULTIPLIER, balance_after, 0));
            return Ok(());
        };

        if last.epoch_id < epoch {
            // Idle since an older epoch: the previous balance is fully vested.
            let prev_balance = last.balance()?;
            let blended =
                compute_new_multiplier(prev_balance, BASE_MULTIPLIER, amount, multiplier)?;
            self.checkpoints
                .push(Checkpoint::new(epoch, blended, prev_balance, amount));
            self.checkpoints
                .push(Checkpoint::new(next_epoch, BASE_MULTIPLIER, balance_after, 0));
        } else if last.epoch_id == epoch {
            let tail = self.tail_mut(0)?;
            tail.multiplier =
                compute_new_multiplier(last.balance()?, last.multiplier, amount, multiplier)?;
            tail.new_deposits = tail
                .new_deposits
                .checked_add(amount)
                .ok_or(LedgerError::Overflow)?;
            self.checkpoints
                .push(Checkpoint::new(next_epoch, BASE_MULTIPLIER, balance_after, 0));
        } else if last.epoch_id == next_epoch {
            if let Some(current) = self.current_before_lookahead(epoch) {
                let current_balance = current.balance()?;
                let current_multiplier = current.multiplier;
                let entry = self.tail_mut(1)?;
                entry.multiplier = compute_new_multiplier(
                    current_balance,
                    current_multiplier,
                    amount,
                    multiplier,
                )?;
                entry.new_deposits = entry
                    .new_deposits
                    .checked_add(amount)
                    .ok_or(LedgerError::Overflow)?;
            }
            self.tail_mut(0)?.start_balance = balance_after;
        } else {
            return Err(LedgerError::CorruptCheckpoints(format!(
                "last checkpoint is for epoch {} while recording epoch {}",
                last.epoch_id, epoch
            )));
        }

        log::debug!(
            "checkpoint deposit: epoch {} amount {} multiplier {} ({} checkpoints)",
            epoch,
            amount,
            multiplier,
            self.checkpoints.len()
        );
        Ok(())
    }

    /// Record a withdrawal of `amount` made in `epoch`.
    ///
    /// Withdrawals first consume the deposits made during `epoch`; anything
    /// beyond that comes out of the vested principal.
    pub fn record_withdraw(
        &mut self,
        epoch: EpochId,
        amount: Amount,
        balance_after: Amount,
    ) -> Result<()> {
        let Some(last) = self.checkpoints.last().copied() else {
            return Err(LedgerError::InsufficientBalance {
                requested: amount,
                available: 0,
            });
        };
        let next_epoch = epoch.checked_add(1).ok_or(LedgerError::Overflow)?;

        if last.epoch_id < epoch {
            self.checkpoints
                .push(Checkpoint::new(epoch, BASE_MULTIPLIER, balance_after, 0));
        } else if last.epoch_id == epoch {
            let tail = self.tail_mut(0)?;
            tail.start_balance = balance_after;
            tail.new_deposits = 0;
            tail.multiplier = BASE_MULTIPLIER;
        } else if last.epoch_id == next_epoch {
            let current = self.current_before_lookahead(epoch).ok_or_else(|| {
                LedgerError::CorruptCheckpoints(format!(
                    "lookahead for epoch {} without a checkpoint for epoch {}",
                    next_epoch, epoch
                ))
            })?;
            let balance_before = current.effective_balance()?;
            let mut updated = current;

            if amount < current.new_deposits {
                // Rounding can leave the effective balance a unit under the
                // vested principal when the fresh deposits barely count.
                let fresh_effective = balance_before.saturating_sub(current.start_balance);
                let avg_deposit_multiplier =
                    mul_div(fresh_effective, BASE_MULTIPLIER, current.new_deposits)?;
                updated.new_deposits = current.new_deposits - amount;
                updated.multiplier = compute_new_multiplier(
                    current.start_balance,
                    BASE_MULTIPLIER,
                    updated.new_deposits,
                    avg_deposit_multiplier,
                )?;
            } else {
                let from_principal = amount - current.new_deposits;
                updated.start_balance = current.start_balance.checked_sub(from_principal).ok_or(
                    LedgerError::InsufficientBalance {
                        requested: amount,
                        available: current.balance()?,
                    },
                )?;
                updated.new_deposits = 0;
                updated.multiplier = BASE_MULTIPLIER;
            }

            *self.tail_mut(1)? = updated;
            self.tail_mut(0)?.start_balance = balance_after;
        } else {
            return Err(LedgerError::CorruptCheckpoints(format!(
                "last checkpoint is for epoch {} while recording epoch {}",
                last.epoch_id, epoch
            )));
        }

        log::debug!(
            "checkpoint withdraw: epoch {} amount {} ({} checkpoints)",
            epoch,
            amount,
            self.checkpoints.len()
        );
        Ok(())
    }

    /// Effective balance of the latest checkpoint at or before `epoch`, or 0
    /// when the series starts after `epoch`.
    pub fn balance_at(&self, epoch: EpochId) -> Result<Amount> {
        let (Some(first), Some(last)) = (self.checkpoints.first(), self.checkpoints.last()) else {
            return Ok(0);
        };
        if epoch < first.epoch_id {
            return Ok(0);
        }
        if epoch >= last.epoch_id {
            return last.effective_balance();
        }

        let idx = self.checkpoints.partition_point(|c| c.epoch_id <= epoch);
        self.checkpoints[idx - 1].effective_balance()
    }

    /// True when epoch ids strictly increase along the series.
    pub fn is_sorted(&self) -> bool {
        self.checkpoints
            .windows(2)
            .all(|pair| pair[0].epoch_id < pair[1].epoch_id)
    }

    fn tail_mut(&mut self, from_end: usize) -> Result<&mut Checkpoint> {
        let len = self.checkpoints.len();
        if from_end >= len {
            return Err(LedgerError::CorruptCheckpoints(format!(
                "series has {} checkpoints, wanted tail offset {}",
                len, from_end
            )));
        }
        Ok(&mut self.checkpoints[len - 1 - from_end])
    }

    fn current_before_lookahead(&self, epoch: EpochId) -> Option<Checkpoint> {
        let len = self.checkpoints.len();
        if len < 2 {
            return None;
        }
        let candidate = self.checkpoints[len - 2];
        (candidate.epoch_id == epoch).then_some(candidate)
    }
}

/// Checkpoint series for every (owner, asset) pair, owned by a pool.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CheckpointLedger {
    series: HashMap<Address, HashMap<AssetId, CheckpointSeries>>,
}

impl CheckpointLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn series(&self, owner: &str, asset: &str) -> Option<&CheckpointSeries> {
        self.series.get(owner).and_then(|assets| assets.get(asset))
    }

    fn series_mut(&mut self, owner: &str, asset: &str) -> &mut CheckpointSeries {
        self.series
            .entry(owner.to_string())
            .or_default()
            .entry(asset.to_string())
            .or_default()
    }

    pub fn record_deposit(
        &mut self,
        owner: &str,
        asset: &str,
        epoch: EpochId,
        multiplier: Amount,
        amount: Amount,
        balance_after: Amount,
    ) -> Result<()> {
        self.series_mut(owner, asset)
            .record_deposit(epoch, multiplier, amount, balance_after)
    }

    pub fn record_withdraw(
        &mut self,
        owner: &str,
        asset: &str,
        epoch: EpochId,
        amount: Amount,
        balance_after: Amount,
    ) -> Result<()> {
        match self
            .series
            .get_mut(owner)
            .and_then(|assets| assets.get_mut(asset))
        {
            Some(series) => series.record_withdraw(epoch, amount, balance_after),
            None => Err(LedgerError::InsufficientBalance {
                requested: amount,
                available: 0,
            }),
        }
    }

    pub fn balance_at(&self, owner: &str, asset: &str, epoch: EpochId) -> Result<Amount> {
        match self.series(owner, asset) {
            Some(series) => series.balance_at(epoch),
            None => Ok(0),
        }
    }

    /// Number of (owner, asset) series tracked.
    pub fn series_count(&self) -> usize {
        self.series.values().map(HashMap::len).sum()
    }
}
