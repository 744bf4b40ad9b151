//! Flexible staking pool
//!
//! Users deposit and withdraw the staked asset at any time. Every movement is
//! booked in the checkpoint ledger (time-weighted per epoch) and in the
//! pool-size registry: the next epoch is snapshotted to the pool's live
//! balance, the current epoch moves by the change in the user's effective
//! balance.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use epoch_core::{
    AccessControl, Address, Amount, CheckpointLedger, EpochClock, EpochId, FungibleAsset,
    PoolSizeRegistry, ReentrancyGuard, StakingConfig, Timestamp,
};

use crate::error::{Result, StakingError};
use crate::harvest::{FarmState, FrozenEpoch};

/// Mutable book of the pool; restored wholesale when an operation fails.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PoolState {
    pub(crate) balances: HashMap<Address, Amount>,
    pub(crate) checkpoints: CheckpointLedger,
    pub(crate) pool_sizes: PoolSizeRegistry,
    /// Epoch of the last successful withdraw or harvest
    pub(crate) last_success_epoch: EpochId,
    pub(crate) total_reward_per_epoch: Amount,
    pub(crate) farm: FarmState,
}

/// Dashboard summary of the pool
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolReport {
    pub current_epoch: EpochId,
    pub current_multiplier: Amount,
    pub staked_asset: String,
    pub total_staked: Amount,
    pub stakers: usize,
    pub current_pool_size: Amount,
    pub next_pool_size: Amount,
    pub total_reward_per_epoch: Amount,
    pub last_frozen_epoch: EpochId,
    pub total_distributed: Amount,
}

pub struct FlexiblePool<L, R> {
    pub(crate) config: StakingConfig,
    pub(crate) clock: EpochClock,
    pub(crate) state: PoolState,
    pub(crate) ledger: L,
    pub(crate) roles: R,
    guard: ReentrancyGuard,
}

impl<L, R> FlexiblePool<L, R>
where
    L: FungibleAsset + Clone,
    R: AccessControl,
{
    /// Create a pool; epoch 0 of the staked asset is booked at size 0.
    pub fn new(config: StakingConfig, clock: EpochClock, ledger: L, roles: R) -> Result<Self> {
        config.validate()?;
        let mut state = PoolState {
            total_reward_per_epoch: config.total_reward_per_epoch,
            ..PoolState::default()
        };
        state.pool_sizes.ensure_initialized(&config.staked_asset, 0)?;

        log::info!(
            "flexible pool {} staking {} ({} epochs, {} {} per epoch)",
            config.pool_address,
            config.staked_asset,
            config.epochs_count,
            config.total_reward_per_epoch,
            config.reward_asset
        );

        Ok(Self {
            config,
            clock,
            state,
            ledger,
            roles,
            guard: ReentrancyGuard::new(),
        })
    }

    /// Run `op` under the reentrancy guard; on error the pool state and the
    /// token ledger are rolled back.
    pub(crate) fn transact<T, F>(&mut self, op: F) -> Result<T>
    where
        F: FnOnce(&mut Self) -> Result<T>,
    {
        self.guard.enter()?;
        let state = self.state.clone();
        let ledger = self.ledger.clone();

        let outcome = op(self);
        if outcome.is_err() {
            self.state = state;
            self.ledger = ledger;
        }

        self.guard.exit();
        outcome
    }

    pub fn deposit(&mut self, user: &str, amount: Amount, now: Timestamp) -> Result<()> {
        self.transact(|pool| pool.deposit_inner(user, amount, now))
    }

    fn deposit_inner(&mut self, user: &str, amount: Amount, now: Timestamp) -> Result<()> {
        if amount == 0 {
            return Err(StakingError::InvalidAmount(
                "deposit amount must be > 0".to_string(),
            ));
        }
        let asset = self.config.staked_asset.clone();
        let pool_address = self.config.pool_address.clone();

        self.ledger
            .transfer_from(&asset, &pool_address, user, &pool_address, amount)?;

        let balance = self
            .balance_of(user)
            .checked_add(amount)
            .ok_or(epoch_core::LedgerError::Overflow)?;
        self.state.balances.insert(user.to_string(), balance);

        let epoch = self.clock.current_epoch(now);
        let multiplier = self.clock.decay_multiplier(now);
        self.prepare_epoch(epoch)?;

        let before = self.state.checkpoints.balance_at(user, &asset, epoch)?;
        self.state
            .checkpoints
            .record_deposit(user, &asset, epoch, multiplier, amount, balance)?;
        let after = self.state.checkpoints.balance_at(user, &asset, epoch)?;
        self.apply_size_change(epoch, before, after)?;

        log::info!(
            "deposit: {} staked {} {} in epoch {} (balance {})",
            user,
            amount,
            asset,
            epoch,
            balance
        );
        Ok(())
    }

    pub fn withdraw(&mut self, user: &str, amount: Amount, now: Timestamp) -> Result<()> {
        self.transact(|pool| pool.withdraw_inner(user, amount, now))
    }

    fn withdraw_inner(&mut self, user: &str, amount: Amount, now: Timestamp) -> Result<()> {
        if amount == 0 {
            return Err(StakingError::InvalidAmount(
                "withdraw amount must be > 0".to_string(),
            ));
        }
        let available = self.balance_of(user);
        if available < amount {
            return Err(StakingError::InsufficientBalance {
                requested: amount,
                available,
            });
        }
        let asset = self.config.staked_asset.clone();
        let pool_address = self.config.pool_address.clone();

        let balance = available - amount;
        self.state.balances.insert(user.to_string(), balance);
        self.ledger.transfer(&asset, &pool_address, user, amount)?;

        let epoch = self.clock.current_epoch(now);
        self.state.last_success_epoch = epoch;
        self.prepare_epoch(epoch)?;

        let before = self.state.checkpoints.balance_at(user, &asset, epoch)?;
        self.state
            .checkpoints
            .record_withdraw(user, &asset, epoch, amount, balance)?;
        let after = self.state.checkpoints.balance_at(user, &asset, epoch)?;
        self.apply_size_change(epoch, before, after)?;

        log::info!(
            "withdraw: {} took {} {} in epoch {} (balance {})",
            user,
            amount,
            asset,
            epoch,
            balance
        );
        Ok(())
    }

    /// Return the user's whole balance without touching the checkpoints.
    ///
    /// Only allowed once `emergency_withdraw_epochs` epochs passed since the
    /// pool last completed a withdraw or a harvest.
    pub fn emergency_withdraw(&mut self, user: &str, now: Timestamp) -> Result<Amount> {
        self.transact(|pool| {
            let epoch = pool.clock.current_epoch(now);
            let elapsed = epoch.saturating_sub(pool.state.last_success_epoch);
            let required = pool.config.emergency_withdraw_epochs;
            if elapsed < required {
                return Err(StakingError::EmergencyLocked { elapsed, required });
            }

            let balance = pool.balance_of(user);
            if balance == 0 {
                return Err(StakingError::NothingToWithdraw);
            }
            pool.state.balances.insert(user.to_string(), 0);
            pool.ledger.transfer(
                &pool.config.staked_asset,
                &pool.config.pool_address,
                user,
                balance,
            )?;

            log::warn!(
                "emergency withdraw: {} recovered {} {} in epoch {} ({} epochs idle)",
                user,
                balance,
                pool.config.staked_asset,
                epoch,
                elapsed
            );
            Ok(balance)
        })
    }

    /// Book the pool size of `epoch`; epochs must be booked in order.
    pub fn manual_epoch_init(&mut self, epoch: EpochId, now: Timestamp) -> Result<()> {
        let current = self.clock.current_epoch(now);
        self.transact(|pool| {
            pool.state
                .pool_sizes
                .manual_init(&pool.config.staked_asset, epoch, current)?;
            Ok(())
        })
    }

    /// Book every missing epoch up to and including `epoch`.
    pub fn init_epochs_through(&mut self, epoch: EpochId, now: Timestamp) -> Result<usize> {
        let current = self.clock.current_epoch(now);
        self.transact(|pool| {
            let asset = pool.config.staked_asset.clone();
            let mut booked = 0;
            for target in 0..=epoch {
                if !pool.state.pool_sizes.is_initialized(&asset, target) {
                    pool.state.pool_sizes.manual_init(&asset, target, current)?;
                    booked += 1;
                }
            }
            Ok(booked)
        })
    }

    /// Book the current epoch and snapshot the next one to the live balance.
    fn prepare_epoch(&mut self, epoch: EpochId) -> Result<()> {
        let asset = &self.config.staked_asset;
        self.state.pool_sizes.ensure_initialized(asset, epoch)?;

        let live = self.ledger.balance_of(asset, &self.config.pool_address);
        let next = epoch.checked_add(1).ok_or(epoch_core::LedgerError::Overflow)?;
        self.state.pool_sizes.snapshot(asset, next, live);
        Ok(())
    }

    fn apply_size_change(&mut self, epoch: EpochId, before: Amount, after: Amount) -> Result<()> {
        let asset = &self.config.staked_asset;
        if after >= before {
            self.state.pool_sizes.increase(asset, epoch, after - before)?;
        } else {
            self.state.pool_sizes.decrease(asset, epoch, before - after)?;
        }
        Ok(())
    }

    pub fn config(&self) -> &StakingConfig {
        &self.config
    }

    pub fn clock(&self) -> &EpochClock {
        &self.clock
    }

    pub fn ledger(&self) -> &L {
        &self.ledger
    }

    /// Direct access to the token ledger (funding, approvals).
    pub fn ledger_mut(&mut self) -> &mut L {
        &mut self.ledger
    }

    pub fn balance_of(&self, user: &str) -> Amount {
        self.state.balances.get(user).copied().unwrap_or(0)
    }

    /// Time-weighted balance of `user` for `epoch`.
    pub fn epoch_user_balance(&self, user: &str, epoch: EpochId) -> Result<Amount> {
        Ok(self
            .state
            .checkpoints
            .balance_at(user, &self.config.staked_asset, epoch)?)
    }

    pub fn epoch_pool_size(&self, epoch: EpochId) -> Amount {
        let asset = &self.config.staked_asset;
        let live = self.ledger.balance_of(asset, &self.config.pool_address);
        self.state.pool_sizes.current_size(asset, epoch, live)
    }

    pub fn epoch_is_initialized(&self, epoch: EpochId) -> bool {
        self.state
            .pool_sizes
            .is_initialized(&self.config.staked_asset, epoch)
    }

    pub fn pool_sizes(&self) -> &PoolSizeRegistry {
        &self.state.pool_sizes
    }

    pub fn checkpoints(&self) -> &CheckpointLedger {
        &self.state.checkpoints
    }

    pub fn current_epoch(&self, now: Timestamp) -> EpochId {
        self.clock.current_epoch(now)
    }

    pub fn current_epoch_multiplier(&self, now: Timestamp) -> Amount {
        self.clock.decay_multiplier(now)
    }

    pub fn frozen_epoch(&self, epoch: EpochId) -> Option<&FrozenEpoch> {
        self.state.farm.frozen.get(&epoch)
    }

    pub fn is_locked(&self) -> bool {
        self.guard.is_entered()
    }

    pub fn report(&self, now: Timestamp) -> PoolReport {
        let epoch = self.clock.current_epoch(now);
        PoolReport {
            current_epoch: epoch,
            current_multiplier: self.clock.decay_multiplier(now),
            staked_asset: self.config.staked_asset.clone(),
            total_staked: self.state.balances.values().sum(),
            stakers: self.state.balances.values().filter(|b| **b > 0).count(),
            current_pool_size: self.epoch_pool_size(epoch),
            next_pool_size: self.epoch_pool_size(epoch.saturating_add(1)),
            total_reward_per_epoch: self.state.total_reward_per_epoch,
            last_frozen_epoch: self.state.farm.last_initialized_epoch,
            total_distributed: self.state.farm.total_distributed,
        }
    }

    pub fn report_json(&self, now: Timestamp) -> serde_json::Result<String> {
        serde_json::to_string_pretty(&self.report(now))
    }
}
