//! Reward farming on top of the flexible pool
//!
//! Reward epoch `e` is settled against staking epoch `e + offset`. The pool
//! size and the reward of a reward epoch are frozen the first time any user
//! harvests it; epochs are frozen in order.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

use epoch_core::{
    mul_div, AccessControl, Address, Amount, EpochId, FungibleAsset, LedgerError, Role, Timestamp,
};

use crate::error::{Result, StakingError};
use crate::pool::FlexiblePool;

/// Values fixed for a reward epoch when it is first harvested.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrozenEpoch {
    pub pool_size: Amount,
    pub reward: Amount,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FarmState {
    pub(crate) frozen: BTreeMap<EpochId, FrozenEpoch>,
    pub(crate) last_initialized_epoch: EpochId,
    pub(crate) last_harvested: HashMap<Address, EpochId>,
    pub(crate) total_distributed: Amount,
}

impl<L, R> FlexiblePool<L, R>
where
    L: FungibleAsset + Clone,
    R: AccessControl,
{
    /// Reward epoch in progress at `now`.
    pub fn current_reward_epoch(&self, now: Timestamp) -> EpochId {
        self.clock
            .current_epoch(now)
            .saturating_sub(self.config.reward_epoch_offset)
    }

    pub fn last_epoch_harvested(&self, user: &str) -> EpochId {
        self.state
            .farm
            .last_harvested
            .get(user)
            .copied()
            .unwrap_or(0)
    }

    /// Harvest a single reward epoch; it must directly follow the user's
    /// last harvested epoch.
    pub fn harvest(&mut self, user: &str, epoch: EpochId, now: Timestamp) -> Result<Amount> {
        self.transact(|pool| {
            let current = pool.current_reward_epoch(now);
            if epoch >= current {
                return Err(StakingError::EpochNotElapsed { epoch, current });
            }
            if epoch > pool.config.epochs_count {
                return Err(StakingError::EpochBeyondSchedule {
                    epoch,
                    epochs_count: pool.config.epochs_count,
                });
            }
            let expected = pool.last_epoch_harvested(user).saturating_add(1);
            if epoch != expected {
                return Err(StakingError::OutOfOrder {
                    expected,
                    requested: epoch,
                });
            }

            let reward = pool.harvest_epoch(user, epoch)?;
            pool.pay_reward(user, reward)?;
            pool.state.last_success_epoch = pool.clock.current_epoch(now);

            log::info!("harvest: {} collected {} for epoch {}", user, reward, epoch);
            Ok(reward)
        })
    }

    /// Harvest every elapsed epoch not yet harvested by `user`, paying the
    /// total in a single transfer.
    pub fn mass_harvest(&mut self, user: &str, now: Timestamp) -> Result<Amount> {
        self.transact(|pool| {
            let last = pool.last_epoch_harvested(user);
            let upto = pool.harvestable_through(now);

            let mut total: Amount = 0;
            let mut harvested = 0u64;
            for epoch in last.saturating_add(1)..=upto {
                let reward = pool.harvest_epoch(user, epoch)?;
                total = total.checked_add(reward).ok_or(LedgerError::Overflow)?;
                harvested += 1;
            }

            pool.pay_reward(user, total)?;
            pool.state.last_success_epoch = pool.clock.current_epoch(now);

            log::info!(
                "mass harvest: {} collected {} over {} epochs (through epoch {})",
                user,
                total,
                harvested,
                pool.last_epoch_harvested(user)
            );
            Ok(total)
        })
    }

    /// Reward `user` would receive from `mass_harvest` at `now`.
    pub fn available_reward(&self, user: &str, now: Timestamp) -> Result<Amount> {
        let mut total: Amount = 0;
        for epoch in self.last_epoch_harvested(user).saturating_add(1)..=self.harvestable_through(now) {
            let frozen = match self.state.farm.frozen.get(&epoch) {
                Some(frozen) => *frozen,
                None => self.pending_freeze(epoch),
            };
            let reward = self.user_reward(user, epoch, frozen)?;
            total = total.checked_add(reward).ok_or(LedgerError::Overflow)?;
        }
        Ok(total)
    }

    /// Set the reward of epochs not frozen yet.
    pub fn change_rewards_per_epoch(&mut self, caller: &str, amount: Amount) -> Result<()> {
        if !self.roles.has_role(Role::RewardsManager, caller) {
            log::warn!("rewards change rejected: {} is not a rewards manager", caller);
            return Err(StakingError::Unauthorized {
                role: Role::RewardsManager,
                account: caller.to_string(),
            });
        }
        self.transact(|pool| {
            log::info!(
                "rewards per epoch changed by {}: {} -> {}",
                caller,
                pool.state.total_reward_per_epoch,
                amount
            );
            pool.state.total_reward_per_epoch = amount;
            Ok(())
        })
    }

    pub fn total_reward_per_epoch(&self) -> Amount {
        self.state.total_reward_per_epoch
    }

    fn harvestable_through(&self, now: Timestamp) -> EpochId {
        self.current_reward_epoch(now)
            .saturating_sub(1)
            .min(self.config.epochs_count)
    }

    fn harvest_epoch(&mut self, user: &str, epoch: EpochId) -> Result<Amount> {
        let frozen = self.freeze_through(epoch)?;
        let reward = self.user_reward(user, epoch, frozen)?;
        self.state
            .farm
            .last_harvested
            .insert(user.to_string(), epoch);
        Ok(reward)
    }

    fn freeze_through(&mut self, epoch: EpochId) -> Result<FrozenEpoch> {
        while self.state.farm.last_initialized_epoch < epoch {
            let next = self.state.farm.last_initialized_epoch + 1;
            let frozen = self.pending_freeze(next);
            self.state.farm.frozen.insert(next, frozen);
            self.state.farm.last_initialized_epoch = next;
            log::debug!(
                "reward epoch {} frozen: pool size {}, reward {}",
                next,
                frozen.pool_size,
                frozen.reward
            );
        }
        self.state
            .farm
            .frozen
            .get(&epoch)
            .copied()
            .ok_or(StakingError::Ledger(LedgerError::EpochNotInitialized { epoch }))
    }

    fn pending_freeze(&self, epoch: EpochId) -> FrozenEpoch {
        FrozenEpoch {
            pool_size: self.epoch_pool_size(self.staking_epoch(epoch)),
            reward: self.state.total_reward_per_epoch,
        }
    }

    fn user_reward(&self, user: &str, epoch: EpochId, frozen: FrozenEpoch) -> Result<Amount> {
        if frozen.pool_size == 0 {
            return Ok(0);
        }
        let stake = self.epoch_user_balance(user, self.staking_epoch(epoch))?;
        Ok(mul_div(frozen.reward, stake, frozen.pool_size)?)
    }

    fn staking_epoch(&self, epoch: EpochId) -> EpochId {
        epoch.saturating_add(self.config.reward_epoch_offset)
    }

    fn pay_reward(&mut self, user: &str, amount: Amount) -> Result<()> {
        if amount == 0 {
            return Ok(());
        }
        self.ledger.transfer_from(
            &self.config.reward_asset,
            &self.config.pool_address,
            &self.config.reward_vault,
            user,
            amount,
        )?;
        self.state.farm.total_distributed = self
            .state
            .farm
            .total_distributed
            .checked_add(amount)
            .ok_or(LedgerError::Overflow)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use epoch_core::{EpochClock, RoleRegistry, StakingConfig, TokenLedger, DEFAULT_EPOCH_DURATION};

    const START: Timestamp = 1_000_000;
    const WEEK: u64 = DEFAULT_EPOCH_DURATION;

    fn at_epoch(epoch: u64) -> Timestamp {
        START + (epoch - 1) * WEEK + 1
    }

    fn farm() -> FlexiblePool<TokenLedger, RoleRegistry> {
        let config = StakingConfig {
            pool_address: "pool".to_string(),
            staked_asset: "BOND".to_string(),
            reward_asset: "REWARD".to_string(),
            reward_vault: "vault".to_string(),
            total_reward_per_epoch: 1000,
            epochs_count: 20,
            reward_epoch_offset: 1,
            emergency_withdraw_epochs: 10,
        };
        let mut ledger = TokenLedger::new();
        ledger.mint("BOND", "alice", 1_000).unwrap();
        ledger.approve("BOND", "alice", "pool", 1_000).unwrap();
        ledger.mint("REWARD", "vault", 1_000_000).unwrap();
        ledger.approve("REWARD", "vault", "pool", 1_000_000).unwrap();
        FlexiblePool::new(config, EpochClock::new(START, WEEK), ledger, RoleRegistry::new()).unwrap()
    }

    #[test]
    fn test_harvest_requires_elapsed_epoch() {
        let mut pool = farm();
        pool.deposit("alice", 1_000, at_epoch(1)).unwrap();

        // reward epoch 1 settles on staking epoch 2, still running
        assert_eq!(
            pool.harvest("alice", 1, at_epoch(2)),
            Err(StakingError::EpochNotElapsed { epoch: 1, current: 1 })
        );
        assert_eq!(pool.harvest("alice", 1, at_epoch(3)).unwrap(), 1000);
        assert_eq!(pool.last_epoch_harvested("alice"), 1);
    }

    #[test]
    fn test_freeze_is_sticky() {
        let mut pool = farm();
        pool.deposit("alice", 1_000, at_epoch(1)).unwrap();
        pool.harvest("alice", 1, at_epoch(3)).unwrap();

        let frozen = *pool.frozen_epoch(1).unwrap();
        assert_eq!(frozen, FrozenEpoch { pool_size: 1_000, reward: 1000 });

        pool.withdraw("alice", 400, at_epoch(3)).unwrap();
        assert_eq!(pool.frozen_epoch(1), Some(&frozen));
    }

    #[test]
    fn test_available_reward_matches_mass_harvest() {
        let mut pool = farm();
        pool.deposit("alice", 1_000, at_epoch(1)).unwrap();

        let now = at_epoch(6);
        let expected = pool.available_reward("alice", now).unwrap();
        assert_eq!(expected, 4 * 1000);
        assert_eq!(pool.mass_harvest("alice", now).unwrap(), expected);
        assert_eq!(pool.available_reward("alice", now).unwrap(), 0);
        assert_eq!(pool.ledger().balance_of("REWARD", "alice"), expected);
    }

    #[test]
    fn test_schedule_bounds_harvest() {
        let mut pool = farm();
        pool.deposit("alice", 1_000, at_epoch(1)).unwrap();

        let now = at_epoch(40);
        assert_eq!(pool.mass_harvest("alice", now).unwrap(), 20 * 1000);
        assert_eq!(pool.last_epoch_harvested("alice"), 20);
        assert_eq!(
            pool.harvest("alice", 21, now),
            Err(StakingError::EpochBeyondSchedule { epoch: 21, epochs_count: 20 })
        );
    }
}
