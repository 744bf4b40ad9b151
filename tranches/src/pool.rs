//! Tranches pool
//!
//! Every epoch is a round: junior capital enters during the junior window,
//! senior capital after it, up to `senior_ratio` times the junior side. Once
//! the epoch is over a results poster books how the principal was split
//! between the tranches, and stakers withdraw their share of the result.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

use epoch_core::{
    AccessControl, Address, Amount, CustodyVault, EpochClock, EpochId, FungibleAsset,
    LedgerError, ReentrancyGuard, Role, Timestamp, TranchesConfig,
};

use crate::error::{Result, TranchesError};
use crate::tranche::{EpochData, Tranche, TrancheSides, UserHistory};

/// Mutable book of the pool; restored wholesale when an operation fails.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TranchesState {
    pub(crate) epochs: BTreeMap<EpochId, EpochData>,
    pub(crate) users: HashMap<Address, BTreeMap<EpochId, UserHistory>>,
    pub(crate) rewards_per_epoch: Amount,
    pub(crate) total_rewards_paid: Amount,
}

/// Dashboard summary of the pool
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranchesReport {
    pub current_epoch: EpochId,
    pub junior_period: bool,
    pub staked_asset: String,
    pub current_staked: TrancheSides<Amount>,
    pub senior_capacity: Amount,
    pub senior_ratio: Amount,
    pub rewards_per_epoch: Amount,
    pub posted_epochs: Vec<EpochId>,
    pub custody_balance: Amount,
    pub total_rewards_paid: Amount,
}

pub struct TranchesPool<L, V, R> {
    pub(crate) config: TranchesConfig,
    pub(crate) clock: EpochClock,
    pub(crate) state: TranchesState,
    pub(crate) ledger: L,
    pub(crate) vault: V,
    pub(crate) roles: R,
    guard: ReentrancyGuard,
}

impl<L, V, R> TranchesPool<L, V, R>
where
    L: FungibleAsset + Clone,
    V: CustodyVault + Clone,
    R: AccessControl,
{
    pub fn new(
        config: TranchesConfig,
        clock: EpochClock,
        ledger: L,
        vault: V,
        roles: R,
    ) -> Result<Self> {
        config.validate()?;
        log::info!(
            "tranches pool {} on {} (senior ratio {}:1, {} {} per epoch)",
            config.pool_address,
            config.staked_asset,
            config.senior_ratio,
            config.rewards_per_epoch,
            config.reward_asset
        );
        let state = TranchesState {
            rewards_per_epoch: config.rewards_per_epoch,
            ..TranchesState::default()
        };
        Ok(Self {
            config,
            clock,
            state,
            ledger,
            vault,
            roles,
            guard: ReentrancyGuard::new(),
        })
    }

    /// Run `op` under the reentrancy guard; on error the pool state, the
    /// token ledger and the custody vault are rolled back.
    pub(crate) fn transact<T, F>(&mut self, op: F) -> Result<T>
    where
        F: FnOnce(&mut Self) -> Result<T>,
    {
        self.guard.enter()?;
        let state = self.state.clone();
        let ledger = self.ledger.clone();
        let vault = self.vault.clone();

        let outcome = op(self);
        if outcome.is_err() {
            self.state = state;
            self.ledger = ledger;
            self.vault = vault;
        }

        self.guard.exit();
        outcome
    }

    /// Stake `amount` in `tranche` for the epoch in progress.
    pub fn deposit(
        &mut self,
        user: &str,
        amount: Amount,
        tranche: Tranche,
        now: Timestamp,
    ) -> Result<()> {
        self.transact(|pool| pool.deposit_inner(user, amount, tranche, now))
    }

    fn deposit_inner(
        &mut self,
        user: &str,
        amount: Amount,
        tranche: Tranche,
        now: Timestamp,
    ) -> Result<()> {
        let epoch = self.clock.current_epoch(now);
        if epoch == 0 {
            return Err(TranchesError::EpochNotStarted);
        }
        if amount == 0 {
            return Err(TranchesError::InvalidAmount(
                "deposit amount must be > 0".to_string(),
            ));
        }

        let junior_period = self.clock.is_junior_period(now);
        let staked = self.epoch_data(epoch).staked;
        match tranche {
            Tranche::Junior if !junior_period => {
                return Err(TranchesError::JuniorWindowClosed { epoch });
            }
            Tranche::Senior if junior_period => {
                return Err(TranchesError::JuniorWindowOpen { epoch });
            }
            Tranche::Senior => {
                let limit = self.senior_limit(&staked)?;
                let wanted = staked
                    .senior
                    .checked_add(amount)
                    .ok_or(LedgerError::Overflow)?;
                if wanted > limit {
                    return Err(TranchesError::SeniorLimitReached {
                        requested: amount,
                        staked: staked.senior,
                        limit,
                    });
                }
            }
            Tranche::Junior => {}
        }

        let asset = self.config.staked_asset.clone();
        let pool_address = self.config.pool_address.clone();
        self.ledger
            .transfer_from(&asset, &pool_address, user, &pool_address, amount)?;
        self.vault
            .safe_keep(&mut self.ledger, &pool_address, &asset, amount)?;

        let multiplier = self.clock.decay_multiplier(now);
        let position = self
            .state
            .users
            .entry(user.to_string())
            .or_default()
            .entry(epoch)
            .or_default()
            .sides
            .get_mut(tranche);

        let balance = position
            .balance
            .checked_add(amount)
            .ok_or(LedgerError::Overflow)?;
        let before = position.weighted(epoch)?;
        position
            .series
            .record_deposit(epoch, multiplier, amount, balance)?;
        let after = position.weighted(epoch)?;
        position.balance = balance;

        let data = self.state.epochs.entry(epoch).or_default();
        data.staked.add(tranche, amount)?;
        data.weighted.add(tranche, after.saturating_sub(before))?;

        log::info!(
            "deposit: {} staked {} {} as {} in epoch {}",
            user,
            amount,
            asset,
            tranche,
            epoch
        );
        Ok(())
    }

    /// Book how the principal of a finished epoch ended up split between the
    /// tranches. The split must conserve the staked total.
    pub fn post_results(
        &mut self,
        caller: &str,
        epoch: EpochId,
        junior_result: Amount,
        senior_result: Amount,
        now: Timestamp,
    ) -> Result<()> {
        if !self.roles.has_role(Role::ResultsPoster, caller) {
            log::warn!("post results for epoch {} rejected: {} is not a results poster", epoch, caller);
            return Err(TranchesError::Unauthorized {
                role: Role::ResultsPoster,
                account: caller.to_string(),
            });
        }

        self.transact(|pool| {
            let current = pool.clock.current_epoch(now);
            if epoch == 0 || epoch >= current {
                return Err(TranchesError::EpochNotFinalized { epoch, current });
            }
            let next = epoch + 1;
            if current != next || !pool.clock.is_junior_period(now) {
                return Err(TranchesError::PostingWindowClosed { epoch, next });
            }

            let budget = pool.state.rewards_per_epoch;
            let data = pool.state.epochs.entry(epoch).or_default();
            if data.posted_results {
                return Err(TranchesError::ResultsAlreadyPosted { epoch });
            }

            let results = TrancheSides::new(junior_result, senior_result);
            let staked = data.staked.total()?;
            let posted = results.total()?;
            if posted != staked {
                return Err(TranchesError::ConservationViolated {
                    results: posted,
                    staked,
                });
            }

            data.results = results;
            data.reward_budget = budget;
            data.posted_results = true;

            log::info!(
                "results posted for epoch {} by {}: junior {} -> {}, senior {} -> {}",
                epoch,
                caller,
                data.staked.junior,
                junior_result,
                data.staked.senior,
                senior_result
            );
            Ok(())
        })
    }

    /// Set the reward budget of epochs whose results are not posted yet.
    pub fn change_rewards_per_epoch(&mut self, caller: &str, amount: Amount) -> Result<()> {
        if !self.roles.has_role(Role::RewardsManager, caller) {
            log::warn!("rewards change rejected: {} is not a rewards manager", caller);
            return Err(TranchesError::Unauthorized {
                role: Role::RewardsManager,
                account: caller.to_string(),
            });
        }
        self.transact(|pool| {
            log::info!(
                "rewards per epoch changed by {}: {} -> {}",
                caller,
                pool.state.rewards_per_epoch,
                amount
            );
            pool.state.rewards_per_epoch = amount;
            Ok(())
        })
    }

    fn senior_limit(&self, staked: &TrancheSides<Amount>) -> Result<Amount> {
        Ok(staked
            .junior
            .checked_mul(self.config.senior_ratio)
            .ok_or(LedgerError::Overflow)?)
    }

    pub fn config(&self) -> &TranchesConfig {
        &self.config
    }

    pub fn clock(&self) -> &EpochClock {
        &self.clock
    }

    pub fn ledger(&self) -> &L {
        &self.ledger
    }

    pub fn ledger_mut(&mut self) -> &mut L {
        &mut self.ledger
    }

    pub fn vault(&self) -> &V {
        &self.vault
    }

    pub fn current_epoch(&self, now: Timestamp) -> EpochId {
        self.clock.current_epoch(now)
    }

    pub fn is_junior_period(&self, now: Timestamp) -> bool {
        self.clock.is_junior_period(now)
    }

    /// Record of `epoch`; untouched epochs read as empty.
    pub fn epoch_data(&self, epoch: EpochId) -> EpochData {
        self.state.epochs.get(&epoch).cloned().unwrap_or_default()
    }

    pub fn user_history(&self, user: &str, epoch: EpochId) -> Option<&UserHistory> {
        self.state.users.get(user).and_then(|epochs| epochs.get(&epoch))
    }

    /// Principal `user` still holds in `tranche` for `epoch`.
    pub fn user_balance(&self, user: &str, epoch: EpochId, tranche: Tranche) -> Amount {
        self.user_history(user, epoch)
            .map(|history| history.sides.get(tranche).balance)
            .unwrap_or(0)
    }

    /// Room left on the senior side of `epoch`.
    pub fn senior_capacity(&self, epoch: EpochId) -> Amount {
        let staked = self.epoch_data(epoch).staked;
        staked
            .junior
            .saturating_mul(self.config.senior_ratio)
            .saturating_sub(staked.senior)
    }

    pub fn rewards_per_epoch(&self) -> Amount {
        self.state.rewards_per_epoch
    }

    pub fn is_locked(&self) -> bool {
        self.guard.is_entered()
    }

    pub fn report(&self, now: Timestamp) -> TranchesReport {
        let epoch = self.clock.current_epoch(now);
        let posted_epochs = self
            .state
            .epochs
            .iter()
            .filter(|(_, data)| data.posted_results)
            .map(|(epoch, _)| *epoch)
            .collect();

        TranchesReport {
            current_epoch: epoch,
            junior_period: self.clock.is_junior_period(now),
            staked_asset: self.config.staked_asset.clone(),
            current_staked: self.epoch_data(epoch).staked,
            senior_capacity: self.senior_capacity(epoch),
            senior_ratio: self.config.senior_ratio,
            rewards_per_epoch: self.state.rewards_per_epoch,
            posted_epochs,
            custody_balance: self
                .vault
                .get_balance(&self.config.pool_address, &self.config.staked_asset),
            total_rewards_paid: self.state.total_rewards_paid,
        }
    }

    pub fn report_json(&self, now: Timestamp) -> serde_json::Result<String> {
        serde_json::to_string_pretty(&self.report(now))
    }
}
