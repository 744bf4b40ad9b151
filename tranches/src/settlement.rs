//! Settlement of posted epochs: principal withdrawal and reward claims

use epoch_core::{
    apply_ratio, mul_div, ratio, AccessControl, Amount, CustodyVault, EpochId, FungibleAsset,
    LedgerError, Timestamp,
};

use crate::error::{Result, TranchesError};
use crate::pool::TranchesPool;
use crate::tranche::{EpochData, Tranche};

/// Share of `pool_result` owed for `user_stake` out of `pool_staked`.
///
/// The pool-wide ratio is taken at full precision before being applied to
/// the stake.
pub fn withdraw_amount(user_stake: Amount, pool_result: Amount, pool_staked: Amount) -> Result<Amount> {
    Ok(apply_ratio(user_stake, ratio(pool_result, pool_staked))?)
}

impl<L, V, R> TranchesPool<L, V, R>
where
    L: FungibleAsset + Clone,
    V: CustodyVault + Clone,
    R: AccessControl,
{
    /// Withdraw the user's share of the posted result of `tranche`.
    pub fn withdraw(
        &mut self,
        user: &str,
        epoch: EpochId,
        tranche: Tranche,
        now: Timestamp,
    ) -> Result<Amount> {
        self.transact(|pool| pool.withdraw_inner(user, epoch, tranche, now))
    }

    /// Claim the reward of `tranche` for `epoch`. A repeated claim pays 0.
    pub fn claim_reward(
        &mut self,
        user: &str,
        epoch: EpochId,
        tranche: Tranche,
        now: Timestamp,
    ) -> Result<Amount> {
        self.transact(|pool| pool.claim_inner(user, epoch, tranche, now))
    }

    /// Withdraw and claim in one step; returns `(principal, reward)`.
    pub fn exit(
        &mut self,
        user: &str,
        epoch: EpochId,
        tranche: Tranche,
        now: Timestamp,
    ) -> Result<(Amount, Amount)> {
        self.transact(|pool| {
            let principal = pool.withdraw_inner(user, epoch, tranche, now)?;
            let reward = pool.claim_inner(user, epoch, tranche, now)?;
            Ok((principal, reward))
        })
    }

    /// Reward `user` could still claim for `tranche` in `epoch`; 0 until
    /// results are posted.
    pub fn available_reward(&self, user: &str, epoch: EpochId, tranche: Tranche) -> Result<Amount> {
        let data = self.epoch_data(epoch);
        if !data.posted_results {
            return Ok(0);
        }
        let Some(history) = self.user_history(user, epoch) else {
            return Ok(0);
        };
        if *history.rewards_claimed.get(tranche) {
            return Ok(0);
        }
        let weighted = history.sides.get(tranche).weighted(epoch)?;
        reward_share(&data, weighted)
    }

    fn withdraw_inner(
        &mut self,
        user: &str,
        epoch: EpochId,
        tranche: Tranche,
        now: Timestamp,
    ) -> Result<Amount> {
        let data = self.posted_epoch(epoch)?;
        let stake = self.user_balance(user, epoch, tranche);
        if stake == 0 {
            return Err(TranchesError::NothingToWithdraw { epoch, tranche });
        }
        let amount = withdraw_amount(stake, *data.results.get(tranche), *data.staked.get(tranche))?;

        if let Some(history) = self
            .state
            .users
            .get_mut(user)
            .and_then(|epochs| epochs.get_mut(&epoch))
        {
            history.sides.get_mut(tranche).balance = 0;
        }

        let asset = self.config.staked_asset.clone();
        let pool_address = self.config.pool_address.clone();
        if amount > 0 {
            self.vault
                .safe_withdraw(&mut self.ledger, &pool_address, &asset, amount)?;
            self.ledger.transfer(&asset, &pool_address, user, amount)?;
        }

        log::info!(
            "withdraw: {} took {} {} from the {} tranche of epoch {} (staked {}, current epoch {})",
            user,
            amount,
            asset,
            tranche,
            epoch,
            stake,
            self.clock.current_epoch(now)
        );
        Ok(amount)
    }

    fn claim_inner(
        &mut self,
        user: &str,
        epoch: EpochId,
        tranche: Tranche,
        now: Timestamp,
    ) -> Result<Amount> {
        let data = self.posted_epoch(epoch)?;
        let Some(history) = self
            .state
            .users
            .get_mut(user)
            .and_then(|epochs| epochs.get_mut(&epoch))
        else {
            return Ok(0);
        };
        if *history.rewards_claimed.get(tranche) {
            log::debug!("{} already claimed {} rewards for epoch {}", user, tranche, epoch);
            return Ok(0);
        }
        *history.rewards_claimed.get_mut(tranche) = true;
        let weighted = history.sides.get(tranche).weighted(epoch)?;

        let reward = reward_share(&data, weighted)?;
        if reward > 0 {
            self.ledger.transfer_from(
                &self.config.reward_asset,
                &self.config.pool_address,
                &self.config.reward_vault,
                user,
                reward,
            )?;
            self.state.total_rewards_paid = self
                .state
                .total_rewards_paid
                .checked_add(reward)
                .ok_or(LedgerError::Overflow)?;
        }

        log::info!(
            "claim: {} received {} {} for the {} tranche of epoch {} (current epoch {})",
            user,
            reward,
            self.config.reward_asset,
            tranche,
            epoch,
            self.clock.current_epoch(now)
        );
        Ok(reward)
    }

    fn posted_epoch(&self, epoch: EpochId) -> Result<EpochData> {
        let data = self.epoch_data(epoch);
        if !data.posted_results {
            return Err(TranchesError::ResultsNotPosted { epoch });
        }
        Ok(data)
    }
}

/// Share of the epoch's reward budget for a time-weighted stake.
fn reward_share(data: &EpochData, weighted: Amount) -> Result<Amount> {
    let total_weighted = data.weighted.total()?;
    Ok(mul_div(data.reward_budget, weighted, total_weighted)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_withdraw_amount_tracks_result() {
        assert_eq!(withdraw_amount(1_000, 1_005, 1_000).unwrap(), 1_005);
        assert_eq!(withdraw_amount(5_000, 4_995, 5_000).unwrap(), 4_995);
        assert_eq!(withdraw_amount(250, 900, 1_000).unwrap(), 225);
        assert_eq!(withdraw_amount(0, 900, 0).unwrap(), 0);
    }

    #[test]
    fn test_withdraw_amount_keeps_precision_on_small_pools() {
        // pools under 100 units still settle
        assert_eq!(withdraw_amount(50, 60, 50).unwrap(), 60);
        assert_eq!(withdraw_amount(10, 60, 50).unwrap(), 12);
        assert_eq!(withdraw_amount(1, 3, 7).unwrap(), 0);
    }

    #[test]
    fn test_withdraw_amount_at_token_scale() {
        let token = 1_000_000_000_000_000_000u128;
        assert_eq!(
            withdraw_amount(1_000 * token, 1_005 * token, 1_000 * token).unwrap(),
            1_005 * token
        );
        assert_eq!(
            withdraw_amount(2_500_000 * token, 4_995_000 * token, 5_000_000 * token).unwrap(),
            2_497_500 * token
        );
        // the ratio rounds down, never the other way
        assert_eq!(withdraw_amount(3 * token, token, 3 * token).unwrap(), token - 1);
    }

    #[test]
    fn test_reward_share_at_token_scale() {
        let token = 1_000_000_000_000_000_000u128;
        let data = EpochData {
            reward_budget: 100_000 * token,
            weighted: crate::tranche::TrancheSides::new(200 * token, 800 * token),
            ..EpochData::default()
        };
        assert_eq!(reward_share(&data, 200 * token).unwrap(), 20_000 * token);
    }

    #[test]
    fn test_reward_share_with_empty_epoch() {
        let data = EpochData {
            reward_budget: 600,
            ..EpochData::default()
        };
        assert_eq!(reward_share(&data, 0).unwrap(), 0);
    }
}
