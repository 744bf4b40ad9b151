//! Collaborator services consumed by the pools
//!
//! The pools never hold balances themselves; value moves through a
//! [`FungibleAsset`] service, principal is escrowed in a [`CustodyVault`] and
//! privileged calls are checked against an [`AccessControl`] service. The
//! in-memory implementations below back the tests and local simulations.

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt;

use crate::error::{LedgerError, Result};
use crate::{Address, Amount, AssetId};

/// Standard fungible-token semantics over any number of assets.
pub trait FungibleAsset {
    fn balance_of(&self, asset: &str, owner: &str) -> Amount;

    fn allowance(&self, asset: &str, owner: &str, spender: &str) -> Amount;

    fn approve(&mut self, asset: &str, owner: &str, spender: &str, amount: Amount) -> Result<()>;

    /// Move `amount` of `asset` from `from` (the caller) to `to`.
    fn transfer(&mut self, asset: &str, from: &str, to: &str, amount: Amount) -> Result<()>;

    /// Move `amount` of `asset` from `from` to `to` on behalf of `spender`,
    /// consuming allowance.
    fn transfer_from(
        &mut self,
        asset: &str,
        spender: &str,
        from: &str,
        to: &str,
        amount: Amount,
    ) -> Result<()>;
}

/// Escrow of balances per (owner, asset).
pub trait CustodyVault {
    /// Move `amount` from `owner` into custody.
    fn safe_keep(
        &mut self,
        ledger: &mut dyn FungibleAsset,
        owner: &str,
        asset: &str,
        amount: Amount,
    ) -> Result<()>;

    /// Release `amount` from custody back to `owner`.
    fn safe_withdraw(
        &mut self,
        ledger: &mut dyn FungibleAsset,
        owner: &str,
        asset: &str,
        amount: Amount,
    ) -> Result<()>;

    fn get_balance(&self, owner: &str, asset: &str) -> Amount;
}

/// Privileged roles checked by the pools.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Role {
    /// May post tranche results.
    ResultsPoster,
    /// May change the reward budget per epoch.
    RewardsManager,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::ResultsPoster => write!(f, "results-poster"),
            Role::RewardsManager => write!(f, "rewards-manager"),
        }
    }
}

pub trait AccessControl {
    fn has_role(&self, role: Role, account: &str) -> bool;
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct Account {
    balance: Amount,
    allowances: HashMap<Address, Amount>,
}

/// In-memory multi-asset token ledger.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TokenLedger {
    accounts: HashMap<AssetId, HashMap<Address, Account>>,
    total_supply: HashMap<AssetId, Amount>,
}

impl TokenLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mint(&mut self, asset: &str, recipient: &str, amount: Amount) -> Result<()> {
        let supply = self.total_supply.entry(asset.to_string()).or_insert(0);
        *supply = supply.checked_add(amount).ok_or(LedgerError::Overflow)?;

        let account = self.account_mut(asset, recipient);
        account.balance = account
            .balance
            .checked_add(amount)
            .ok_or(LedgerError::Overflow)?;
        Ok(())
    }

    pub fn total_supply(&self, asset: &str) -> Amount {
        self.total_supply.get(asset).copied().unwrap_or(0)
    }

    fn account(&self, asset: &str, owner: &str) -> Option<&Account> {
        self.accounts.get(asset).and_then(|accounts| accounts.get(owner))
    }

    fn account_mut(&mut self, asset: &str, owner: &str) -> &mut Account {
        self.accounts
            .entry(asset.to_string())
            .or_default()
            .entry(owner.to_string())
            .or_default()
    }

    fn move_balance(&mut self, asset: &str, from: &str, to: &str, amount: Amount) -> Result<()> {
        let available = self.balance_of(asset, from);
        if available < amount {
            return Err(LedgerError::InsufficientBalance {
                requested: amount,
                available,
            });
        }
        if from == to {
            return Ok(());
        }

        let recipient_balance = self.balance_of(asset, to);
        let credited = recipient_balance
            .checked_add(amount)
            .ok_or(LedgerError::Overflow)?;

        self.account_mut(asset, from).balance = available - amount;
        self.account_mut(asset, to).balance = credited;
        Ok(())
    }
}

impl FungibleAsset for TokenLedger {
    fn balance_of(&self, asset: &str, owner: &str) -> Amount {
        self.account(asset, owner).map(|acc| acc.balance).unwrap_or(0)
    }

    fn allowance(&self, asset: &str, owner: &str, spender: &str) -> Amount {
        self.account(asset, owner)
            .and_then(|acc| acc.allowances.get(spender).copied())
            .unwrap_or(0)
    }

    fn approve(&mut self, asset: &str, owner: &str, spender: &str, amount: Amount) -> Result<()> {
        self.account_mut(asset, owner)
            .allowances
            .insert(spender.to_string(), amount);
        Ok(())
    }

    fn transfer(&mut self, asset: &str, from: &str, to: &str, amount: Amount) -> Result<()> {
        self.move_balance(asset, from, to, amount)
    }

    fn transfer_from(
        &mut self,
        asset: &str,
        spender: &str,
        from: &str,
        to: &str,
        amount: Amount,
    ) -> Result<()> {
        let approved = self.allowance(asset, from, spender);
        if approved < amount {
            return Err(LedgerError::InsufficientAllowance {
                requested: amount,
                approved,
            });
        }
        self.move_balance(asset, from, to, amount)?;
        self.account_mut(asset, from)
            .allowances
            .insert(spender.to_string(), approved - amount);
        Ok(())
    }
}

/// In-memory custody vault holding escrowed balances under its own address.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Vault {
    address: Address,
    balances: HashMap<Address, HashMap<AssetId, Amount>>,
}

impl Vault {
    pub fn new(address: impl Into<Address>) -> Self {
        Self {
            address: address.into(),
            balances: HashMap::new(),
        }
    }

    pub fn address(&self) -> &str {
        &self.address
    }
}

impl CustodyVault for Vault {
    fn safe_keep(
        &mut self,
        ledger: &mut dyn FungibleAsset,
        owner: &str,
        asset: &str,
        amount: Amount,
    ) -> Result<()> {
        let held = self.get_balance(owner, asset);
        let updated = held.checked_add(amount).ok_or(LedgerError::Overflow)?;
        ledger.transfer(asset, owner, &self.address, amount)?;
        self.balances
            .entry(owner.to_string())
            .or_default()
            .insert(asset.to_string(), updated);
        Ok(())
    }

    fn safe_withdraw(
        &mut self,
        ledger: &mut dyn FungibleAsset,
        owner: &str,
        asset: &str,
        amount: Amount,
    ) -> Result<()> {
        let held = self.get_balance(owner, asset);
        if held < amount {
            return Err(LedgerError::InsufficientBalance {
                requested: amount,
                available: held,
            });
        }
        ledger.transfer(asset, &self.address, owner, amount)?;
        self.balances
            .entry(owner.to_string())
            .or_default()
            .insert(asset.to_string(), held - amount);
        Ok(())
    }

    fn get_balance(&self, owner: &str, asset: &str) -> Amount {
        self.balances
            .get(owner)
            .and_then(|assets| assets.get(asset))
            .copied()
            .unwrap_or(0)
    }
}

/// In-memory role membership.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RoleRegistry {
    members: HashMap<Role, HashSet<Address>>,
}

impl RoleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn grant(&mut self, role: Role, account: impl Into<Address>) {
        self.members.entry(role).or_default().insert(account.into());
    }

    pub fn revoke(&mut self, role: Role, account: &str) {
        if let Some(members) = self.members.get_mut(&role) {
            members.remove(account);
        }
    }
}

impl AccessControl for RoleRegistry {
    fn has_role(&self, role: Role, account: &str) -> bool {
        self.members
            .get(&role)
            .is_some_and(|members| members.contains(account))
    }
}
