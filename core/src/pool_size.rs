//! Pool-size registry
//!
//! Aggregate staked size per asset and epoch. Epochs are initialized in
//! order: epoch `n` can only be initialized once epoch `n - 1` is, and an
//! uninitialized epoch inherits its size from the last known state.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

use crate::error::{LedgerError, Result};
use crate::{Amount, AssetId, EpochId};

/// How the size of an epoch is resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EpochSize {
    /// No activity ever touched the asset.
    Uninitialized,
    /// Size booked for the epoch.
    Initialized(Amount),
    /// The asset is live but the epoch was never booked: the size is the
    /// pool's current balance of the asset.
    ForwardedFromBalance,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PoolSizeRegistry {
    sizes: HashMap<AssetId, BTreeMap<EpochId, Amount>>,
}

impl PoolSizeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_initialized(&self, asset: &str, epoch: EpochId) -> bool {
        self.sizes
            .get(asset)
            .is_some_and(|epochs| epochs.contains_key(&epoch))
    }

    /// Classify `epoch` for `asset`.
    pub fn resolve(&self, asset: &str, epoch: EpochId) -> EpochSize {
        match self.sizes.get(asset).and_then(|epochs| epochs.get(&epoch)) {
            Some(size) => EpochSize::Initialized(*size),
            None if !self.is_initialized(asset, 0) => EpochSize::Uninitialized,
            None => EpochSize::ForwardedFromBalance,
        }
    }

    /// Size of `epoch`, falling back to `live_balance` for epochs that were
    /// never booked on a live asset.
    pub fn current_size(&self, asset: &str, epoch: EpochId, live_balance: Amount) -> Amount {
        match self.resolve(asset, epoch) {
            EpochSize::Initialized(size) => size,
            EpochSize::Uninitialized => 0,
            EpochSize::ForwardedFromBalance => live_balance,
        }
    }

    /// Initialize `epoch` if needed by carrying the previous epoch forward.
    pub fn ensure_initialized(&mut self, asset: &str, epoch: EpochId) -> Result<()> {
        if self.is_initialized(asset, epoch) {
            return Ok(());
        }
        self.initialize(asset, epoch)
    }

    /// Explicit initialization of `epoch`; fails if it is already booked or
    /// lies in the future.
    pub fn manual_init(&mut self, asset: &str, epoch: EpochId, current_epoch: EpochId) -> Result<()> {
        if epoch > current_epoch {
            return Err(LedgerError::FutureEpoch {
                epoch,
                current: current_epoch,
            });
        }
        if self.is_initialized(asset, epoch) {
            return Err(LedgerError::EpochAlreadyInitialized { epoch });
        }
        self.initialize(asset, epoch)
    }

    fn initialize(&mut self, asset: &str, epoch: EpochId) -> Result<()> {
        let size = if epoch == 0 {
            0
        } else {
            let previous = self
                .sizes
                .get(asset)
                .and_then(|epochs| epochs.get(&(epoch - 1)))
                .copied();
            previous.ok_or(LedgerError::PreviousEpochNotInitialized { epoch })?
        };

        self.sizes
            .entry(asset.to_string())
            .or_default()
            .insert(epoch, size);
        log::debug!("pool size for {} initialized at epoch {}: {}", asset, epoch, size);
        Ok(())
    }

    /// Overwrite the size of `epoch`, marking it initialized. Used for the
    /// eager snapshot of the epoch after the current one.
    pub fn snapshot(&mut self, asset: &str, epoch: EpochId, size: Amount) {
        self.sizes
            .entry(asset.to_string())
            .or_default()
            .insert(epoch, size);
    }

    pub fn increase(&mut self, asset: &str, epoch: EpochId, amount: Amount) -> Result<()> {
        let size = self.booked_mut(asset, epoch)?;
        *size = size.checked_add(amount).ok_or(LedgerError::Overflow)?;
        Ok(())
    }

    pub fn decrease(&mut self, asset: &str, epoch: EpochId, amount: Amount) -> Result<()> {
        let size = self.booked_mut(asset, epoch)?;
        *size = size
            .checked_sub(amount)
            .ok_or(LedgerError::InsufficientBalance {
                requested: amount,
                available: *size,
            })?;
        Ok(())
    }

    fn booked_mut(&mut self, asset: &str, epoch: EpochId) -> Result<&mut Amount> {
        self.sizes
            .get_mut(asset)
            .and_then(|epochs| epochs.get_mut(&epoch))
            .ok_or(LedgerError::EpochNotInitialized { epoch })
    }

    /// Initialized epochs of `asset` in ascending order.
    pub fn initialized_epochs(&self, asset: &str) -> Vec<EpochId> {
        self.sizes
            .get(asset)
            .map(|epochs| epochs.keys().copied().collect())
            .unwrap_or_default()
    }

    /// True when every initialized epoch `n > 0` has an initialized `n - 1`.
    pub fn has_no_gaps(&self, asset: &str) -> bool {
        let epochs = self.initialized_epochs(asset);
        epochs
            .iter()
            .all(|epoch| *epoch == 0 || epochs.binary_search(&(epoch - 1)).is_ok())
    }
}
