//! Epoch Staking
//!
//! Flexible staking pool with time-weighted epoch balances and in-order
//! reward harvesting.
//!
//! Deposits made during an epoch only count for the fraction of the epoch
//! still ahead; the full amount counts from the next epoch on. Rewards of
//! every epoch are shared pro rata between stakers of that epoch.

pub mod error;
pub mod harvest;
pub mod pool;

pub use error::{Result, StakingError};
pub use harvest::{FarmState, FrozenEpoch};
pub use pool::{FlexiblePool, PoolReport, PoolState};
