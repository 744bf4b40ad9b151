//! Epoch Staking Core Library
//!
//! Accounting primitives shared by the staking pools:
//! - Epoch clock and time-decay multiplier
//! - Checkpoint ledger with point-in-time balance queries
//! - Per-epoch pool-size registry
//! - Collaborator services (tokens, custody, roles)
//! - Deployment configuration

pub mod assets;
pub mod checkpoint;
pub mod clock;
pub mod config;
pub mod error;
pub mod guard;
pub mod math;
pub mod pool_size;

pub type Address = String;
pub type AssetId = String;
pub type Amount = u128;
pub type EpochId = u64;
pub type Timestamp = u64;

pub use assets::{
    AccessControl, CustodyVault, FungibleAsset, Role, RoleRegistry, TokenLedger, Vault,
};
pub use checkpoint::{Checkpoint, CheckpointLedger, CheckpointSeries};
pub use clock::{EpochClock, DEFAULT_EPOCH_DURATION, DEFAULT_JUNIOR_WINDOW};
pub use config::{
    ClockConfig, ConfigError, ProtocolConfig, StakingConfig, TranchesConfig,
    DEFAULT_EMERGENCY_EPOCHS, DEFAULT_REWARD_EPOCH_OFFSET, DEFAULT_SENIOR_RATIO,
};
pub use error::{LedgerError, Result};
pub use guard::ReentrancyGuard;
pub use math::{apply_ratio, compute_new_multiplier, mul_div, ratio, BASE_MULTIPLIER, U256};
pub use pool_size::{EpochSize, PoolSizeRegistry};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_module_constants() {
        assert_eq!(BASE_MULTIPLIER, 10u128.pow(18));
        assert_eq!(DEFAULT_EPOCH_DURATION, 7 * 86400);
        assert_eq!(DEFAULT_SENIOR_RATIO, 5);
        assert_eq!(DEFAULT_EMERGENCY_EPOCHS, 10);
    }
}
