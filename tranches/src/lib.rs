//! Epoch Tranches
//!
//! Two-tranche pool: junior and senior stakers share the outcome of each
//! epoch according to results posted once the epoch is over. Senior capital
//! is capped at a fixed multiple of junior capital.

pub mod error;
pub mod pool;
pub mod settlement;
pub mod tranche;

pub use error::{Result, TranchesError};
pub use pool::{TranchesPool, TranchesReport, TranchesState};
pub use settlement::withdraw_amount;
pub use tranche::{EpochData, Tranche, TrancheBalance, TrancheSides, UserHistory};
