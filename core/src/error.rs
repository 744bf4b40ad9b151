//! Ledger error types

use thiserror::Error;

use crate::{Amount, EpochId};

/// Errors raised by the epoch accounting primitives and the in-memory
/// collaborators.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LedgerError {
    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    #[error("Insufficient balance: requested {requested}, available {available}")]
    InsufficientBalance { requested: Amount, available: Amount },

    #[error("Insufficient allowance: requested {requested}, approved {approved}")]
    InsufficientAllowance { requested: Amount, approved: Amount },

    #[error("Epoch {epoch} is already initialized")]
    EpochAlreadyInitialized { epoch: EpochId },

    #[error("Cannot initialize epoch {epoch}: previous epoch not initialized")]
    PreviousEpochNotInitialized { epoch: EpochId },

    #[error("Epoch {epoch} is not initialized")]
    EpochNotInitialized { epoch: EpochId },

    #[error("Cannot initialize future epoch {epoch} (current epoch is {current})")]
    FutureEpoch { epoch: EpochId, current: EpochId },

    #[error("Checkpoint series is corrupt: {0}")]
    CorruptCheckpoints(String),

    #[error("Arithmetic overflow")]
    Overflow,

    #[error("Reentrant call rejected")]
    Reentrancy,
}

pub type Result<T> = std::result::Result<T, LedgerError>;
