//! Per-pool mutual exclusion flag

use serde::{Deserialize, Serialize};

use crate::error::{LedgerError, Result};

/// Set on entry to every external-effecting pool operation and cleared on
/// exit; a nested entry is rejected.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReentrancyGuard {
    entered: bool,
}

impl ReentrancyGuard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enter(&mut self) -> Result<()> {
        if self.entered {
            log::warn!("reentrant call rejected");
            return Err(LedgerError::Reentrancy);
        }
        self.entered = true;
        Ok(())
    }

    pub fn exit(&mut self) {
        self.entered = false;
    }

    pub fn is_entered(&self) -> bool {
        self.entered
    }
}
