//! Fixed-point helpers shared by the ledger and the pools.
//!
//! Multipliers are fractions of an epoch scaled by [`BASE_MULTIPLIER`]
//! (`10^18` == one full epoch). Products are taken in 256 bits so that
//! 18-decimal balances can be weighted without overflow.

pub use primitive_types::U256;

use crate::error::{LedgerError, Result};
use crate::Amount;

/// Fixed-point unit for decay multipliers.
pub const BASE_MULTIPLIER: Amount = 1_000_000_000_000_000_000;

/// `value * numerator / denominator`, rounding down.
///
/// A zero denominator yields zero. Fails only when the quotient does not fit
/// an [`Amount`].
pub fn mul_div(value: Amount, numerator: Amount, denominator: Amount) -> Result<Amount> {
    if denominator == 0 {
        return Ok(0);
    }
    let quotient = U256::from(value) * U256::from(numerator) / U256::from(denominator);
    to_amount(quotient)
}

/// `numerator / denominator` as a [`BASE_MULTIPLIER`]-scaled ratio, rounding
/// down. Kept in 256 bits since the ratio itself may exceed an [`Amount`].
pub fn ratio(numerator: Amount, denominator: Amount) -> U256 {
    if denominator == 0 {
        return U256::zero();
    }
    U256::from(numerator) * U256::from(BASE_MULTIPLIER) / U256::from(denominator)
}

/// Apply a [`ratio`] to `value`, rounding down.
pub fn apply_ratio(value: Amount, ratio: U256) -> Result<Amount> {
    let product = U256::from(value)
        .checked_mul(ratio)
        .ok_or(LedgerError::Overflow)?;
    to_amount(product / U256::from(BASE_MULTIPLIER))
}

fn to_amount(value: U256) -> Result<Amount> {
    if value > U256::from(Amount::MAX) {
        return Err(LedgerError::Overflow);
    }
    Ok(value.as_u128())
}

/// Apply a multiplier to a balance.
pub fn apply_multiplier(balance: Amount, multiplier: Amount) -> Result<Amount> {
    mul_div(balance, multiplier, BASE_MULTIPLIER)
}

/// Stake-weighted average of two multipliers.
///
/// `prev_balance` staked for `prev_multiplier` of the epoch blended with
/// `amount` staked for `current_multiplier`:
///
/// ```text
/// ((prev_balance * prev_multiplier / BASE) + (amount * current_multiplier / BASE)) * BASE
///     / (prev_balance + amount)
/// ```
pub fn compute_new_multiplier(
    prev_balance: Amount,
    prev_multiplier: Amount,
    amount: Amount,
    current_multiplier: Amount,
) -> Result<Amount> {
    let prev_amount = apply_multiplier(prev_balance, prev_multiplier)?;
    let add_amount = apply_multiplier(amount, current_multiplier)?;
    let total = prev_balance
        .checked_add(amount)
        .ok_or(LedgerError::Overflow)?;
    if total == 0 {
        return Ok(BASE_MULTIPLIER);
    }

    let weighted = prev_amount
        .checked_add(add_amount)
        .ok_or(LedgerError::Overflow)?;
    mul_div(weighted, BASE_MULTIPLIER, total)
}
